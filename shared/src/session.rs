//! One detect → transfer → removal cycle against a reader.
//!
//! ```text
//! Idle → Detecting → Present → Transferring → Present → AwaitingRemoval → Idle
//! ```
//!
//! A session only becomes reusable after the tag has been seen leaving the
//! field, so a tag swapped in right after a transfer is never mistaken for
//! the one that was just written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codec::{self, ReadProfile};
use crate::led::{LedGuard, StatusLed};
use crate::reader::{BlockRead, BlockWrite, ReaderError, TagReader};
use crate::types::{is_zero_block, Block, Uid, BLOCK_SIZE, USER_START_BLOCK};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no tag found within {0:?}")]
    TagNotFound(Duration),
    #[error("failed to write block {block}")]
    BlockWriteFailed {
        block: u8,
        #[source]
        source: Option<ReaderError>,
    },
    #[error("no data found on tag ({blocks_read} blocks read)")]
    NoDataFound { blocks_read: usize },
    #[error("authentication failed for sector {sector}")]
    AuthenticationFailed { sector: u8 },
    #[error("sector {0} does not exist on a Mifare Classic card")]
    InvalidSector(u8),
    #[error("block {0} is reserved and cannot hold payload data")]
    ReservedBlock(u8),
    #[error("payload of {0} bytes is not a whole number of blocks")]
    UnalignedPayload(usize),
    #[error("payload of {blocks} blocks starting at block {start} runs past the last block")]
    BlockRangeOverflow { start: u8, blocks: usize },
    #[error("cannot {operation} while the session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("session cancelled")]
    Cancelled,
    #[error(transparent)]
    Reader(#[from] ReaderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Detecting,
    Present,
    Transferring,
    AwaitingRemoval,
}

/// Timing of detection probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Upper bound for a single detection probe.
    pub probe_timeout: Duration,
    /// Pause between probes.
    pub poll_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Shared stop request for the polling loops.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub bytes_written: usize,
    pub blocks_written: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Recovered payload with padding removed; never empty.
    pub payload: Vec<u8>,
    /// Blocks read from the tag, including an end-of-data block.
    pub blocks_read: usize,
    /// Raw blocks as read, for callers that print them.
    pub blocks: Vec<Block>,
}

pub struct TagSession<'a> {
    id: Uuid,
    pub(crate) reader: &'a mut dyn TagReader,
    pub(crate) led: &'a mut dyn StatusLed,
    poll: PollConfig,
    state: SessionState,
    uid: Option<Uid>,
    cancel: Option<CancelFlag>,
}

impl<'a> TagSession<'a> {
    pub fn new(reader: &'a mut dyn TagReader, led: &'a mut dyn StatusLed, poll: PollConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            reader,
            led,
            poll,
            state: SessionState::Idle,
            uid: None,
            cancel: None,
        }
    }

    /// Lets `cancel` interrupt the detection and removal waits.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// UID of the tag currently in the field, if one was detected.
    pub fn uid(&self) -> Option<&Uid> {
        self.uid.as_ref()
    }

    /// Probes until a tag shows up or `timeout` elapses.
    ///
    /// Each probe is clamped to the time left, so a slow reader cannot push
    /// the wait past its deadline. Probe errors are logged and polling goes on.
    pub fn wait_for_tag(&mut self, timeout: Duration) -> Result<Uid, SessionError> {
        self.expect_state("wait for a tag", SessionState::Idle)?;
        self.state = SessionState::Detecting;

        let deadline = Instant::now() + timeout;
        loop {
            if self.is_cancelled() {
                self.state = SessionState::Idle;
                return Err(SessionError::Cancelled);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.state = SessionState::Idle;
                return Err(SessionError::TagNotFound(timeout));
            }

            match self.reader.poll(self.poll.probe_timeout.min(remaining)) {
                Ok(Some(uid)) => {
                    info!(session = %self.id, uid = %uid, "Found NFC tag");
                    self.uid = Some(uid.clone());
                    self.state = SessionState::Present;
                    return Ok(uid);
                }
                Ok(None) => {}
                Err(e) => warn!(session = %self.id, "Detection probe failed: {}", e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(self.poll.poll_interval.min(remaining));
        }
    }

    /// Writes a block-aligned payload to consecutive blocks from `start_block`.
    ///
    /// The first block that fails aborts the write; nothing is retried.
    pub fn write_payload(&mut self, start_block: u8, payload: &[u8]) -> Result<WriteOutcome, SessionError> {
        self.expect_state("write", SessionState::Present)?;
        if start_block < USER_START_BLOCK {
            return Err(SessionError::ReservedBlock(start_block));
        }
        if payload.len() % BLOCK_SIZE != 0 {
            return Err(SessionError::UnalignedPayload(payload.len()));
        }
        let blocks = codec::encode(payload);
        if usize::from(start_block) + blocks.len() > usize::from(u8::MAX) + 1 {
            return Err(SessionError::BlockRangeOverflow {
                start: start_block,
                blocks: blocks.len(),
            });
        }

        self.state = SessionState::Transferring;
        let res = self.write_blocks(start_block, &blocks);
        self.state = SessionState::Present;
        res
    }

    fn write_blocks(&mut self, start_block: u8, blocks: &[Block]) -> Result<WriteOutcome, SessionError> {
        info!(
            session = %self.id,
            "Writing {} bytes in {} blocks...",
            blocks.len() * BLOCK_SIZE,
            blocks.len()
        );
        let _busy = LedGuard::on(&mut *self.led);

        for (block_number, data) in (start_block..=u8::MAX).zip(blocks) {
            debug!(session = %self.id, "Writing to block {}: {}", block_number, hex::encode(data));
            match BlockWrite::from(self.reader.write_block(block_number, data)) {
                BlockWrite::Written => {}
                BlockWrite::Rejected => {
                    error!(session = %self.id, "Tag rejected write of block {}", block_number);
                    return Err(SessionError::BlockWriteFailed {
                        block: block_number,
                        source: None,
                    });
                }
                BlockWrite::Failed(e) => {
                    error!(session = %self.id, "Error writing block {}: {}", block_number, e);
                    return Err(SessionError::BlockWriteFailed {
                        block: block_number,
                        source: Some(e),
                    });
                }
            }
        }

        Ok(WriteOutcome {
            bytes_written: blocks.len() * BLOCK_SIZE,
            blocks_written: blocks.len(),
        })
    }

    /// Reads blocks according to `profile` and recovers the stored payload.
    ///
    /// A block that cannot be read ends the scan; blocks read before it are
    /// kept. Fails with [`SessionError::NoDataFound`] when only padding remains.
    pub fn read_payload(&mut self, profile: ReadProfile) -> Result<ReadOutcome, SessionError> {
        self.expect_state("read", SessionState::Present)?;
        self.state = SessionState::Transferring;
        let blocks = self.read_blocks(profile);
        self.state = SessionState::Present;

        let blocks_read = blocks.len();
        match codec::decode(&blocks, profile.stop_on_zero_block) {
            Some(payload) => Ok(ReadOutcome {
                payload,
                blocks_read,
                blocks,
            }),
            None => Err(SessionError::NoDataFound { blocks_read }),
        }
    }

    fn read_blocks(&mut self, profile: ReadProfile) -> Vec<Block> {
        let _busy = LedGuard::on(&mut *self.led);
        let limit = profile.max_blocks.unwrap_or(usize::MAX);
        let mut blocks = Vec::new();

        for block_number in (profile.start_block..=u8::MAX).take(limit) {
            match BlockRead::from(self.reader.read_block(block_number)) {
                BlockRead::Data(data) => {
                    debug!(session = %self.id, "Block {}: {}", block_number, hex::encode(data));
                    blocks.push(data);
                    if profile.stop_on_zero_block && is_zero_block(&data) {
                        debug!(session = %self.id, "Reached end of data at block {}", block_number);
                        break;
                    }
                }
                BlockRead::Missing => {
                    warn!(session = %self.id, "Failed to read block {} - no data", block_number);
                    break;
                }
                BlockRead::Failed(e) => {
                    warn!(session = %self.id, "Error reading block {}: {}", block_number, e);
                    break;
                }
            }
        }
        blocks
    }

    /// Reads a single block, reserved blocks included. Used for diagnostics.
    pub fn read_block(&mut self, block: u8) -> Result<BlockRead, SessionError> {
        self.expect_state("read", SessionState::Present)?;
        Ok(BlockRead::from(self.reader.read_block(block)))
    }

    /// Waits, without a deadline, until the tag has left the field.
    ///
    /// Probe errors count as "still present". Only the cancel flag ends the
    /// wait early.
    pub fn await_removal(&mut self) -> Result<(), SessionError> {
        self.expect_state("await removal", SessionState::Present)?;
        self.state = SessionState::AwaitingRemoval;

        loop {
            if self.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            match self.reader.poll(self.poll.probe_timeout) {
                Ok(None) => break,
                Ok(Some(_)) => {}
                Err(e) => warn!(session = %self.id, "Removal probe failed: {}", e),
            }
            thread::sleep(self.poll.poll_interval);
        }

        info!(session = %self.id, "Tag removed");
        self.uid = None;
        self.state = SessionState::Idle;
        Ok(())
    }

    pub(crate) fn expect_state(&self, operation: &'static str, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RecordingLed, SimulatedField, SimulatedReader, SimulatedTag};

    fn fast_poll() -> PollConfig {
        PollConfig {
            probe_timeout: Duration::from_millis(5),
            poll_interval: Duration::from_millis(2),
        }
    }

    fn ntag() -> SimulatedTag {
        SimulatedTag::ntag(vec![0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66], 45)
    }

    #[test]
    fn hex_payload_round_trip() {
        let field = SimulatedField::with_tag(ntag());
        let mut reader = SimulatedReader::new(field.clone());
        let (mut led, probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());

        let uid = session.wait_for_tag(Duration::from_secs(1)).unwrap();
        assert_eq!(uid.to_hex(), "04112233445566");

        let payload = codec::pad(&hex::decode("48656c6c6f").unwrap());
        assert_eq!(payload.len(), 8);
        let written = session.write_payload(USER_START_BLOCK, &payload).unwrap();
        assert_eq!(written.blocks_written, 2);
        assert_eq!(field.page(4), Some(*b"Hell"));
        assert_eq!(field.page(5), Some([b'o', 0, 0, 0]));

        let read = session.read_payload(ReadProfile::hex_payload()).unwrap();
        assert_eq!(hex::encode(&read.payload), "48656c6c6f");
        assert_eq!(read.payload.len(), 5);
        assert_eq!(read.blocks_read, 3);
        assert!(!probe.is_lit());
        assert_eq!(probe.history(), vec![true, false, true, false]);
    }

    #[test]
    fn wait_times_out_without_tag() {
        let field = SimulatedField::empty();
        let mut reader = SimulatedReader::new(field.clone());
        let (mut led, probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());

        let started = Instant::now();
        let err = session.wait_for_tag(Duration::from_millis(40)).unwrap_err();
        assert!(matches!(err, SessionError::TagNotFound(_)));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(field.poll_count() > 0);
        assert!(probe.history().is_empty());
    }

    #[test]
    fn slow_probe_does_not_overrun_deadline() {
        let field = SimulatedField::empty();
        field.set_probe_delay(Duration::from_millis(300));
        let mut reader = SimulatedReader::new(field);
        let (mut led, _probe) = RecordingLed::new();
        let poll = PollConfig {
            probe_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(1),
        };
        let mut session = TagSession::new(&mut reader, &mut led, poll);

        let started = Instant::now();
        let err = session.wait_for_tag(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, SessionError::TagNotFound(_)));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn read_stops_at_failing_block_and_keeps_earlier_ones() {
        let mut tag = ntag();
        tag.write_page(4, *b"abcd");
        tag.write_page(5, *b"efgh");
        tag.write_page(6, *b"ijkl");
        tag.fail_reads_from(6);
        let field = SimulatedField::with_tag(tag);
        let mut reader = SimulatedReader::new(field);
        let (mut led, probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());

        session.wait_for_tag(Duration::from_secs(1)).unwrap();
        let read = session.read_payload(ReadProfile::hex_payload()).unwrap();
        assert_eq!(read.payload, b"abcdefgh");
        assert_eq!(read.blocks_read, 2);
        assert!(!probe.is_lit());
    }

    #[test]
    fn all_zero_tag_reports_no_data() {
        let field = SimulatedField::with_tag(ntag());
        let mut reader = SimulatedReader::new(field);
        let (mut led, _probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());

        session.wait_for_tag(Duration::from_secs(1)).unwrap();
        let profile = ReadProfile {
            stop_on_zero_block: false,
            ..ReadProfile::hex_payload()
        };
        let err = session.read_payload(profile).unwrap_err();
        assert!(matches!(err, SessionError::NoDataFound { blocks_read: 16 }));
        assert_eq!(session.state(), SessionState::Present);
    }

    #[test]
    fn full_dump_reads_until_tag_stops_answering() {
        let mut tag = SimulatedTag::ntag(vec![1, 2, 3, 4, 5, 6, 7], 10);
        tag.write_page(9, [9, 9, 9, 9]);
        let field = SimulatedField::with_tag(tag);
        let mut reader = SimulatedReader::new(field);
        let (mut led, _probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());

        session.wait_for_tag(Duration::from_secs(1)).unwrap();
        let read = session.read_payload(ReadProfile::full_dump()).unwrap();
        assert_eq!(read.blocks_read, 6);
        assert_eq!(read.payload.len(), 24);
    }

    #[test]
    fn write_aborts_on_failed_block() {
        let mut tag = ntag();
        tag.fail_writes_at(5);
        let field = SimulatedField::with_tag(tag);
        let mut reader = SimulatedReader::new(field.clone());
        let (mut led, probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());

        session.wait_for_tag(Duration::from_secs(1)).unwrap();
        let err = session.write_payload(4, b"aaaabbbbcccc").unwrap_err();
        assert!(matches!(err, SessionError::BlockWriteFailed { block: 5, .. }));
        assert_eq!(field.page(4), Some(*b"aaaa"));
        assert_eq!(field.page(6), Some([0; 4]));
        assert!(!probe.is_lit());
        assert_eq!(session.state(), SessionState::Present);
    }

    #[test]
    fn write_validates_before_touching_the_tag() {
        let field = SimulatedField::with_tag(ntag());
        let mut reader = SimulatedReader::new(field.clone());
        let (mut led, probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());
        session.wait_for_tag(Duration::from_secs(1)).unwrap();

        assert!(matches!(
            session.write_payload(3, b"abcd"),
            Err(SessionError::ReservedBlock(3))
        ));
        assert!(matches!(
            session.write_payload(4, b"abc"),
            Err(SessionError::UnalignedPayload(3))
        ));
        assert!(matches!(
            session.write_payload(250, &[1u8; 40]),
            Err(SessionError::BlockRangeOverflow { start: 250, blocks: 10 })
        ));
        assert!(probe.history().is_empty());
        assert_eq!(field.page(4), Some([0; 4]));
    }

    #[test]
    fn transfers_require_a_present_tag() {
        let field = SimulatedField::with_tag(ntag());
        let mut reader = SimulatedReader::new(field);
        let (mut led, _probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());

        assert!(matches!(
            session.read_payload(ReadProfile::default()),
            Err(SessionError::InvalidState { state: SessionState::Idle, .. })
        ));
        assert!(matches!(
            session.await_removal(),
            Err(SessionError::InvalidState { .. })
        ));

        session.wait_for_tag(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            session.wait_for_tag(Duration::from_secs(1)),
            Err(SessionError::InvalidState { state: SessionState::Present, .. })
        ));
    }

    #[test]
    fn removal_returns_session_to_idle() {
        let field = SimulatedField::with_tag(ntag());
        let mut reader = SimulatedReader::new(field.clone());
        let (mut led, _probe) = RecordingLed::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll());

        session.wait_for_tag(Duration::from_secs(1)).unwrap();
        let remover = field.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remover.remove();
        });
        session.await_removal().unwrap();
        handle.join().unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.uid().is_none());
        assert!(matches!(
            session.wait_for_tag(Duration::from_millis(20)),
            Err(SessionError::TagNotFound(_))
        ));
    }

    #[test]
    fn cancel_interrupts_removal_wait() {
        let field = SimulatedField::with_tag(ntag());
        let mut reader = SimulatedReader::new(field);
        let (mut led, _probe) = RecordingLed::new();
        let cancel = CancelFlag::new();
        let mut session = TagSession::new(&mut reader, &mut led, fast_poll()).with_cancel(cancel.clone());

        session.wait_for_tag(Duration::from_secs(1)).unwrap();
        let stopper = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stopper.cancel();
        });
        assert!(matches!(session.await_removal(), Err(SessionError::Cancelled)));
        handle.join().unwrap();
    }
}
