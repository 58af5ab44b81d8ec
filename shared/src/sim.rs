//! In-memory stand-ins for the reader and the LED.
//!
//! A [`SimulatedField`] is the reader's RF field: tags are placed into it and
//! taken out from any thread while a [`SimulatedReader`] polls it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::led::StatusLed;
use crate::mifare::sector_of;
use crate::reader::{FirmwareVersion, KeyType, MifareBlock, MifareKey, ReaderError, TagReader};
use crate::types::{Block, Uid};

#[derive(Debug, Clone)]
enum Memory {
    Ntag {
        pages: Vec<Block>,
    },
    Classic {
        blocks: Vec<MifareBlock>,
        /// (key A, key B) per sector
        keys: Vec<(MifareKey, MifareKey)>,
        authenticated_sector: Option<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct SimulatedTag {
    uid: Uid,
    memory: Memory,
    fail_reads_from: Option<u8>,
    fail_writes_at: Option<u8>,
}

impl SimulatedTag {
    /// NTAG2xx with `pages` pages; pages 0-3 hold the UID echo and a
    /// capability container like a factory-fresh tag.
    pub fn ntag(uid: Vec<u8>, pages: usize) -> Self {
        let mut memory = vec![[0u8; 4]; pages];
        if uid.len() == 7 && pages >= 4 {
            let bcc0 = 0x88 ^ uid[0] ^ uid[1] ^ uid[2];
            let bcc1 = uid[3] ^ uid[4] ^ uid[5] ^ uid[6];
            memory[0] = [uid[0], uid[1], uid[2], bcc0];
            memory[1] = [uid[3], uid[4], uid[5], uid[6]];
            memory[2] = [bcc1, 0x48, 0x00, 0x00];
            memory[3] = [0xE1, 0x10, ((pages - 4) * 4 / 8) as u8, 0x00];
        }
        Self {
            uid: Uid::new(uid),
            memory: Memory::Ntag { pages: memory },
            fail_reads_from: None,
            fail_writes_at: None,
        }
    }

    /// Mifare Classic 1K whose sectors all use `key` as both key A and key B.
    pub fn classic_1k(uid: [u8; 4], key: MifareKey) -> Self {
        let mut blocks = vec![[0u8; 16]; 64];
        blocks[0][..4].copy_from_slice(&uid);
        blocks[0][4] = uid.iter().fold(0, |acc, b| acc ^ b);
        Self {
            uid: Uid::new(uid.to_vec()),
            memory: Memory::Classic {
                blocks,
                keys: vec![(key, key); 16],
                authenticated_sector: None,
            },
            fail_reads_from: None,
            fail_writes_at: None,
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn write_page(&mut self, page: u8, data: Block) {
        if let Memory::Ntag { pages } = &mut self.memory {
            if let Some(slot) = pages.get_mut(usize::from(page)) {
                *slot = data;
            }
        }
    }

    pub fn page(&self, page: u8) -> Option<Block> {
        match &self.memory {
            Memory::Ntag { pages } => pages.get(usize::from(page)).copied(),
            Memory::Classic { .. } => None,
        }
    }

    pub fn write_classic_block(&mut self, block: u8, data: MifareBlock) {
        if let Memory::Classic { blocks, .. } = &mut self.memory {
            if let Some(slot) = blocks.get_mut(usize::from(block)) {
                *slot = data;
            }
        }
    }

    pub fn set_sector_keys(&mut self, sector: u8, key_a: MifareKey, key_b: MifareKey) {
        if let Memory::Classic { keys, .. } = &mut self.memory {
            if let Some(slot) = keys.get_mut(usize::from(sector)) {
                *slot = (key_a, key_b);
            }
        }
    }

    /// Every read of `block` or later fails with a transport error.
    pub fn fail_reads_from(&mut self, block: u8) {
        self.fail_reads_from = Some(block);
    }

    /// The write of `block` fails with a transport error.
    pub fn fail_writes_at(&mut self, block: u8) {
        self.fail_writes_at = Some(block);
    }

    fn read_fails(&self, block: u8) -> bool {
        self.fail_reads_from.is_some_and(|from| block >= from)
    }
}

#[derive(Debug, Default)]
struct FieldState {
    tag: Option<SimulatedTag>,
    polls: usize,
    probe_delay: Duration,
}

/// Shared handle on the simulated RF field.
#[derive(Debug, Clone, Default)]
pub struct SimulatedField(Arc<Mutex<FieldState>>);

impl SimulatedField {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_tag(tag: SimulatedTag) -> Self {
        let field = Self::default();
        field.present(tag);
        field
    }

    pub fn present(&self, tag: SimulatedTag) {
        self.lock().tag = Some(tag);
    }

    /// Takes the tag out of the field, returning it with any data written to it.
    pub fn remove(&self) -> Option<SimulatedTag> {
        self.lock().tag.take()
    }

    pub fn page(&self, page: u8) -> Option<Block> {
        self.lock().tag.as_ref().and_then(|t| t.page(page))
    }

    /// Number of detection probes seen so far.
    pub fn poll_count(&self) -> usize {
        self.lock().polls
    }

    /// Makes every probe take up to `delay`, bounded by the probe timeout.
    pub fn set_probe_delay(&self, delay: Duration) {
        self.lock().probe_delay = delay;
    }

    fn lock(&self) -> MutexGuard<'_, FieldState> {
        // a panicking test thread must not wedge the others
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// [`TagReader`] backed by a [`SimulatedField`].
pub struct SimulatedReader {
    field: SimulatedField,
}

impl SimulatedReader {
    pub fn new(field: SimulatedField) -> Self {
        Self { field }
    }
}

fn no_tag() -> ReaderError {
    ReaderError::Transport("no tag in field".into())
}

impl TagReader for SimulatedReader {
    fn firmware_version(&mut self) -> Result<FirmwareVersion, ReaderError> {
        Ok(FirmwareVersion {
            ic: 0x32,
            version: 1,
            revision: 6,
            support: 7,
        })
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Uid>, ReaderError> {
        let delay = {
            let mut state = self.field.lock();
            state.polls += 1;
            state.probe_delay.min(timeout)
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.field.lock();
        Ok(state.tag.as_mut().map(|tag| {
            if let Memory::Classic {
                authenticated_sector, ..
            } = &mut tag.memory
            {
                *authenticated_sector = None;
            }
            tag.uid.clone()
        }))
    }

    fn read_block(&mut self, block: u8) -> Result<Option<Block>, ReaderError> {
        let state = self.field.lock();
        let tag = state.tag.as_ref().ok_or_else(no_tag)?;
        if tag.read_fails(block) {
            return Err(ReaderError::Transport(format!("injected read failure at block {block}")));
        }
        Ok(tag.page(block))
    }

    fn write_block(&mut self, block: u8, data: &Block) -> Result<bool, ReaderError> {
        let mut state = self.field.lock();
        let tag = state.tag.as_mut().ok_or_else(no_tag)?;
        if tag.fail_writes_at == Some(block) {
            return Err(ReaderError::Transport(format!("injected write failure at block {block}")));
        }
        match &mut tag.memory {
            Memory::Ntag { pages } => match pages.get_mut(usize::from(block)) {
                Some(slot) => {
                    *slot = *data;
                    Ok(true)
                }
                None => Ok(false),
            },
            Memory::Classic { .. } => Ok(false),
        }
    }

    fn authenticate(
        &mut self,
        uid: &Uid,
        block: u8,
        key_type: KeyType,
        key: &MifareKey,
    ) -> Result<bool, ReaderError> {
        let mut state = self.field.lock();
        let tag = state.tag.as_mut().ok_or_else(no_tag)?;
        if &tag.uid != uid {
            return Ok(false);
        }
        let Memory::Classic {
            keys,
            authenticated_sector,
            ..
        } = &mut tag.memory
        else {
            return Ok(false);
        };

        let sector = sector_of(block);
        let accepted = keys.get(usize::from(sector)).is_some_and(|(a, b)| match key_type {
            KeyType::A => a == key,
            KeyType::B => b == key,
        });
        *authenticated_sector = accepted.then_some(sector);
        Ok(accepted)
    }

    fn read_mifare_block(&mut self, block: u8) -> Result<Option<MifareBlock>, ReaderError> {
        let state = self.field.lock();
        let tag = state.tag.as_ref().ok_or_else(no_tag)?;
        if tag.read_fails(block) {
            return Err(ReaderError::Transport(format!("injected read failure at block {block}")));
        }
        match &tag.memory {
            Memory::Classic {
                blocks,
                authenticated_sector,
                ..
            } if *authenticated_sector == Some(sector_of(block)) => {
                Ok(blocks.get(usize::from(block)).copied())
            }
            _ => Ok(None),
        }
    }
}

/// LED that records every transition; `true` is lit.
pub struct RecordingLed {
    history: Arc<Mutex<Vec<bool>>>,
}

/// Read side of a [`RecordingLed`].
#[derive(Clone)]
pub struct LedProbe {
    history: Arc<Mutex<Vec<bool>>>,
}

impl RecordingLed {
    pub fn new() -> (Self, LedProbe) {
        let history = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                history: history.clone(),
            },
            LedProbe { history },
        )
    }

    fn record(&self, lit: bool) {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(lit);
    }
}

impl StatusLed for RecordingLed {
    fn set_high(&mut self) {
        self.record(true);
    }

    fn set_low(&mut self) {
        self.record(false);
    }
}

impl LedProbe {
    pub fn history(&self) -> Vec<bool> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_lit(&self) -> bool {
        self.history().last().copied().unwrap_or(false)
    }
}
