//! [`TagReader`] on top of the `pn532` crate, talking I2C through rppal.
//!
//! The crate owns framing, checksums and the ACK handshake. Every request
//! goes through [`Pn532::process`] with a single timeout that covers both
//! the ACK and the response, so a detection probe never outlives the time
//! its caller gave it.

use std::fmt::Debug;
use std::task::Poll;
use std::thread;
use std::time::Duration;

use pn532::requests::{Command, SAMMode};
use pn532::serialport::SysTimer;
use pn532::{Interface, Pn532, Request};
use rppal::i2c::I2c;
use tracing::{debug, trace};

use crate::reader::{FirmwareVersion, KeyType, MifareBlock, MifareKey, ReaderError, TagReader};
use crate::types::{Block, Uid, BLOCK_SIZE};

pub const DEFAULT_I2C_ADDRESS: u16 = 0x24;

const COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Bit 0 of the I2C status byte: a frame is waiting to be read.
const I2C_READY: u8 = 0x01;

/// Host ACK frame. Sent unprompted it cancels the command in progress.
const ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];

/// Logical number of the single target InListPassiveTarget selects.
const TARGET: u8 = 0x01;

/// READ through InDataExchange: 4 NTAG pages or one Mifare Classic block.
const TAG_READ: u8 = 0x30;

/// Response sizes handed to the crate, tag status byte included.
const INLIST_RESPONSE_LEN: usize = 17;
const READ_RESPONSE_LEN: usize = 17;
const STATUS_RESPONSE_LEN: usize = 1;

/// rppal I2C device as a `pn532` interface.
///
/// Every read from the chip starts with the status byte, so a frame read
/// fetches one extra byte and drops it.
pub struct PiI2c {
    i2c: I2c,
}

impl PiI2c {
    /// Opens the chip on the given I2C bus (bus 1 on the Pi header).
    pub fn open(bus: u8, address: u16) -> Result<Self, ReaderError> {
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;
        Ok(Self { i2c })
    }
}

impl Interface for PiI2c {
    type Error = rppal::i2c::Error;

    fn write(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        self.i2c.write(frame)?;
        Ok(())
    }

    fn wait_ready(&mut self) -> Poll<Result<(), Self::Error>> {
        let mut status = [0u8; 1];
        if let Err(e) = self.i2c.read(&mut status) {
            return Poll::Ready(Err(e));
        }
        if status[0] & I2C_READY != 0 {
            Poll::Ready(Ok(()))
        } else {
            thread::sleep(Duration::from_millis(1));
            Poll::Pending
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        let mut raw = vec![0u8; buf.len() + 1];
        self.i2c.read(&mut raw)?;
        buf.copy_from_slice(&raw[1..]);
        Ok(())
    }
}

fn reader_error<E: Debug>(err: pn532::Error<E>) -> ReaderError {
    match err {
        pn532::Error::TimeoutAck | pn532::Error::TimeoutResponse => ReaderError::Timeout,
        other => ReaderError::Pn532(format!("{other:?}")),
    }
}

/// Extracts the first target's UID from an InListPassiveTarget response.
fn parse_target(resp: &[u8]) -> Result<Option<Uid>, ReaderError> {
    // NbTg, Tg, SENS_RES (2), SEL_RES, NFCIDLength, NFCID...
    match resp {
        [0, ..] => Ok(None),
        [1, _tg, _sens0, _sens1, _sel, uid_len, rest @ ..] => rest
            .get(..usize::from(*uid_len))
            .map(|uid| Some(Uid::new(uid.to_vec())))
            .ok_or(ReaderError::UnexpectedResponse {
                command: Command::InListPassiveTarget as u8,
            }),
        _ => Err(ReaderError::UnexpectedResponse {
            command: Command::InListPassiveTarget as u8,
        }),
    }
}

pub struct Pn532Reader<I: Interface> {
    pn532: Pn532<I, SysTimer>,
}

impl Pn532Reader<PiI2c> {
    pub fn open_i2c(bus: u8, address: u16) -> Result<Self, ReaderError> {
        Ok(Self::new(PiI2c::open(bus, address)?))
    }
}

impl<I: Interface> Pn532Reader<I> {
    pub fn new(interface: I) -> Self {
        Self {
            pn532: Pn532::new(interface, SysTimer::new()),
        }
    }

    /// Puts the SAM in normal mode, required before any target command.
    pub fn sam_configuration(&mut self) -> Result<(), ReaderError> {
        self.exchange(&Request::sam_configuration(SAMMode::Normal, false), 0, COMMAND_TIMEOUT)?;
        Ok(())
    }

    fn exchange<const N: usize>(
        &mut self,
        request: &Request<N>,
        response_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, ReaderError> {
        let resp = self
            .pn532
            .process(request, response_len, timeout)
            .map_err(reader_error)?;
        trace!("pn532 response {:02x?}", resp);
        Ok(resp.to_vec())
    }

    /// InDataExchange answer split into the tag status byte and its data.
    fn tag_exchange<const N: usize>(
        &mut self,
        request: &Request<N>,
        response_len: usize,
    ) -> Result<(u8, Vec<u8>), ReaderError> {
        let resp = self.exchange(request, response_len, COMMAND_TIMEOUT)?;
        match resp.split_first() {
            Some((status, data)) => Ok((*status, data.to_vec())),
            None => Err(ReaderError::UnexpectedResponse {
                command: Command::InDataExchange as u8,
            }),
        }
    }

    fn abort(&mut self) -> Result<(), ReaderError> {
        self.pn532
            .interface
            .write(&ACK_FRAME)
            .map_err(|e| ReaderError::Transport(format!("{e:?}")))
    }
}

impl<I> TagReader for Pn532Reader<I>
where
    I: Interface + Send,
{
    fn firmware_version(&mut self) -> Result<FirmwareVersion, ReaderError> {
        let resp = self.exchange(&Request::GET_FIRMWARE_VERSION, 4, COMMAND_TIMEOUT)?;
        match resp[..] {
            [ic, version, revision, support, ..] => Ok(FirmwareVersion {
                ic,
                version,
                revision,
                support,
            }),
            _ => Err(ReaderError::UnexpectedResponse {
                command: Command::GetFirmwareVersion as u8,
            }),
        }
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Uid>, ReaderError> {
        let res = self
            .pn532
            .process(&Request::INLIST_ONE_ISO_A_TARGET, INLIST_RESPONSE_LEN, timeout)
            .map(parse_target);
        match res {
            Ok(target) => target,
            Err(pn532::Error::TimeoutResponse) => {
                // no target answered; cancel the pending list command
                self.abort()?;
                Ok(None)
            }
            Err(e) => Err(reader_error(e)),
        }
    }

    fn read_block(&mut self, block: u8) -> Result<Option<Block>, ReaderError> {
        let (status, data) = self.tag_exchange(&Request::ntag_read(block), READ_RESPONSE_LEN)?;
        if status & 0x3F != 0 || data.len() < BLOCK_SIZE {
            debug!("NTAG read of block {} returned status 0x{:02x}", block, status);
            return Ok(None);
        }
        let mut page = [0u8; BLOCK_SIZE];
        page.copy_from_slice(&data[..BLOCK_SIZE]);
        Ok(Some(page))
    }

    fn write_block(&mut self, block: u8, data: &Block) -> Result<bool, ReaderError> {
        let (status, _) = self.tag_exchange(&Request::ntag_write(block, data), STATUS_RESPONSE_LEN)?;
        Ok(status == 0x00)
    }

    fn authenticate(
        &mut self,
        uid: &Uid,
        block: u8,
        key_type: KeyType,
        key: &MifareKey,
    ) -> Result<bool, ReaderError> {
        // Crypto1 uses the last four bytes of the UID
        let uid = uid.as_bytes();
        let uid_tail = &uid[uid.len().saturating_sub(4)..];

        let mut params = [0u8; 13];
        params[..3].copy_from_slice(&[TARGET, key_type.command(), block]);
        params[3..9].copy_from_slice(key);
        params[13 - uid_tail.len()..].copy_from_slice(uid_tail);

        let request = Request::new(Command::InDataExchange, params);
        let (status, _) = self.tag_exchange(&request, STATUS_RESPONSE_LEN)?;
        Ok(status == 0x00)
    }

    fn read_mifare_block(&mut self, block: u8) -> Result<Option<MifareBlock>, ReaderError> {
        let request = Request::new(Command::InDataExchange, [TARGET, TAG_READ, block]);
        let (status, data) = self.tag_exchange(&request, READ_RESPONSE_LEN)?;
        if status != 0x00 || data.len() < 16 {
            return Ok(None);
        }
        let mut out = [0u8; 16];
        out.copy_from_slice(&data[..16]);
        Ok(Some(out))
    }
}
