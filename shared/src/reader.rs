//! Capabilities the session needs from an NFC reader.

use std::time::Duration;

use thiserror::Error;

use crate::types::{Block, Uid};

/// Mifare Classic sector key.
pub type MifareKey = [u8; 6];

/// Mifare Classic data block.
pub type MifareBlock = [u8; 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    A,
    B,
}

impl KeyType {
    /// Authentication command byte sent to the card.
    pub fn command(self) -> u8 {
        match self {
            KeyType::A => 0x60,
            KeyType::B => 0x61,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub ic: u8,
    pub version: u8,
    pub revision: u8,
    pub support: u8,
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("i2c error: {0}")]
    I2c(#[from] rppal::i2c::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out waiting for the reader")]
    Timeout,
    #[error("PN532 error: {0}")]
    Pn532(String),
    #[error("unexpected response to command 0x{command:02x}")]
    UnexpectedResponse { command: u8 },
}

/// A block-addressable NFC reader.
///
/// Implementations talk to a single transceiver and are not re-entrant; the
/// caller serializes access.
pub trait TagReader: Send {
    fn firmware_version(&mut self) -> Result<FirmwareVersion, ReaderError>;

    /// Probes once for a tag, giving up after `timeout`.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Uid>, ReaderError>;

    /// Reads one 4-byte block. `Ok(None)` means the tag answered with an error.
    fn read_block(&mut self, block: u8) -> Result<Option<Block>, ReaderError>;

    /// Writes one 4-byte block. `Ok(false)` means the tag rejected the write.
    fn write_block(&mut self, block: u8, data: &Block) -> Result<bool, ReaderError>;

    fn authenticate(
        &mut self,
        uid: &Uid,
        block: u8,
        key_type: KeyType,
        key: &MifareKey,
    ) -> Result<bool, ReaderError>;

    fn read_mifare_block(&mut self, block: u8) -> Result<Option<MifareBlock>, ReaderError>;
}

/// Result of reading a single block.
#[derive(Debug)]
pub enum BlockRead {
    Data(Block),
    /// The tag returned no data for this block.
    Missing,
    Failed(ReaderError),
}

impl From<Result<Option<Block>, ReaderError>> for BlockRead {
    fn from(res: Result<Option<Block>, ReaderError>) -> Self {
        match res {
            Ok(Some(block)) => BlockRead::Data(block),
            Ok(None) => BlockRead::Missing,
            Err(e) => BlockRead::Failed(e),
        }
    }
}

/// Result of writing a single block.
#[derive(Debug)]
pub enum BlockWrite {
    Written,
    Rejected,
    Failed(ReaderError),
}

impl From<Result<bool, ReaderError>> for BlockWrite {
    fn from(res: Result<bool, ReaderError>) -> Self {
        match res {
            Ok(true) => BlockWrite::Written,
            Ok(false) => BlockWrite::Rejected,
            Err(e) => BlockWrite::Failed(e),
        }
    }
}
