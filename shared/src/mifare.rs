//! Mifare Classic sector reads with a short list of well-known keys.
//!
//! The key list only covers factory and common transport keys. Cards that
//! were personalised with their own keys will simply fail authentication.

use tracing::{debug, info, warn};

use crate::led::LedGuard;
use crate::reader::{KeyType, MifareBlock, MifareKey};
use crate::session::{SessionError, SessionState, TagSession};
use crate::types::Uid;

pub const DEFAULT_KEYS: [MifareKey; 4] = [
    [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], // factory default
    [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5],
    [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassicSize {
    OneK,
    FourK,
}

impl ClassicSize {
    /// Card size as guessed from the UID length.
    pub fn from_uid(uid: &Uid) -> Self {
        match uid.len() {
            7 => ClassicSize::FourK,
            _ => ClassicSize::OneK,
        }
    }

    pub fn sectors(self) -> u8 {
        match self {
            ClassicSize::OneK => 16,
            ClassicSize::FourK => MAX_SECTORS,
        }
    }
}

/// Sectors on the largest (4K) card.
pub const MAX_SECTORS: u8 = 40;

/// First block and block count of a sector, `None` past the last 4K sector.
///
/// Sectors 0-31 have 4 blocks; the 4K-only sectors 32-39 have 16.
pub fn sector_layout(sector: u8) -> Option<(u8, u8)> {
    match sector {
        0..32 => Some((sector * 4, 4)),
        32..MAX_SECTORS => Some((128 + (sector - 32) * 16, 16)),
        _ => None,
    }
}

/// Sector holding `block`. Every block number maps to one of the 40 sectors.
pub fn sector_of(block: u8) -> u8 {
    if block < 128 {
        block / 4
    } else {
        32 + (block - 128) / 16
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorReport {
    pub sector: u8,
    /// Key that opened the sector, `None` when no default key worked.
    pub key: Option<(KeyType, MifareKey)>,
    /// Data blocks, trailer excluded; `None` for blocks that failed to read.
    pub blocks: Vec<(u8, Option<MifareBlock>)>,
}

impl TagSession<'_> {
    /// Authenticates a sector with the default keys and reads its data blocks.
    ///
    /// For each key, key A is tried before key B; the first success wins.
    pub fn read_sector(&mut self, sector: u8) -> Result<SectorReport, SessionError> {
        self.expect_state("read a sector", SessionState::Present)?;
        self.read_sector_blocks(sector)
    }

    /// Reads every sector of a Mifare Classic card, skipping the ones no
    /// default key opens.
    pub fn dump_classic(&mut self) -> Result<Vec<SectorReport>, SessionError> {
        self.expect_state("dump", SessionState::Present)?;
        let size = self
            .uid()
            .map(ClassicSize::from_uid)
            .unwrap_or(ClassicSize::OneK);
        info!("Reading Mifare Classic card ({:?}, {} sectors)", size, size.sectors());

        let mut reports = Vec::with_capacity(usize::from(size.sectors()));
        for sector in 0..size.sectors() {
            match self.read_sector_blocks(sector) {
                Ok(report) => reports.push(report),
                Err(SessionError::AuthenticationFailed { sector }) => {
                    warn!("Authentication failed for sector {}", sector);
                    reports.push(SectorReport {
                        sector,
                        key: None,
                        blocks: Vec::new(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reports)
    }

    fn read_sector_blocks(&mut self, sector: u8) -> Result<SectorReport, SessionError> {
        let uid = self
            .uid()
            .cloned()
            .ok_or(SessionError::InvalidState {
                operation: "read a sector",
                state: self.state(),
            })?;
        let (first_block, block_count) =
            sector_layout(sector).ok_or(SessionError::InvalidSector(sector))?;

        let key = self
            .authenticate_sector(&uid, first_block)
            .ok_or(SessionError::AuthenticationFailed { sector })?;
        debug!("Sector {} authenticated with key {:?}", sector, key.0);

        let _busy = LedGuard::on(&mut *self.led);
        // the last block of each sector is the trailer holding the keys
        let blocks = (first_block..first_block + block_count - 1)
            .map(|block| match self.reader.read_mifare_block(block) {
                Ok(Some(data)) => (block, Some(data)),
                Ok(None) => {
                    warn!("Block {} returned no data", block);
                    (block, None)
                }
                Err(e) => {
                    warn!("Error reading block {}: {}", block, e);
                    (block, None)
                }
            })
            .collect();

        Ok(SectorReport {
            sector,
            key: Some(key),
            blocks,
        })
    }

    fn authenticate_sector(&mut self, uid: &Uid, first_block: u8) -> Option<(KeyType, MifareKey)> {
        for key in DEFAULT_KEYS {
            for key_type in [KeyType::A, KeyType::B] {
                match self.reader.authenticate(uid, first_block, key_type, &key) {
                    Ok(true) => return Some((key_type, key)),
                    Ok(false) => {}
                    Err(e) => debug!("Authentication attempt errored: {}", e),
                }
                // a failed authentication halts the card; select it again
                if let Err(e) = self.reader.poll(self.poll_config().probe_timeout) {
                    debug!("Re-select after failed authentication errored: {}", e);
                }
            }
        }
        None
    }
}

/// Formats a key or block as space separated hex.
pub fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
