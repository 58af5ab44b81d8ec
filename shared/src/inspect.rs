//! Best-effort identification of a tag from its UID and first pages.

use crate::reader::BlockRead;
use crate::session::{SessionError, TagSession};
use crate::types::{is_zero_block, Block, Uid, USER_START_BLOCK};

const LAST_INSPECTED_BLOCK: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    MifareClassic1k,
    /// 7-byte UIDs are shared by NTAG2xx and Mifare Classic 4K.
    NtagOrClassic4k,
    Unknown,
}

impl TagKind {
    pub fn guess(uid: &Uid) -> Self {
        match uid.len() {
            4 => TagKind::MifareClassic1k,
            7 => TagKind::NtagOrClassic4k,
            _ => TagKind::Unknown,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            TagKind::MifareClassic1k => "Mifare Classic 1K",
            TagKind::NtagOrClassic4k => "NTAG2xx or Mifare Classic 4K",
            TagKind::Unknown => "Unknown tag type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    Empty(Block),
    Data(Block),
    Unreadable,
}

#[derive(Debug, Clone)]
pub struct TagInfo {
    pub uid: Uid,
    pub kind: TagKind,
    /// Blocks 0-3; `None` where the read failed.
    pub header: Vec<(u8, Option<Block>)>,
    /// Block 0 starts with the first three UID bytes, as on NTAG2xx.
    pub header_echoes_uid: bool,
    /// User blocks from 4, up to the first unreadable one.
    pub user_blocks: Vec<(u8, BlockStatus)>,
}

impl TagInfo {
    /// Reads the system and first user blocks of the tag in the field.
    pub fn collect(session: &mut TagSession<'_>, uid: &Uid) -> Result<Self, SessionError> {
        let mut header = Vec::with_capacity(usize::from(USER_START_BLOCK));
        for block in 0..USER_START_BLOCK {
            let data = match session.read_block(block)? {
                BlockRead::Data(data) => Some(data),
                BlockRead::Missing | BlockRead::Failed(_) => None,
            };
            header.push((block, data));
        }

        let header_echoes_uid = match (header.first(), uid.as_bytes().get(..3)) {
            (Some((_, Some(block0))), Some(prefix)) => block0[..3] == *prefix,
            _ => false,
        };

        let mut user_blocks = Vec::new();
        for block in USER_START_BLOCK..=LAST_INSPECTED_BLOCK {
            match session.read_block(block)? {
                BlockRead::Data(data) if is_zero_block(&data) => {
                    user_blocks.push((block, BlockStatus::Empty(data)));
                }
                BlockRead::Data(data) => user_blocks.push((block, BlockStatus::Data(data))),
                BlockRead::Missing | BlockRead::Failed(_) => {
                    user_blocks.push((block, BlockStatus::Unreadable));
                    break;
                }
            }
        }

        Ok(Self {
            uid: uid.clone(),
            kind: TagKind::guess(uid),
            header,
            header_echoes_uid,
            user_blocks,
        })
    }
}
