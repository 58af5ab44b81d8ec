//! Mapping between arbitrary byte payloads and runs of 4-byte tag blocks.
//!
//! Payloads are padded with trailing zero bytes up to a whole number of
//! blocks. Decoding strips every trailing zero byte, so a payload whose own
//! content ends in zeros comes back shorter than it was written. That loss
//! is part of the on-tag format and is kept as is.

use thiserror::Error;

use crate::types::{is_zero_block, Block, BLOCK_SIZE, USER_START_BLOCK};

/// Returns the payload followed by the zero bytes needed to fill its last block.
pub fn pad(payload: &[u8]) -> Vec<u8> {
    let mut padded = payload.to_vec();
    let rem = padded.len() % BLOCK_SIZE;
    if rem != 0 {
        padded.resize(padded.len() + BLOCK_SIZE - rem, 0);
    }
    padded
}

/// Splits a payload into padded blocks, in order.
///
/// An empty payload yields no blocks; callers that need at least one block
/// must reject empty input before encoding.
pub fn encode(payload: &[u8]) -> Vec<Block> {
    pad(payload)
        .chunks_exact(BLOCK_SIZE)
        .map(|chunk| {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            block
        })
        .collect()
}

/// Reassembles blocks read from a tag into the stored payload.
///
/// With `stop_on_zero_block` set, concatenation ends at the first all-zero
/// block, which is treated as an end-of-data marker. Trailing zero bytes are
/// then stripped. Returns `None` when nothing but padding was found, so
/// "tag had nothing" is never confused with a payload.
pub fn decode(blocks: &[Block], stop_on_zero_block: bool) -> Option<Vec<u8>> {
    let mut data = Vec::with_capacity(blocks.len() * BLOCK_SIZE);
    for block in blocks {
        if stop_on_zero_block && is_zero_block(block) {
            break;
        }
        data.extend_from_slice(block);
    }

    let end = data.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    data.truncate(end);

    if data.is_empty() { None } else { Some(data) }
}

/// Renders the bytes before the first NUL as ASCII, printable characters only.
pub fn text_until_nul(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| printable(*b))
        .collect()
}

/// Same as [`text_until_nul`] but keeps interior NULs, stripping only trailing ones.
pub fn text_trimmed(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    bytes[..end].iter().map(|b| printable(*b)).collect()
}

fn printable(b: u8) -> char {
    if (32..=126).contains(&b) { b as char } else { '.' }
}

/// How a read scans tag memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadProfile {
    pub start_block: u8,
    /// `None` keeps reading until a block cannot be read.
    pub max_blocks: Option<usize>,
    /// Treat the first all-zero block as the end of the data.
    pub stop_on_zero_block: bool,
}

impl ReadProfile {
    /// Generic hex payload read: up to 64 bytes, ends at the first empty block.
    pub const fn hex_payload() -> Self {
        Self {
            start_block: USER_START_BLOCK,
            max_blocks: Some(16),
            stop_on_zero_block: true,
        }
    }

    /// Fixed 16-byte message read.
    pub const fn message() -> Self {
        Self {
            start_block: USER_START_BLOCK,
            max_blocks: Some(4),
            stop_on_zero_block: false,
        }
    }

    /// NTAG text read used by the generic tag reader.
    pub const fn ntag_text() -> Self {
        Self {
            start_block: USER_START_BLOCK,
            max_blocks: Some(8),
            stop_on_zero_block: false,
        }
    }

    /// Every user block until the tag stops answering.
    pub const fn full_dump() -> Self {
        Self {
            start_block: USER_START_BLOCK,
            max_blocks: None,
            stop_on_zero_block: false,
        }
    }
}

impl Default for ReadProfile {
    fn default() -> Self {
        Self::hex_payload()
    }
}

/// Rejected user-supplied hex.
#[derive(Debug, Error)]
pub enum InvalidHexInput {
    #[error("No hex string provided")]
    Empty,
    #[error("Invalid hex string: whitespace inside byte at position {0}")]
    SplitByte(usize),
    #[error("Invalid hex string: {0}")]
    Malformed(#[from] hex::FromHexError),
}

/// Decodes a user-supplied hex string.
///
/// Surrounding whitespace is ignored, as is whitespace between byte pairs
/// ("48 65 6c"). Upper and lower case digits are both accepted.
pub fn parse_hex_payload(input: &str) -> Result<Vec<u8>, InvalidHexInput> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InvalidHexInput::Empty);
    }

    let mut digits = String::with_capacity(trimmed.len());
    for (pos, c) in trimmed.char_indices() {
        if c.is_whitespace() {
            if digits.len() % 2 != 0 {
                return Err(InvalidHexInput::SplitByte(pos));
            }
            continue;
        }
        digits.push(c);
    }

    Ok(hex::decode(digits)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_whole_blocks() {
        let blocks = encode(b"Hello");
        assert_eq!(blocks, vec![*b"Hell", [b'o', 0, 0, 0]]);
        assert_eq!(pad(b"Hello").len(), 8);
    }

    #[test]
    fn exact_multiple_gets_no_padding() {
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(pad(&payload), payload.to_vec());
        assert_eq!(encode(&payload).len(), 2);
    }

    #[test]
    fn empty_payload_encodes_to_nothing() {
        assert!(encode(&[]).is_empty());
    }

    #[test]
    fn encoding_rounds_up_to_whole_blocks() {
        for len in 1..=64usize {
            let payload = vec![0xAB; len];
            assert_eq!(encode(&payload).len(), len.div_ceil(4), "len {len}");
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let payload = b"deterministic payload";
        assert_eq!(encode(payload), encode(payload));
    }

    #[test]
    fn round_trip_strips_only_trailing_zeros() {
        for len in 1..=64usize {
            let payload: Vec<u8> = (0..len).map(|i| (i % 7) as u8).collect();
            let expected_len = payload.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            let decoded = decode(&encode(&payload), false);
            if expected_len == 0 {
                assert_eq!(decoded, None, "len {len}");
            } else {
                assert_eq!(decoded.as_deref(), Some(&payload[..expected_len]), "len {len}");
            }
        }
    }

    #[test]
    fn trailing_zero_content_is_lost() {
        let decoded = decode(&encode(&[0xCA, 0xFE, 0x00]), false);
        assert_eq!(decoded, Some(vec![0xCA, 0xFE]));
    }

    #[test]
    fn interior_zero_block_kept_without_stop_policy() {
        let blocks = [[1, 0, 0, 0], [0, 0, 0, 0], [2, 0, 0, 0]];
        assert_eq!(
            decode(&blocks, false),
            Some(vec![1, 0, 0, 0, 0, 0, 0, 0, 2])
        );
        assert_eq!(decode(&blocks, true), Some(vec![1]));
    }

    #[test]
    fn all_zero_blocks_mean_no_data() {
        let blocks = vec![[0u8; 4]; 16];
        assert_eq!(decode(&blocks, false), None);
        assert_eq!(decode(&blocks, true), None);
        assert_eq!(decode(&[], false), None);
    }

    #[test]
    fn parses_hex_with_spacing_and_case() {
        assert_eq!(parse_hex_payload(" 48656c6c6f ").unwrap(), b"Hello");
        assert_eq!(parse_hex_payload("48 65 6C").unwrap(), b"He\x6c");
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(parse_hex_payload(""), Err(InvalidHexInput::Empty)));
        assert!(matches!(parse_hex_payload("   "), Err(InvalidHexInput::Empty)));
        assert!(matches!(parse_hex_payload("4 8"), Err(InvalidHexInput::SplitByte(1))));
        assert!(matches!(parse_hex_payload("abc"), Err(InvalidHexInput::Malformed(_))));
        assert!(matches!(parse_hex_payload("zz"), Err(InvalidHexInput::Malformed(_))));
    }

    #[test]
    fn text_stops_at_first_nul() {
        assert_eq!(text_until_nul(b"Hello\0World\0\0"), "Hello");
        assert_eq!(text_until_nul(b"tab\there"), "tab.here");
        assert_eq!(text_trimmed(b"Hi\0there\0\0"), "Hi.there");
    }
}
