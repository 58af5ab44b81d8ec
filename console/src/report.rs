//! Text rendering of read results for the console tools.

use tagstation_shared::codec;
use tagstation_shared::inspect::{BlockStatus, TagInfo};
use tagstation_shared::mifare::{spaced_hex, SectorReport};
use tagstation_shared::reader::KeyType;
use tagstation_shared::{Block, ReadOutcome};

pub fn hex_results(read: &ReadOutcome) -> String {
    let hex_string = hex::encode(&read.payload);
    [
        "--- HEX DATA RESULTS ---".to_string(),
        format!("Total bytes read: {}", read.payload.len()),
        format!("Successful block reads: {}", read.blocks_read),
        format!("Original hex string: {}", hex_string),
        format!("Hex string length: {} characters", hex_string.len()),
    ]
    .join("\n")
}

/// Message stored in `blocks`, cut at the first NUL, plus the raw bytes.
pub fn message(blocks: &[Block]) -> String {
    let raw = blocks.concat();
    format!(
        "Decoded message: '{}'\nTotal bytes read: {}\nRaw data: {}",
        codec::text_until_nul(&raw),
        raw.len(),
        hex::encode(&raw)
    )
}

/// Text stored on an NTAG, trailing NULs removed.
pub fn ntag_text(blocks: &[Block]) -> String {
    format!("Complete data read: {}", codec::text_trimmed(&blocks.concat()))
}

pub fn sector(report: &SectorReport) -> String {
    let mut lines = vec![format!("Sector {}:", report.sector)];
    let Some((key_type, key)) = &report.key else {
        lines.push(format!("  Authentication failed for sector {}", report.sector));
        return lines.join("\n");
    };

    let key_name = match key_type {
        KeyType::A => "A",
        KeyType::B => "B",
    };
    lines.push(format!("  Authenticated with key {}: {}", key_name, spaced_hex(key)));
    for (block, data) in &report.blocks {
        lines.push(match data {
            Some(data) => {
                let ascii: String = data
                    .iter()
                    .map(|b| if (32..=126).contains(b) { *b as char } else { '.' })
                    .collect();
                format!("  Block {}: {} | {}", block, spaced_hex(data), ascii)
            }
            None => format!("  Error reading block {}", block),
        });
    }
    lines.join("\n")
}

pub fn tag_info(info: &TagInfo) -> String {
    let mut out = String::from("=== NFC TAG INFORMATION ===\n");
    out.push_str(&format!("UID: {}\n", info.uid));
    out.push_str(&format!("UID Length: {} bytes\n", info.uid.len()));
    out.push_str(&format!("Likely tag type: {}\n", info.kind.describe()));

    out.push_str("\n=== ATTEMPTING TO READ BLOCKS ===\n");
    for (block, data) in &info.header {
        let label = if *block == 0 { " (header)" } else { "" };
        let shown = match data {
            Some(data) => hex::encode_upper(data),
            None => "Failed to read".to_string(),
        };
        out.push_str(&format!("Block {}{}: {}\n", block, label, shown));
        if *block == 0 && data.is_some() {
            if info.header_echoes_uid {
                out.push_str("  Block 0 contains UID - likely NTAG2xx\n");
            } else {
                out.push_str("  Block 0 structure unclear\n");
            }
        }
    }

    out.push_str("\n=== USER DATA BLOCKS ===\n");
    for (block, status) in &info.user_blocks {
        let line = match status {
            BlockStatus::Empty(data) => format!("Block {}: {} (empty)", block, hex::encode_upper(data)),
            BlockStatus::Data(data) => {
                format!("Block {}: {} (contains data)", block, hex::encode_upper(data))
            }
            BlockStatus::Unreadable => format!("Block {}: Failed to read", block),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("\n=== ANALYSIS COMPLETE ===");
    out
}
