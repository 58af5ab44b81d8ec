//! Prompts for a hex string and writes it from block 4 of every tag presented.
//!
//! # Usage
//! ```bash
//! cargo run --bin write-pk
//! ```

use std::io::{self, Write};
use std::process;

use tagstation_console::{init_tracing, Console};
use tagstation_shared::{codec, USER_START_BLOCK};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    init_tracing();

    println!("Enter the hex string to write to NFC tag:");
    print!("Hex string: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let hex_string = line.trim();

    let data = match codec::parse_hex_payload(hex_string) {
        Ok(data) => data,
        Err(e) => {
            error!("Error: {}", e);
            process::exit(1);
        }
    };
    info!("Hex string to write: {} ({} bytes)", hex_string, data.len());
    let padded = codec::pad(&data);
    if padded.len() != data.len() {
        info!(
            "Padded to {} bytes with {} null bytes",
            padded.len(),
            padded.len() - data.len()
        );
    }

    let mut console = Console::open()?;
    info!("Waiting for an NFC tag...");
    console.run(|session, _uid| {
        let written = session.write_payload(USER_START_BLOCK, &padded)?;
        info!(
            "Write successful! {} blocks written. Remove the NFC tag.",
            written.blocks_written
        );
        Ok(())
    })
}
