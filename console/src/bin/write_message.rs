//! Writes a fixed greeting from block 4 of every tag presented.
//!
//! # Usage
//! ```bash
//! cargo run --bin write-message
//! ```

use tagstation_console::{init_tracing, Console};
use tagstation_shared::{codec, USER_START_BLOCK};
use tracing::info;

const MESSAGE: &str = "Hello, NFC Tag!";

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut console = Console::open()?;
    let padded = codec::pad(MESSAGE.as_bytes());

    info!("Waiting for an NFC tag...");
    console.run(|session, _uid| {
        session.write_payload(USER_START_BLOCK, &padded)?;
        info!("Write successful! Remove the NFC tag.");
        Ok(())
    })
}
