//! Reads any tag presented: text from NTAG2xx, sectors from Mifare Classic.
//!
//! # Usage
//! ```bash
//! cargo run --bin read-tag
//! ```

use tagstation_console::{init_tracing, report, Console};
use tagstation_shared::{ReadProfile, SessionError, TagSession};
use tracing::{info, warn};

fn read_ntag(session: &mut TagSession<'_>) -> Result<(), SessionError> {
    info!("Reading NTAG2xx tag...");
    match session.read_payload(ReadProfile::ntag_text()) {
        Ok(read) => {
            for (block, data) in (4..).zip(&read.blocks) {
                println!("Block {}: {}", block, hex::encode(data));
            }
            println!("\n{}", report::ntag_text(&read.blocks));
        }
        Err(SessionError::NoDataFound { .. }) => println!("\nComplete data read: "),
        Err(e) => return Err(e),
    }
    Ok(())
}

fn read_classic(session: &mut TagSession<'_>) -> Result<(), SessionError> {
    for sector in session.dump_classic()? {
        println!("\n{}", report::sector(&sector));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut console = Console::open()?;

    info!("NFC Tag Reader");
    info!("Waiting for an NFC tag...");
    console.run(|session, uid| {
        match uid.len() {
            7 => read_ntag(session)?,
            4 => read_classic(session)?,
            len => warn!("Unknown card type with UID length: {}", len),
        }
        info!("Remove the tag to read another...");
        Ok(())
    })
}
