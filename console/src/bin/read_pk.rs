//! Reads the hex payload stored from block 4 of every tag presented.
//!
//! # Usage
//! ```bash
//! cargo run --bin read-pk
//! ```

use tagstation_console::{init_tracing, report, Console};
use tagstation_shared::{ReadProfile, SessionError};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut console = Console::open()?;

    info!("Waiting for an NFC tag to read hex data...");
    console.run(|session, _uid| {
        match session.read_payload(ReadProfile::hex_payload()) {
            Ok(read) => println!("\n{}", report::hex_results(&read)),
            Err(SessionError::NoDataFound { blocks_read: 0 }) => {
                warn!("No data could be read from the tag")
            }
            Err(SessionError::NoDataFound { .. }) => warn!("No valid hex data found (all null bytes)"),
            Err(e) => return Err(e),
        }
        info!("Read complete! Remove the NFC tag.");
        Ok(())
    })
}
