//! Reads the 16-byte message in blocks 4-7, every two seconds while a tag
//! is in the field.
//!
//! # Usage
//! ```bash
//! cargo run --bin read-message
//! ```

use std::time::Duration;

use tagstation_console::{init_tracing, report, Console};
use tagstation_shared::{ReadProfile, SessionError, BLOCK_SIZE};
use tracing::{info, warn};

const READ_PAUSE: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut console = Console::open()?;

    info!("Waiting for an NFC tag to read...");
    console.run_repeating(READ_PAUSE, |session, _uid| {
        match session.read_payload(ReadProfile::message()) {
            Ok(read) => println!("{}", report::message(&read.blocks)),
            Err(SessionError::NoDataFound { blocks_read: 0 }) => {
                warn!("No data could be read from the tag")
            }
            Err(SessionError::NoDataFound { blocks_read }) => {
                println!("{}", report::message(&vec![[0; BLOCK_SIZE]; blocks_read]))
            }
            Err(e) => return Err(e),
        }
        info!("Read complete! Remove the NFC tag.");
        Ok(())
    })
}
