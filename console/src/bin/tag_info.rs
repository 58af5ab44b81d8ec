//! Prints what can be learned about each tag presented.
//!
//! # Usage
//! ```bash
//! cargo run --bin tag-info
//! ```

use tagstation_console::{init_tracing, report, Console};
use tagstation_shared::inspect::TagInfo;
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut console = Console::open()?;

    info!("Waiting for an NFC tag to analyze...");
    console.run(|session, uid| {
        let tag = TagInfo::collect(session, uid)?;
        println!("\n{}", report::tag_info(&tag));
        info!("Remove the tag to analyze another one...");
        Ok(())
    })
}
