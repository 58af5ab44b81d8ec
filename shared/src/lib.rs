//! Shared tag-station library: block payload codec, tag sessions, and the
//! hardware capabilities (PN532 reader, status LED) they run against.

pub mod codec;
pub mod config;
pub mod inspect;
pub mod led;
pub mod mifare;
pub mod pn532_ext;
pub mod reader;
pub mod session;
pub mod sim;
pub mod station;
pub mod types;

pub use codec::{InvalidHexInput, ReadProfile};
pub use config::{Backend, HardwareConfig};
pub use led::{LedGuard, StatusLed};
pub use reader::{ReaderError, TagReader};
pub use session::{CancelFlag, PollConfig, ReadOutcome, SessionError, TagSession, WriteOutcome};
pub use station::Station;
pub use types::{Block, Uid, BLOCK_SIZE, USER_START_BLOCK};
