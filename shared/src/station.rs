//! Process-wide hardware context: the reader and the status LED.
//!
//! A station is opened once at startup, lends itself to one [`TagSession`]
//! at a time and is released at shutdown.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Backend, HardwareConfig};
use crate::led::{self, NoLed, StatusLed};
use crate::pn532_ext::Pn532Reader;
use crate::reader::{ReaderError, TagReader};
use crate::session::{PollConfig, TagSession};
use crate::sim::{SimulatedField, SimulatedReader, SimulatedTag};

/// Pages of the blank NTAG215 the simulated backend keeps in its field.
const SIMULATED_NTAG_PAGES: usize = 135;

#[derive(Debug, Error)]
pub enum StationError {
    #[error("failed to open status LED: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("failed to initialise NFC reader: {0}")]
    Reader(#[from] ReaderError),
}

pub struct Station {
    reader: Box<dyn TagReader>,
    led: Box<dyn StatusLed>,
}

impl Station {
    pub fn new(reader: Box<dyn TagReader>, led: Box<dyn StatusLed>) -> Self {
        Self { reader, led }
    }

    /// Opens the backend selected by `config`.
    pub fn open(config: &HardwareConfig) -> Result<Self, StationError> {
        match config.backend {
            Backend::Pn532 => Self::open_pn532(config),
            Backend::Simulated => {
                info!("Using simulated NFC reader");
                let field = SimulatedField::with_tag(SimulatedTag::ntag(
                    vec![0x04, 0x53, 0x49, 0x4D, 0x54, 0x41, 0x47],
                    SIMULATED_NTAG_PAGES,
                ));
                Ok(Self::simulated(field))
            }
        }
    }

    fn open_pn532(config: &HardwareConfig) -> Result<Self, StationError> {
        let led = led::open_pin(config.led_pin)?;
        let mut pn532 = Pn532Reader::open_i2c(config.i2c_bus, config.i2c_address)?;

        // the first frame after power-up may only wake the chip
        let fw = match pn532.firmware_version() {
            Ok(fw) => fw,
            Err(e) => {
                warn!("No answer from PN532 ({}), retrying", e);
                pn532.firmware_version()?
            }
        };
        info!("Found PN532 with firmware version: {}.{}", fw.version, fw.revision);
        pn532.sam_configuration()?;

        Ok(Self::new(Box::new(pn532), Box::new(led)))
    }

    /// Station around a simulated field, with no LED attached.
    pub fn simulated(field: SimulatedField) -> Self {
        Self::new(Box::new(SimulatedReader::new(field)), Box::new(NoLed))
    }

    pub fn session(&mut self, poll: PollConfig) -> TagSession<'_> {
        TagSession::new(self.reader.as_mut(), self.led.as_mut(), poll)
    }

    /// Turns the LED off before the pins are handed back at drop.
    pub fn release(&mut self) {
        self.led.set_low();
        info!("Station released");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::codec::ReadProfile;
    use crate::sim::RecordingLed;

    #[test]
    fn simulated_backend_holds_blank_tag() {
        let config = HardwareConfig {
            backend: Backend::Simulated,
            ..HardwareConfig::default()
        };
        let mut station = Station::open(&config).unwrap();
        let mut session = station.session(PollConfig::default());

        let uid = session.wait_for_tag(Duration::from_secs(1)).unwrap();
        assert_eq!(uid.len(), 7);
        session.write_payload(4, b"ping").unwrap();
        let read = session.read_payload(ReadProfile::hex_payload()).unwrap();
        assert_eq!(read.payload, b"ping");
    }

    #[test]
    fn release_turns_led_off() {
        let (mut led, probe) = RecordingLed::new();
        led.set_high();
        let mut station = Station::new(
            Box::new(SimulatedReader::new(SimulatedField::empty())),
            Box::new(led),
        );
        station.release();
        assert!(!probe.is_lit());
    }
}
