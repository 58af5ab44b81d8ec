//! Plumbing shared by the console tools: logging setup, hardware from the
//! environment, and the detect/transfer/remove loop.

pub mod report;

use std::thread;
use std::time::Duration;

use tagstation_shared::led::{self, NoLed};
use tagstation_shared::{
    Backend, CancelFlag, HardwareConfig, SessionError, Station, StatusLed, TagSession, Uid,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound of one wait for a tag; the loops simply wait again.
const SCAN_WINDOW: Duration = Duration::from_secs(60);

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Loads `.env` and reads the hardware settings.
pub fn load_config() -> HardwareConfig {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }
    HardwareConfig::from_env()
}

/// A flag that Ctrl-C sets.
pub fn cancel_on_ctrl_c() -> anyhow::Result<CancelFlag> {
    let cancel = CancelFlag::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || handler.cancel())?;
    Ok(cancel)
}

/// Opens only the status LED, for tools that never touch the reader.
pub fn open_led(config: &HardwareConfig) -> anyhow::Result<Box<dyn StatusLed>> {
    let led: Box<dyn StatusLed> = match config.backend {
        Backend::Pn532 => Box::new(led::open_pin(config.led_pin)?),
        Backend::Simulated => Box::new(NoLed),
    };
    Ok(led)
}

pub struct Console {
    station: Station,
    config: HardwareConfig,
    cancel: CancelFlag,
    /// Pause after a tag left the field before polling again.
    rearm_delay: Duration,
}

impl Console {
    /// Opens the station described by the environment and stops on Ctrl-C.
    pub fn open() -> anyhow::Result<Self> {
        let config = load_config();
        let station = Station::open(&config)?;
        let cancel = cancel_on_ctrl_c()?;
        Ok(Self::new(station, config, cancel))
    }

    pub fn new(station: Station, config: HardwareConfig, cancel: CancelFlag) -> Self {
        Self {
            station,
            config,
            cancel,
            rearm_delay: Duration::from_secs(1),
        }
    }

    pub fn with_rearm_delay(mut self, delay: Duration) -> Self {
        self.rearm_delay = delay;
        self
    }

    /// Runs `cycle` for every tag presented, waiting for each to be removed,
    /// until cancelled. A failed cycle is logged and the loop goes on.
    pub fn run<F>(&mut self, mut cycle: F) -> anyhow::Result<()>
    where
        F: FnMut(&mut TagSession<'_>, &Uid) -> Result<(), SessionError>,
    {
        let mut session = self
            .station
            .session(self.config.poll)
            .with_cancel(self.cancel.clone());

        loop {
            let uid = match session.wait_for_tag(SCAN_WINDOW) {
                Ok(uid) => uid,
                Err(SessionError::TagNotFound(_)) => continue,
                Err(SessionError::Cancelled) => break,
                Err(e) => return Err(e.into()),
            };

            match cycle(&mut session, &uid) {
                Ok(()) => {}
                Err(SessionError::Cancelled) => break,
                Err(e) => error!("{}", e),
            }

            info!("Waiting for card to be removed...");
            match session.await_removal() {
                Ok(()) => info!("Card removed! Ready for next tag."),
                Err(SessionError::Cancelled) => break,
                Err(e) => return Err(e.into()),
            }
            thread::sleep(self.rearm_delay);
        }

        drop(session);
        self.shutdown();
        Ok(())
    }

    /// Runs `cycle` for every tag seen, pausing `pause` between cycles
    /// instead of waiting for the tag to leave.
    pub fn run_repeating<F>(&mut self, pause: Duration, mut cycle: F) -> anyhow::Result<()>
    where
        F: FnMut(&mut TagSession<'_>, &Uid) -> Result<(), SessionError>,
    {
        while !self.cancel.is_cancelled() {
            let mut session = self
                .station
                .session(self.config.poll)
                .with_cancel(self.cancel.clone());

            let uid = match session.wait_for_tag(SCAN_WINDOW) {
                Ok(uid) => uid,
                Err(SessionError::TagNotFound(_)) => continue,
                Err(SessionError::Cancelled) => break,
                Err(e) => return Err(e.into()),
            };

            match cycle(&mut session, &uid) {
                Ok(()) => {}
                Err(SessionError::Cancelled) => break,
                Err(e) => error!("{}", e),
            }
            thread::sleep(pause);
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.station.release();
        info!("Stopped");
    }
}
