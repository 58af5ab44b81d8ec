//! Hardware settings read from `TAGSTATION_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::pn532_ext::DEFAULT_I2C_ADDRESS;
use crate::session::PollConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// PN532 on I2C plus a GPIO LED.
    Pn532,
    /// In-memory reader with a blank tag permanently in the field.
    Simulated,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pn532" => Ok(Backend::Pn532),
            "simulated" | "sim" => Ok(Backend::Simulated),
            other => Err(format!("unknown backend {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HardwareConfig {
    pub backend: Backend,
    pub i2c_bus: u8,
    pub i2c_address: u16,
    /// BCM pin number of the status LED.
    pub led_pin: u8,
    pub poll: PollConfig,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Pn532,
            i2c_bus: 1,
            i2c_address: DEFAULT_I2C_ADDRESS,
            led_pin: 17,
            poll: PollConfig::default(),
        }
    }
}

impl HardwareConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: env_or("TAGSTATION_BACKEND", defaults.backend),
            i2c_bus: env_or("TAGSTATION_I2C_BUS", defaults.i2c_bus),
            i2c_address: env::var("TAGSTATION_I2C_ADDRESS")
                .ok()
                .and_then(|v| parse_address(&v).or_else(|| invalid("TAGSTATION_I2C_ADDRESS", &v)))
                .unwrap_or(defaults.i2c_address),
            led_pin: env_or("TAGSTATION_LED_PIN", defaults.led_pin),
            poll: PollConfig {
                probe_timeout: env_millis("TAGSTATION_PROBE_TIMEOUT_MS", defaults.poll.probe_timeout),
                poll_interval: env_millis("TAGSTATION_POLL_INTERVAL_MS", defaults.poll.poll_interval),
            },
        }
    }
}

/// Reads `key`, falling back to `default` when unset or unparseable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .ok()
            .or_else(|| invalid(key, &value))
            .unwrap_or(default),
        Err(_) => default,
    }
}

/// Reads a duration given in milliseconds.
pub fn env_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or(key, default.as_millis() as u64))
}

fn invalid<T>(key: &str, value: &str) -> Option<T> {
    warn!("Ignoring invalid value {:?} for {}", value, key);
    None
}

/// Accepts decimal or `0x`-prefixed hex.
fn parse_address(value: &str) -> Option<u16> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
