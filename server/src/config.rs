use std::time::Duration;

use tagstation_shared::HardwareConfig;
use tagstation_shared::config::{env_millis, env_or};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// How long a request waits for a tag before giving up.
    pub detect_timeout: Duration,
    pub hardware: HardwareConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".into(),
            detect_timeout: Duration::from_secs(10),
            hardware: HardwareConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_or("TAGSTATION_BIND_ADDRESS", defaults.bind_address),
            detect_timeout: env_millis("TAGSTATION_DETECT_TIMEOUT_MS", defaults.detect_timeout),
            hardware: HardwareConfig::from_env(),
        }
    }
}
