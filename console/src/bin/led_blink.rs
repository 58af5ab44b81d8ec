//! Blinks the status LED once a second until Ctrl-C.
//!
//! # Usage
//! ```bash
//! cargo run --bin led-blink
//! ```

use std::time::Duration;

use tagstation_console::{cancel_on_ctrl_c, init_tracing, load_config, open_led};
use tagstation_shared::led;
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = load_config();
    let mut status_led = open_led(&config)?;
    let cancel = cancel_on_ctrl_c()?;

    info!("Blinking LED on GPIO {}", config.led_pin);
    led::blink(status_led.as_mut(), Duration::from_secs(1), &cancel);
    info!("GPIO cleaned up, exiting...");
    Ok(())
}
