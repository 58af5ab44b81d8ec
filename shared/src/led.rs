//! Status LED driven from a GPIO output.

use std::thread;
use std::time::Duration;

use rppal::gpio::{Gpio, OutputPin};

use crate::session::CancelFlag;

/// An output that signals "busy" while a tag transfer is in progress.
pub trait StatusLed: Send {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

impl StatusLed for OutputPin {
    fn set_high(&mut self) {
        OutputPin::set_high(self);
    }

    fn set_low(&mut self) {
        OutputPin::set_low(self);
    }
}

/// Opens a BCM-numbered pin as an output, initially low.
pub fn open_pin(pin: u8) -> Result<OutputPin, rppal::gpio::Error> {
    let mut pin = Gpio::new()?.get(pin)?.into_output_low();
    pin.set_reset_on_drop(true);
    Ok(pin)
}

/// Keeps the LED lit for as long as it is alive.
pub struct LedGuard<'a> {
    led: &'a mut dyn StatusLed,
}

impl<'a> LedGuard<'a> {
    pub fn on(led: &'a mut dyn StatusLed) -> Self {
        led.set_high();
        Self { led }
    }
}

impl Drop for LedGuard<'_> {
    fn drop(&mut self) {
        self.led.set_low();
    }
}

/// Toggles the LED every `period` until cancelled, then leaves it low.
pub fn blink(led: &mut dyn StatusLed, period: Duration, cancel: &CancelFlag) {
    while !cancel.is_cancelled() {
        led.set_high();
        tracing::info!("LED ON");
        thread::sleep(period);
        if cancel.is_cancelled() {
            break;
        }

        led.set_low();
        tracing::info!("LED OFF");
        thread::sleep(period);
    }
    led.set_low();
}

/// LED that does nothing, for hosts without GPIO.
pub struct NoLed;

impl StatusLed for NoLed {
    fn set_high(&mut self) {}
    fn set_low(&mut self) {}
}
