//! rppal-backed door contact input.

use rppal::gpio::{Gpio, InputPin, Level};
use tracing::info;

use super::{PinLevel, SwitchInput};

/// Door contact wired to a GPIO pin with the internal pull-up enabled,
/// matching the usual reed-switch-to-ground wiring.
pub struct GpioSwitch {
    pin: InputPin,
}

impl GpioSwitch {
    pub fn new(gpio: &Gpio, pin: u8) -> rppal::gpio::Result<Self> {
        let pin = gpio.get(pin)?.into_input_pullup();
        info!(pin = pin.pin(), "door contact pin configured");
        Ok(Self { pin })
    }
}

impl SwitchInput for GpioSwitch {
    fn read_level(&mut self) -> PinLevel {
        match self.pin.read() {
            Level::Low => PinLevel::Low,
            Level::High => PinLevel::High,
        }
    }
}
