//! Radio power and link-state control.

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::{debug, info};

/// Control surface of the radio module.
///
/// The session manager is the only caller; production uses [`GpioRadio`],
/// tests substitute a scripted fake.
pub trait Radio {
    /// Applies power to the radio. Safe to call when already powered.
    fn power_on(&mut self);

    /// Cuts power to the radio. Safe to call when already off.
    fn power_off(&mut self);

    /// Whether the radio reports an established network link.
    fn link_up(&mut self) -> bool;
}

/// Radio module driven over two GPIO lines: an enable line that gates the
/// module's power rail and a link-sense line the module drives high once it
/// has associated with the network.
pub struct GpioRadio {
    enable: OutputPin,
    link_sense: InputPin,
}

impl GpioRadio {
    pub fn new(gpio: &Gpio, enable_pin: u8, link_pin: u8) -> rppal::gpio::Result<Self> {
        let enable = gpio.get(enable_pin)?.into_output_low();
        let link_sense = gpio.get(link_pin)?.into_input_pulldown();
        info!(
            enable = enable.pin(),
            link = link_sense.pin(),
            "radio control pins configured"
        );
        Ok(Self { enable, link_sense })
    }
}

impl Radio for GpioRadio {
    fn power_on(&mut self) {
        if self.enable.is_set_low() {
            debug!("radio power on");
            self.enable.set_high();
        }
    }

    fn power_off(&mut self) {
        if self.enable.is_set_high() {
            debug!("radio power off");
            self.enable.set_low();
        }
    }

    fn link_up(&mut self) -> bool {
        self.link_sense.is_high()
    }
}
