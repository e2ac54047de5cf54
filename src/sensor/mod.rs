//! Door contact sensing: raw pin access and debounced state tracking.

pub mod debounce;
pub mod gpio;

pub use debounce::DebouncedSwitch;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical door state derived from the raw pin level via [`Polarity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Open,
    Closed,
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorState::Open => write!(f, "open"),
            DoorState::Closed => write!(f, "closed"),
        }
    }
}

/// Raw electrical level of the contact pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

/// Wiring polarity of the contact switch.
///
/// `ActiveLow` matches a normally-open reed switch to ground with a pull-up:
/// the pin reads low while the magnet holds the contact closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    pub fn door_state(&self, level: PinLevel) -> DoorState {
        match (self, level) {
            (Polarity::ActiveLow, PinLevel::Low) => DoorState::Closed,
            (Polarity::ActiveLow, PinLevel::High) => DoorState::Open,
            (Polarity::ActiveHigh, PinLevel::High) => DoorState::Closed,
            (Polarity::ActiveHigh, PinLevel::Low) => DoorState::Open,
        }
    }
}

/// Raw access to the physical contact pin.
///
/// Production uses [`gpio::GpioSwitch`]; tests script the levels.
pub trait SwitchInput {
    fn read_level(&mut self) -> PinLevel;
}
