//! Debounced tracking of the door contact.
//!
//! The contact is a mechanical switch, so a single door movement produces a
//! burst of electrical transitions. The tracker samples on the control-loop
//! tick and only commits a new stable state once the raw level has held
//! still for the configured quiet period. Every wobble restarts that timer.

use std::time::{Duration, Instant};

use tracing::debug;

use super::{DoorState, Polarity, SwitchInput};

/// Debounced view of a contact switch.
///
/// `sample` reports `Some(new_state)` exactly on the tick where the stable
/// state changes, `None` otherwise. The tracker runs independently of any
/// in-flight publish; it is the caller's job to remember unsent changes.
pub struct DebouncedSwitch<I: SwitchInput> {
    input: I,
    polarity: Polarity,
    interval: Duration,
    last_raw: DoorState,
    last_change: Instant,
    stable: DoorState,
}

impl<I: SwitchInput> DebouncedSwitch<I> {
    /// Creates the tracker, priming raw and stable state from an initial read.
    pub fn new(mut input: I, polarity: Polarity, interval: Duration, now: Instant) -> Self {
        let initial = polarity.door_state(input.read_level());
        debug!(state = %initial, "door contact primed");
        Self {
            input,
            polarity,
            interval,
            last_raw: initial,
            last_change: now,
            stable: initial,
        }
    }

    /// Current debounced state. Always valid, even mid-bounce.
    pub fn stable(&self) -> DoorState {
        self.stable
    }

    /// Samples the raw pin and advances the debounce latch.
    pub fn sample(&mut self, now: Instant) -> Option<DoorState> {
        let raw = self.polarity.door_state(self.input.read_level());

        if raw != self.last_raw {
            // Any raw movement restarts the quiet-period timer.
            self.last_raw = raw;
            self.last_change = now;
            return None;
        }

        if raw != self.stable && now.duration_since(self.last_change) >= self.interval {
            debug!(state = %raw, "door state settled");
            self.stable = raw;
            return Some(raw);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::PinLevel;

    /// Replays a fixed level sequence, holding the last level afterwards.
    struct ScriptedSwitch {
        levels: Vec<PinLevel>,
        pos: usize,
    }

    impl ScriptedSwitch {
        fn new(levels: Vec<PinLevel>) -> Self {
            Self { levels, pos: 0 }
        }
    }

    impl SwitchInput for ScriptedSwitch {
        fn read_level(&mut self) -> PinLevel {
            let level = self.levels[self.pos.min(self.levels.len() - 1)];
            self.pos += 1;
            level
        }
    }

    const DEBOUNCE: Duration = Duration::from_millis(40);

    fn at(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn bounces_shorter_than_interval_are_filtered() {
        let t0 = Instant::now();
        // Primed low (closed), then bouncing every 10ms, never quiet for 40ms.
        let switch = ScriptedSwitch::new(vec![
            PinLevel::Low,
            PinLevel::High,
            PinLevel::Low,
            PinLevel::High,
            PinLevel::Low,
        ]);
        let mut tracker = DebouncedSwitch::new(switch, Polarity::ActiveLow, DEBOUNCE, t0);

        for tick in 1u64..=4 {
            assert_eq!(tracker.sample(at(t0, tick * 10)), None);
        }
        assert_eq!(tracker.stable(), DoorState::Closed);
    }

    #[test]
    fn sustained_level_reports_exactly_once() {
        let t0 = Instant::now();
        let switch = ScriptedSwitch::new(vec![PinLevel::Low, PinLevel::High]);
        let mut tracker = DebouncedSwitch::new(switch, Polarity::ActiveLow, DEBOUNCE, t0);

        // Raw flips at 10ms; the change only commits once 40ms of quiet pass.
        assert_eq!(tracker.sample(at(t0, 10)), None);
        assert_eq!(tracker.sample(at(t0, 30)), None);
        assert_eq!(tracker.sample(at(t0, 50)), Some(DoorState::Open));
        // Further ticks at the same level stay quiet.
        assert_eq!(tracker.sample(at(t0, 60)), None);
        assert_eq!(tracker.sample(at(t0, 500)), None);
        assert_eq!(tracker.stable(), DoorState::Open);
    }

    #[test]
    fn bounce_during_settle_restarts_the_timer() {
        let t0 = Instant::now();
        let switch = ScriptedSwitch::new(vec![
            PinLevel::Low,
            PinLevel::High,
            PinLevel::Low,
            PinLevel::High,
        ]);
        let mut tracker = DebouncedSwitch::new(switch, Polarity::ActiveLow, DEBOUNCE, t0);

        assert_eq!(tracker.sample(at(t0, 10)), None); // high, timer at 10
        assert_eq!(tracker.sample(at(t0, 30)), None); // low again, timer at 30
        assert_eq!(tracker.sample(at(t0, 45)), None); // high, timer at 45
        // Only quiet since 45ms, so 60ms is still too early.
        assert_eq!(tracker.sample(at(t0, 60)), None);
        assert_eq!(tracker.sample(at(t0, 85)), Some(DoorState::Open));
    }

    #[test]
    fn return_to_stable_level_never_reports() {
        let t0 = Instant::now();
        // A glitch away from the stable level that settles back where it was.
        let switch = ScriptedSwitch::new(vec![PinLevel::Low, PinLevel::High, PinLevel::Low]);
        let mut tracker = DebouncedSwitch::new(switch, Polarity::ActiveLow, DEBOUNCE, t0);

        assert_eq!(tracker.sample(at(t0, 10)), None);
        assert_eq!(tracker.sample(at(t0, 20)), None);
        assert_eq!(tracker.sample(at(t0, 200)), None);
        assert_eq!(tracker.stable(), DoorState::Closed);
    }
}
