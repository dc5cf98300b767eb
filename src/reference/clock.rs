use parking_lot::Mutex;

use crate::capability::TimeProvider;

/// A settable, advanceable day/night clock: `advance` moves the
/// celestial angle forward by `dt * cycle_speed` (wrapping at 1.0),
/// grounded on the engine's own `day_night_cycle_speed` config knob.
pub struct DayNightClock {
    angle: Mutex<f32>,
    cycle_speed: f32,
}

impl DayNightClock {
    pub fn new(cycle_speed: f32) -> Self {
        Self {
            angle: Mutex::new(0.0),
            cycle_speed,
        }
    }

    pub fn advance(&self, dt: f32) {
        let mut angle = self.angle.lock();
        *angle = (*angle + dt * self.cycle_speed).rem_euclid(1.0);
    }

    pub fn set_angle(&self, angle: f32) {
        *self.angle.lock() = angle.rem_euclid(1.0);
    }
}

impl Default for DayNightClock {
    fn default() -> Self {
        // A full day every 20 minutes, matching the original engine's
        // default pacing.
        Self::new(1.0 / 1200.0)
    }
}

impl TimeProvider for DayNightClock {
    fn celestial_angle(&self) -> f32 {
        *self.angle.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_wraps_past_a_full_cycle() {
        let clock = DayNightClock::new(1.0);
        clock.advance(1.5);
        assert!((clock.celestial_angle() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn set_angle_is_read_back_directly() {
        let clock = DayNightClock::default();
        clock.set_angle(0.25);
        assert_eq!(clock.celestial_angle(), 0.25);
    }
}
