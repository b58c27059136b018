//! Render-frame clock for a fixed-step physics world.
//!
//! The renderer calls back once per frame with a millisecond timestamp. The
//! clock turns consecutive timestamps into a delta in seconds. The very first
//! timestamp after a reset has nothing to subtract from, so it produces no
//! delta at all: that frame shows the scene exactly as it was built.
//!
//! The clock also carries the fixed sub-step size and the sub-step cap. The
//! physics world integrates at most `fixed_step * max_sub_steps` seconds per
//! frame and drops the rest, so a long pause (tab switch, debugger) does not
//! turn into a burst of catch-up steps.

use crate::error::{SimError, SimResult};

/// Timing state of the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameClock {
    last_timestamp_ms: Option<f64>,
    fixed_step: f32,
    max_sub_steps: u32,
}

impl FrameClock {
    /// Create a clock with no recorded frame.
    ///
    /// # Errors
    /// `InvalidParameter` when `fixed_step` is not a positive finite number or
    /// `max_sub_steps` is zero.
    pub fn new(fixed_step: f32, max_sub_steps: u32) -> SimResult<Self> {
        if !fixed_step.is_finite() || fixed_step <= 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "fixed step must be positive, got {}",
                fixed_step
            )));
        }
        if max_sub_steps == 0 {
            return Err(SimError::InvalidParameter(
                "max sub-steps must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            last_timestamp_ms: None,
            fixed_step,
            max_sub_steps,
        })
    }

    pub fn fixed_step(&self) -> f32 {
        self.fixed_step
    }

    pub fn max_sub_steps(&self) -> u32 {
        self.max_sub_steps
    }

    /// Most simulated time a single frame can integrate.
    pub fn max_frame_time(&self) -> f32 {
        self.fixed_step * self.max_sub_steps as f32
    }

    pub fn last_timestamp_ms(&self) -> Option<f64> {
        self.last_timestamp_ms
    }

    /// True until the first frame has been recorded.
    pub fn is_warming_up(&self) -> bool {
        self.last_timestamp_ms.is_none()
    }

    /// Seconds elapsed since the recorded frame, or `None` if there is no
    /// recorded frame or the timestamp went backwards.
    pub fn delta_seconds(&self, timestamp_ms: f64) -> Option<f32> {
        let previous = self.last_timestamp_ms?;
        let delta_ms = timestamp_ms - previous;
        if !delta_ms.is_finite() || delta_ms < 0.0 {
            return None;
        }
        Some((delta_ms / 1000.0) as f32)
    }

    /// Remember `timestamp_ms` as the previous frame.
    pub fn record(&mut self, timestamp_ms: f64) {
        self.last_timestamp_ms = Some(timestamp_ms);
    }

    /// Forget the previous frame; the next one is a warm-up frame again.
    pub fn reset(&mut self) {
        self.last_timestamp_ms = None;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self {
            last_timestamp_ms: None,
            fixed_step: 1.0 / 60.0,
            max_sub_steps: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_has_no_delta() {
        let clock = FrameClock::default();
        assert!(clock.is_warming_up());
        assert_eq!(clock.delta_seconds(1234.0), None);
    }

    #[test]
    fn test_delta_after_record() {
        let mut clock = FrameClock::default();
        clock.record(1000.0);
        let dt = clock.delta_seconds(1016.0).unwrap();
        assert!((dt - 0.016).abs() < 1e-6, "Expected 0.016, got {}", dt);
    }

    #[test]
    fn test_backwards_timestamp_has_no_delta() {
        let mut clock = FrameClock::default();
        clock.record(500.0);
        assert_eq!(clock.delta_seconds(400.0), None);
        assert_eq!(clock.delta_seconds(f64::NAN), None);
    }

    #[test]
    fn test_reset_returns_to_warm_up() {
        let mut clock = FrameClock::default();
        clock.record(10.0);
        assert!(!clock.is_warming_up());
        clock.reset();
        assert!(clock.is_warming_up());
    }

    #[test]
    fn test_max_frame_time() {
        let clock = FrameClock::new(1.0 / 60.0, 3).unwrap();
        assert!((clock.max_frame_time() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(FrameClock::new(0.0, 3).is_err());
        assert!(FrameClock::new(f32::INFINITY, 3).is_err());
        assert!(FrameClock::new(1.0 / 60.0, 0).is_err());
    }
}
