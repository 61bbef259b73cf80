//! Closed-loop navigation engines and their tunables.
//!
//! - [`distance::DistanceNavigator`] regulates the gap to whatever is ahead.
//! - [`obstacle::ObstacleNavigator`] searches for a described target while
//!   steering around obstacles.
//!
//! Both hold the actuator lock for their whole run, poll the cancel token
//! between attempts, and stop the motors on every exit path.

use std::time::Duration;

use picarx_hal::{ActuatorGateway, GroundReference, MAX_SPEED};
use picarx_types::PicarError;
use serde::{Deserialize, Serialize};
use tracing::error;

pub mod distance;
pub mod obstacle;

pub use distance::DistanceNavigator;
pub use obstacle::{AvoidanceStrategy, ObstacleNavigator, StrategyCycle};

/// Every numeric parameter of the navigation loops, with documented
/// defaults.  Deserializable from the `[navigation]` table of the config
/// file; missing keys keep their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Goal band width as a fraction of the target distance.
    pub tolerance_fraction: f32,
    /// Lower bound of the goal band width, in cm.
    pub min_tolerance_cm: f32,
    /// Drive duration of one attempt.
    pub drive_burst_ms: u64,
    /// Pause after stopping, before the next reading.
    pub settle_ms: u64,
    /// Safety distance used when a request does not name one.
    pub safety_cm: f32,
    /// Speed used when a request does not name one.
    pub default_speed: u8,
    pub max_attempts: u32,
    /// Readings at or below this trigger the "possible arrival" check.
    pub close_threshold_cm: f32,
    /// Grayscale values at or below these mean a drop-off.
    pub cliff_reference: [f32; 3],
    /// Query the vision service for a bearing every N attempts (0 = never).
    pub vision_period: u32,
    /// Camera pan of the side frames taken when the forward frame misses
    /// the target (0 = forward frame only).
    pub panorama_pan_deg: f32,
    /// Steering angle used by the avoidance manoeuvres.
    pub strategy_steer_deg: f32,
    pub backup_ms: u64,
    /// Floor of the attenuated speed.
    pub min_speed: u8,
    /// Readings at or above this get the full requested speed.
    pub attenuation_far_cm: f32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            tolerance_fraction: 0.03,
            min_tolerance_cm: 0.5,
            drive_burst_ms: 300,
            settle_ms: 200,
            safety_cm: 5.0,
            default_speed: 30,
            max_attempts: 50,
            close_threshold_cm: 20.0,
            cliff_reference: [200.0; 3],
            vision_period: 4,
            panorama_pan_deg: 20.0,
            strategy_steer_deg: 30.0,
            backup_ms: 500,
            min_speed: 10,
            attenuation_far_cm: 100.0,
        }
    }
}

impl NavigationConfig {
    /// Zero delays: for tests and simulations that must not sleep.
    pub fn instant() -> Self {
        Self {
            drive_burst_ms: 0,
            settle_ms: 0,
            backup_ms: 0,
            ..Self::default()
        }
    }

    pub fn burst(&self) -> Duration {
        Duration::from_millis(self.drive_burst_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn backup(&self) -> Duration {
        Duration::from_millis(self.backup_ms)
    }

    /// Width of the goal band below `target_cm`.
    pub fn tolerance_for(&self, target_cm: f32) -> f32 {
        (self.tolerance_fraction * target_cm).max(self.min_tolerance_cm)
    }

    pub fn ground_reference(&self) -> GroundReference {
        GroundReference::with_cliff(self.cliff_reference)
    }

    /// Speed for the next move given the latest proximity reading.
    ///
    /// Linear from `min_speed` at 0 cm up to `speed` at
    /// `attenuation_far_cm`, flat beyond.  Monotonic non-decreasing in
    /// `reading_cm` and never above `speed`.
    pub fn attenuate_speed(&self, reading_cm: f32, speed: u8) -> u8 {
        let floor = self.min_speed.min(speed);
        if !reading_cm.is_finite() || self.attenuation_far_cm <= 0.0 {
            return floor;
        }
        let ratio = (reading_cm / self.attenuation_far_cm).clamp(0.0, 1.0);
        let span = f32::from(speed - floor);
        floor + (span * ratio).round() as u8
    }

    pub(crate) fn pause(&self) {
        if self.settle_ms > 0 {
            std::thread::sleep(self.settle());
        }
    }
}

pub(crate) fn check_speed(speed: u8) -> Result<(), PicarError> {
    if speed > MAX_SPEED {
        return Err(PicarError::InvalidParameter(format!(
            "speed {speed} outside 0-{MAX_SPEED}"
        )));
    }
    Ok(())
}

/// Stop the motors ahead of reporting `cause`.  A failing stop is logged;
/// the lease drop retries it.
pub(crate) fn halt(actuators: &mut dyn ActuatorGateway, cause: &PicarError) {
    error!(error = %cause, "hardware fault during navigation; stopping motors");
    if let Err(e) = actuators.stop() {
        error!(error = %e, "emergency stop failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_has_a_floor() {
        let cfg = NavigationConfig::default();
        assert!((cfg.tolerance_for(30.0) - 0.9).abs() < 1e-6);
        assert_eq!(cfg.tolerance_for(10.0), 0.5);
    }

    #[test]
    fn attenuation_is_monotonic_and_bounded() {
        let cfg = NavigationConfig::default();
        let mut previous = 0;
        for reading in (0..=150).map(|r| r as f32) {
            let s = cfg.attenuate_speed(reading, 40);
            assert!(s >= previous, "speed dropped at {reading} cm");
            assert!((10..=40).contains(&s));
            previous = s;
        }
        assert_eq!(cfg.attenuate_speed(0.0, 40), 10);
        assert_eq!(cfg.attenuate_speed(50.0, 40), 25);
        assert_eq!(cfg.attenuate_speed(500.0, 40), 40);
    }

    #[test]
    fn attenuation_never_raises_a_slow_request() {
        let cfg = NavigationConfig::default();
        assert_eq!(cfg.attenuate_speed(0.0, 5), 5);
        assert_eq!(cfg.attenuate_speed(200.0, 5), 5);
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let cfg: NavigationConfig = serde_json::from_str(r#"{"max_attempts": 12}"#).unwrap();
        assert_eq!(cfg.max_attempts, 12);
        assert_eq!(cfg.default_speed, 30);
    }
}
