//! Documented mechanical ranges of the Picar-X servos and motors.
//!
//! The actuator gateway clamps every command into these ranges before it
//! reaches a driver.  Callers that must *reject* out-of-range values instead
//! (the command router) use [`ServoLimits::contains`].

use picarx_types::ServoChannel;

/// Maximum motor speed accepted by [`ActuatorGateway::drive`][crate::actuator::ActuatorGateway::drive].
pub const MAX_SPEED: u8 = 100;

/// Inclusive angular range of one servo, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoLimits {
    pub min_deg: f32,
    pub max_deg: f32,
}

impl ServoLimits {
    /// Limits for `channel`: steering ±30°, camera pan and tilt ±35°.
    pub const fn for_channel(channel: ServoChannel) -> Self {
        match channel {
            ServoChannel::Steering => Self {
                min_deg: -30.0,
                max_deg: 30.0,
            },
            ServoChannel::Pan | ServoChannel::Tilt => Self {
                min_deg: -35.0,
                max_deg: 35.0,
            },
        }
    }

    pub fn contains(&self, angle_deg: f32) -> bool {
        angle_deg.is_finite() && angle_deg >= self.min_deg && angle_deg <= self.max_deg
    }

    /// Clamp into range.  Non-finite input maps to the centre position.
    pub fn clamp(&self, angle_deg: f32) -> f32 {
        if angle_deg.is_finite() {
            angle_deg.clamp(self.min_deg, self.max_deg)
        } else {
            0.0
        }
    }
}

/// Clamp a requested speed into `0..=MAX_SPEED`.
pub fn clamp_speed(speed: u8) -> u8 {
    speed.min(MAX_SPEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steering_is_narrower_than_camera() {
        let steering = ServoLimits::for_channel(ServoChannel::Steering);
        let pan = ServoLimits::for_channel(ServoChannel::Pan);
        assert!(steering.contains(30.0));
        assert!(!steering.contains(31.0));
        assert!(pan.contains(-35.0));
        assert!(!pan.contains(-35.5));
    }

    #[test]
    fn clamp_pins_to_edges() {
        let tilt = ServoLimits::for_channel(ServoChannel::Tilt);
        assert_eq!(tilt.clamp(90.0), 35.0);
        assert_eq!(tilt.clamp(-90.0), -35.0);
        assert_eq!(tilt.clamp(f32::NAN), 0.0);
        assert!(!tilt.contains(f32::NAN));
    }

    #[test]
    fn speed_is_capped() {
        assert_eq!(clamp_speed(30), 30);
        assert_eq!(clamp_speed(250), MAX_SPEED);
    }
}
