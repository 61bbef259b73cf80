//! The `ActuatorGateway` trait: drive motors, position servos, stop.
//!
//! Drivers implement this trait once for the whole robot.  The rest of the
//! stack only talks to the trait, so the simulated robot and a real
//! motor-controller driver are interchangeable.
//!
//! Implementations clamp every input into its documented range (see
//! [`crate::limits`]); rejecting out-of-range requests is the caller's job.

use std::time::Duration;

use picarx_types::{Direction, PicarError, ServoChannel};

/// Uniform command surface for the rear motors and the three servos.
///
/// All commands are idempotent.  Methods take `&mut self`: write access is
/// serialized by the kernel's actuator lock, never by the driver.
pub trait ActuatorGateway: Send {
    /// Run both rear motors in `direction` at `speed` (0–100) for at least
    /// `duration`.
    ///
    /// The motors keep turning when this returns; the caller ends the burst
    /// with [`stop`][Self::stop].
    ///
    /// # Errors
    ///
    /// Returns [`PicarError::ActuatorFault`] when the motor controller
    /// rejects the command.
    fn drive(&mut self, direction: Direction, speed: u8, duration: Duration) -> Result<(), PicarError>;

    /// Move `channel` to `angle_deg` and return the angle actually applied
    /// after clamping.
    ///
    /// # Errors
    ///
    /// Returns [`PicarError::ActuatorFault`] when the servo cannot be driven.
    fn set_angle(&mut self, channel: ServoChannel, angle_deg: f32) -> Result<f32, PicarError>;

    /// Bring both motors to speed 0.
    ///
    /// # Errors
    ///
    /// Returns [`PicarError::ActuatorFault`] when the motor controller
    /// cannot be reached.
    fn stop(&mut self) -> Result<(), PicarError>;

    /// Centre every servo and stop the motors.
    fn reset(&mut self) -> Result<(), PicarError> {
        self.stop()?;
        for channel in [ServoChannel::Steering, ServoChannel::Pan, ServoChannel::Tilt] {
            self.set_angle(channel, 0.0)?;
        }
        Ok(())
    }
}
