//! `picarx-kernel` – Safety brainstem
//!
//! Enforces who may move the robot and which values are legal.  It does not
//! decide what the robot should do.
//!
//! # Modules
//!
//! - [`actuator_lock`] – [`ActuatorLock`][actuator_lock::ActuatorLock]:
//!   exclusive, non-blocking write access to the actuator gateway.  The
//!   returned lease stops the motors whenever it is released.
//! - [`cancel`] – [`CancelToken`][cancel::CancelToken]: a shared flag that
//!   navigators poll between attempts.
//! - [`parameter_verifier`] – [`ParameterVerifier`][parameter_verifier::ParameterVerifier]:
//!   a rule engine that rejects out-of-range speeds, angles, distances and
//!   durations with `InvalidParameter` before anything is actuated.

pub mod actuator_lock;
pub mod cancel;
pub mod parameter_verifier;

pub use actuator_lock::{ActuatorLease, ActuatorLock};
pub use cancel::CancelToken;
pub use parameter_verifier::{
    DurationRule, ParameterVerifier, PositiveDistanceRule, Rule, ServoLimitRule, SpeedRangeRule,
};
