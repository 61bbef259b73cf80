//! [`ActuatorLock`] – exclusive write access to the robot's actuators.
//!
//! Only one logical owner (an immediate dispatch or one of the navigators)
//! may command the motors and servos at a time.  Acquiring the lock yields an
//! [`ActuatorLease`], which dereferences to the [`ActuatorGateway`] and
//! **stops the motors when dropped**.  Every exit path of a holder (return,
//! `?` propagation, panic unwinding) therefore leaves the robot stationary.
//!
//! Acquisition never waits: a second caller receives
//! [`PicarError::ActuatorBusy`] immediately.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use picarx_hal::sim::SimRobot;
//! use picarx_kernel::ActuatorLock;
//! use picarx_types::{Direction, PicarError};
//!
//! let robot = SimRobot::new();
//! let lock = ActuatorLock::new(Box::new(robot.actuators()));
//!
//! {
//!     let mut lease = lock.try_acquire("demo").unwrap();
//!     lease.drive(Direction::Forward, 30, Duration::ZERO).unwrap();
//!     assert_eq!(lock.try_acquire("other").err(), Some(PicarError::ActuatorBusy));
//! }
//!
//! // Dropping the lease stopped the motors.
//! assert_eq!(robot.motor_speed(), 0);
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, TryLockError};

use picarx_hal::ActuatorGateway;
use picarx_types::PicarError;
use tracing::{debug, error, warn};

/// Serialized owner of the robot's [`ActuatorGateway`].
pub struct ActuatorLock {
    gateway: Mutex<Box<dyn ActuatorGateway>>,
}

impl ActuatorLock {
    pub fn new(gateway: Box<dyn ActuatorGateway>) -> Self {
        Self {
            gateway: Mutex::new(gateway),
        }
    }

    /// Take exclusive write access on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// [`PicarError::ActuatorBusy`] when another lease is alive.
    pub fn try_acquire(&self, owner: &str) -> Result<ActuatorLease<'_>, PicarError> {
        let guard = match self.gateway.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!(owner, "actuator lock busy");
                return Err(PicarError::ActuatorBusy);
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!(owner, "actuator lock poisoned by a panicking holder; recovering");
                poisoned.into_inner()
            }
        };
        debug!(owner, "actuator lock acquired");
        Ok(ActuatorLease {
            guard,
            owner: owner.to_string(),
        })
    }
}

/// Live write access to the actuators.  Stops the motors on drop.
pub struct ActuatorLease<'a> {
    guard: MutexGuard<'a, Box<dyn ActuatorGateway>>,
    owner: String,
}

impl ActuatorLease<'_> {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Deref for ActuatorLease<'_> {
    type Target = dyn ActuatorGateway;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl DerefMut for ActuatorLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.guard
    }
}

impl Drop for ActuatorLease<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.guard.stop() {
            error!(owner = %self.owner, error = %e, "failed to stop motors on lease release");
        }
        debug!(owner = %self.owner, "actuator lock released");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use picarx_hal::sim::{SimCommand, SimRobot};
    use picarx_types::Direction;

    use super::*;

    #[test]
    fn second_acquire_is_busy() {
        let robot = SimRobot::new();
        let lock = ActuatorLock::new(Box::new(robot.actuators()));
        let lease = lock.try_acquire("distance_navigator").unwrap();
        assert_eq!(lease.owner(), "distance_navigator");
        assert!(matches!(
            lock.try_acquire("router"),
            Err(PicarError::ActuatorBusy)
        ));
        drop(lease);
        assert!(lock.try_acquire("router").is_ok());
    }

    #[test]
    fn release_stops_motors() {
        let robot = SimRobot::new();
        let lock = ActuatorLock::new(Box::new(robot.actuators()));
        {
            let mut lease = lock.try_acquire("test").unwrap();
            lease
                .drive(Direction::Forward, 40, Duration::ZERO)
                .unwrap();
            assert_eq!(robot.motor_speed(), 40);
        }
        assert_eq!(robot.motor_speed(), 0);
        assert_eq!(robot.commands().last(), Some(&SimCommand::Stop));
    }

    #[test]
    fn early_return_with_question_mark_still_stops() {
        fn failing(lock: &ActuatorLock) -> Result<(), PicarError> {
            let mut lease = lock.try_acquire("test")?;
            lease.drive(Direction::Forward, 25, Duration::ZERO)?;
            Err(PicarError::SensorUnavailable {
                sensor: "ultrasonic".into(),
                details: "timeout".into(),
            })
        }

        let robot = SimRobot::new();
        let lock = ActuatorLock::new(Box::new(robot.actuators()));
        assert!(failing(&lock).is_err());
        assert_eq!(robot.motor_speed(), 0);
    }

    #[test]
    fn lock_is_shareable_across_threads() {
        use std::sync::Arc;

        let robot = SimRobot::new();
        let lock = Arc::new(ActuatorLock::new(Box::new(robot.actuators())));
        let worker = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                let mut lease = lock.try_acquire("worker").unwrap();
                lease.drive(Direction::Backward, 10, Duration::ZERO).unwrap();
            })
        };
        worker.join().unwrap();
        assert_eq!(robot.motor_speed(), 0);
        assert!(lock.try_acquire("main").is_ok());
    }
}
