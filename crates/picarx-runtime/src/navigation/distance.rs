//! [`DistanceNavigator`] – drive until the gap ahead matches a target.
//!
//! # Algorithm
//!
//! Each attempt reads the ultrasonic distance `d` and, in priority order:
//!
//! 1. `d <= safety_cm` → stop, `stopped_safety` (pre-empts the goal);
//! 2. `target - tolerance <= d <= target` → stop, `reached`;
//! 3. otherwise drive one burst forward (`d > target`) or backward, stop,
//!    settle, and try again.
//!
//! The goal band lies on the near side of the target so that an approach
//! from far away never stops short of it.  Its width is
//! [`NavigationConfig::tolerance_for`].

use std::sync::Arc;

use picarx_hal::SensorGateway;
use picarx_kernel::{ActuatorLock, CancelToken};
use picarx_types::{Direction, NavigationOutcome, NavigationStatus, PicarError};
use tracing::{debug, info, instrument};

use super::{NavigationConfig, check_speed, halt};

pub struct DistanceNavigator {
    sensors: Arc<dyn SensorGateway>,
    actuators: Arc<ActuatorLock>,
    cancel: CancelToken,
    config: NavigationConfig,
}

impl DistanceNavigator {
    pub fn new(
        sensors: Arc<dyn SensorGateway>,
        actuators: Arc<ActuatorLock>,
        cancel: CancelToken,
        config: NavigationConfig,
    ) -> Self {
        Self {
            sensors,
            actuators,
            cancel,
            config,
        }
    }

    /// Regulate the distance ahead to `target_cm`.
    ///
    /// Blocks for at most `max_attempts` attempts.  Motors are stopped on
    /// every return.
    ///
    /// # Errors
    ///
    /// - [`PicarError::InvalidParameter`] before any actuation when
    ///   `target_cm <= safety_cm`, a value is not finite, `speed > 100`, or
    ///   `max_attempts == 0`;
    /// - [`PicarError::ActuatorBusy`] when another navigation holds the lock;
    /// - [`PicarError::SensorUnavailable`] / [`PicarError::ActuatorFault`]
    ///   after the motors have been stopped.
    #[instrument(skip(self))]
    pub fn seek_distance(
        &self,
        target_cm: f32,
        safety_cm: f32,
        speed: u8,
        max_attempts: u32,
    ) -> Result<NavigationOutcome, PicarError> {
        validate(target_cm, safety_cm, speed, max_attempts)?;
        let mut lease = self.actuators.try_acquire("distance_navigator")?;
        let tolerance = self.config.tolerance_for(target_cm);
        let mut last_reading = f32::NAN;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                lease.stop()?;
                info!(attempt, "distance seek cancelled");
                return Ok(NavigationOutcome::new(
                    NavigationStatus::Aborted,
                    last_reading,
                    attempt - 1,
                ));
            }

            let d = match self.sensors.read_distance() {
                Ok(d) => d,
                Err(e) => {
                    halt(&mut *lease, &e);
                    return Err(e);
                }
            };
            last_reading = d;
            debug!(attempt, distance_cm = d, "distance reading");

            if d <= safety_cm {
                lease.stop()?;
                info!(attempt, distance_cm = d, "safety stop");
                return Ok(NavigationOutcome::new(NavigationStatus::StoppedSafety, d, attempt));
            }
            if d <= target_cm && d >= target_cm - tolerance {
                lease.stop()?;
                info!(attempt, distance_cm = d, "target distance reached");
                return Ok(NavigationOutcome::new(NavigationStatus::Reached, d, attempt));
            }

            let direction = if d > target_cm {
                Direction::Forward
            } else {
                Direction::Backward
            };
            let moved = lease
                .drive(direction, speed, self.config.burst())
                .and_then(|()| lease.stop());
            if let Err(e) = moved {
                halt(&mut *lease, &e);
                return Err(e);
            }
            self.config.pause();
        }

        lease.stop()?;
        info!(max_attempts, distance_cm = last_reading, "attempt budget exhausted");
        Ok(NavigationOutcome::new(
            NavigationStatus::ExhaustedAttempts,
            last_reading,
            max_attempts,
        ))
    }
}

fn validate(target_cm: f32, safety_cm: f32, speed: u8, max_attempts: u32) -> Result<(), PicarError> {
    if !target_cm.is_finite() || !safety_cm.is_finite() || safety_cm < 0.0 {
        return Err(PicarError::InvalidParameter(format!(
            "target {target_cm} cm and safety {safety_cm} cm must be finite and non-negative"
        )));
    }
    if target_cm <= safety_cm {
        return Err(PicarError::InvalidParameter(format!(
            "target {target_cm} cm must exceed safety distance {safety_cm} cm"
        )));
    }
    if max_attempts == 0 {
        return Err(PicarError::InvalidParameter(
            "max_attempts must be at least 1".into(),
        ));
    }
    check_speed(speed)
}

#[cfg(test)]
mod tests {
    use picarx_hal::sim::{SimCommand, SimRobot};

    use super::*;

    fn navigator(robot: &SimRobot) -> (DistanceNavigator, CancelToken) {
        let cancel = CancelToken::new();
        let nav = DistanceNavigator::new(
            Arc::new(robot.sensors()),
            Arc::new(ActuatorLock::new(Box::new(robot.actuators()))),
            cancel.clone(),
            NavigationConfig::instant(),
        );
        (nav, cancel)
    }

    #[test]
    fn reaches_target_from_scripted_approach() {
        let robot = SimRobot::new().with_distances([120.0, 30.2, 29.8]);
        let (nav, _) = navigator(&robot);
        let outcome = nav.seek_distance(30.0, 5.0, 30, 50).unwrap();
        assert_eq!(outcome.status, NavigationStatus::Reached);
        assert_eq!(outcome.final_reading, 29.8);
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(robot.motor_speed(), 0);
    }

    #[test]
    fn target_not_above_safety_is_rejected_without_actuation() {
        let robot = SimRobot::new().with_distances([50.0]);
        let (nav, _) = navigator(&robot);
        for target in [5.0, 3.0] {
            let err = nav.seek_distance(target, 5.0, 30, 50).unwrap_err();
            assert!(matches!(err, PicarError::InvalidParameter(_)));
        }
        assert!(robot.commands().is_empty());
        assert_eq!(robot.distance_reads(), 0);
    }

    #[test]
    fn safety_preempts_goal() {
        let robot = SimRobot::new().with_distances([4.0]);
        let (nav, _) = navigator(&robot);
        let outcome = nav.seek_distance(30.0, 5.0, 30, 50).unwrap();
        assert_eq!(outcome.status, NavigationStatus::StoppedSafety);
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(robot.motor_speed(), 0);
    }

    #[test]
    fn too_close_backs_up() {
        let robot = SimRobot::new().with_distances([20.0, 29.5]);
        let (nav, _) = navigator(&robot);
        let outcome = nav.seek_distance(30.0, 5.0, 30, 50).unwrap();
        assert_eq!(outcome.status, NavigationStatus::Reached);
        assert!(matches!(
            robot.commands().first(),
            Some(SimCommand::Drive { direction: Direction::Backward, .. })
        ));
    }

    #[test]
    fn converges_in_simulated_world() {
        let robot = SimRobot::new().with_world_distance(150.0);
        let cancel = CancelToken::new();
        let config = NavigationConfig {
            drive_burst_ms: 100,
            settle_ms: 0,
            ..NavigationConfig::default()
        };
        let nav = DistanceNavigator::new(
            Arc::new(robot.sensors()),
            Arc::new(ActuatorLock::new(Box::new(robot.actuators()))),
            cancel,
            config,
        );
        // Speed 30 covers 3 cm per 100 ms burst: 150 cm falls to 39 cm on attempt 38.
        let outcome = nav.seek_distance(40.0, 5.0, 30, 50).unwrap();
        assert_eq!(outcome.status, NavigationStatus::Reached);
        assert!(outcome.final_reading <= 40.0 && outcome.final_reading >= 38.8);
        assert_eq!(robot.motor_speed(), 0);
    }

    #[test]
    fn stalled_approach_exhausts_budget() {
        let robot = SimRobot::new().with_distances([80.0]);
        let (nav, _) = navigator(&robot);
        let outcome = nav.seek_distance(30.0, 5.0, 30, 7).unwrap();
        assert_eq!(outcome.status, NavigationStatus::ExhaustedAttempts);
        assert_eq!(outcome.attempts_used, 7);
        assert_eq!(outcome.final_reading, 80.0);
        assert_eq!(robot.motor_speed(), 0);
        assert_eq!(robot.distance_reads(), 7);
    }

    #[test]
    fn sensor_fault_stops_then_propagates() {
        let robot = SimRobot::new().with_distances([80.0]).fail_distance_after(2);
        let (nav, _) = navigator(&robot);
        let err = nav.seek_distance(30.0, 5.0, 30, 50).unwrap_err();
        assert!(matches!(err, PicarError::SensorUnavailable { .. }));
        assert_eq!(robot.motor_speed(), 0);
        assert_eq!(robot.commands().last(), Some(&SimCommand::Stop));
    }

    #[test]
    fn drive_fault_stops_then_propagates() {
        let robot = SimRobot::new().with_distances([80.0]).fail_drive_after(1);
        let (nav, _) = navigator(&robot);
        let err = nav.seek_distance(30.0, 5.0, 30, 50).unwrap_err();
        assert!(err.is_hardware_fault());
        assert_eq!(robot.motor_speed(), 0);
    }

    #[test]
    fn cancellation_between_attempts_aborts() {
        let cancel = CancelToken::new();
        let hook_cancel = cancel.clone();
        let robot = SimRobot::new()
            .with_distances([80.0])
            .on_drive(move |n| {
                if n == 3 {
                    hook_cancel.cancel();
                }
            });
        let nav = DistanceNavigator::new(
            Arc::new(robot.sensors()),
            Arc::new(ActuatorLock::new(Box::new(robot.actuators()))),
            cancel,
            NavigationConfig::instant(),
        );
        let outcome = nav.seek_distance(30.0, 5.0, 30, 50).unwrap();
        assert_eq!(outcome.status, NavigationStatus::Aborted);
        assert_eq!(outcome.attempts_used, 3);
        assert!(outcome.fault.is_none());
        assert_eq!(robot.motor_speed(), 0);
    }

    #[test]
    fn second_navigation_is_refused_while_lock_is_held() {
        let robot = SimRobot::new().with_distances([80.0]);
        let lock = Arc::new(ActuatorLock::new(Box::new(robot.actuators())));
        let nav = DistanceNavigator::new(
            Arc::new(robot.sensors()),
            Arc::clone(&lock),
            CancelToken::new(),
            NavigationConfig::instant(),
        );
        let _held = lock.try_acquire("someone_else").unwrap();
        assert_eq!(
            nav.seek_distance(30.0, 5.0, 30, 5).unwrap_err(),
            PicarError::ActuatorBusy
        );
        assert_eq!(robot.distance_reads(), 0);
    }
}
