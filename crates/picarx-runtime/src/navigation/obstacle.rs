//! [`ObstacleNavigator`] – search for a described target while steering
//! around whatever is in the way.
//!
//! # Algorithm
//!
//! Each attempt, in priority order:
//!
//! 1. **Cliff check**: any grayscale channel at or below the cliff reference
//!    stops the run with `stopped_safety`.
//! 2. **Proximity check**: an ultrasonic reading at or below
//!    `close_threshold_cm` stops the car and asks the vision service whether
//!    the target is in front of it.  Confirmed ⇒ `reached`; otherwise the
//!    next [`AvoidanceStrategy`] runs.
//! 3. **Heading bias**: every `vision_period` attempts a snapshot is matched
//!    against the description and a reported bearing becomes the steering
//!    angle of the following cruises.  When the forward frame misses, the
//!    camera pans to `-panorama_pan_deg` and `+panorama_pan_deg`; a hit there
//!    steers towards that side (pan plus bearing).  The pan is re-centred
//!    afterwards.
//! 4. **Cruise**: one forward burst at a speed attenuated by the latest
//!    reading.
//!
//! Any sensor, actuator or vision failure stops the motors and ends the run
//! with an `aborted` outcome carrying the fault.

use std::fmt;
use std::sync::Arc;

use picarx_hal::{ActuatorGateway, GroundStatus, SensorGateway, ServoLimits};
use picarx_kernel::{ActuatorLock, CancelToken};
use picarx_types::{Direction, NavigationOutcome, NavigationStatus, PicarError, ServoChannel, VisualMatch};
use tracing::{debug, info, instrument, warn};

use super::{NavigationConfig, check_speed, halt};
use crate::language::LanguageService;

// ─────────────────────────────────────────────────────────────────────────────
// Avoidance strategies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvoidanceStrategy {
    TurnLeftForward,
    TurnRightForward,
    /// Reverse straight, then flip the cruise heading to the other side.
    BackUpReangle,
}

impl AvoidanceStrategy {
    const ROTATION: [AvoidanceStrategy; 3] = [
        AvoidanceStrategy::TurnLeftForward,
        AvoidanceStrategy::TurnRightForward,
        AvoidanceStrategy::BackUpReangle,
    ];
}

impl fmt::Display for AvoidanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AvoidanceStrategy::TurnLeftForward => "turn_left_forward",
            AvoidanceStrategy::TurnRightForward => "turn_right_forward",
            AvoidanceStrategy::BackUpReangle => "back_up_reangle",
        };
        f.write_str(s)
    }
}

/// Fixed rotation over the three strategies.  Consecutive calls never
/// return the same strategy.
#[derive(Debug, Default, Clone)]
pub struct StrategyCycle {
    position: usize,
}

impl StrategyCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_strategy(&mut self) -> AvoidanceStrategy {
        let rotation = AvoidanceStrategy::ROTATION;
        let strategy = rotation[self.position % rotation.len()];
        self.position = (self.position + 1) % rotation.len();
        strategy
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ObstacleNavigator
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable state of one `seek_target` run.
struct Run {
    cycle: StrategyCycle,
    heading_deg: f32,
    last_reading: f32,
}

enum Attempt {
    Continue,
    Finished(NavigationStatus),
}

pub struct ObstacleNavigator {
    sensors: Arc<dyn SensorGateway>,
    actuators: Arc<ActuatorLock>,
    language: Arc<dyn LanguageService>,
    cancel: CancelToken,
    config: NavigationConfig,
}

impl ObstacleNavigator {
    pub fn new(
        sensors: Arc<dyn SensorGateway>,
        actuators: Arc<ActuatorLock>,
        language: Arc<dyn LanguageService>,
        cancel: CancelToken,
        config: NavigationConfig,
    ) -> Self {
        Self {
            sensors,
            actuators,
            language,
            cancel,
            config,
        }
    }

    /// Look for `target_description`, avoiding obstacles on the way.
    ///
    /// Faults do not surface as `Err`: they end the run with
    /// [`NavigationStatus::Aborted`] and the fault in
    /// [`NavigationOutcome::fault`].
    ///
    /// # Errors
    ///
    /// - [`PicarError::InvalidParameter`] for an empty description,
    ///   `max_attempts == 0` or `speed > 100`;
    /// - [`PicarError::ActuatorBusy`] when another navigation holds the lock.
    #[instrument(skip(self))]
    pub fn seek_target(
        &self,
        target_description: &str,
        max_attempts: u32,
        speed: u8,
    ) -> Result<NavigationOutcome, PicarError> {
        let target = target_description.trim();
        if target.is_empty() {
            return Err(PicarError::InvalidParameter("target description is empty".into()));
        }
        if max_attempts == 0 {
            return Err(PicarError::InvalidParameter(
                "max_attempts must be at least 1".into(),
            ));
        }
        check_speed(speed)?;

        let mut lease = self.actuators.try_acquire("obstacle_navigator")?;
        let mut run = Run {
            cycle: StrategyCycle::new(),
            heading_deg: 0.0,
            last_reading: f32::NAN,
        };

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                info!(attempt, "target search cancelled");
                return Ok(self.finish(&mut *lease, NavigationStatus::Aborted, &run, attempt - 1));
            }
            match self.attempt(&mut *lease, &mut run, attempt, target, speed) {
                Ok(Attempt::Continue) => self.config.pause(),
                Ok(Attempt::Finished(status)) => {
                    return Ok(self.finish(&mut *lease, status, &run, attempt));
                }
                Err(e) => {
                    halt(&mut *lease, &e);
                    return Ok(NavigationOutcome::faulted(e, run.last_reading, attempt));
                }
            }
        }

        info!(max_attempts, "attempt budget exhausted");
        Ok(self.finish(&mut *lease, NavigationStatus::ExhaustedAttempts, &run, max_attempts))
    }

    fn attempt(
        &self,
        gateway: &mut dyn ActuatorGateway,
        run: &mut Run,
        attempt: u32,
        target: &str,
        speed: u8,
    ) -> Result<Attempt, PicarError> {
        let grayscale = self.sensors.read_grayscale()?;
        if self.config.ground_reference().classify(grayscale) == GroundStatus::Cliff {
            info!(attempt, ?grayscale, "drop-off ahead");
            return Ok(Attempt::Finished(NavigationStatus::StoppedSafety));
        }

        let d = self.sensors.read_distance()?;
        run.last_reading = d;
        debug!(attempt, distance_cm = d, "distance reading");

        if d <= self.config.close_threshold_cm {
            gateway.stop()?;
            if self.look(target)?.present {
                info!(attempt, distance_cm = d, "target confirmed");
                return Ok(Attempt::Finished(NavigationStatus::Reached));
            }
            let strategy = run.cycle.next_strategy();
            info!(attempt, distance_cm = d, %strategy, "obstacle ahead; avoiding");
            self.avoid(gateway, run, strategy, self.config.attenuate_speed(d, speed))?;
            return Ok(Attempt::Continue);
        }

        if self.config.vision_period > 0 && attempt % self.config.vision_period == 0 {
            let sighting = self.look(target)?;
            if sighting.present {
                if let Some(bearing) = sighting.bearing_deg {
                    run.heading_deg = ServoLimits::for_channel(ServoChannel::Steering).clamp(bearing);
                    debug!(attempt, bearing, heading_deg = run.heading_deg, "heading biased towards target");
                }
            } else if let Some(heading) = self.panorama(gateway, target)? {
                run.heading_deg = heading;
                debug!(attempt, heading_deg = heading, "target found off-axis");
            }
        }

        gateway.set_angle(ServoChannel::Steering, run.heading_deg)?;
        gateway.drive(
            Direction::Forward,
            self.config.attenuate_speed(d, speed),
            self.config.burst(),
        )?;
        gateway.stop()?;
        Ok(Attempt::Continue)
    }

    fn look(&self, target: &str) -> Result<VisualMatch, PicarError> {
        let snapshot = self.sensors.capture_snapshot()?;
        self.language.match_visual(&snapshot, target)
    }

    /// Look left, then right.  Returns the steering angle towards the first
    /// side frame that shows the target.
    fn panorama(&self, gateway: &mut dyn ActuatorGateway, target: &str) -> Result<Option<f32>, PicarError> {
        let pan = self.config.panorama_pan_deg.abs();
        if pan == 0.0 {
            return Ok(None);
        }
        let found = self.sweep(gateway, target, pan);
        let centred = gateway.set_angle(ServoChannel::Pan, 0.0);
        let found = found?;
        centred?;
        Ok(found)
    }

    fn sweep(&self, gateway: &mut dyn ActuatorGateway, target: &str, pan: f32) -> Result<Option<f32>, PicarError> {
        for side in [-pan, pan] {
            let applied = gateway.set_angle(ServoChannel::Pan, side)?;
            let sighting = self.look(target)?;
            if sighting.present {
                let bearing = applied + sighting.bearing_deg.unwrap_or(0.0);
                return Ok(Some(ServoLimits::for_channel(ServoChannel::Steering).clamp(bearing)));
            }
        }
        Ok(None)
    }

    fn avoid(
        &self,
        gateway: &mut dyn ActuatorGateway,
        run: &mut Run,
        strategy: AvoidanceStrategy,
        speed: u8,
    ) -> Result<(), PicarError> {
        let steer = self.config.strategy_steer_deg.abs();
        match strategy {
            AvoidanceStrategy::TurnLeftForward | AvoidanceStrategy::TurnRightForward => {
                let angle = if strategy == AvoidanceStrategy::TurnLeftForward {
                    -steer
                } else {
                    steer
                };
                gateway.set_angle(ServoChannel::Steering, angle)?;
                gateway.drive(Direction::Forward, speed, self.config.burst())?;
                gateway.stop()
            }
            AvoidanceStrategy::BackUpReangle => {
                gateway.set_angle(ServoChannel::Steering, 0.0)?;
                gateway.drive(Direction::Backward, speed, self.config.backup())?;
                gateway.stop()?;
                run.heading_deg = if run.heading_deg > 0.0 { -steer } else { steer };
                Ok(())
            }
        }
    }

    /// Stop the motors and build the outcome.  A failing stop turns the
    /// outcome into an abort carrying that fault.
    fn finish(
        &self,
        gateway: &mut dyn ActuatorGateway,
        status: NavigationStatus,
        run: &Run,
        attempts_used: u32,
    ) -> NavigationOutcome {
        match gateway.stop() {
            Ok(()) => NavigationOutcome::new(status, run.last_reading, attempts_used),
            Err(e) => {
                warn!(error = %e, %status, "stop failed while finishing");
                NavigationOutcome::faulted(e, run.last_reading, attempts_used)
            }
        }
    }
}
