//! In-process simulated Picar-X for tests and hardware-free runs.
//!
//! [`SimRobot`] owns one shared state record and hands out two views onto
//! it: [`SimSensors`] (a [`SensorGateway`]) and [`SimActuators`] (an
//! [`ActuatorGateway`]).  Every actuator command is appended to a log that
//! tests can inspect afterwards.
//!
//! Distance readings come from one of two models:
//!
//! - a **script**: readings are consumed in order and the last one repeats;
//! - a **world**: a single wall ahead whose distance shrinks while driving
//!   forward (speed 30 covers about 30 cm per second) and grows in reverse.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use picarx_hal::actuator::ActuatorGateway;
//! use picarx_hal::sensor::SensorGateway;
//! use picarx_hal::sim::SimRobot;
//! use picarx_types::Direction;
//!
//! let robot = SimRobot::new().with_world_distance(100.0);
//! let mut actuators = robot.actuators();
//! actuators
//!     .drive(Direction::Forward, 30, Duration::from_secs(1))
//!     .expect("sim drive must succeed");
//! actuators.stop().expect("sim stop must succeed");
//!
//! let d = robot.sensors().read_distance().expect("sim read must succeed");
//! assert!((d - 70.0).abs() < 0.01);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use picarx_types::{Direction, PicarError, RobotState, ServoChannel};
use tracing::{debug, warn};

use crate::actuator::ActuatorGateway;
use crate::camera::{ImageEncoding, Snapshot};
use crate::limits::{ServoLimits, clamp_speed};
use crate::sensor::SensorGateway;

/// One recorded actuator command.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Drive {
        direction: Direction,
        speed: u8,
        duration: Duration,
    },
    SetAngle {
        channel: ServoChannel,
        /// Angle after clamping.
        angle_deg: f32,
    },
    Stop,
}

enum DistanceModel {
    Script(VecDeque<f32>),
    World { distance_cm: f32 },
}

type DriveHook = Box<dyn FnMut(u32) + Send>;

struct SimState {
    robot: RobotState,
    distance: DistanceModel,
    log: Vec<SimCommand>,
    distance_reads: u32,
    drives: u32,
    fail_distance_after: Option<u32>,
    fail_drive_after: Option<u32>,
    drive_hook: Option<DriveHook>,
    realtime: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// SimRobot
// ────────────────────────────────────────────────────────────────────────────

/// Builder and owner of the simulated robot state.
#[derive(Clone)]
pub struct SimRobot {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimRobot {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRobot {
    /// A robot facing an open room (300 cm) on bright floor.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                robot: RobotState {
                    grayscale: [1400.0; 3],
                    ..RobotState::default()
                },
                distance: DistanceModel::World { distance_cm: 300.0 },
                log: Vec::new(),
                distance_reads: 0,
                drives: 0,
                fail_distance_after: None,
                fail_drive_after: None,
                drive_hook: None,
                realtime: false,
            })),
        }
    }

    /// Serve these ultrasonic readings in order; the last one repeats.
    pub fn with_distances(self, readings: impl IntoIterator<Item = f32>) -> Self {
        self.lock().distance = DistanceModel::Script(readings.into_iter().collect());
        self
    }

    /// Place a wall `distance_cm` ahead and move it with the motors.
    pub fn with_world_distance(self, distance_cm: f32) -> Self {
        self.lock().distance = DistanceModel::World { distance_cm };
        self
    }

    pub fn with_grayscale(self, grayscale: [f32; 3]) -> Self {
        self.lock().robot.grayscale = grayscale;
        self
    }

    /// Distance reads after the first `n` fail with `SensorUnavailable`.
    pub fn fail_distance_after(self, n: u32) -> Self {
        self.lock().fail_distance_after = Some(n);
        self
    }

    /// Drive commands after the first `n` fail with `ActuatorFault`.
    pub fn fail_drive_after(self, n: u32) -> Self {
        self.lock().fail_drive_after = Some(n);
        self
    }

    /// Call `hook` with the running drive count after every drive command.
    pub fn on_drive(self, hook: impl FnMut(u32) + Send + 'static) -> Self {
        self.lock().drive_hook = Some(Box::new(hook));
        self
    }

    /// Make `drive` block for its requested duration like real motors.
    pub fn realtime(self, enabled: bool) -> Self {
        self.lock().realtime = enabled;
        self
    }

    pub fn sensors(&self) -> SimSensors {
        SimSensors {
            state: Arc::clone(&self.state),
        }
    }

    pub fn actuators(&self) -> SimActuators {
        SimActuators {
            state: Arc::clone(&self.state),
        }
    }

    /// Every actuator command issued so far, oldest first.
    pub fn commands(&self) -> Vec<SimCommand> {
        self.lock().log.clone()
    }

    pub fn distance_reads(&self) -> u32 {
        self.lock().distance_reads
    }

    /// Current signed motor speed.
    pub fn motor_speed(&self) -> i16 {
        self.lock().robot.motor_speed
    }

    pub fn angle(&self, channel: ServoChannel) -> f32 {
        let state = self.lock();
        match channel {
            ServoChannel::Steering => state.robot.steering_deg,
            ServoChannel::Pan => state.robot.pan_deg,
            ServoChannel::Tilt => state.robot.tilt_deg,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| {
        warn!("sim state mutex poisoned; recovering");
        poisoned.into_inner()
    })
}

fn peek_distance(model: &DistanceModel) -> Option<f32> {
    match model {
        DistanceModel::Script(readings) => readings.front().copied(),
        DistanceModel::World { distance_cm } => Some(*distance_cm),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor view
// ────────────────────────────────────────────────────────────────────────────

/// Read-only view of a [`SimRobot`].
#[derive(Clone)]
pub struct SimSensors {
    state: Arc<Mutex<SimState>>,
}

impl SensorGateway for SimSensors {
    fn read_distance(&self) -> Result<f32, PicarError> {
        let mut state = lock_state(&self.state);
        state.distance_reads += 1;
        if let Some(limit) = state.fail_distance_after
            && state.distance_reads > limit
        {
            return Err(PicarError::SensorUnavailable {
                sensor: "ultrasonic".into(),
                details: "simulated echo timeout".into(),
            });
        }
        let reading = match &mut state.distance {
            DistanceModel::Script(readings) => {
                let reading = if readings.len() > 1 {
                    readings.pop_front()
                } else {
                    readings.front().copied()
                };
                reading.ok_or_else(|| PicarError::SensorUnavailable {
                    sensor: "ultrasonic".into(),
                    details: "no readings scripted".into(),
                })?
            }
            DistanceModel::World { distance_cm } => *distance_cm,
        };
        state.robot.distance_cm = reading;
        Ok(reading)
    }

    fn read_grayscale(&self) -> Result<[f32; 3], PicarError> {
        Ok(lock_state(&self.state).robot.grayscale)
    }

    fn capture_snapshot(&self) -> Result<Snapshot, PicarError> {
        Ok(Snapshot::new(4, 4, ImageEncoding::Gray8, vec![128u8; 16]))
    }

    fn robot_state(&self) -> Result<RobotState, PicarError> {
        let state = lock_state(&self.state);
        let mut robot = state.robot.clone();
        if let Some(d) = peek_distance(&state.distance) {
            robot.distance_cm = d;
        }
        Ok(robot)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Actuator view
// ────────────────────────────────────────────────────────────────────────────

/// Command view of a [`SimRobot`].  Always succeeds unless a fault was
/// injected.
pub struct SimActuators {
    state: Arc<Mutex<SimState>>,
}

impl ActuatorGateway for SimActuators {
    fn drive(&mut self, direction: Direction, speed: u8, duration: Duration) -> Result<(), PicarError> {
        let speed = clamp_speed(speed);
        let realtime = {
            let mut state = lock_state(&self.state);
            if let Some(limit) = state.fail_drive_after
                && state.drives >= limit
            {
                return Err(PicarError::ActuatorFault {
                    channel: "motors".into(),
                    details: "simulated motor stall".into(),
                });
            }
            state.drives += 1;
            state.log.push(SimCommand::Drive {
                direction,
                speed,
                duration,
            });
            let signed = match direction {
                Direction::Forward => speed as i16,
                Direction::Backward => -(speed as i16),
            };
            state.robot.motor_speed = signed;
            if let DistanceModel::World { distance_cm } = &mut state.distance {
                let travelled = signed as f32 * duration.as_secs_f32();
                *distance_cm = (*distance_cm - travelled).max(0.0);
            }
            let drives = state.drives;
            if let Some(hook) = state.drive_hook.as_mut() {
                hook(drives);
            }
            debug!(?direction, speed, ?duration, "sim drive");
            state.realtime
        };
        if realtime {
            std::thread::sleep(duration);
        }
        Ok(())
    }

    fn set_angle(&mut self, channel: ServoChannel, angle_deg: f32) -> Result<f32, PicarError> {
        let applied = ServoLimits::for_channel(channel).clamp(angle_deg);
        let mut state = lock_state(&self.state);
        match channel {
            ServoChannel::Steering => state.robot.steering_deg = applied,
            ServoChannel::Pan => state.robot.pan_deg = applied,
            ServoChannel::Tilt => state.robot.tilt_deg = applied,
        }
        state.log.push(SimCommand::SetAngle {
            channel,
            angle_deg: applied,
        });
        Ok(applied)
    }

    fn stop(&mut self) -> Result<(), PicarError> {
        let mut state = lock_state(&self.state);
        state.robot.motor_speed = 0;
        state.log.push(SimCommand::Stop);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
