//! [`Orchestrator`] – request in, response out.
//!
//! One request flows through:
//!
//! ```text
//! text ──► CommandRouter::classify ──► dispatch table (by DecisionTag)
//!            │                            ├─ Immediate     → actuator / sensor gateway
//!            │                            ├─ NeedsPlan     → ProgressJudge::create_plan
//!            │                            ├─ DistanceSeek  → DistanceNavigator
//!            │                            └─ ObstacleAvoid → ObstacleNavigator
//!            └─ fresh RobotState               │
//!                                              └─► ProgressJudge::record_outcome
//! ```
//!
//! Navigation calls block; a second thread can call
//! [`Orchestrator::request_stop`] to cancel them between attempts.

use std::sync::Arc;
use std::time::Duration;

use picarx_hal::{ActuatorGateway, GroundStatus, SensorGateway, Snapshot};
use picarx_kernel::{ActuatorLock, CancelToken};
use picarx_memory::PlanStore;
use picarx_types::{
    Decision, DecisionTag, Direction, ImmediateAction, NavigationOutcome, PicarError, Plan, RobotState,
    ServoChannel, SessionId,
};
use tracing::{info, instrument, warn};

use crate::judge::{Guidance, ProgressJudge, StatusReport};
use crate::language::LanguageService;
use crate::navigation::{DistanceNavigator, NavigationConfig, ObstacleNavigator};
use crate::router::CommandRouter;

/// Drive duration when an immediate drive names none.
pub const DEFAULT_DRIVE_SECS: f32 = 1.0;

/// Samples taken for an on-demand distance reading.
const STABLE_DISTANCE_SAMPLES: usize = 5;

/// Result of one immediate action.
#[derive(Debug, Clone)]
pub enum ActionReport {
    Drove {
        direction: Direction,
        speed: u8,
        seconds: f32,
    },
    /// Servo position after gateway clamping.
    Angle { channel: ServoChannel, angle_deg: f32 },
    Stopped,
    /// A navigation held the actuators; it was asked to cancel.
    CancelRequested,
    Reset,
    Distance(f32),
    Grayscale { values: [f32; 3], ground: GroundStatus },
    Snapshot(Snapshot),
    State(RobotState),
}

#[derive(Debug, Clone)]
pub enum Response {
    Action(ActionReport),
    PlanCreated(Plan),
    Navigation(NavigationOutcome),
}

type Handler = fn(&Orchestrator, &Decision) -> Result<Response, PicarError>;

fn handler_for(tag: DecisionTag) -> Handler {
    match tag {
        DecisionTag::Immediate => Orchestrator::run_immediate,
        DecisionTag::NeedsPlan => Orchestrator::run_plan,
        DecisionTag::DistanceSeek => Orchestrator::run_distance_seek,
        DecisionTag::ObstacleAvoid => Orchestrator::run_obstacle_avoid,
    }
}

pub struct Orchestrator {
    router: CommandRouter,
    judge: ProgressJudge,
    distance: DistanceNavigator,
    obstacle: ObstacleNavigator,
    sensors: Arc<dyn SensorGateway>,
    actuators: Arc<ActuatorLock>,
    cancel: CancelToken,
    config: NavigationConfig,
    session: SessionId,
}

impl Orchestrator {
    pub fn new(
        language: Arc<dyn LanguageService>,
        sensors: Arc<dyn SensorGateway>,
        actuators: Box<dyn ActuatorGateway>,
        store: Arc<PlanStore>,
        session: SessionId,
        config: NavigationConfig,
    ) -> Self {
        let actuators = Arc::new(ActuatorLock::new(actuators));
        let cancel = CancelToken::new();
        Self {
            router: CommandRouter::new(Arc::clone(&language)),
            judge: ProgressJudge::new(store, Arc::clone(&language), Arc::clone(&sensors), config.clone()),
            distance: DistanceNavigator::new(
                Arc::clone(&sensors),
                Arc::clone(&actuators),
                cancel.clone(),
                config.clone(),
            ),
            obstacle: ObstacleNavigator::new(
                Arc::clone(&sensors),
                Arc::clone(&actuators),
                language,
                cancel.clone(),
                config.clone(),
            ),
            sensors,
            actuators,
            cancel,
            config,
            session,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn judge(&self) -> &ProgressJudge {
        &self.judge
    }

    /// Shared with Ctrl-C handlers and shell threads.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Classify `request` and execute it.
    ///
    /// Hardware faults fail the session's active plan before they are
    /// returned.
    #[instrument(skip(self), fields(session = %self.session))]
    pub fn handle(&self, request: &str) -> Result<Response, PicarError> {
        let state = self.sensors.robot_state()?;
        let decision = self.router.classify(request, &state)?;
        let result = handler_for(decision.tag)(self, &decision);
        if let Err(e) = &result
            && let Err(record_err) = self.judge.record_fault(&self.session, e)
        {
            warn!(error = %record_err, "could not record fault in plan");
        }
        result
    }

    /// Stop the motors now, or cancel the navigation that holds them.
    pub fn request_stop(&self) -> Result<ActionReport, PicarError> {
        match self.actuators.try_acquire("stop") {
            Ok(mut lease) => {
                lease.stop()?;
                Ok(ActionReport::Stopped)
            }
            Err(PicarError::ActuatorBusy) => {
                info!("navigation in progress; requesting cancellation");
                self.cancel.cancel();
                Ok(ActionReport::CancelRequested)
            }
            Err(e) => Err(e),
        }
    }

    pub fn status(&self) -> Result<StatusReport, PicarError> {
        self.judge.status_report(&self.session)
    }

    pub fn guidance(&self) -> Result<Guidance, PicarError> {
        self.judge.guidance(&self.session)
    }

    /// Record a manually executed step as completed.
    pub fn advance(&self, step_description: &str) -> Result<Plan, PicarError> {
        self.judge.advance(&self.session, step_description, true)
    }

    // ── Handlers ─────────────────────────────────────────────────────────────

    fn run_immediate(&self, decision: &Decision) -> Result<Response, PicarError> {
        let action = decision.action.as_ref().ok_or_else(|| {
            PicarError::NeedsClarification(format!("'{}' does not name a single action", decision.command))
        })?;

        let report = match action {
            ImmediateAction::Stop => self.request_stop()?,
            ImmediateAction::ReadDistance => {
                ActionReport::Distance(self.sensors.read_distance_stable(STABLE_DISTANCE_SAMPLES)?)
            }
            ImmediateAction::ReadGrayscale => {
                let values = self.sensors.read_grayscale()?;
                let ground = self.config.ground_reference().classify(values);
                ActionReport::Grayscale { values, ground }
            }
            ImmediateAction::CaptureSnapshot => ActionReport::Snapshot(self.sensors.capture_snapshot()?),
            ImmediateAction::ReportState => ActionReport::State(self.sensors.robot_state()?),
            ImmediateAction::Reset => {
                self.actuators.try_acquire("reset")?.reset()?;
                ActionReport::Reset
            }
            ImmediateAction::SetAngle { channel, angle_deg } => {
                let applied = self.actuators.try_acquire("set_angle")?.set_angle(*channel, *angle_deg)?;
                ActionReport::Angle {
                    channel: *channel,
                    angle_deg: applied,
                }
            }
            ImmediateAction::Drive {
                direction,
                speed,
                duration_s,
            } => {
                let speed = speed.or(decision.params.speed).unwrap_or(self.config.default_speed);
                let seconds = duration_s.or(decision.params.duration_s).unwrap_or(DEFAULT_DRIVE_SECS);
                let mut lease = self.actuators.try_acquire("drive")?;
                lease.drive(*direction, speed, Duration::from_secs_f32(seconds))?;
                lease.stop()?;
                ActionReport::Drove {
                    direction: *direction,
                    speed,
                    seconds,
                }
            }
            ImmediateAction::Turn {
                speed, duration_s, ..
            } => {
                let angle_deg = decision.params.angle_deg.ok_or_else(|| {
                    PicarError::InvalidParameter("turn was not resolved to a steering angle".into())
                })?;
                let mut lease = self.actuators.try_acquire("turn")?;
                let applied = lease.set_angle(ServoChannel::Steering, angle_deg)?;
                if speed.is_some() || duration_s.is_some() {
                    let speed = speed.unwrap_or(self.config.default_speed);
                    let seconds = duration_s.unwrap_or(DEFAULT_DRIVE_SECS);
                    lease.drive(Direction::Forward, speed, Duration::from_secs_f32(seconds))?;
                    lease.stop()?;
                }
                ActionReport::Angle {
                    channel: ServoChannel::Steering,
                    angle_deg: applied,
                }
            }
        };
        info!(?action, "immediate action done");
        Ok(Response::Action(report))
    }

    fn run_plan(&self, decision: &Decision) -> Result<Response, PicarError> {
        let plan = self.judge.create_plan(&self.session, &decision.command)?;
        Ok(Response::PlanCreated(plan))
    }

    fn run_distance_seek(&self, decision: &Decision) -> Result<Response, PicarError> {
        let target_cm = decision
            .params
            .target_cm
            .ok_or_else(|| PicarError::NeedsClarification("no target distance given".into()))?;
        let speed = decision.params.speed.unwrap_or(self.config.default_speed);
        self.cancel.reset();
        let outcome = self.distance.seek_distance(
            target_cm,
            self.config.safety_cm,
            speed,
            self.config.max_attempts,
        )?;
        self.record(decision, &outcome);
        Ok(Response::Navigation(outcome))
    }

    fn run_obstacle_avoid(&self, decision: &Decision) -> Result<Response, PicarError> {
        let target = decision
            .params
            .target
            .as_deref()
            .ok_or_else(|| PicarError::NeedsClarification("no target described".into()))?;
        let speed = decision.params.speed.unwrap_or(self.config.default_speed);
        self.cancel.reset();
        let outcome = self.obstacle.seek_target(target, self.config.max_attempts, speed)?;
        self.record(decision, &outcome);
        Ok(Response::Navigation(outcome))
    }

    fn record(&self, decision: &Decision, outcome: &NavigationOutcome) {
        info!(status = %outcome.status, attempts = outcome.attempts_used, "navigation finished");
        if let Err(e) = self.judge.record_outcome(&self.session, &decision.command, outcome) {
            warn!(error = %e, "could not record navigation outcome in plan");
        }
    }
}

#[cfg(test)]
mod tests {
    use picarx_hal::sim::{SimCommand, SimRobot};
    use picarx_types::{NavigationStatus, PlanStatus};

    use super::*;
    use crate::scripted::ScriptedLanguageService;

    // ---- helpers ------------------------------------------------------------

    fn orchestrator(robot: &SimRobot, language: ScriptedLanguageService) -> Orchestrator {
        Orchestrator::new(
            Arc::new(language),
            Arc::new(robot.sensors()),
            Box::new(robot.actuators()),
            Arc::new(PlanStore::in_memory()),
            SessionId::new("orchestrator-test"),
            NavigationConfig::instant(),
        )
    }

    // ---- immediate ------------------------------------------------------------

    #[test]
    fn drive_without_duration_runs_one_second_then_stops() {
        let robot = SimRobot::new();
        let orch = orchestrator(&robot, ScriptedLanguageService::new());
        let response = orch.handle("Drive forward at speed 30").unwrap();
        assert!(matches!(
            response,
            Response::Action(ActionReport::Drove { speed: 30, .. })
        ));
        assert_eq!(
            robot.commands(),
            vec![
                SimCommand::Drive {
                    direction: Direction::Forward,
                    speed: 30,
                    duration: Duration::from_secs(1),
                },
                SimCommand::Stop,
                SimCommand::Stop,
            ]
        );
    }

    #[test]
    fn turn_sets_resolved_steering_angle() {
        let robot = SimRobot::new();
        let orch = orchestrator(&robot, ScriptedLanguageService::new());
        let response = orch.handle("turn left 20 degrees").unwrap();
        assert!(matches!(
            response,
            Response::Action(ActionReport::Angle {
                channel: ServoChannel::Steering,
                ..
            })
        ));
        assert_eq!(robot.angle(ServoChannel::Steering), -20.0);
    }

    #[test]
    fn distance_reading_uses_stable_median() {
        let robot = SimRobot::new().with_distances([40.0, 500.0, 41.0, 39.0, 40.0]);
        let orch = orchestrator(&robot, ScriptedLanguageService::new());
        // robot_state peeks without consuming the script.
        let Response::Action(ActionReport::Distance(d)) = orch.handle("read the distance").unwrap() else {
            panic!("expected a distance report");
        };
        assert_eq!(d, 40.0);
    }

    #[test]
    fn stop_while_idle_stops_motors() {
        let robot = SimRobot::new();
        let orch = orchestrator(&robot, ScriptedLanguageService::new());
        assert!(matches!(orch.request_stop().unwrap(), ActionReport::Stopped));
        assert_eq!(robot.motor_speed(), 0);
    }

    #[test]
    fn stop_while_busy_raises_cancellation() {
        let robot = SimRobot::new();
        let orch = orchestrator(&robot, ScriptedLanguageService::new());
        let _held = orch.actuators.try_acquire("navigation").unwrap();
        assert!(matches!(orch.request_stop().unwrap(), ActionReport::CancelRequested));
        assert!(orch.cancel_token().is_cancelled());
    }

    // ---- plans and navigation -------------------------------------------------

    #[test]
    fn multi_step_request_creates_a_plan() {
        let robot = SimRobot::new();
        let orch = orchestrator(
            &robot,
            ScriptedLanguageService::new().with_steps(["Take initial photo", "Find the exit"]),
        );
        let Response::PlanCreated(plan) = orch.handle("Explore the room and find the exit").unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.total_steps, 2);
        assert!(robot.commands().is_empty());
    }

    #[test]
    fn distance_seek_outcome_advances_the_active_plan() {
        let robot = SimRobot::new().with_distances([120.0, 30.2, 29.8]);
        let orch = orchestrator(
            &robot,
            ScriptedLanguageService::new().with_steps(["Approach the wall", "Take a photo"]),
        );
        orch.handle("explore the room").unwrap();

        let Response::Navigation(outcome) = orch.handle("Navigate until 30 cm from the wall").unwrap() else {
            panic!("expected a navigation outcome");
        };
        assert_eq!(outcome.status, NavigationStatus::Reached);
        assert_eq!(outcome.final_reading, 29.8);

        let plan = orch.status().unwrap().plan.unwrap();
        assert_eq!(plan.current_step, 1);
        assert_eq!(plan.status, PlanStatus::InProgress);
    }

    #[test]
    fn hardware_fault_fails_the_active_plan() {
        let robot = SimRobot::new().with_distances([80.0]).fail_drive_after(0);
        let orch = orchestrator(
            &robot,
            ScriptedLanguageService::new().with_steps(["Approach the wall"]),
        );
        orch.handle("explore the room").unwrap();
        let err = orch.handle("drive to 30 cm from the wall").unwrap_err();
        assert!(err.is_hardware_fault());
        assert_eq!(orch.status().unwrap().plan.unwrap().status, PlanStatus::Failed);
        assert_eq!(robot.motor_speed(), 0);
    }

    #[test]
    fn stale_cancellation_does_not_abort_the_next_navigation() {
        let robot = SimRobot::new().with_distances([29.8]);
        let orch = orchestrator(&robot, ScriptedLanguageService::new());
        orch.cancel_token().cancel();
        let Response::Navigation(outcome) = orch.handle("go until 30 cm away").unwrap() else {
            panic!("expected a navigation outcome");
        };
        assert_eq!(outcome.status, NavigationStatus::Reached);
    }
}
