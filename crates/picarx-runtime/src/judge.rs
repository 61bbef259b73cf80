//! [`ProgressJudge`] – the only writer of plans.
//!
//! The judge creates plans by decomposing tasks through the
//! [`LanguageService`], advances and fails them through the [`PlanStore`],
//! folds navigation outcomes into the active plan, and renders read-only
//! status reports and next-step guidance from the plan plus a fresh sensor
//! snapshot.
//!
//! ```text
//! pending --(first advance)--> in_progress --(current_step == total)--> completed
//!    |                              |
//!    +------(hardware fault)--------+--> failed (terminal)
//! ```

use std::fmt;
use std::sync::Arc;

use picarx_hal::{GroundStatus, SensorGateway};
use picarx_memory::PlanStore;
use picarx_types::{
    NavigationOutcome, NavigationStatus, PicarError, Plan, PlanStatus, RobotState, SessionId,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::language::LanguageService;
use crate::navigation::NavigationConfig;

/// Read-only composite of the active plan and the current robot state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub plan: Option<Plan>,
    pub state: RobotState,
}

/// Next-step advice derived from the active plan and live sensor data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Guidance {
    pub task: Option<String>,
    pub status: Option<PlanStatus>,
    pub completed_steps: u32,
    pub total_steps: u32,
    pub next_step: Option<String>,
    pub warnings: Vec<String>,
}

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.task, self.status) {
            (Some(task), Some(status)) => writeln!(
                f,
                "Task: {task} [{}] {}/{} steps",
                status.as_str(),
                self.completed_steps,
                self.total_steps
            )?,
            _ => writeln!(f, "No active plan")?,
        }
        if let Some(step) = &self.next_step {
            writeln!(f, "Next: {step}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "Warning: {warning}")?;
        }
        Ok(())
    }
}

pub struct ProgressJudge {
    store: Arc<PlanStore>,
    language: Arc<dyn LanguageService>,
    sensors: Arc<dyn SensorGateway>,
    config: NavigationConfig,
}

impl ProgressJudge {
    pub fn new(
        store: Arc<PlanStore>,
        language: Arc<dyn LanguageService>,
        sensors: Arc<dyn SensorGateway>,
        config: NavigationConfig,
    ) -> Self {
        Self {
            store,
            language,
            sensors,
            config,
        }
    }

    /// Decompose `task` and install the result as a pending plan.
    ///
    /// # Errors
    ///
    /// - [`PicarError::ServiceUnavailable`] when decomposition fails;
    /// - [`PicarError::PlanCreationFailed`] when it yields no steps;
    /// - [`PicarError::PlanRejected`] when the session's current plan is in
    ///   progress or completed.
    #[instrument(skip(self), fields(session = %session))]
    pub fn create_plan(&self, session: &SessionId, task: &str) -> Result<Plan, PicarError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(PicarError::InvalidParameter("task is empty".into()));
        }
        let steps = self.language.decompose(task)?;
        let plan = Plan::new(task, steps)?;
        self.store.install(session, plan)
    }

    /// Append a step record; move to the next step when `completed`.
    #[instrument(skip(self), fields(session = %session))]
    pub fn advance(
        &self,
        session: &SessionId,
        step_description: &str,
        completed: bool,
    ) -> Result<Plan, PicarError> {
        let plan = self.store.update(session, |plan| {
            plan.advance(step_description, completed)?;
            Ok(plan.clone())
        })?;
        info!(
            step = plan.current_step,
            total = plan.total_steps,
            status = plan.status.as_str(),
            "plan advanced"
        );
        Ok(plan)
    }

    /// Move the active plan to the terminal failed state.
    #[instrument(skip(self), fields(session = %session))]
    pub fn fail(&self, session: &SessionId, reason: &str) -> Result<Plan, PicarError> {
        let plan = self.store.update(session, |plan| {
            plan.fail(reason)?;
            Ok(plan.clone())
        })?;
        warn!(task = %plan.task, reason, "plan failed");
        Ok(plan)
    }

    /// Remove the session's plan, whatever its status.
    pub fn clear(&self, session: &SessionId) -> Result<(), PicarError> {
        self.store.clear(session)
    }

    pub fn status_report(&self, session: &SessionId) -> Result<StatusReport, PicarError> {
        Ok(StatusReport {
            plan: self.store.get(session)?,
            state: self.sensors.robot_state()?,
        })
    }

    /// Render what should happen next, with safety warnings from the live
    /// state.
    pub fn guidance(&self, session: &SessionId) -> Result<Guidance, PicarError> {
        let StatusReport { plan, state } = self.status_report(session)?;

        let mut warnings = Vec::new();
        if state.distance_cm <= self.config.safety_cm {
            warnings.push(format!(
                "obstacle {:.1} cm ahead: stop or back up before driving forward",
                state.distance_cm
            ));
        }
        match self.config.ground_reference().classify(state.grayscale) {
            GroundStatus::Cliff => warnings.push("drop-off under the sensors: do not drive forward".into()),
            GroundStatus::Line => warnings.push("line detected under the car".into()),
            GroundStatus::Safe => {}
        }
        if let Some(plan) = plan.as_ref().filter(|p| p.status == PlanStatus::Failed) {
            warnings.push(format!(
                "plan failed: {}",
                plan.failure.as_deref().unwrap_or("unknown reason")
            ));
        }

        Ok(Guidance {
            task: plan.as_ref().map(|p| p.task.clone()),
            status: plan.as_ref().map(|p| p.status),
            completed_steps: plan.as_ref().map_or(0, |p| p.current_step),
            total_steps: plan.as_ref().map_or(0, |p| p.total_steps),
            next_step: plan.as_ref().and_then(|p| p.next_step().map(str::to_string)),
            warnings,
        })
    }

    /// Fold a navigation outcome into the active plan.
    ///
    /// `reached` completes the current step; `stopped_safety`,
    /// `exhausted_attempts` and cancellation log an incomplete step; an
    /// abort caused by a hardware fault fails the plan.  Returns `None` when
    /// the session has no plan still accepting steps.
    pub fn record_outcome(
        &self,
        session: &SessionId,
        description: &str,
        outcome: &NavigationOutcome,
    ) -> Result<Option<Plan>, PicarError> {
        if !self.has_open_plan(session)? {
            return Ok(None);
        }
        if let Some(fault) = outcome.fault.as_ref().filter(|f| f.is_hardware_fault()) {
            return self.fail(session, &fault.to_string()).map(Some);
        }
        let note = format!("{description} ({})", outcome.status);
        let completed = outcome.status == NavigationStatus::Reached;
        self.advance(session, &note, completed).map(Some)
    }

    /// Fail the active plan when `error` is a hardware fault.
    pub fn record_fault(&self, session: &SessionId, error: &PicarError) -> Result<Option<Plan>, PicarError> {
        if !error.is_hardware_fault() || !self.has_open_plan(session)? {
            return Ok(None);
        }
        self.fail(session, &error.to_string()).map(Some)
    }

    fn has_open_plan(&self, session: &SessionId) -> Result<bool, PicarError> {
        Ok(self
            .store
            .get(session)?
            .is_some_and(|p| matches!(p.status, PlanStatus::Pending | PlanStatus::InProgress)))
    }
}

#[cfg(test)]
mod tests {
    use picarx_hal::sim::SimRobot;

    use super::*;
    use crate::scripted::ScriptedLanguageService;

    // ---- helpers ------------------------------------------------------------

    const EXPLORE_STEPS: [&str; 3] = [
        "Take initial photo",
        "Drive forward while scanning for an opening",
        "Drive through the exit",
    ];

    fn judge_with(robot: &SimRobot, language: ScriptedLanguageService) -> ProgressJudge {
        ProgressJudge::new(
            Arc::new(PlanStore::in_memory()),
            Arc::new(language),
            Arc::new(robot.sensors()),
            NavigationConfig::instant(),
        )
    }

    fn judge(robot: &SimRobot) -> ProgressJudge {
        judge_with(robot, ScriptedLanguageService::new().with_steps(EXPLORE_STEPS))
    }

    fn session() -> SessionId {
        SessionId::new("test-session")
    }

    // ---- plan lifecycle -------------------------------------------------------

    #[test]
    fn create_plan_is_pending_at_step_zero() {
        let robot = SimRobot::new();
        let plan = judge(&robot)
            .create_plan(&session(), "Explore the room and find the exit")
            .unwrap();
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.current_step, 0);
        assert_eq!(plan.total_steps, 3);
    }

    #[test]
    fn first_completed_advance_starts_progress() {
        let robot = SimRobot::new();
        let judge = judge(&robot);
        judge.create_plan(&session(), "Explore the room and find the exit").unwrap();
        let plan = judge.advance(&session(), "Take initial photo", true).unwrap();
        assert_eq!(plan.current_step, 1);
        assert_eq!(plan.status, PlanStatus::InProgress);
        assert_eq!(plan.history.len(), 1);
        assert_eq!(plan.history[0].step, 1);
        assert!(plan.history[0].completed);
    }

    #[test]
    fn empty_decomposition_fails_creation() {
        let robot = SimRobot::new();
        let judge = judge_with(&robot, ScriptedLanguageService::new().with_steps(Vec::<String>::new()));
        let err = judge.create_plan(&session(), "do nothing").unwrap_err();
        assert!(matches!(err, PicarError::PlanCreationFailed(_)));
        assert!(judge.status_report(&session()).unwrap().plan.is_none());
    }

    #[test]
    fn decomposition_outage_is_reported() {
        let robot = SimRobot::new();
        let judge = judge_with(&robot, ScriptedLanguageService::new());
        let err = judge.create_plan(&session(), "explore").unwrap_err();
        assert!(matches!(err, PicarError::ServiceUnavailable(_)));
    }

    #[test]
    fn in_progress_plan_blocks_a_new_task() {
        let robot = SimRobot::new();
        let judge = judge(&robot);
        judge.create_plan(&session(), "explore").unwrap();
        judge.advance(&session(), "Take initial photo", true).unwrap();
        let err = judge.create_plan(&session(), "another task").unwrap_err();
        assert!(matches!(err, PicarError::PlanRejected(_)));
    }

    #[test]
    fn failed_plan_refuses_advances() {
        let robot = SimRobot::new();
        let judge = judge(&robot);
        judge.create_plan(&session(), "explore").unwrap();
        judge.fail(&session(), "motor stall").unwrap();
        let err = judge.advance(&session(), "keep going", true).unwrap_err();
        assert!(matches!(err, PicarError::PlanRejected(_)));
    }

    #[test]
    fn advance_without_plan_reports_no_active_plan() {
        let robot = SimRobot::new();
        let err = judge(&robot).advance(&session(), "step", true).unwrap_err();
        assert!(matches!(err, PicarError::NoActivePlan(_)));
    }

    // ---- status and guidance --------------------------------------------------

    #[test]
    fn repeated_status_reports_are_identical() {
        let robot = SimRobot::new().with_distances([80.0]);
        let judge = judge(&robot);
        judge.create_plan(&session(), "explore").unwrap();
        judge.advance(&session(), "Take initial photo", true).unwrap();
        let first = judge.status_report(&session()).unwrap();
        let second = judge.status_report(&session()).unwrap();
        assert_eq!(first.plan, second.plan);
        assert_eq!(first.state.distance_cm, 80.0);
    }

    #[test]
    fn guidance_names_next_step_and_hazards() {
        let robot = SimRobot::new()
            .with_distances([3.0])
            .with_grayscale([100.0, 1400.0, 1400.0]);
        let judge = judge(&robot);
        judge.create_plan(&session(), "explore").unwrap();
        judge.advance(&session(), "Take initial photo", true).unwrap();

        let guidance = judge.guidance(&session()).unwrap();
        assert_eq!(guidance.next_step.as_deref(), Some(EXPLORE_STEPS[1]));
        assert_eq!((guidance.completed_steps, guidance.total_steps), (1, 3));
        assert_eq!(guidance.warnings.len(), 2);
        assert!(guidance.to_string().contains("Next: Drive forward"));
    }

    #[test]
    fn guidance_without_plan_still_reports_hazards() {
        let robot = SimRobot::new().with_grayscale([1400.0, 600.0, 1400.0]);
        let guidance = judge(&robot).guidance(&session()).unwrap();
        assert!(guidance.task.is_none());
        assert_eq!(guidance.warnings, vec!["line detected under the car".to_string()]);
    }

    // ---- navigation outcomes --------------------------------------------------

    #[test]
    fn reached_outcome_completes_the_step() {
        let robot = SimRobot::new();
        let judge = judge(&robot);
        judge.create_plan(&session(), "explore").unwrap();
        let outcome = NavigationOutcome::new(NavigationStatus::Reached, 29.8, 3);
        let plan = judge
            .record_outcome(&session(), "approach the wall", &outcome)
            .unwrap()
            .unwrap();
        assert_eq!(plan.current_step, 1);
        assert_eq!(plan.history[0].description, "approach the wall (reached)");
    }

    #[test]
    fn safety_stop_logs_an_incomplete_step() {
        let robot = SimRobot::new();
        let judge = judge(&robot);
        judge.create_plan(&session(), "explore").unwrap();
        let outcome = NavigationOutcome::new(NavigationStatus::StoppedSafety, 4.0, 1);
        let plan = judge.record_outcome(&session(), "approach", &outcome).unwrap().unwrap();
        assert_eq!(plan.current_step, 0);
        assert_eq!(plan.history.len(), 1);
        assert!(!plan.history[0].completed);
    }

    #[test]
    fn hardware_fault_fails_the_plan() {
        let robot = SimRobot::new();
        let judge = judge(&robot);
        judge.create_plan(&session(), "explore").unwrap();
        let fault = PicarError::ActuatorFault {
            channel: "motors".into(),
            details: "stall".into(),
        };
        let outcome = NavigationOutcome::faulted(fault.clone(), 50.0, 2);
        let plan = judge.record_outcome(&session(), "search", &outcome).unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Failed);
        assert!(judge.record_fault(&session(), &fault).unwrap().is_none());
    }

    #[test]
    fn outcome_without_plan_is_ignored() {
        let robot = SimRobot::new();
        let outcome = NavigationOutcome::new(NavigationStatus::Reached, 29.8, 3);
        assert!(judge(&robot).record_outcome(&session(), "x", &outcome).unwrap().is_none());
    }
}
