use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A servo the robot can position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServoChannel {
    /// Front-wheel steering servo.
    Steering,
    /// Camera pan (left/right) servo.
    Pan,
    /// Camera tilt (up/down) servo.
    Tilt,
}

impl std::fmt::Display for ServoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServoChannel::Steering => write!(f, "steering"),
            ServoChannel::Pan => write!(f, "pan"),
            ServoChannel::Tilt => write!(f, "tilt"),
        }
    }
}

/// Drive direction of the rear motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// Side of a relative steering request ("turn left 20 degrees").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TurnSide {
    Left,
    Right,
}

/// Snapshot of servo angles and last-known sensor readings.
///
/// Produced fresh by the sensor gateway on every query; never cached across
/// calls that mutate actuators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub steering_deg: f32,
    pub pan_deg: f32,
    pub tilt_deg: f32,
    /// Signed motor speed: positive forward, negative backward, 0 stopped.
    pub motor_speed: i16,
    pub distance_cm: f32,
    pub grayscale: [f32; 3],
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            steering_deg: 0.0,
            pan_deg: 0.0,
            tilt_deg: 0.0,
            motor_speed: 0,
            distance_cm: 0.0,
            grayscale: [0.0; 3],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision
// ─────────────────────────────────────────────────────────────────────────────

/// Execution strategy a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTag {
    /// A single bounded actuator or sensor call.
    Immediate,
    /// A multi-step task that needs a plan.
    NeedsPlan,
    /// Closed-loop distance regulation.
    DistanceSeek,
    /// Closed-loop search for a described target while avoiding obstacles.
    ObstacleAvoid,
}

/// Numeric and textual parameters extracted from a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionParams {
    /// Motor speed, 0–100.
    #[serde(default)]
    pub speed: Option<u8>,
    /// Absolute servo angle in degrees after resolving relative phrasing.
    #[serde(default)]
    pub angle_deg: Option<f32>,
    /// Drive duration in seconds.
    #[serde(default)]
    pub duration_s: Option<f32>,
    /// Goal distance in centimetres for distance seeking.
    #[serde(default)]
    pub target_cm: Option<f32>,
    /// Free-text description of the target ("the red ball").
    #[serde(default)]
    pub target: Option<String>,
}

/// A single bounded action for the `Immediate` path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ImmediateAction {
    Drive {
        direction: Direction,
        #[serde(default)]
        speed: Option<u8>,
        #[serde(default)]
        duration_s: Option<f32>,
    },
    /// Steer relative to the current steering angle, optionally driving.
    Turn {
        side: TurnSide,
        degrees: f32,
        #[serde(default)]
        speed: Option<u8>,
        #[serde(default)]
        duration_s: Option<f32>,
    },
    SetAngle {
        channel: ServoChannel,
        angle_deg: f32,
    },
    Stop,
    /// All servos to 0 and motors stopped.
    Reset,
    ReadDistance,
    ReadGrayscale,
    CaptureSnapshot,
    ReportState,
}

/// Where a [`Decision`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    LanguageModel,
    PatternFallback,
}

/// The classification of one request.  Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    pub tag: DecisionTag,
    /// Normalized request text.
    pub command: String,
    #[serde(default)]
    pub params: DecisionParams,
    /// Present for [`DecisionTag::Immediate`].
    #[serde(default)]
    pub action: Option<ImmediateAction>,
    #[serde(default = "default_source")]
    pub source: DecisionSource,
}

fn default_source() -> DecisionSource {
    DecisionSource::LanguageModel
}

/// Result of a visual match query against a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisualMatch {
    pub present: bool,
    /// Bearing of the target relative to the camera axis in degrees,
    /// negative to the left.
    #[serde(default)]
    pub bearing_deg: Option<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Plan
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of a conversation session; one active [`Plan`] per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InProgress,
    Completed,
    /// Terminal: no further step advances are accepted.
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }
}

/// One append-only entry of a plan's progress log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u32,
    pub description: String,
    pub completed: bool,
    pub timestamp: DateTime<Utc>,
}

/// A decomposed multi-step task and its progress history.
///
/// Invariants upheld by every mutator:
/// - `current_step` never decreases and never exceeds `total_steps`;
/// - `status == Completed` implies `current_step == total_steps`;
/// - `history` grows by exactly one entry per [`Plan::advance`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub task: String,
    pub steps: Vec<String>,
    pub current_step: u32,
    pub total_steps: u32,
    pub status: PlanStatus,
    pub history: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
    /// Reason recorded when the plan entered [`PlanStatus::Failed`].
    #[serde(default)]
    pub failure: Option<String>,
}

impl Plan {
    /// Build a pending plan from an ordered list of step descriptions.
    ///
    /// Blank descriptions are dropped.  Fails with
    /// [`PicarError::PlanCreationFailed`] when nothing remains.
    pub fn new(task: impl Into<String>, steps: Vec<String>) -> Result<Self, PicarError> {
        let task = task.into();
        let steps: Vec<String> = steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if steps.is_empty() {
            return Err(PicarError::PlanCreationFailed(format!(
                "decomposition of '{task}' produced no steps"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            task,
            total_steps: steps.len() as u32,
            steps,
            current_step: 0,
            status: PlanStatus::Pending,
            history: Vec::new(),
            created_at: Utc::now(),
            failure: None,
        })
    }

    /// Append a [`StepRecord`] and, when `completed`, move to the next step.
    pub fn advance(&mut self, description: &str, completed: bool) -> Result<&StepRecord, PicarError> {
        if self.status == PlanStatus::Failed {
            return Err(PicarError::PlanRejected(format!(
                "plan '{}' has failed; no further steps are accepted",
                self.task
            )));
        }
        let step = (self.current_step + 1).min(self.total_steps);
        self.history.push(StepRecord {
            step,
            description: description.to_string(),
            completed,
            timestamp: Utc::now(),
        });
        if completed {
            self.current_step = (self.current_step + 1).min(self.total_steps);
        }
        self.status = if self.current_step == self.total_steps {
            PlanStatus::Completed
        } else {
            PlanStatus::InProgress
        };
        Ok(&self.history[self.history.len() - 1])
    }

    /// Move the plan to the terminal [`PlanStatus::Failed`] state.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PicarError> {
        match self.status {
            PlanStatus::Completed => Err(PicarError::PlanRejected(format!(
                "plan '{}' is already completed",
                self.task
            ))),
            PlanStatus::Failed => Ok(()),
            PlanStatus::Pending | PlanStatus::InProgress => {
                self.status = PlanStatus::Failed;
                self.failure = Some(reason.into());
                Ok(())
            }
        }
    }

    /// Description of the step that should run next, if any.
    pub fn next_step(&self) -> Option<&str> {
        match self.status {
            PlanStatus::Pending | PlanStatus::InProgress => self
                .steps
                .get(self.current_step as usize)
                .map(String::as_str),
            PlanStatus::Completed | PlanStatus::Failed => None,
        }
    }

    /// Whether a new plan may replace this one in the store.
    pub fn is_replaceable(&self) -> bool {
        matches!(self.status, PlanStatus::Pending | PlanStatus::Failed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal status of a navigation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStatus {
    Reached,
    StoppedSafety,
    ExhaustedAttempts,
    Aborted,
}

impl std::fmt::Display for NavigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NavigationStatus::Reached => "reached",
            NavigationStatus::StoppedSafety => "stopped_safety",
            NavigationStatus::ExhaustedAttempts => "exhausted_attempts",
            NavigationStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Produced once per navigation invocation and returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationOutcome {
    pub status: NavigationStatus,
    /// Last ultrasonic reading in centimetres.
    pub final_reading: f32,
    pub attempts_used: u32,
    /// The error that ended an `Aborted` run, when it was not cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<PicarError>,
}

impl NavigationOutcome {
    pub fn new(status: NavigationStatus, final_reading: f32, attempts_used: u32) -> Self {
        Self {
            status,
            final_reading,
            attempts_used,
            fault: None,
        }
    }

    /// An `Aborted` outcome caused by `fault`.
    pub fn faulted(fault: PicarError, final_reading: f32, attempts_used: u32) -> Self {
        Self {
            status: NavigationStatus::Aborted,
            final_reading,
            attempts_used,
            fault: Some(fault),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type spanning caller mistakes, hardware faults, external
/// service failures and plan-store rejections.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PicarError {
    /// Rejected before any actuation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Sensor unavailable ({sensor}): {details}")]
    SensorUnavailable { sensor: String, details: String },

    #[error("Actuator fault on {channel}: {details}")]
    ActuatorFault { channel: String, details: String },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Plan creation failed: {0}")]
    PlanCreationFailed(String),

    #[error("Request needs clarification: {0}")]
    NeedsClarification(String),

    #[error("Plan rejected: {0}")]
    PlanRejected(String),

    #[error("No active plan for session {0}")]
    NoActivePlan(String),

    #[error("Actuators are held by another navigation")]
    ActuatorBusy,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl PicarError {
    /// Hardware-layer faults: the robot must be stopped before reporting.
    pub fn is_hardware_fault(&self) -> bool {
        matches!(
            self,
            PicarError::SensorUnavailable { .. } | PicarError::ActuatorFault { .. }
        )
    }
}
