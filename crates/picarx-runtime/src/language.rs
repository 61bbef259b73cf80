//! The language-understanding seam: classification, task decomposition and
//! visual matching.
//!
//! [`LanguageService`] is the only way the core talks to a language model.
//! Every failure surfaces as [`PicarError::ServiceUnavailable`]; the command
//! router is the only caller with a local fallback (pattern matching for
//! `classify`).  Decomposition and visual matching fail the call.

use picarx_hal::Snapshot;
use picarx_types::{
    Decision, DecisionParams, DecisionSource, DecisionTag, ImmediateAction, PicarError, RobotState,
    VisualMatch,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::llm_driver::{ChatMessage, LlmDriver};

pub trait LanguageService: Send + Sync {
    /// Map a normalized request to one execution strategy.
    ///
    /// # Errors
    ///
    /// [`PicarError::ServiceUnavailable`] when the model cannot be reached or
    /// answers outside the schema; [`PicarError::NeedsClarification`] when
    /// the model reports the request as ambiguous.
    fn classify(&self, text: &str, state: &RobotState) -> Result<Decision, PicarError>;

    /// Ordered step descriptions for a multi-step task.  May be empty.
    fn decompose(&self, task: &str) -> Result<Vec<String>, PicarError>;

    /// Whether `description` is visible in `image`, and where.
    fn match_visual(&self, image: &Snapshot, description: &str) -> Result<VisualMatch, PicarError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Model reply shapes
// ─────────────────────────────────────────────────────────────────────────────

/// What the model is asked to return for `classify`.
#[derive(Debug, Deserialize, JsonSchema)]
struct Classification {
    tag: DecisionTag,
    #[serde(default)]
    params: DecisionParams,
    /// Required when `tag` is `immediate`.
    #[serde(default)]
    action: Option<ImmediateAction>,
    /// Set instead of guessing when the request maps to no single strategy.
    #[serde(default)]
    clarification: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Decomposition {
    steps: Vec<String>,
}

const CLASSIFY_PROMPT: &str = "\
You route natural-language commands for a Picar-X robot car. Pick exactly one tag:
- immediate: one bounded action (drive forward/backward, turn left/right, set steering/pan/tilt angle, stop, reset, read distance, read grayscale, take a photo, report state). Fill `action`.
- needs_plan: a multi-step task (exploring, searching a room, sequences joined by 'then').
- distance_seek: drive until a given distance in cm from something ahead. Fill `params.target_cm`.
- obstacle_avoid: reach a described target while avoiding obstacles. Fill `params.target`.
A directive verb together with a distance in cm is always distance_seek.
Turns are relative: 'turn left 20 degrees' is {action: turn, side: left, degrees: 20}.
Speeds are 0-100. Steering is limited to +/-30 degrees, camera pan and tilt to +/-35.
Copy numbers exactly as stated; never adjust them into range.
If the command is ambiguous, set `clarification` to a short question instead of guessing.";

const DECOMPOSE_PROMPT: &str = "\
You plan tasks for a Picar-X robot car with an ultrasonic sensor, three grayscale ground sensors, \
a pan/tilt camera and front-wheel steering. Break the task into short, ordered, concrete steps \
that the robot can execute one at a time. Return between 1 and 8 steps.";

const VISION_PROMPT: &str = "\
You are the eyes of a small robot car. Decide whether the described target is visible in the image. \
If it is, give its horizontal bearing in degrees from the image centre, negative to the left.";

// ─────────────────────────────────────────────────────────────────────────────
// LlmLanguageService
// ─────────────────────────────────────────────────────────────────────────────

/// [`LanguageService`] backed by an OpenAI-compatible model server.
pub struct LlmLanguageService {
    driver: LlmDriver,
}

impl LlmLanguageService {
    pub fn new(driver: LlmDriver) -> Self {
        Self { driver }
    }
}

impl LanguageService for LlmLanguageService {
    #[instrument(skip(self, state), fields(model = %self.driver.model()))]
    fn classify(&self, text: &str, state: &RobotState) -> Result<Decision, PicarError> {
        let context = format!(
            "Current state: steering {:.1} deg, pan {:.1} deg, tilt {:.1} deg, motor speed {}, distance ahead {:.1} cm.\nCommand: {text}",
            state.steering_deg, state.pan_deg, state.tilt_deg, state.motor_speed, state.distance_cm
        );
        let reply: Classification = self
            .driver
            .complete_structured(&[ChatMessage::system(CLASSIFY_PROMPT), ChatMessage::user(context)])?;
        if let Some(question) = reply.clarification.filter(|q| !q.trim().is_empty()) {
            return Err(PicarError::NeedsClarification(question));
        }
        Ok(Decision {
            tag: reply.tag,
            command: text.to_string(),
            params: reply.params,
            action: reply.action,
            source: DecisionSource::LanguageModel,
        })
    }

    #[instrument(skip(self), fields(model = %self.driver.model()))]
    fn decompose(&self, task: &str) -> Result<Vec<String>, PicarError> {
        let reply: Decomposition = self
            .driver
            .complete_structured(&[ChatMessage::system(DECOMPOSE_PROMPT), ChatMessage::user(task)])?;
        if reply.steps.is_empty() {
            warn!(task, "model returned no steps");
        }
        Ok(reply.steps)
    }

    #[instrument(skip(self, image), fields(model = %self.driver.model(), image = %image.id))]
    fn match_visual(&self, image: &Snapshot, description: &str) -> Result<VisualMatch, PicarError> {
        let question = format!("Target: {description}");
        let reply: VisualMatch = self.driver.complete_structured(&[
            ChatMessage::system(VISION_PROMPT),
            ChatMessage::user_with_image(question, image.encoding.mime_type(), &image.data),
        ])?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_reply_parses_with_clarification() {
        let reply: Classification = serde_json::from_str(
            r#"{"tag": "needs_plan", "clarification": "Which room should I explore?"}"#,
        )
        .unwrap();
        assert_eq!(reply.tag, DecisionTag::NeedsPlan);
        assert_eq!(reply.clarification.as_deref(), Some("Which room should I explore?"));
        assert!(reply.action.is_none());
    }

    #[test]
    fn classification_schema_lists_every_tag() {
        let schema = serde_json::to_string(&schemars::schema_for!(Classification)).unwrap();
        for tag in ["immediate", "needs_plan", "distance_seek", "obstacle_avoid"] {
            assert!(schema.contains(tag), "schema is missing {tag}");
        }
    }

    #[test]
    fn unreachable_server_is_service_unavailable() {
        // Port 9 (discard) is never an HTTP server.
        let service = LlmLanguageService::new(LlmDriver::new("http://127.0.0.1:9", "none"));
        let err = service.decompose("explore").unwrap_err();
        assert!(matches!(err, PicarError::ServiceUnavailable(_)));
    }
}
