//! [`CommandRouter`] – turns one free-text request into one [`Decision`].
//!
//! The router's own work is small and deterministic:
//!
//! 1. normalize the text (trim, collapse whitespace, lowercase, drop
//!    trailing punctuation);
//! 2. ask the [`LanguageService`] to classify it, falling back to
//!    [`patterns::parse`] only when the service is unavailable;
//! 3. apply the tie-break: a directive verb plus an `NN cm` token turns an
//!    immediate action into a distance seek.  Plans and obstacle searches
//!    keep their tag;
//! 4. resolve relative turns against the current steering angle;
//! 5. reject out-of-range values with `InvalidParameter` (never clamp) and
//!    unresolvable requests with `NeedsClarification` (never guess).

use std::sync::Arc;

use picarx_kernel::ParameterVerifier;
use picarx_types::{Decision, DecisionTag, ImmediateAction, PicarError, RobotState, TurnSide};
use tracing::{debug, info, instrument, warn};

use crate::language::LanguageService;
use crate::patterns;

pub struct CommandRouter {
    language: Arc<dyn LanguageService>,
    verifier: ParameterVerifier,
}

impl CommandRouter {
    /// Router with the default speed, servo, distance and duration rules.
    pub fn new(language: Arc<dyn LanguageService>) -> Self {
        Self::with_verifier(language, ParameterVerifier::with_default_rules())
    }

    pub fn with_verifier(language: Arc<dyn LanguageService>, verifier: ParameterVerifier) -> Self {
        Self { language, verifier }
    }

    /// Classify `request` in the context of `state`.
    ///
    /// # Errors
    ///
    /// - [`PicarError::InvalidParameter`] for empty requests and
    ///   out-of-range values;
    /// - [`PicarError::NeedsClarification`] when neither the service nor the
    ///   local patterns can resolve the request;
    /// - any non-`ServiceUnavailable` error from the language service.
    #[instrument(skip(self, state))]
    pub fn classify(&self, request: &str, state: &RobotState) -> Result<Decision, PicarError> {
        let command = normalize(request);
        if command.is_empty() {
            return Err(PicarError::InvalidParameter("empty request".into()));
        }

        let mut decision = match self.language.classify(&command, state) {
            Ok(decision) => decision,
            Err(PicarError::ServiceUnavailable(reason)) => {
                warn!(%reason, "language service unavailable; using pattern fallback");
                patterns::parse(&command)?.ok_or_else(|| {
                    PicarError::NeedsClarification(format!(
                        "could not understand '{command}' without the language service"
                    ))
                })?
            }
            Err(e) => return Err(e),
        };
        decision.command = command;

        apply_tie_break(&mut decision);
        complete_params(&mut decision)?;
        resolve_turn(&mut decision, state);
        self.verifier.verify(&decision)?;

        info!(tag = ?decision.tag, source = ?decision.source, "request classified");
        Ok(decision)
    }
}

/// Lowercase, collapse whitespace and strip trailing sentence punctuation.
pub fn normalize(request: &str) -> String {
    let collapsed = request.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', '!', '?'])
        .trim_end()
        .to_lowercase()
}

fn apply_tie_break(decision: &mut Decision) {
    if decision.tag != DecisionTag::Immediate {
        return;
    }
    if let Some(target_cm) = patterns::distance_directive(&decision.command) {
        debug!(from = ?decision.tag, target_cm, "verb + distance token: routing to distance seek");
        decision.tag = DecisionTag::DistanceSeek;
        decision.params.target_cm = Some(target_cm);
        decision.action = None;
    }
}

/// Fill parameters the text states but the classifier left out, and refuse
/// decisions that cannot be executed as tagged.
fn complete_params(decision: &mut Decision) -> Result<(), PicarError> {
    match decision.tag {
        DecisionTag::DistanceSeek => {
            if decision.params.target_cm.is_none() {
                decision.params.target_cm = patterns::distance_directive(&decision.command);
            }
            if decision.params.target_cm.is_none() {
                return Err(PicarError::NeedsClarification(
                    "how far from the obstacle should I stop (in cm)?".into(),
                ));
            }
        }
        DecisionTag::ObstacleAvoid => {
            let has_target = decision
                .params
                .target
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            if !has_target {
                decision.params.target = patterns::target_object(&decision.command);
            }
            if decision.params.target.is_none() {
                return Err(PicarError::NeedsClarification(
                    "what target should I look for?".into(),
                ));
            }
        }
        DecisionTag::Immediate => {
            if decision.action.is_none() {
                return Err(PicarError::NeedsClarification(format!(
                    "'{}' does not name a single action",
                    decision.command
                )));
            }
        }
        DecisionTag::NeedsPlan => {}
    }
    Ok(())
}

/// Resolve a relative turn into an absolute steering angle.  Left is
/// negative.
fn resolve_turn(decision: &mut Decision, state: &RobotState) {
    if let Some(ImmediateAction::Turn { side, degrees, .. }) = &decision.action {
        let delta = match side {
            TurnSide::Left => -degrees.abs(),
            TurnSide::Right => degrees.abs(),
        };
        decision.params.angle_deg = Some(state.steering_deg + delta);
    }
}
