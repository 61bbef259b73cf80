//! [`ParameterVerifier`] – legal-range rule engine for routed decisions.
//!
//! Before a [`Decision`] is dispatched, pass it through
//! [`ParameterVerifier::verify`].  Every registered [`Rule`] is evaluated in
//! order; the first violation returns [`PicarError::InvalidParameter`] and
//! nothing is actuated.
//!
//! Verification never clamps.  Clamping into documented ranges is the
//! actuator gateway's job; a request that names an out-of-range value is a
//! caller mistake and is reported as such.
//!
//! Built-in rules:
//! - [`SpeedRangeRule`] – speeds must lie in `0..=100`.
//! - [`ServoLimitRule`] – absolute servo angles must lie inside the channel's
//!   mechanical range.
//! - [`PositiveDistanceRule`] – distance-seek targets must be finite and > 0.
//! - [`DurationRule`] – drive durations must be finite, > 0 and bounded.

use picarx_hal::limits::{MAX_SPEED, ServoLimits};
use picarx_types::{Decision, DecisionTag, ImmediateAction, PicarError, ServoChannel};

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// One legal-range constraint a decision must satisfy.
pub trait Rule: Send + Sync {
    /// Human-readable name used in rejection messages.
    fn name(&self) -> &str;

    fn check(&self, decision: &Decision) -> Result<(), PicarError>;
}

// ────────────────────────────────────────────────────────────────────────────
// ParameterVerifier
// ────────────────────────────────────────────────────────────────────────────

/// # Example
///
/// ```
/// use picarx_kernel::ParameterVerifier;
/// use picarx_types::{Decision, DecisionParams, DecisionSource, DecisionTag};
///
/// let verifier = ParameterVerifier::with_default_rules();
///
/// let seek = |target_cm| Decision {
///     tag: DecisionTag::DistanceSeek,
///     command: "drive until 30cm from the wall".into(),
///     params: DecisionParams { target_cm: Some(target_cm), ..Default::default() },
///     action: None,
///     source: DecisionSource::PatternFallback,
/// };
/// assert!(verifier.verify(&seek(30.0)).is_ok());
/// assert!(verifier.verify(&seek(0.0)).is_err());
/// ```
#[derive(Default)]
pub struct ParameterVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl ParameterVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speed, servo, distance and duration rules with their default bounds.
    pub fn with_default_rules() -> Self {
        let mut verifier = Self::new();
        verifier.add_rule(Box::new(SpeedRangeRule));
        verifier.add_rule(Box::new(ServoLimitRule));
        verifier.add_rule(Box::new(PositiveDistanceRule));
        verifier.add_rule(Box::new(DurationRule::default()));
        verifier
    }

    /// Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Returns the first violation, or `Ok(())` when every rule passes.
    pub fn verify(&self, decision: &Decision) -> Result<(), PicarError> {
        for rule in &self.rules {
            rule.check(decision)?;
        }
        Ok(())
    }
}

fn violation(rule: &str, details: String) -> PicarError {
    PicarError::InvalidParameter(format!("{rule}: {details}"))
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

pub struct SpeedRangeRule;

impl Rule for SpeedRangeRule {
    fn name(&self) -> &str {
        "speed_range"
    }

    fn check(&self, decision: &Decision) -> Result<(), PicarError> {
        let action_speed = match &decision.action {
            Some(ImmediateAction::Drive { speed, .. }) | Some(ImmediateAction::Turn { speed, .. }) => {
                *speed
            }
            _ => None,
        };
        for speed in [decision.params.speed, action_speed].into_iter().flatten() {
            if speed > MAX_SPEED {
                return Err(violation(
                    self.name(),
                    format!("speed {speed} outside 0-{MAX_SPEED}"),
                ));
            }
        }
        Ok(())
    }
}

/// Checks absolute angles.  A relative `Turn` is expected to have been
/// resolved into `params.angle_deg` against the current steering angle.
pub struct ServoLimitRule;

impl ServoLimitRule {
    fn check_angle(&self, channel: ServoChannel, angle_deg: f32) -> Result<(), PicarError> {
        let limits = ServoLimits::for_channel(channel);
        if limits.contains(angle_deg) {
            Ok(())
        } else {
            Err(violation(
                self.name(),
                format!(
                    "{channel} angle {angle_deg} outside [{}, {}]",
                    limits.min_deg, limits.max_deg
                ),
            ))
        }
    }
}

impl Rule for ServoLimitRule {
    fn name(&self) -> &str {
        "servo_limit"
    }

    fn check(&self, decision: &Decision) -> Result<(), PicarError> {
        match &decision.action {
            Some(ImmediateAction::SetAngle { channel, angle_deg }) => {
                self.check_angle(*channel, *angle_deg)
            }
            Some(ImmediateAction::Turn { .. }) => match decision.params.angle_deg {
                Some(angle) => self.check_angle(ServoChannel::Steering, angle),
                None => Err(violation(
                    self.name(),
                    "turn has no resolved steering angle".into(),
                )),
            },
            _ => Ok(()),
        }
    }
}

pub struct PositiveDistanceRule;

impl Rule for PositiveDistanceRule {
    fn name(&self) -> &str {
        "positive_distance"
    }

    fn check(&self, decision: &Decision) -> Result<(), PicarError> {
        let target = decision.params.target_cm;
        if decision.tag == DecisionTag::DistanceSeek && target.is_none() {
            return Err(violation(self.name(), "distance seek without a target".into()));
        }
        match target {
            Some(cm) if !cm.is_finite() || cm <= 0.0 => Err(violation(
                self.name(),
                format!("target distance {cm} cm must be > 0"),
            )),
            _ => Ok(()),
        }
    }
}

/// Bounds open-loop drive durations.
pub struct DurationRule {
    pub max_s: f32,
}

impl Default for DurationRule {
    fn default() -> Self {
        Self { max_s: 10.0 }
    }
}

impl Rule for DurationRule {
    fn name(&self) -> &str {
        "duration"
    }

    fn check(&self, decision: &Decision) -> Result<(), PicarError> {
        let action_duration = match &decision.action {
            Some(ImmediateAction::Drive { duration_s, .. })
            | Some(ImmediateAction::Turn { duration_s, .. }) => *duration_s,
            _ => None,
        };
        for secs in [decision.params.duration_s, action_duration].into_iter().flatten() {
            if !secs.is_finite() || secs <= 0.0 || secs > self.max_s {
                return Err(violation(
                    self.name(),
                    format!("duration {secs} s outside (0, {}]", self.max_s),
                ));
            }
        }
        Ok(())
    }
}
