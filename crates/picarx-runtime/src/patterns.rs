//! Local pattern-matching parser used when the language service is down.
//!
//! [`parse`] is a pure function of the normalized command text.  It either
//! recognizes a phrasing and extracts its parameters, or reports "no match"
//! with `Ok(None)`.  It never fills in a value the request did not state,
//! with one exception: an obstacle-avoidance target may be missing and is
//! then left for the router to query.
//!
//! Recognized phrasings are tried in priority order:
//!
//! 1. sequences (`then`, `after that`, or a comma list of actions) → needs
//!    plan, so no step of a sequence is dropped;
//! 2. directive verb + `NN cm` → distance seek;
//! 3. avoidance phrasing → obstacle avoid;
//! 4. stop / reset / turn / servo angle / drive → immediate action;
//! 5. sensor and camera queries → immediate read;
//! 6. multi-step cues (`explore`, `patrol`, `find`, ...) → needs plan.

use std::sync::LazyLock;

use picarx_types::{
    Decision, DecisionParams, DecisionSource, DecisionTag, Direction, ImmediateAction, PicarError,
    ServoChannel, TurnSide,
};
use regex::{Captures, Regex};

// ─────────────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────────────

static DIRECTIVE_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(navigate|drive|go|move|approach|head|get)\b").unwrap()
});

static DISTANCE_CM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d+(?:\.\d+)?)\s*(?:cm|centimet(?:er|re)s?)\b").unwrap()
});

static AVOIDANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bavoid(?:ing|ance)?\b|\baround (?:the )?obstacles?\b|\b(?:navigate|drive|go|move)\b.*\bobstacles?\b").unwrap()
});

static TARGET_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:to|toward|towards|near|from|find|reach)\s+(?:the|a|an)\s+([a-z][a-z ]*?)(?:\s+(?:while|until|at|and|avoiding|without)\b|[,.!?]|$)").unwrap()
});

static STOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:please\s+)?(?:stop|halt|brake|freeze)\b").unwrap());

static RESET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:please\s+)?(?:reset|(?:re)?cent(?:er|re)\s+(?:all\s+)?(?:the\s+)?(?:servos|wheels|camera))\b").unwrap()
});

static TURN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:turn|steer)\s+(left|right)\s+(?:by\s+)?(\d+(?:\.\d+)?)\s*(?:deg(?:ree)?s?|°)").unwrap()
});

static SET_ANGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:set\s+)?(?:the\s+)?(?:camera\s+)?(pan|tilt|steering|steer)(?:\s+(?:servo|angle))?\s+(?:to\s+)?(-?\d+(?:\.\d+)?)\s*(?:deg(?:ree)?s?|°)?").unwrap()
});

static DRIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:drive|go|move|roll)\s+(forwards?|ahead|straight|backwards?|back|in reverse)\b").unwrap()
});

static REVERSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:please\s+)?(?:reverse|back up)\b").unwrap());

static SPEED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:at\s+)?speed\s*(?:of\s+)?(-?\d+)|\bat\s+(-?\d+)\s*(?:%|percent)").unwrap()
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfor\s+(\d+(?:\.\d+)?)\s*(?:s|secs?|seconds?)\b").unwrap()
});

static READ_DISTANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:ultrasonic|how far|distance reading|read (?:the )?distance|measure (?:the )?distance)\b").unwrap()
});

static READ_GRAYSCALE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:gr[ae]yscale|line sensors?|ground sensors?|cliff)\b").unwrap()
});

static SNAPSHOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:take|capture|snap)\s+(?:a\s+|an\s+)?(?:photo|picture|image|snapshot)\b").unwrap()
});

static REPORT_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:status|state|servo angles|where are you)\b").unwrap()
});

static SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:then|after that|afterwards|followed by)\b").unwrap()
});

static PLAN_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:explore|patrol|search|scan the room|look around|map out|find)\b").unwrap()
});

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Target distance of a "directive verb + NN cm" request, if the request is
/// one.
pub fn distance_directive(command: &str) -> Option<f32> {
    if !DIRECTIVE_VERB.is_match(command) {
        return None;
    }
    DISTANCE_CM
        .captures(command)
        .and_then(|c| c[1].parse::<f32>().ok())
}

/// The object phrase after "to the", "near the", "find the", ...
pub fn target_object(command: &str) -> Option<String> {
    TARGET_OBJECT
        .captures(command)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Parse a normalized (lowercase) command.
///
/// # Errors
///
/// [`PicarError::InvalidParameter`] when a recognized phrasing carries a
/// number that cannot be represented (e.g. speed 300).
pub fn parse(command: &str) -> Result<Option<Decision>, PicarError> {
    let speed = extract_speed(command)?;
    let duration_s = DURATION.captures(command).and_then(|c| c[1].parse::<f32>().ok());

    if is_sequence(command)? {
        return Ok(Some(decision(
            DecisionTag::NeedsPlan,
            command,
            DecisionParams::default(),
            None,
        )));
    }

    if let Some(target_cm) = distance_directive(command) {
        let params = DecisionParams {
            speed,
            target_cm: Some(target_cm),
            target: target_object(command),
            ..Default::default()
        };
        return Ok(Some(decision(DecisionTag::DistanceSeek, command, params, None)));
    }

    if AVOIDANCE.is_match(command) {
        let params = DecisionParams {
            speed,
            target: target_object(command),
            ..Default::default()
        };
        return Ok(Some(decision(DecisionTag::ObstacleAvoid, command, params, None)));
    }

    if let Some(action) = immediate_action(command, speed, duration_s)? {
        let params = DecisionParams {
            speed,
            duration_s,
            ..Default::default()
        };
        return Ok(Some(decision(DecisionTag::Immediate, command, params, Some(action))));
    }

    if PLAN_CUE.is_match(command) {
        return Ok(Some(decision(
            DecisionTag::NeedsPlan,
            command,
            DecisionParams::default(),
            None,
        )));
    }

    Ok(None)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn decision(
    tag: DecisionTag,
    command: &str,
    params: DecisionParams,
    action: Option<ImmediateAction>,
) -> Decision {
    Decision {
        tag,
        command: command.to_string(),
        params,
        action,
        source: DecisionSource::PatternFallback,
    }
}

fn extract_speed(command: &str) -> Result<Option<u8>, PicarError> {
    let Some(caps) = SPEED.captures(command) else {
        return Ok(None);
    };
    let raw = first_group(&caps, &[1, 2]).unwrap_or_default();
    match raw.parse::<i64>() {
        Ok(n) if (0..=i64::from(u8::MAX)).contains(&n) => Ok(Some(n as u8)),
        _ => Err(PicarError::InvalidParameter(format!(
            "speed {raw} outside 0-100"
        ))),
    }
}

/// Two or more actions in one request: an ordering word, or at least two
/// comma-separated clauses that each name an action.
fn is_sequence(command: &str) -> Result<bool, PicarError> {
    if SEQUENCE.is_match(command) {
        return Ok(true);
    }
    let mut actions = 0;
    for clause in command.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if distance_directive(clause).is_some() || immediate_action(clause, None, None)?.is_some() {
            actions += 1;
        }
    }
    Ok(actions >= 2)
}

fn first_group<'t>(caps: &Captures<'t>, groups: &[usize]) -> Option<&'t str> {
    groups
        .iter()
        .find_map(|&g| caps.get(g))
        .map(|m| m.as_str())
}

fn immediate_action(
    command: &str,
    speed: Option<u8>,
    duration_s: Option<f32>,
) -> Result<Option<ImmediateAction>, PicarError> {
    if STOP.is_match(command) {
        return Ok(Some(ImmediateAction::Stop));
    }
    if RESET.is_match(command) {
        return Ok(Some(ImmediateAction::Reset));
    }
    if let Some(caps) = TURN.captures(command) {
        let side = if &caps[1] == "left" {
            TurnSide::Left
        } else {
            TurnSide::Right
        };
        let degrees = parse_number(&caps[2], "turn angle")?;
        return Ok(Some(ImmediateAction::Turn {
            side,
            degrees,
            speed,
            duration_s,
        }));
    }
    if let Some(caps) = SET_ANGLE.captures(command) {
        let channel = match &caps[1] {
            "pan" => ServoChannel::Pan,
            "tilt" => ServoChannel::Tilt,
            _ => ServoChannel::Steering,
        };
        let angle_deg = parse_number(&caps[2], "servo angle")?;
        return Ok(Some(ImmediateAction::SetAngle { channel, angle_deg }));
    }
    let direction = DRIVE
        .captures(command)
        .map(|caps| match &caps[1] {
            "forward" | "forwards" | "ahead" | "straight" => Direction::Forward,
            _ => Direction::Backward,
        })
        .or_else(|| REVERSE.is_match(command).then_some(Direction::Backward));
    if let Some(direction) = direction {
        return Ok(Some(ImmediateAction::Drive {
            direction,
            speed,
            duration_s,
        }));
    }
    if SNAPSHOT.is_match(command) {
        return Ok(Some(ImmediateAction::CaptureSnapshot));
    }
    if READ_DISTANCE.is_match(command) {
        return Ok(Some(ImmediateAction::ReadDistance));
    }
    if READ_GRAYSCALE.is_match(command) {
        return Ok(Some(ImmediateAction::ReadGrayscale));
    }
    if REPORT_STATE.is_match(command) {
        return Ok(Some(ImmediateAction::ReportState));
    }
    Ok(None)
}

fn parse_number(raw: &str, what: &str) -> Result<f32, PicarError> {
    raw.parse::<f32>()
        .map_err(|_| PicarError::InvalidParameter(format!("{what} '{raw}' is not a number")))
}
