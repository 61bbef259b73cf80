//! [`ScriptedLanguageService`] – an offline [`LanguageService`] that replays
//! canned answers.
//!
//! Used by the simulator shell when no model server is configured and by
//! tests.  Anything not scripted fails with `ServiceUnavailable`, which
//! makes the router fall back to its local patterns.
//!
//! # Example
//!
//! ```rust
//! use picarx_runtime::language::LanguageService;
//! use picarx_runtime::scripted::ScriptedLanguageService;
//!
//! let service = ScriptedLanguageService::new()
//!     .with_steps(["Take initial photo", "Drive to the door"]);
//! assert_eq!(service.decompose("explore").unwrap().len(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use picarx_hal::Snapshot;
use picarx_types::{Decision, PicarError, RobotState, VisualMatch};

use crate::language::LanguageService;

#[derive(Default)]
struct Script {
    decisions: VecDeque<Result<Decision, PicarError>>,
    steps: Option<Vec<String>>,
    sightings: VecDeque<Result<VisualMatch, PicarError>>,
    vision_calls: u32,
}

#[derive(Default)]
pub struct ScriptedLanguageService {
    script: Mutex<Script>,
}

impl ScriptedLanguageService {
    /// A service that answers nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one `classify` answer.  Answers are consumed in order.
    pub fn with_decision(self, decision: Result<Decision, PicarError>) -> Self {
        self.lock().decisions.push_back(decision);
        self
    }

    /// Answer every `decompose` call with these steps.
    pub fn with_steps<I, S>(self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().steps = Some(steps.into_iter().map(Into::into).collect());
        self
    }

    /// Serve these `match_visual` answers in order; the last one repeats.
    pub fn with_sightings(self, sightings: impl IntoIterator<Item = Result<VisualMatch, PicarError>>) -> Self {
        self.lock().sightings = sightings.into_iter().collect();
        self
    }

    pub fn vision_calls(&self) -> u32 {
        self.lock().vision_calls
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn offline(what: &str) -> PicarError {
    PicarError::ServiceUnavailable(format!("no scripted {what}"))
}

impl LanguageService for ScriptedLanguageService {
    fn classify(&self, text: &str, _state: &RobotState) -> Result<Decision, PicarError> {
        let mut decision = self
            .lock()
            .decisions
            .pop_front()
            .unwrap_or_else(|| Err(offline("classification")))?;
        decision.command = text.to_string();
        Ok(decision)
    }

    fn decompose(&self, _task: &str) -> Result<Vec<String>, PicarError> {
        self.lock().steps.clone().ok_or_else(|| offline("decomposition"))
    }

    fn match_visual(&self, _image: &Snapshot, _description: &str) -> Result<VisualMatch, PicarError> {
        let mut script = self.lock();
        script.vision_calls += 1;
        let next = if script.sightings.len() > 1 {
            script.sightings.pop_front()
        } else {
            script.sightings.front().cloned()
        };
        next.unwrap_or_else(|| Err(offline("sighting")))
    }
}
