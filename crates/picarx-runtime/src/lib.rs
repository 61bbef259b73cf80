//! `picarx-runtime` – understanding requests and carrying them out.
//!
//! # Modules
//!
//! - [`router`] – [`CommandRouter`][router::CommandRouter]: one request in,
//!   one [`Decision`][picarx_types::Decision] out.  Classification goes to
//!   the [`LanguageService`][language::LanguageService]; when that is down
//!   the local [`patterns`] take over.
//! - [`language`] / [`llm_driver`] – the language seam and its
//!   OpenAI-compatible implementation.  Replies are forced into typed JSON
//!   via `response_format` with schemas generated by `schemars`.
//! - [`scripted`] – an offline language service that replays canned answers.
//! - [`judge`] – [`ProgressJudge`][judge::ProgressJudge]: the plan state
//!   machine, status reports and next-step guidance.
//! - [`navigation`] – the distance and obstacle-avoidance control loops.
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: the
//!   dispatch table from decision tag to handler.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].
//!
//! # Actuator ownership
//!
//! Every actuator command goes through the
//! [`ActuatorLock`][picarx_kernel::ActuatorLock].  Navigations hold it for
//! their full run; immediate actions hold it for one command.  A lease stops
//! the motors when it is dropped.

pub mod judge;
pub mod language;
pub mod llm_driver;
pub mod navigation;
pub mod orchestrator;
pub mod patterns;
pub mod router;
pub mod scripted;
pub mod telemetry;

pub use judge::{Guidance, ProgressJudge, StatusReport};
pub use language::{LanguageService, LlmLanguageService};
pub use llm_driver::{ChatMessage, LlmDriver, LlmError, Role};
pub use navigation::{
    AvoidanceStrategy, DistanceNavigator, NavigationConfig, ObstacleNavigator, StrategyCycle,
};
pub use orchestrator::{ActionReport, Orchestrator, Response};
pub use router::CommandRouter;
pub use scripted::ScriptedLanguageService;
pub use telemetry::{TracerProviderGuard, init_tracing};
