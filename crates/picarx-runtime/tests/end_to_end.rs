//! Requests driven through the full stack: router, dispatch, navigation,
//! plan store with SQLite persistence, simulated robot.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use picarx_hal::sim::SimRobot;
use picarx_memory::{PlanStore, SqliteSessionStore};
use picarx_runtime::{
    ActionReport, NavigationConfig, Orchestrator, Response, ScriptedLanguageService,
};
use picarx_types::{
    Decision, DecisionParams, DecisionSource, DecisionTag, NavigationStatus, PicarError, PlanStatus,
    SessionId, VisualMatch,
};

// ---- helpers ----------------------------------------------------------------

fn orchestrator_with_store(
    robot: &SimRobot,
    language: ScriptedLanguageService,
    store: Arc<PlanStore>,
    config: NavigationConfig,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(language),
        Arc::new(robot.sensors()),
        Box::new(robot.actuators()),
        store,
        SessionId::new("living-room"),
        config,
    )
}

fn orchestrator(robot: &SimRobot, language: ScriptedLanguageService) -> Orchestrator {
    orchestrator_with_store(
        robot,
        language,
        Arc::new(PlanStore::in_memory()),
        NavigationConfig::instant(),
    )
}

fn sqlite_store(path: &std::path::Path) -> Arc<PlanStore> {
    let backend = SqliteSessionStore::open(path.to_str().unwrap()).unwrap();
    Arc::new(PlanStore::new(Box::new(backend)))
}

// ---- scenarios --------------------------------------------------------------

#[test]
fn explore_plan_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("sessions.db");
    let steps = [
        "Take initial photo",
        "Drive forward while scanning",
        "Turn towards the opening",
        "Drive through the exit",
    ];

    {
        let robot = SimRobot::new();
        let orch = orchestrator_with_store(
            &robot,
            ScriptedLanguageService::new().with_steps(steps),
            sqlite_store(&db),
            NavigationConfig::instant(),
        );
        let Response::PlanCreated(plan) = orch.handle("Explore the room and find the exit").unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.current_step, 0);
        assert!(plan.total_steps >= 1);

        let plan = orch.advance("Take initial photo").unwrap();
        assert_eq!(plan.current_step, 1);
        assert_eq!(plan.status, PlanStatus::InProgress);
        assert_eq!(plan.history.len(), 1);
        assert!(plan.history[0].completed);
    }

    let robot = SimRobot::new();
    let orch = orchestrator_with_store(
        &robot,
        ScriptedLanguageService::new(),
        sqlite_store(&db),
        NavigationConfig::instant(),
    );
    let plan = orch.status().unwrap().plan.expect("plan reloaded from disk");
    assert_eq!(plan.current_step, 1);
    assert_eq!(plan.history[0].description, "Take initial photo");
    assert_eq!(
        orch.guidance().unwrap().next_step.as_deref(),
        Some("Drive forward while scanning")
    );
}

#[test]
fn language_model_decision_drives_the_robot() {
    let robot = SimRobot::new();
    let decision = Decision {
        tag: DecisionTag::Immediate,
        command: String::new(),
        params: DecisionParams {
            speed: Some(30),
            ..Default::default()
        },
        action: Some(picarx_types::ImmediateAction::Drive {
            direction: picarx_types::Direction::Forward,
            speed: Some(30),
            duration_s: Some(0.5),
        }),
        source: DecisionSource::LanguageModel,
    };
    let orch = orchestrator(&robot, ScriptedLanguageService::new().with_decision(Ok(decision)));
    let response = orch.handle("Drive forward at speed 30").unwrap();
    assert!(matches!(
        response,
        Response::Action(ActionReport::Drove { speed: 30, seconds, .. }) if seconds == 0.5
    ));
    assert_eq!(robot.motor_speed(), 0);
}

#[test]
fn distance_request_reaches_scripted_target() {
    let robot = SimRobot::new().with_distances([120.0, 30.2, 29.8]);
    let orch = orchestrator(&robot, ScriptedLanguageService::new());
    let Response::Navigation(outcome) = orch.handle("Navigate until 30 cm from the wall").unwrap() else {
        panic!("expected a navigation outcome");
    };
    assert_eq!(outcome.status, NavigationStatus::Reached);
    assert_eq!(outcome.final_reading, 29.8);
    assert_eq!(outcome.attempts_used, 3);
    assert_eq!(robot.motor_speed(), 0);
}

#[test]
fn distance_at_safety_limit_is_rejected_before_moving() {
    let robot = SimRobot::new().with_distances([80.0]);
    let orch = orchestrator(&robot, ScriptedLanguageService::new());
    let err = orch.handle("drive until 5 cm from the wall").unwrap_err();
    assert!(matches!(err, PicarError::InvalidParameter(_)));
    assert!(robot.commands().is_empty());
}

#[test]
fn stop_from_another_thread_cancels_target_search() {
    // Realtime motors make each burst take 50 ms, so the search is still
    // running when the stop arrives.
    let robot = SimRobot::new().with_world_distance(350.0).realtime(true);
    let config = NavigationConfig {
        drive_burst_ms: 50,
        settle_ms: 10,
        vision_period: 0,
        ..NavigationConfig::default()
    };
    let orch = Arc::new(orchestrator_with_store(
        &robot,
        ScriptedLanguageService::new().with_sightings([Ok(VisualMatch {
            present: false,
            bearing_deg: None,
        })]),
        Arc::new(PlanStore::in_memory()),
        config,
    ));

    let worker = {
        let orch = Arc::clone(&orch);
        thread::spawn(move || orch.handle("find the red ball while avoiding obstacles"))
    };
    thread::sleep(Duration::from_millis(200));
    let stop = orch.request_stop().unwrap();
    assert!(matches!(stop, ActionReport::CancelRequested));

    let Response::Navigation(outcome) = worker.join().unwrap().unwrap() else {
        panic!("expected a navigation outcome");
    };
    assert_eq!(outcome.status, NavigationStatus::Aborted);
    assert!(outcome.fault.is_none());
    assert!(outcome.attempts_used < 50);
    assert_eq!(robot.motor_speed(), 0);
}

#[test]
fn unknown_request_asks_for_clarification() {
    let robot = SimRobot::new();
    let orch = orchestrator(&robot, ScriptedLanguageService::new());
    let err = orch.handle("sing me a song").unwrap_err();
    assert!(matches!(err, PicarError::NeedsClarification(_)));
    assert!(robot.commands().is_empty());
}
