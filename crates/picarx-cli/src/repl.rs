//! Interactive shell.
//!
//! Free text is handed to the orchestrator on a worker thread so that the
//! prompt stays responsive while the car is navigating.  Slash-commands:
//!
//!   /status          – active plan and live robot state
//!   /plan            – next-step guidance and safety warnings
//!   /advance <text>  – record a manually completed step
//!   /clear           – drop the session's plan
//!   /stop            – stop the motors or cancel the running navigation
//!   /help            – show this list
//!   /quit | /exit    – stop everything and leave

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use colored::Colorize;
use picarx_runtime::{ActionReport, Guidance, Orchestrator, Response, StatusReport};
use picarx_types::{NavigationOutcome, NavigationStatus, PicarError, Plan};

#[derive(Debug, PartialEq)]
enum ShellCommand<'a> {
    Request(&'a str),
    Status,
    Plan,
    Advance(&'a str),
    Clear,
    Stop,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_line(line: &str) -> Option<ShellCommand<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(ShellCommand::Request(line));
    }
    let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    Some(match cmd {
        "/status" => ShellCommand::Status,
        "/plan" => ShellCommand::Plan,
        "/advance" if !rest.is_empty() => ShellCommand::Advance(rest),
        "/clear" => ShellCommand::Clear,
        "/stop" => ShellCommand::Stop,
        "/help" => ShellCommand::Help,
        "/quit" | "/exit" => ShellCommand::Quit,
        _ => ShellCommand::Unknown(line),
    })
}

/// Run the shell until `/quit` or end of input.
pub fn run(orch: Arc<Orchestrator>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut job: Option<JoinHandle<()>> = None;

    loop {
        print!("{} ", "picarx>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        let Some(command) = parse_line(&line) else {
            continue;
        };

        match command {
            ShellCommand::Request(text) => {
                if job.as_ref().is_some_and(|j| !j.is_finished()) {
                    println!(
                        "{} a request is still running; use {} to cancel it",
                        "Busy:".yellow(),
                        "/stop".bold()
                    );
                    continue;
                }
                let orch = Arc::clone(&orch);
                let text = text.to_string();
                job = Some(thread::spawn(move || {
                    let result = orch.handle(&text);
                    println!("\n{}", render_result(result));
                    print!("{} ", "picarx>".bold().cyan());
                    io::stdout().flush().ok();
                }));
            }
            ShellCommand::Status => match orch.status() {
                Ok(report) => println!("{}", render_status(&report)),
                Err(e) => println!("{}", render_error(&e)),
            },
            ShellCommand::Plan => match orch.guidance() {
                Ok(guidance) => print!("{}", render_guidance(&guidance)),
                Err(e) => println!("{}", render_error(&e)),
            },
            ShellCommand::Advance(step) => match orch.advance(step) {
                Ok(plan) => println!("{}", render_plan(&plan)),
                Err(e) => println!("{}", render_error(&e)),
            },
            ShellCommand::Clear => match orch.judge().clear(orch.session()) {
                Ok(()) => println!("{}", "✓ Plan cleared.".green()),
                Err(e) => println!("{}", render_error(&e)),
            },
            ShellCommand::Stop => match orch.request_stop() {
                Ok(report) => println!("{}", render_action(&report)),
                Err(e) => println!("{}", render_error(&e)),
            },
            ShellCommand::Help => print_help(),
            ShellCommand::Quit => break,
            ShellCommand::Unknown(other) => println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "/help".bold()
            ),
        }
    }

    if let Some(job) = job.take() {
        if !job.is_finished() {
            orch.request_stop().ok();
        }
        job.join().ok();
    }
    println!("{}", "Goodbye.".green());
}

fn print_help() {
    println!();
    println!("{}", "Picar-X Commands".bold().underline());
    println!("  {}  – anything else is a request, e.g. \"drive forward at speed 30\"", "<text>".bold().cyan());
    println!("  {}        – active plan and robot state", "/status".bold().cyan());
    println!("  {}          – next step and safety warnings", "/plan".bold().cyan());
    println!("  {} – record a completed step", "/advance <text>".bold().cyan());
    println!("  {}         – drop the current plan", "/clear".bold().cyan());
    println!("  {}          – stop motors / cancel navigation (also Ctrl-C)", "/stop".bold().cyan());
    println!("  {}   – exit the shell", "/quit  /exit".bold().cyan());
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

fn render_result(result: Result<Response, PicarError>) -> String {
    match result {
        Ok(Response::Action(report)) => render_action(&report),
        Ok(Response::PlanCreated(plan)) => format!("{}\n{}", "✓ Plan created".green().bold(), render_plan(&plan)),
        Ok(Response::Navigation(outcome)) => render_outcome(&outcome),
        Err(e) => render_error(&e),
    }
}

fn render_action(report: &ActionReport) -> String {
    match report {
        ActionReport::Drove {
            direction,
            speed,
            seconds,
        } => format!("✓ Drove {:?} at speed {} for {:.1} s", direction, speed, seconds),
        ActionReport::Angle { channel, angle_deg } => format!("✓ {} set to {:.1}°", channel, angle_deg),
        ActionReport::Stopped => "✓ Motors stopped".to_string(),
        ActionReport::CancelRequested => "⚠ Cancelling the running navigation …".yellow().to_string(),
        ActionReport::Reset => "✓ Servos centred, motors stopped".to_string(),
        ActionReport::Distance(d) => format!("Distance ahead: {:.1} cm", d),
        ActionReport::Grayscale { values, ground } => format!(
            "Grayscale: [{:.0}, {:.0}, {:.0}] ({:?})",
            values[0], values[1], values[2], ground
        ),
        ActionReport::Snapshot(s) => format!(
            "Snapshot {} ({}x{}, {} bytes)",
            s.id,
            s.width,
            s.height,
            s.data.len()
        ),
        ActionReport::State(state) => format!(
            "Steering {:.1}°, pan {:.1}°, tilt {:.1}°, motor {}, distance {:.1} cm, grayscale {:?}",
            state.steering_deg, state.pan_deg, state.tilt_deg, state.motor_speed, state.distance_cm, state.grayscale
        ),
    }
}

fn render_outcome(outcome: &NavigationOutcome) -> String {
    let status = outcome.status.to_string();
    let status = match outcome.status {
        NavigationStatus::Reached => status.green().bold(),
        NavigationStatus::StoppedSafety | NavigationStatus::ExhaustedAttempts => status.yellow().bold(),
        NavigationStatus::Aborted => status.red().bold(),
    };
    let mut line = format!(
        "Navigation {} after {} attempt(s), last reading {:.1} cm",
        status, outcome.attempts_used, outcome.final_reading
    );
    if let Some(fault) = &outcome.fault {
        line.push_str(&format!(" – {}", fault));
    }
    line
}

fn render_plan(plan: &Plan) -> String {
    let mut out = format!(
        "Plan: {} [{}] {}/{}",
        plan.task.bold(),
        plan.status.as_str(),
        plan.current_step,
        plan.total_steps
    );
    for (i, step) in plan.steps.iter().enumerate() {
        let marker = if (i as u32) < plan.current_step { "✓" } else { "·" };
        out.push_str(&format!("\n  {} {}. {}", marker, i + 1, step));
    }
    out
}

fn render_status(report: &StatusReport) -> String {
    let plan = report
        .plan
        .as_ref()
        .map_or_else(|| "No active plan".dimmed().to_string(), render_plan);
    format!("{}\n{}", plan, render_action(&ActionReport::State(report.state.clone())))
}

fn render_guidance(guidance: &Guidance) -> String {
    guidance.to_string()
}

fn render_error(error: &PicarError) -> String {
    match error {
        PicarError::NeedsClarification(q) => format!("{} {}", "?".yellow().bold(), q),
        other => format!("{} {}", "✗".red().bold(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_is_a_request() {
        assert_eq!(
            parse_line("  Drive forward at speed 30 \n"),
            Some(ShellCommand::Request("Drive forward at speed 30"))
        );
        assert_eq!(parse_line("   \n"), None);
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_line("/status"), Some(ShellCommand::Status));
        assert_eq!(parse_line("/plan"), Some(ShellCommand::Plan));
        assert_eq!(
            parse_line("/advance Take initial photo"),
            Some(ShellCommand::Advance("Take initial photo"))
        );
        assert_eq!(parse_line("/exit"), Some(ShellCommand::Quit));
        assert_eq!(parse_line("/stop"), Some(ShellCommand::Stop));
    }

    #[test]
    fn advance_needs_a_description() {
        assert_eq!(parse_line("/advance   "), Some(ShellCommand::Unknown("/advance")));
    }

    #[test]
    fn outcome_rendering_mentions_fault() {
        let outcome = NavigationOutcome::faulted(
            PicarError::SensorUnavailable {
                sensor: "ultrasonic".into(),
                details: "timeout".into(),
            },
            42.0,
            3,
        );
        let text = render_outcome(&outcome);
        assert!(text.contains("aborted"));
        assert!(text.contains("ultrasonic"));
    }

    #[test]
    fn plan_rendering_marks_completed_steps() {
        let mut plan = Plan::new("explore", vec!["photo".into(), "drive".into()]).unwrap();
        plan.advance("photo", true).unwrap();
        let text = render_plan(&plan);
        assert!(text.contains("✓ 1. photo"));
        assert!(text.contains("· 2. drive"));
    }
}
