//! `picarx` – natural-language shell for the Picar-X.
//!
//! 1. Loads `~/.picarx/config.toml`, running a first-run wizard when absent.
//! 2. Probes the configured model server.
//! 3. Wires the orchestrator to the simulated robot and the plan store.
//! 4. Drops into the interactive shell.  Ctrl-C cancels the running
//!    navigation; the motors stop and the shell stays open.

mod config;
mod llm_probe;
mod repl;

use std::sync::Arc;

use colored::Colorize;
use picarx_hal::sim::SimRobot;
use picarx_memory::{PlanStore, SqliteSessionStore};
use picarx_runtime::{LlmDriver, LlmLanguageService, Orchestrator, init_tracing};
use picarx_types::SessionId;
use tracing::warn;

fn main() {
    let _tracing = init_tracing("picarx");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    print!("\n  Probing model server at {} … ", cfg.llm_url.dimmed());
    match llm_probe::fetch_models(&cfg.llm_url, &cfg.api_key) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            if !models.iter().any(|m| m.id == cfg.model) {
                println!(
                    "  {} model {} is not listed by the server",
                    "Warning:".yellow(),
                    cfg.model.bold()
                );
            }
        }
        Err(e) => {
            println!("{}", "offline".yellow());
            println!("  {}", e.dimmed());
            println!("  Requests fall back to built-in phrase matching; plans and vision are unavailable.");
        }
    }

    let driver = LlmDriver::new(cfg.llm_url.clone(), cfg.model.clone()).with_api_key(cfg.api_key.clone());
    // Simulated robot with real-time motors; a hardware gateway plugs in here.
    let robot = SimRobot::new().realtime(true);
    let orch = Arc::new(Orchestrator::new(
        Arc::new(LlmLanguageService::new(driver)),
        Arc::new(robot.sensors()),
        Box::new(robot.actuators()),
        open_plan_store(&cfg.session_db),
        SessionId::new(cfg.session_id.clone()),
        cfg.navigation.clone(),
    ));
    println!("  Session {}", orch.session().to_string().bold());

    let cancel = orch.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C – cancelling navigation (type /quit to exit)".yellow().bold());
        cancel.cancel();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; use /stop to cancel navigation");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(orch);
}

fn open_plan_store(session_db: &str) -> Arc<PlanStore> {
    if session_db.trim().is_empty() {
        return Arc::new(PlanStore::in_memory());
    }
    match SqliteSessionStore::open(session_db) {
        Ok(backend) => Arc::new(PlanStore::new(Box::new(backend))),
        Err(e) => {
            warn!(error = %e, path = session_db, "cannot open session database; plans stay in memory");
            println!(
                "  {} cannot open {}: {} – plans will not persist",
                "Warning:".yellow(),
                session_db.bold(),
                e
            );
            Arc::new(PlanStore::in_memory())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Picar-X First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the shell.\n");

    let mut cfg = config::Config::default();

    cfg.llm_url = prompt_line(
        &format!("  Model server URL (OpenAI-compatible) [{}]: ", cfg.llm_url),
        &cfg.llm_url,
    );
    cfg.model = prompt_line(&format!("  Model [{}]: ", cfg.model), &cfg.model);
    cfg.api_key = prompt_line("  API key (leave empty for local servers): ", "");

    let db = config::default_session_db().display().to_string();
    let answer = prompt_line(
        &format!("  Plan database, or 'none' to keep plans in memory [{}]: ", db),
        &db,
    );
    cfg.session_db = if answer.eq_ignore_ascii_case("none") {
        String::new()
    } else {
        answer
    };

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"    ____  _                       _  __"#.bold().cyan());
    println!("{}", r#"   / __ \(_)________ ______      | |/ /"#.bold().cyan());
    println!("{}", r#"  / /_/ / / ___/ __ `/ ___/_____ |   / "#.bold().cyan());
    println!("{}", r#" / ____/ / /__/ /_/ / /  /_____//   |  "#.bold().cyan());
    println!("{}", r#"/_/   /_/\___/\__,_/_/         /_/|_|  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "picarx".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Natural-language control for the Picar-X");
    println!();
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
