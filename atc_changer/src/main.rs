//! # ATC Changer
//!
//! Runs the tool-changer engine against the simulated motion layer.
//!
//! Loads the changer configuration, seeds the carousel with one tool per
//! pocket, then performs the requested tool changes with the step-timeout
//! watchdog active. Every notification is logged. Ctrl-C aborts the
//! running change, which leaves the changer in Fault; `--recover` runs a
//! home / clear / complete recovery pass afterwards.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use atc_changer::config::{AtcConfig, load_config};
use atc_changer::runtime::Atc;
use atc_changer::sim::SimulatedMotion;
use atc_changer::state::machine::{StepOutcome, StepResult};
use atc_common::prelude::*;
use clap::Parser;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// ATC Changer: tool changer state and recovery engine
#[derive(Parser, Debug)]
#[command(name = "atc_changer")]
#[command(version)]
#[command(about = "Automatic tool changer state and recovery engine (simulated motion)")]
struct Args {
    /// Path to the changer configuration TOML.
    #[arg(short, long, default_value = "config/atc.toml")]
    config: PathBuf,

    /// Target pocket of a tool change. Repeat for several changes.
    #[arg(short, long = "target", value_name = "POCKET")]
    targets: Vec<PocketId>,

    /// Simulated time between a command and its completion event [ms].
    #[arg(long, default_value_t = 200)]
    step_delay_ms: u64,

    /// Run a recovery pass if the changer ends up in Fault.
    #[arg(long)]
    recover: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = load_config(&args.config);

    let level = match (&config, args.verbose) {
        (_, true) => Level::DEBUG,
        (Ok(config), false) => config.shared.log_level.into(),
        (Err(_), false) => Level::INFO,
    };
    setup_tracing(&args, level);

    info!("ATC changer v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("ATC changer shutdown complete");
}

fn run(args: &Args, config: AtcConfig) -> Result<(), Box<dyn std::error::Error>> {
    let changer = config.changer;
    info!(
        "Config OK: service={}, pockets={}, step_timeout={}ms, rotation_step={}ms",
        config.shared.service_name, changer.pockets, changer.step_timeout_ms, changer.rotation_step_ms,
    );

    let sim = SimulatedMotion::new();
    let atc = Atc::from_config(changer.clone(), sim.clone())?;
    atc.subscribe(log_event);

    // Demo carousel: tool N in pocket N, spindle empty.
    for pocket in 1..=changer.pockets {
        atc.confirm_occupancy(pocket, Some(ToolNumber::from(pocket)))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let step_delay = Duration::from_millis(args.step_delay_ms);

    for &target in &args.targets {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = tool_change(&atc, target, step_delay, &running) {
            warn!("Tool change to pocket {target} failed: {e}");
            break;
        }
    }

    if atc.mode() == AtcMode::Fault {
        if !args.recover {
            return Err("changer left in Fault, recovery required (--recover)".into());
        }
        recover(&atc)?;
    }

    let snapshot = atc.query_state();
    info!(
        "Final state: mode={}, carousel at pocket {}, spindle={:?}, commands issued={}",
        snapshot.mode,
        snapshot.carousel_pocket,
        snapshot.spindle_tool,
        sim.commands().len(),
    );
    for pocket in &snapshot.pockets {
        debug!("pocket {:>2}: {}", pocket.id, pocket.state());
    }
    Ok(())
}

/// Drive one tool change, acknowledging each command after `step_delay`.
fn tool_change(
    atc: &Atc,
    target: PocketId,
    step_delay: Duration,
    running: &AtomicBool,
) -> Result<(), AtcError> {
    atc.start_cycle(target)?;
    loop {
        thread::sleep(step_delay);
        if !running.load(Ordering::SeqCst) {
            atc.abort();
            return Err(AtcError::NotReady { mode: atc.mode() });
        }
        match atc.advance_step(StepResult::Done)? {
            StepOutcome::Advanced { .. } => {}
            StepOutcome::Completed { .. } => return Ok(()),
            // Watchdog faulted the cycle while we slept.
            StepOutcome::Ignored => return Err(AtcError::NotReady { mode: atc.mode() }),
        }
    }
}

/// Home, clear and complete.
fn recover(atc: &Atc) -> Result<(), AtcError> {
    let mut session = atc.start_recovery()?;
    session.home_atc()?;
    session.clear_fault()?;
    session.complete_recovery()
}

fn log_event(event: &AtcEvent) {
    match event {
        AtcEvent::Mode { mode } => info!("Mode: {mode}"),
        AtcEvent::Pocket { pocket, state } => debug!("Pocket {pocket}: {state}"),
        AtcEvent::Interlocks(state) => info!("Interlocks: {state:?}"),
        AtcEvent::Progress {
            description,
            percent,
        } => info!("[{percent:>3}%] {description}"),
        AtcEvent::Fault { reason } => error!("Fault: {reason}"),
        AtcEvent::Message(text) => info!("{text}"),
        AtcEvent::Recovery(RecoveryEvent::Status(text)) => info!("Recovery: {text}"),
        AtcEvent::Recovery(RecoveryEvent::Progress { step, percent }) => {
            info!("Recovery [{percent:>3}%] {step}")
        }
    }
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
