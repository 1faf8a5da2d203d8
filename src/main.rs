//! Tote calculator: interactive shell.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores saved races from the store and then dispatches one command
//! per input line until `quit` or end of input.

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use tote::config::{self, AppConfig};
use tote::engine::Calculator;
use tote::shell::{Outcome, Shell};
use tote::storage::{FileStore, KeyValueStore, NullStore};

#[derive(Debug, Parser)]
#[command(name = "tote", version, about = "Tote calculator: payouts, odds and saved races")]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, env = "TOTE_CONFIG", default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Keep saved races in memory only.
    #[arg(long)]
    no_storage: bool,
}

fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = Args::parse();
    init_logging();

    // A broken config is reported and replaced by the defaults.
    let cfg = AppConfig::load_or_fallback(&args.config);

    let store: Box<dyn KeyValueStore> = if cfg.storage.enabled && !args.no_storage {
        info!(dir = %cfg.storage.data_dir.display(), "Using file storage");
        Box::new(FileStore::new(&cfg.storage.data_dir))
    } else {
        warn!("Storage disabled, saved races will not survive this session");
        Box::new(NullStore)
    };

    let mut calc = Calculator::with_fallback(
        cfg.calculator.settings(),
        cfg.calculator.runner_count,
        store,
    );

    // A bad history file is reported and then ignored.
    match calc.load_history() {
        Ok(n) => info!(races = n, "Saved races restored"),
        Err(e) => warn!(error = %e, "Ignoring saved races"),
    }

    info!(
        runners = calc.runners().len(),
        settings = %calc.settings(),
        persistent = calc.is_persistent(),
        "Tote calculator ready"
    );

    let mut shell = Shell::new(calc, cfg.storage.export_dir.clone());
    run(&mut shell)?;

    info!(races = shell.calculator().history().len(), "Tote calculator shut down");
    Ok(())
}

/// Read commands from stdin until quit or EOF.
fn run(shell: &mut Shell) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("Tote calculator. Type 'help' for commands.");
    prompt(&mut stdout)?;

    for line in stdin.lock().lines() {
        let line = line?;
        match shell.handle_line(&line) {
            Outcome::Quit => break,
            Outcome::Continue(text) if text.is_empty() => {}
            Outcome::Continue(text) => println!("{text}"),
        }
        prompt(&mut stdout)?;
    }
    Ok(())
}

fn prompt(stdout: &mut io::Stdout) -> Result<()> {
    write!(stdout, "tote> ")?;
    stdout.flush()?;
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tote=warn"));

    let json_logging = std::env::var("TOTE_LOG_JSON").is_ok();

    // Logs go to stderr so they don't interleave with shell output.
    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(io::stderr)
            .init();
    }
}
