use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use timerperf::cli::Cli;
use timerperf::commands;
use timerperf::config::{Config, LogLevel};
use tracing::warn;
use tracing_subscriber::EnvFilter;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Initialize the stderr diagnostic subscriber
fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .parse_lossy(format!(
            "{},{}",
            level.directive(),
            std::env::var("RUST_LOG").unwrap_or_default()
        ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time()
        .with_target(false)
        .init();
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|arg0| std::path::Path::new(arg0).file_name()?.to_str().map(String::from))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

fn main() -> ExitCode {
    let args = Cli::parse();
    let prog = program_name();

    let config = match &args.common.config {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    };
    let level = args
        .common
        .log
        .or_else(|| config.as_ref().ok().map(|config| config.log))
        .unwrap_or_default();
    init_tracing(level);

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}: {}.", prog, err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        warn!("cannot install interrupt handler: {}", err);
    }

    match commands::run(args.command, &config, &INTERRUPTED) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if commands::is_interrupted(&err) => {
            eprintln!("{}: Interrupted!", prog);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("{}: {:#}.", prog, err);
            ExitCode::FAILURE
        }
    }
}
