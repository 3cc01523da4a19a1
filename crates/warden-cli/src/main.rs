//! `wardend`: the daemon binary. Wires C1-C8 together, parses the CLI's
//! handful of startup flags, and runs until a signal or a fatal condition
//! asks it to stop (§6). This is the daemon's own entry point, not a
//! client command surface — `start`/`stop`/`services`/… live behind the
//! HTTP API (§6), the same split the spec draws between "core" and the
//! CLI as an external, thin collaborator.

mod exit_code;
mod run;
mod signals;
mod watchdog;

use std::process::ExitCode as ProcessExitCode;

use clap::Parser;
use warden_config::Paths;

/// `wardend` — the Warden service-manager daemon.
#[derive(Parser)]
#[command(name = "wardend")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration directory (overrides `WARDEN_DIR` and XDG discovery).
    #[arg(long)]
    dir: Option<String>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if Paths::verbose() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() -> ProcessExitCode {
    init_tracing();

    let cli = Cli::parse();
    let paths = match &cli.dir {
        Some(dir) => Paths::with_dir(dir),
        None => match Paths::resolve() {
            Ok(paths) => paths,
            Err(err) => {
                eprintln!("wardend: {err}");
                return ProcessExitCode::from(exit_code::ExitCode::Fatal as u8);
            }
        },
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("wardend: failed to start the async runtime: {err}");
            return ProcessExitCode::from(exit_code::ExitCode::Fatal as u8);
        }
    };

    match runtime.block_on(run::run(paths)) {
        Ok(code) => ProcessExitCode::from(code as u8),
        Err(err) => {
            tracing::error!(%err, "wardend exiting after a fatal error");
            ProcessExitCode::from(exit_code::ExitCode::Fatal as u8)
        }
    }
}
