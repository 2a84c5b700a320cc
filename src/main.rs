//! swarm-sched - Federated HPC scheduling simulator.
//!
//! Takes one experiment description and runs it to completion. The per-job
//! CSV report goes to standard output, aggregate statistics to standard
//! error. Exits 0 on a successful simulation, 1 on a startup error.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use swarm_sched::config::ExperimentConfig;
use swarm_sched::simulation::run_experiment;
use swarm_sched::telemetry::{init_logging, LogFormat, LoggingConfig};

#[derive(Debug, Parser)]
#[command(name = "swarm-sched", version, about = "Federated HPC scheduling simulator")]
struct Cli {
    /// Experiment description (JSON).
    experiment: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SWARM_SCHED_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty, compact).
    #[arg(long, env = "SWARM_SCHED_LOG_FORMAT")]
    log_format: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default();
    if let Some(level) = cli.log_level {
        logging.level = level;
    }
    match cli.log_format.as_deref() {
        Some("json") => logging.format = LogFormat::Json,
        Some("pretty") => logging.format = LogFormat::Pretty,
        Some("compact") | None => {}
        Some(other) => {
            eprintln!("Unknown log format '{}'", other);
            return ExitCode::FAILURE;
        }
    }
    init_logging(&logging);

    let result = ExperimentConfig::load(&cli.experiment).and_then(|config| run_experiment(&config));

    match result {
        Ok(state) => {
            let stdout = std::io::stdout();
            let stderr = std::io::stderr();
            if state.write_csv(&mut stdout.lock()).is_err()
                || state.write_summary(&mut stderr.lock()).is_err()
            {
                return ExitCode::FAILURE;
            }
            let _ = stdout.lock().flush();
            ExitCode::SUCCESS
        }
        Err(error) => {
            error.log();
            eprintln!("{}", error);
            ExitCode::FAILURE
        }
    }
}
