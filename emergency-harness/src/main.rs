//! EMK Harness - stress and scenario testing for the emergency aggregate
//!
//! - `stress` - hammer nodes from many threads and check the aggregate
//! - `run` - execute JSON scenario files and report per-scenario results
//!
//! Results go to stdout as JSON, logs go to stderr.

mod scenario;
mod stress;
mod workload;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "emk-harness")]
#[command(author, version, about = "Stress and scenario harness for EMK", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a multi-threaded stress test
    Stress {
        /// Worker threads
        #[arg(short, long, default_value = "16")]
        threads: usize,

        /// Operations per thread
        #[arg(short, long, default_value = "100000")]
        iterations: u32,

        /// All threads raise on one shared node
        #[arg(long)]
        shared: bool,

        /// Workload seed for owned-node runs
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Run JSON scenario files
    Run {
        /// Scenario files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("EMK harness v{}", emk::VERSION_STRING);

    let passed = match cli.command {
        Commands::Stress {
            threads,
            iterations,
            shared,
            seed,
        } => {
            let report = stress::run(&stress::StressConfig {
                threads,
                iterations,
                shared,
                seed,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.passed
        }
        Commands::Run { files } => {
            let results: Vec<_> = files.iter().map(|path| scenario::run_file(path)).collect();
            println!("{}", serde_json::to_string_pretty(&results)?);

            let passed = results.iter().filter(|r| r.passed).count();
            info!("Passed: {}/{}", passed, results.len());
            passed == results.len()
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
