//! omniloop CLI: run the latency feedback loop once and report the outcome.

mod commands;

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use omniloop_core::{LoopConfig, OracleCommand, DEFAULT_DESCRIPTOR_NAME};
use tracing_subscriber::EnvFilter;

/// Oracle location relative to the directory holding the omniloop executable.
const DEFAULT_ORACLE_DIR: &str = "../rust_tooling";

#[derive(Parser)]
#[command(
    name = "omniloop",
    version,
    about = "Measure a kernel, optimize its access pattern if slow, and report the speedup"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: LoopOptions,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how the oracle would be located and invoked
    Doctor,
}

#[derive(clap::Args, Debug, Clone)]
struct LoopOptions {
    /// Baseline latency (cycles) above which optimization is attempted
    #[arg(long, global = true, default_value_t = omniloop_core::config::REFERENCE_THRESHOLD)]
    threshold: u64,
    /// Stride of the baseline (adversarial) descriptor
    #[arg(long, global = true, default_value_t = omniloop_core::config::REFERENCE_BAD_STRIDE)]
    bad_stride: u32,
    /// Stride of the optimized (conflict-free) descriptor
    #[arg(long, global = true, default_value_t = omniloop_core::config::REFERENCE_GOOD_STRIDE)]
    good_stride: u32,
    /// Operations per descriptor
    #[arg(long, global = true, default_value_t = omniloop_core::config::REFERENCE_INSTRUCTION_COUNT)]
    count: usize,
    /// Oracle working directory, relative to the current directory (default: ../rust_tooling next to this executable)
    #[arg(long, global = true)]
    oracle_dir: Option<PathBuf>,
    /// Oracle program (default: `cargo run --quiet --`)
    #[arg(long, global = true)]
    oracle: Option<String>,
    /// Argument passed to the oracle program before the descriptor path (repeatable)
    #[arg(long = "oracle-arg", global = true, allow_hyphen_values = true)]
    oracle_args: Vec<String>,
    /// Descriptor location, relative to the oracle directory (default: <oracle-dir>/temp.ptx)
    #[arg(long, global = true)]
    descriptor: Option<PathBuf>,
    /// Kill the oracle after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    /// Report format
    #[arg(long, global = true, value_enum, default_value_t = ReportFormat::Human)]
    report: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Human,
    Json,
}

/// Everything a command needs, with defaults resolved.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub config: LoopConfig,
    pub oracle: OracleCommand,
    pub descriptor: PathBuf,
    pub json: bool,
}

impl LoopOptions {
    /// Resolve defaults into absolute paths.
    ///
    /// The harness writes the descriptor from `cwd` while the oracle reads it
    /// from its own working directory, so both paths are anchored before either
    /// side sees them. A relative `--descriptor` names a file inside the oracle
    /// directory.
    fn resolve(self, exe_dir: &Path, cwd: &Path) -> Invocation {
        let oracle_dir = cwd.join(
            self.oracle_dir
                .unwrap_or_else(|| exe_dir.join(DEFAULT_ORACLE_DIR)),
        );

        let oracle = match self.oracle {
            Some(program) => OracleCommand::new(program)
                .with_args(self.oracle_args)
                .with_working_dir(&oracle_dir),
            None => OracleCommand::cargo_run(&oracle_dir),
        }
        .with_timeout(self.timeout_secs.map(Duration::from_secs));

        let descriptor = oracle_dir.join(
            self.descriptor
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DESCRIPTOR_NAME)),
        );

        Invocation {
            config: LoopConfig {
                bad_stride: self.bad_stride,
                good_stride: self.good_stride,
                instruction_count: self.count,
                threshold: self.threshold,
            },
            oracle,
            descriptor,
            json: self.report == ReportFormat::Json,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let exe_dir = executable_dir()?;
    let cwd = std::env::current_dir()?;
    let invocation = cli.options.resolve(&exe_dir, &cwd);

    match cli.command {
        None => commands::run::run(&invocation),
        Some(Commands::Doctor) => commands::doctor::run(&invocation),
    }
}

fn executable_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    match exe.parent() {
        Some(dir) => Ok(dir.to_path_buf()),
        None => anyhow::bail!("cannot determine directory of {}", exe.display()),
    }
}
