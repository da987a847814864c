use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use ttygrade::{RunSummary, Runner, Suite, report};

#[derive(Parser, Debug)]
#[command(
    name = "ttygrade",
    about = "Run a test suite of interactive programs through a PTY and grade their output",
    version
)]
struct Args {
    /// Path to the YAML test suite
    suite: PathBuf,

    /// Run only the named test (repeatable)
    #[arg(short, long = "test", value_name = "NAME")]
    tests: Vec<String>,

    /// Directory for per-test expected/actual/diff files
    #[arg(short, long, value_name = "DIR")]
    results: Option<PathBuf>,

    /// Write a JSON summary to PATH (`-` for stdout)
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn on_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

fn write_json(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = report::json(summary)?;
    if path == Path::new("-") {
        println!("{json}");
    } else {
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write JSON summary: {}", path.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut suite = Suite::load(&args.suite)?;
    suite.select(&args.tests)?;
    if suite.uses_valgrind() && !on_path(ttygrade::controller::VALGRIND) {
        bail!("Suite requires valgrind, but it was not found on PATH");
    }

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let mut runner = Runner::new(suite).with_working_dir(cwd);
    if let Some(dir) = &args.results {
        runner = runner.with_results_dir(dir);
    }
    let tracker = runner.tracker();

    let mut run = tokio::task::spawn_blocking(move || runner.run());
    let summary = tokio::select! {
        joined = &mut run => joined.context("Test runner panicked")??,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, stopping the current test...");
            tracker.interrupt();
            run.await.context("Test runner panicked")??
        }
    };

    print!("{}", report::console(&summary));
    if let Some(path) = &args.json {
        write_json(&summary, path)?;
    }

    Ok(if summary.interrupted {
        ExitCode::from(130)
    } else {
        ExitCode::SUCCESS
    })
}
