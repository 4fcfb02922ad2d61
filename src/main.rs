use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use writebench::{cli::Cli, orchestrator, BenchConfig};

/// Initialize tracing subscriber; `RUST_LOG` directives refine the default level
fn init_tracing(debug: bool) {
    let level = if debug {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = BenchConfig::from_cli(&args)?;
    let summary = orchestrator::run(config)?;

    tracing::info!(reason = %summary.reason, "Benchmark finished");
    Ok(())
}
