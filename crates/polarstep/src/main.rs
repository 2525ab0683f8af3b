use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

fn main() -> Result<()> {
    // Logs go to stderr so reports on stdout stay machine readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check(args) => args.run(),
        Command::Trace(args) => args.run(),
    }
}

#[derive(Parser)]
#[command(name = "polarstep", about = "Step generation for polar kinematics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and validate a machine configuration.
    Check(cli::check::CheckArgs),
    /// Generate steps for the configured moves and print a JSON report.
    Trace(cli::trace::TraceArgs),
}
