use anyhow::{Context, Result};
use clap::Args;
use polarstep::{config::Config, machine::Machine};
use std::path::PathBuf;

#[derive(Args)]
pub struct TraceArgs {
    /// Path to the machine configuration (TOML or JSON).
    pub config: PathBuf,

    /// Include every step time in the report.
    #[arg(long)]
    pub steps: bool,

    /// Override the flush interval in seconds.
    #[arg(long)]
    pub flush_interval: Option<f64>,
}

impl TraceArgs {
    pub fn run(&self) -> Result<()> {
        let mut config = Config::from_file(&self.config)?;
        if let Some(interval) = self.flush_interval {
            config.solver.flush_interval = interval;
        }
        config.validate()?;

        tracing::info!("Tracing steps for config: {}", self.config.display());
        let mut machine = Machine::from_config(&config)?;
        machine.run()?;

        let report = machine.report(self.steps);
        let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{json}");
        Ok(())
    }
}
