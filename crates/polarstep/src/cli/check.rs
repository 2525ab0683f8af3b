use anyhow::Result;
use clap::Args;
use polarstep::config::Config;
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the machine configuration (TOML or JSON).
    pub config: PathBuf,
}

impl CheckArgs {
    pub fn run(&self) -> Result<()> {
        let config = Config::from_file(&self.config)?;
        config.validate()?;

        for stepper in &config.steppers {
            let axis = stepper.polar_axis()?;
            tracing::info!(
                name = %stepper.name,
                %axis,
                step_distance = stepper.step_distance,
                "polar stepper"
            );
        }
        tracing::info!(
            steppers = config.steppers.len(),
            moves = config.moves.len(),
            "config ok: {}",
            self.config.display()
        );
        Ok(())
    }
}
