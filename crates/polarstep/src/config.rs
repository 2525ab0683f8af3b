use anyhow::{Context, Result};
use polarstep_core::kinematics::polar::PolarAxis;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::Path};

/// Machine description: polar steppers plus the moves to run through them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Step generation settings
    #[serde(default)]
    pub solver: SolverConfig,

    /// Polar steppers driven by the moves
    #[serde(default)]
    pub steppers: Vec<StepperConfig>,

    /// Toolhead position before the first move
    #[serde(default)]
    pub start: StartConfig,

    /// Moves queued in order, each starting where the previous ended
    #[serde(default)]
    pub moves: Vec<MoveConfig>,
}

/// Step generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Seconds of print time covered by each step generation flush
    #[serde(default = "default_flush_interval")]
    pub flush_interval: f64,

    /// Seconds before stepper activity during which steps are still generated
    #[serde(default)]
    pub gen_steps_pre_active: f64,

    /// Seconds after stepper activity during which steps are still generated
    #[serde(default)]
    pub gen_steps_post_active: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval(),
            gen_steps_pre_active: 0.0,
            gen_steps_post_active: 0.0,
        }
    }
}

/// One polar stepper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepperConfig {
    pub name: String,

    /// `r`/`radius` or `a`/`angle`
    pub axis: String,

    /// Millimeters (radius) or radians (angle) per full step
    pub step_distance: f64,
}

impl StepperConfig {
    pub fn polar_axis(&self) -> Result<PolarAxis> {
        self.axis
            .parse()
            .with_context(|| format!("steppers.{}.axis is invalid", self.name))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartConfig {
    #[serde(default)]
    pub position: [f64; 3],

    #[serde(default)]
    pub print_time: f64,
}

/// Straight rest-to-rest move to `to`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveConfig {
    pub to: [f64; 3],
    pub velocity: f64,
    pub accel: f64,
}

fn default_flush_interval() -> f64 {
    0.05
}

impl Config {
    /// Load configuration from a file, auto-detecting TOML or JSON format
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => {
                // Try TOML first (preferred), fall back to JSON
                Self::from_toml(&content).or_else(|_| Self::from_json(&content))
            }
        }
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config as TOML")
    }

    /// Parse configuration from JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse config as JSON")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let solver = &self.solver;
        if !(solver.flush_interval.is_finite() && solver.flush_interval > 0.0) {
            anyhow::bail!("solver.flush_interval must be positive");
        }
        if !(solver.gen_steps_pre_active >= 0.0 && solver.gen_steps_post_active >= 0.0) {
            anyhow::bail!("solver.gen_steps_pre_active/post_active cannot be negative");
        }

        if self.steppers.is_empty() {
            anyhow::bail!("at least one stepper must be configured");
        }
        let mut names = HashSet::new();
        for stepper in &self.steppers {
            if stepper.name.is_empty() {
                anyhow::bail!("steppers.name cannot be empty");
            }
            if !names.insert(stepper.name.as_str()) {
                anyhow::bail!("duplicate stepper name {}", stepper.name);
            }
            stepper.polar_axis()?;
            if !(stepper.step_distance.is_finite() && stepper.step_distance > 0.0) {
                anyhow::bail!("steppers.{}.step_distance must be positive", stepper.name);
            }
        }

        if self.start.position.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("start.position must be finite");
        }
        if !(self.start.print_time.is_finite() && self.start.print_time >= 0.0) {
            anyhow::bail!("start.print_time must be finite and non-negative");
        }
        for (i, m) in self.moves.iter().enumerate() {
            if m.to.iter().any(|v| !v.is_finite()) {
                anyhow::bail!("moves[{i}].to must be finite");
            }
            if !(m.velocity.is_finite() && m.velocity > 0.0) {
                anyhow::bail!("moves[{i}].velocity must be positive");
            }
            if !(m.accel.is_finite() && m.accel > 0.0) {
                anyhow::bail!("moves[{i}].accel must be positive");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MACHINE: &str = r#"
[solver]
flush_interval = 0.1

[[steppers]]
name = "stepper_arm"
axis = "radius"
step_distance = 0.0125

[[steppers]]
name = "stepper_bed"
axis = "a"
step_distance = 0.001

[start]
position = [10.0, 0.0, 0.0]

[[moves]]
to = [0.0, 10.0, 0.0]
velocity = 20.0
accel = 500.0
"#;

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml(MACHINE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.solver.flush_interval, 0.1);
        assert_eq!(config.steppers.len(), 2);
        assert_eq!(config.steppers[0].polar_axis().unwrap(), PolarAxis::Radius);
        assert_eq!(config.steppers[1].polar_axis().unwrap(), PolarAxis::Angle);
        assert_eq!(config.start.position, [10.0, 0.0, 0.0]);
        assert_eq!(config.moves[0].to, [0.0, 10.0, 0.0]);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "steppers": [
                { "name": "bed", "axis": "angle", "step_distance": 0.002 }
            ],
            "moves": [
                { "to": [5.0, 5.0, 0.0], "velocity": 10.0, "accel": 100.0 }
            ]
        }"#;

        let config = Config::from_json(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.steppers[0].name, "bed");
        assert_eq!(config.moves.len(), 1);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.solver.flush_interval, 0.05);
        assert_eq!(config.solver.gen_steps_pre_active, 0.0);
        assert_eq!(config.start.position, [0.0; 3]);
        assert!(config.moves.is_empty());
        // no steppers configured
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_axis() {
        let config = Config::from_toml(&MACHINE.replace("axis = \"a\"", "axis = \"z\"")).unwrap();
        let err = format!("{:#}", config.validate().unwrap_err());
        assert!(err.contains("steppers.stepper_bed.axis"), "{err}");
        assert!(err.contains("unknown polar axis"), "{err}");
    }

    #[test]
    fn test_rejects_bad_values() {
        let dup = MACHINE.replace("stepper_bed", "stepper_arm");
        assert!(Config::from_toml(&dup).unwrap().validate().is_err());

        let step = MACHINE.replace("0.0125", "0.0");
        assert!(Config::from_toml(&step).unwrap().validate().is_err());

        let accel = MACHINE.replace("accel = 500.0", "accel = -1.0");
        assert!(Config::from_toml(&accel).unwrap().validate().is_err());

        let flush = MACHINE.replace("flush_interval = 0.1", "flush_interval = 0.0");
        assert!(Config::from_toml(&flush).unwrap().validate().is_err());

        let mut config = Config::from_toml(MACHINE).unwrap();
        for print_time in [f64::NAN, f64::INFINITY, -1.0] {
            config.start.print_time = print_time;
            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains("start.print_time"), "{err}");
        }
    }
}
