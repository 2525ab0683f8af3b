use crate::config::Config;
use anyhow::{Context, Result};
use polarstep_core::{
    itersolve::StepperKinematics,
    kinematics::polar::{PolarAxis, PolarKin, polar_stepper_alloc},
    step_queue::StepQueue,
    trap_queue::{AccelDecel, Coord, TrapQueue},
};
use serde::Serialize;

// Retired moves kept for diagnostics
const MOVE_HISTORY_TIME: f64 = 30.0;

/// One configured polar stepper and the steps generated for it
pub struct Stepper {
    name: String,
    start_pos: f64,
    kin: StepperKinematics<PolarKin>,
    queue: StepQueue,
}

impl Stepper {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn axis(&self) -> PolarAxis {
        self.kin.kinematics().axis()
    }

    pub fn kinematics(&self) -> &StepperKinematics<PolarKin> {
        &self.kin
    }

    pub fn queue(&self) -> &StepQueue {
        &self.queue
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepperReport {
    pub name: String,
    pub axis: String,
    pub step_distance: f64,
    pub start_pos: f64,
    pub commanded_pos: f64,
    pub step_count: usize,
    /// Net steps taken, positive in the increasing direction
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepRecord>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepRecord {
    pub time: f64,
    pub dir: i8,
}

/// Polar steppers fed from a single move queue
pub struct Machine {
    trapq: TrapQueue,
    steppers: Vec<Stepper>,
    flush_interval: f64,
    flush_time: f64,
}

impl Machine {
    /// Build the steppers and queue every configured move.
    ///
    /// The config is expected to have passed [`Config::validate`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let [x, y, z] = config.start.position;

        let mut steppers = Vec::with_capacity(config.steppers.len());
        for sc in &config.steppers {
            let axis = sc.polar_axis()?;
            let mut kin = polar_stepper_alloc(axis.selector())
                .with_context(|| format!("failed to allocate stepper {}", sc.name))?;
            kin.set_step_dist(sc.step_distance);
            kin.set_gen_steps_active(
                config.solver.gen_steps_pre_active,
                config.solver.gen_steps_post_active,
            );
            kin.set_position(x, y, z);
            tracing::info!(
                name = %sc.name,
                %axis,
                step_distance = sc.step_distance,
                start_pos = kin.commanded_pos(),
                "configured polar stepper"
            );
            steppers.push(Stepper {
                name: sc.name.clone(),
                start_pos: kin.commanded_pos(),
                kin,
                queue: StepQueue::new(),
            });
        }

        let mut trapq = TrapQueue::new();
        let mut pos = Coord { x, y, z };
        let mut print_time = config.start.print_time;
        for (i, mc) in config.moves.iter().enumerate() {
            let to = Coord {
                x: mc.to[0],
                y: mc.to[1],
                z: mc.to[2],
            };
            let (dx, dy, dz) = (to.x - pos.x, to.y - pos.y, to.z - pos.z);
            let distance = (dx * dx + dy * dy + dz * dz).sqrt();
            if distance == 0.0 {
                tracing::debug!(index = i, "skipping zero length move");
                continue;
            }
            let axes_r = Coord {
                x: dx / distance,
                y: dy / distance,
                z: dz / distance,
            };
            let ad = AccelDecel::for_distance(distance, mc.velocity, mc.accel);
            trapq.append(print_time, pos, axes_r, &ad);
            print_time = trapq.end_time();
            pos = to;
        }
        tracing::info!(
            moves = trapq.active_len(),
            end_time = trapq.end_time(),
            "queued moves"
        );

        Ok(Self {
            trapq,
            steppers,
            flush_interval: config.solver.flush_interval,
            flush_time: config.start.print_time,
        })
    }

    pub fn steppers(&self) -> &[Stepper] {
        &self.steppers
    }

    pub fn end_time(&self) -> f64 {
        self.trapq.end_time()
    }

    /// Generate steps for every stepper up to `flush_time`
    pub fn flush(&mut self, flush_time: f64) -> Result<()> {
        for stepper in &mut self.steppers {
            stepper
                .kin
                .generate_steps(&mut stepper.queue, &self.trapq, flush_time)
                .with_context(|| format!("step generation failed for {}", stepper.name))?;
        }
        // No stepper reads moves that ended before its last flush
        self.trapq.finalize_moves(flush_time, flush_time - MOVE_HISTORY_TIME);
        self.flush_time = flush_time;
        tracing::debug!(flush_time, "flushed steppers");
        Ok(())
    }

    /// Flush in fixed intervals until every queued move is covered
    pub fn run(&mut self) -> Result<()> {
        let end_time = self.end_time();
        while self.flush_time < end_time {
            let flush_time = (self.flush_time + self.flush_interval).min(end_time);
            if flush_time <= self.flush_time {
                anyhow::bail!(
                    "flush interval {} does not advance print time {}",
                    self.flush_interval,
                    self.flush_time
                );
            }
            self.flush(flush_time)?;
        }
        for stepper in &mut self.steppers {
            stepper.queue.commit()?;
            tracing::info!(
                name = %stepper.name,
                steps = stepper.queue.steps().len(),
                position = stepper.queue.position(),
                commanded_pos = stepper.kin.commanded_pos(),
                "step generation complete"
            );
        }
        Ok(())
    }

    pub fn report(&self, include_steps: bool) -> Vec<StepperReport> {
        self.steppers
            .iter()
            .map(|s| StepperReport {
                name: s.name.clone(),
                axis: s.axis().to_string(),
                step_distance: s.kin.step_dist(),
                start_pos: s.start_pos,
                commanded_pos: s.kin.commanded_pos(),
                step_count: s.queue.steps().len(),
                position: s.queue.position(),
                steps: include_steps.then(|| {
                    s.queue
                        .steps()
                        .iter()
                        .map(|step| StepRecord {
                            time: step.time,
                            dir: if step.dir { 1 } else { -1 },
                        })
                        .collect()
                }),
            })
            .collect()
    }
}
