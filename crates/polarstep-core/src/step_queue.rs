use thiserror::Error;

const QUEUE_START_SIZE: usize = 1024;
const SDS_FILTER_TIME: f64 = 0.000_750;
// Tolerance for step times that tie within float rounding
const STEP_TIME_EPSILON: f64 = 0.000_000_001;

#[derive(Debug, Error, PartialEq)]
pub enum StepQueueError {
    #[error("step at {time:.9} precedes previous step at {last:.9}")]
    OutOfOrder { time: f64, last: f64 },
}

pub type Result<T> = std::result::Result<T, StepQueueError>;

/// One step pulse at an absolute print time
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    pub time: f64,
    pub dir: bool,
}

/// Collects the step times produced by the solver for one stepper.
///
/// The most recent step is kept pending so that a step immediately
/// followed by a reversal can be dropped instead of emitting
/// step+dir+step in quick succession.
#[derive(Debug)]
pub struct StepQueue {
    steps: Vec<Step>,
    pending: Option<Step>,
    next_dir: Option<bool>,
    position: i64,
}

impl Default for StepQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl StepQueue {
    pub fn new() -> Self {
        Self {
            steps: Vec::with_capacity(QUEUE_START_SIZE),
            pending: None,
            next_dir: None,
            position: 0,
        }
    }

    /// Direction of the most recently requested step (false before any step)
    pub fn last_dir(&self) -> bool {
        self.next_dir.unwrap_or(false)
    }

    pub fn append(&mut self, dir: bool, print_time: f64, step_time: f64) -> Result<()> {
        let time = print_time + step_time;

        if let Some(prev) = self.pending {
            if dir != prev.dir && time - prev.time < SDS_FILTER_TIME {
                // rollback last step to avoid rapid step+dir+step
                self.pending = None;
                self.next_dir = Some(dir);
                return Ok(());
            }
            self.push(prev)?;
        }

        self.pending = Some(Step { time, dir });
        self.next_dir = Some(dir);
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if let Some(step) = self.pending.take() {
            self.push(step)?;
        }
        Ok(())
    }

    /// Committed steps in time order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Net committed step count
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn into_steps(mut self) -> Result<Vec<Step>> {
        self.commit()?;
        Ok(self.steps)
    }

    fn push(&mut self, step: Step) -> Result<()> {
        self.pending = None;
        if let Some(last) = self.steps.last()
            && step.time + STEP_TIME_EPSILON < last.time
        {
            return Err(StepQueueError::OutOfOrder {
                time: step.time,
                last: last.time,
            });
        }
        self.position += if step.dir { 1 } else { -1 };
        self.steps.push(step);
        Ok(())
    }
}
