// Iterative solver for kinematic moves

use crate::{
    step_queue::{StepQueue, StepQueueError},
    trap_queue::{Coord, Move, TrapQueue},
};

// Constants
const SEEK_TIME_RESET: f64 = 0.000100;

// Active flags for axis filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveFlags(u8);

impl ActiveFlags {
    const X: u8 = 1 << 0;
    const Y: u8 = 1 << 1;
    const Z: u8 = 1 << 2;

    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn with_x(mut self) -> Self {
        self.0 |= Self::X;
        self
    }

    pub const fn with_y(mut self) -> Self {
        self.0 |= Self::Y;
        self
    }

    pub const fn with_z(mut self) -> Self {
        self.0 |= Self::Z;
        self
    }

    pub const fn has_x(&self) -> bool {
        self.0 & Self::X != 0
    }

    pub const fn has_y(&self) -> bool {
        self.0 & Self::Y != 0
    }

    pub const fn has_z(&self) -> bool {
        self.0 & Self::Z != 0
    }
}

/// Position callback - calculates the stepper position at a given time in a move.
///
/// `commanded_pos` is the last position reported for the stepper. It is
/// read-only input; only [`StepperKinematics`] updates it.
pub trait CalcPositionCallback {
    fn active_flags(&self) -> ActiveFlags;

    fn calc_position(&self, m: &Move, move_time: f64, commanded_pos: f64) -> f64;
}

// Timepos helper struct for secant method
#[derive(Debug, Clone, Copy)]
struct TimePos {
    time: f64,
    position: f64,
}

/// Per-stepper kinematic state and the iterative step time solver
#[derive(Debug, Clone)]
pub struct StepperKinematics<K> {
    step_dist: f64,
    commanded_pos: f64,
    last_flush_time: f64,
    last_move_time: f64,
    active_flags: ActiveFlags,
    gen_steps_pre_active: f64,
    gen_steps_post_active: f64,
    kin: K,
}

impl<K: CalcPositionCallback> StepperKinematics<K> {
    /// Bind `kin` to a new record with every other field zeroed
    pub fn new(kin: K) -> Self {
        Self {
            step_dist: 0.0,
            commanded_pos: 0.0,
            last_flush_time: 0.0,
            last_move_time: 0.0,
            active_flags: kin.active_flags(),
            gen_steps_pre_active: 0.0,
            gen_steps_post_active: 0.0,
            kin,
        }
    }

    pub fn kinematics(&self) -> &K {
        &self.kin
    }

    pub fn step_dist(&self) -> f64 {
        self.step_dist
    }

    pub fn set_step_dist(&mut self, step_dist: f64) {
        self.step_dist = step_dist;
    }

    pub fn set_gen_steps_active(&mut self, pre_active: f64, post_active: f64) {
        self.gen_steps_pre_active = pre_active;
        self.gen_steps_post_active = post_active;
    }

    pub fn commanded_pos(&self) -> f64 {
        self.commanded_pos
    }

    /// Position of this stepper at `move_time` within `m`
    pub fn calc_position(&self, m: &Move, move_time: f64) -> f64 {
        self.kin.calc_position(m, move_time, self.commanded_pos)
    }

    pub fn set_position(&mut self, x: f64, y: f64, z: f64) {
        self.commanded_pos = self.calc_position_from_coord(x, y, z);
    }

    pub fn calc_position_from_coord(&self, x: f64, y: f64, z: f64) -> f64 {
        // Create a dummy move at the given position with a long duration
        let m = Move {
            print_time: 0.0,
            move_t: 1000.0,
            start_v: 0.0,
            half_accel: 0.0,
            start_pos: Coord { x, y, z },
            axes_r: Coord::default(),
        };
        self.calc_position(&m, 500.0)
    }

    // Check if a move is likely to cause movement on this stepper
    fn check_active(&self, m: &Move) -> bool {
        (self.active_flags.has_x() && m.axes_r.x != 0.0)
            || (self.active_flags.has_y() && m.axes_r.y != 0.0)
            || (self.active_flags.has_z() && m.axes_r.z != 0.0)
    }

    // Generate step times for a portion of a move using secant method
    fn gen_steps_range(
        &mut self,
        sq: &mut StepQueue,
        m: &Move,
        abs_start: f64,
        abs_end: f64,
    ) -> Result<(), StepQueueError> {
        let half_step = 0.5 * self.step_dist;
        let start = (abs_start - m.print_time).max(0.0);
        let end = (abs_end - m.print_time).min(m.move_t);

        let mut old_guess = TimePos {
            time: start,
            position: self.commanded_pos,
        };
        let mut guess = old_guess;
        let mut sdir = sq.last_dir();
        let mut is_dir_change = false;
        let mut have_bracket = false;
        let mut check_oscillate = false;
        let mut target = self.commanded_pos + if sdir { half_step } else { -half_step };
        let mut last_time = start;
        let mut low_time = start;
        let mut high_time = (start + SEEK_TIME_RESET).min(end);
        let mut step_count = 0usize;

        loop {
            // Use the "secant method" to guess a new time from previous guesses
            let guess_dist = guess.position - target;
            let og_dist = old_guess.position - target;
            let mut next_time =
                (old_guess.time * guess_dist - guess.time * og_dist) / (guess_dist - og_dist);

            if !(next_time > low_time && next_time < high_time) {
                // Next guess is outside bounds checks - validate it
                if have_bracket {
                    // A poor guess - fall back to bisection
                    next_time = (low_time + high_time) * 0.5;
                    check_oscillate = false;
                } else if guess.time >= end {
                    // No more steps present in requested time range
                    break;
                } else {
                    // Might be a poor guess - limit to exponential search
                    next_time = high_time;
                    high_time = (2.0 * high_time - last_time).min(end);
                }
            }

            // Calculate position at next_time guess
            old_guess = guess;
            guess.time = next_time;
            guess.position = self.calc_position(m, next_time);
            let guess_dist = guess.position - target;

            if guess_dist.abs() > 0.000000001 {
                // Guess does not look close enough - update bounds
                let rel_dist = if sdir { guess_dist } else { -guess_dist };

                if rel_dist > 0.0 {
                    // Found position past target, so step is definitely present
                    if have_bracket && old_guess.time <= low_time {
                        if check_oscillate {
                            // Force bisect next to avoid persistent oscillations
                            old_guess = guess;
                        }
                        check_oscillate = true;
                    }
                    high_time = guess.time;
                    have_bracket = true;
                } else if rel_dist < -(half_step + half_step + 0.000000010) {
                    // Found direction change
                    sdir = !sdir;
                    target = if sdir {
                        target + half_step + half_step
                    } else {
                        target - half_step - half_step
                    };
                    low_time = last_time;
                    high_time = guess.time;
                    is_dir_change = true;
                    have_bracket = true;
                    check_oscillate = false;
                } else {
                    low_time = guess.time;
                }

                if !have_bracket || high_time - low_time > 0.000000001 {
                    if !is_dir_change && rel_dist >= -half_step {
                        // Avoid rollback if stepper fully reaches step position
                        sq.commit()?;
                    }
                    // Guess is not close enough - guess again with new time
                    continue;
                }
            }

            // Found next step - submit it
            sq.append(sdir, m.print_time, guess.time)?;
            step_count += 1;
            target = if sdir {
                target + half_step + half_step
            } else {
                target - half_step - half_step
            };
            // Later guesses compare against the position just stepped to
            self.commanded_pos = target - if sdir { half_step } else { -half_step };

            // Reset bounds checking
            let mut seek_time_delta = 1.5 * (guess.time - last_time);
            if seek_time_delta < 0.000000001 {
                seek_time_delta = 0.000000001;
            }
            if is_dir_change && seek_time_delta > SEEK_TIME_RESET {
                seek_time_delta = SEEK_TIME_RESET;
            }
            last_time = guess.time;
            low_time = guess.time;
            high_time = (guess.time + seek_time_delta).min(end);
            is_dir_change = false;
            have_bracket = false;
            check_oscillate = false;
        }

        self.commanded_pos = target - if sdir { half_step } else { -half_step };
        tracing::trace!(
            print_time = m.print_time,
            start,
            end,
            step_count,
            commanded_pos = self.commanded_pos,
            "generated step range"
        );
        Ok(())
    }

    /// Generate step times for the moves on `trapq` up to `flush_time`
    pub fn generate_steps(
        &mut self,
        sq: &mut StepQueue,
        trapq: &TrapQueue,
        flush_time: f64,
    ) -> Result<(), StepQueueError> {
        let last_flush_time = self.last_flush_time;
        self.last_flush_time = flush_time;

        let moves = trapq.active_moves();
        if moves.is_empty() {
            return Ok(());
        }

        // Find first move that hasn't been fully processed
        let Some(mut move_idx) = moves
            .iter()
            .position(|m| last_flush_time < m.print_time + m.move_t)
        else {
            return Ok(());
        };

        let mut force_steps_time = self.last_move_time + self.gen_steps_post_active;
        let mut skip_count = 0;

        while move_idx < moves.len() {
            let m = moves[move_idx];
            let move_start = m.print_time;
            let move_end = move_start + m.move_t;

            if self.check_active(m) {
                if skip_count > 0 && self.gen_steps_pre_active > 0.0 {
                    // Must generate steps leading up to stepper activity
                    let abs_start = (move_start - self.gen_steps_pre_active)
                        .max(last_flush_time)
                        .max(force_steps_time);

                    // Go back and generate steps for skipped moves
                    let mut pm_idx = move_idx;
                    while skip_count > 0 && pm_idx > 0 {
                        pm_idx -= 1;
                        if moves[pm_idx].print_time <= abs_start {
                            pm_idx += 1;
                            break;
                        }
                        skip_count -= 1;
                    }

                    while pm_idx < move_idx {
                        self.gen_steps_range(sq, moves[pm_idx], abs_start, flush_time)?;
                        pm_idx += 1;
                    }
                }

                // Generate steps for this move
                self.gen_steps_range(sq, m, last_flush_time, flush_time)?;

                if move_end >= flush_time {
                    self.last_move_time = flush_time;
                    return Ok(());
                }

                skip_count = 0;
                self.last_move_time = move_end;
                force_steps_time = self.last_move_time + self.gen_steps_post_active;
            } else {
                if move_start < force_steps_time {
                    // Must generate steps just past stepper activity
                    let abs_end = force_steps_time.min(flush_time);
                    self.gen_steps_range(sq, m, last_flush_time, abs_end)?;
                    skip_count = 1;
                } else {
                    // This move doesn't impact this stepper - skip it
                    skip_count += 1;
                }
                if flush_time + self.gen_steps_pre_active <= move_end {
                    return Ok(());
                }
            }

            move_idx += 1;
        }

        Ok(())
    }

    /// Print time of the next move past the last flush that moves this stepper
    pub fn check_active_time(&self, trapq: &TrapQueue, flush_time: f64) -> Option<f64> {
        for m in trapq
            .active_moves()
            .into_iter()
            .skip_while(|m| self.last_flush_time >= m.print_time + m.move_t)
        {
            if self.check_active(m) {
                return Some(m.print_time);
            }
            if flush_time <= m.print_time + m.move_t {
                return None;
            }
        }
        None
    }

    // Check if this stepper is registered for the given axis
    pub fn is_active_axis(&self, axis: char) -> bool {
        match axis {
            'x' | 'X' => self.active_flags.has_x(),
            'y' | 'Y' => self.active_flags.has_y(),
            'z' | 'Z' => self.active_flags.has_z(),
            _ => false,
        }
    }
}
