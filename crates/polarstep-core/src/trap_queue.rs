//! Trapezoidal velocity movement queue.
//!
//! Holds the constant-acceleration segments the step solver samples.
//! Gaps before a move are filled with null moves so the solver always
//! sees a contiguous timeline, and finished segments are kept in a short
//! history for diagnostics.

use crate::kinematics::move_get_coord;
use std::collections::VecDeque;

const MAX_NULL_MOVE: f64 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Move {
    pub print_time: f64,
    pub move_t: f64,
    pub start_v: f64,
    pub half_accel: f64,
    pub start_pos: Coord,
    pub axes_r: Coord,
}

impl Move {
    pub fn end_time(&self) -> f64 {
        self.print_time + self.move_t
    }

    fn is_null(&self) -> bool {
        self.start_v == 0.0 && self.half_accel == 0.0
    }
}

/// Accel/cruise/decel timing for one planned move
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccelDecel {
    pub accel_t: f64,
    pub cruise_t: f64,
    pub decel_t: f64,
    pub start_v: f64,
    pub cruise_v: f64,
    pub accel: f64,
}

impl AccelDecel {
    /// Rest-to-rest trapezoid covering `distance`.
    ///
    /// Falls back to a triangle profile when `velocity` cannot be reached.
    pub fn for_distance(distance: f64, velocity: f64, accel: f64) -> Self {
        let accel_d = velocity * velocity / (2.0 * accel);
        if 2.0 * accel_d >= distance {
            let peak_v = (distance * accel).sqrt();
            let accel_t = peak_v / accel;
            return Self {
                accel_t,
                cruise_t: 0.0,
                decel_t: accel_t,
                start_v: 0.0,
                cruise_v: peak_v,
                accel,
            };
        }
        let accel_t = velocity / accel;
        Self {
            accel_t,
            cruise_t: (distance - 2.0 * accel_d) / velocity,
            decel_t: accel_t,
            start_v: 0.0,
            cruise_v: velocity,
            accel,
        }
    }

    pub fn total_time(&self) -> f64 {
        self.accel_t + self.cruise_t + self.decel_t
    }
}

#[derive(Debug, Default)]
pub struct TrapQueue {
    moves: VecDeque<Move>,
    history: VecDeque<Move>,
}

impl TrapQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// End of the last queued (or, once flushed, last retired) move
    pub fn end_time(&self) -> f64 {
        self.moves
            .back()
            .or_else(|| self.history.front())
            .map_or(0.0, Move::end_time)
    }

    /// Add a fully-prepared move, filling gaps with a null move when necessary.
    pub fn add_move(&mut self, m: Move) {
        // Only a null move at the head of an empty queue is clamped
        let start = match self.moves.back() {
            Some(prev) => prev.end_time(),
            None => m.print_time - MAX_NULL_MOVE,
        };
        if start < m.print_time {
            self.moves.push_back(Move {
                print_time: start,
                move_t: m.print_time - start,
                start_pos: m.start_pos,
                ..Move::default()
            });
        }
        self.moves.push_back(m);
    }

    /// Queue the accel, cruise, and decel segments of one move.
    pub fn append(&mut self, print_time: f64, start_pos: Coord, axes_r: Coord, ad: &AccelDecel) {
        let mut cur_time = print_time;
        let mut cur_pos = start_pos;

        if ad.accel_t > 0.0 {
            let m = Move {
                print_time: cur_time,
                move_t: ad.accel_t,
                start_v: ad.start_v,
                half_accel: 0.5 * ad.accel,
                start_pos: cur_pos,
                axes_r,
            };
            self.add_move(m);
            cur_time += ad.accel_t;
            cur_pos = move_get_coord(&m, ad.accel_t);
        }

        if ad.cruise_t > 0.0 {
            let m = Move {
                print_time: cur_time,
                move_t: ad.cruise_t,
                start_v: ad.cruise_v,
                half_accel: 0.0,
                start_pos: cur_pos,
                axes_r,
            };
            self.add_move(m);
            cur_time += ad.cruise_t;
            cur_pos = move_get_coord(&m, ad.cruise_t);
        }

        if ad.decel_t > 0.0 {
            let m = Move {
                print_time: cur_time,
                move_t: ad.decel_t,
                start_v: ad.cruise_v,
                half_accel: -0.5 * ad.accel,
                start_pos: cur_pos,
                axes_r,
            };
            self.add_move(m);
        }
    }

    /// Expire any moves older than `print_time`, moving them into history.
    pub fn finalize_moves(&mut self, print_time: f64, clear_history_time: f64) {
        while let Some(m) = self.moves.front().copied() {
            if m.end_time() > print_time {
                break;
            }
            self.moves.pop_front();
            if !m.is_null() {
                self.history.push_front(m);
            }
        }

        // Always keep the most recent history entry
        while self.history.len() > 1
            && self
                .history
                .back()
                .is_some_and(|last| last.end_time() <= clear_history_time)
        {
            self.history.pop_back();
        }
    }

    /// Note a position change; flush pending moves and mark a history entry.
    pub fn set_position(&mut self, print_time: f64, pos: Coord) {
        self.finalize_moves(f64::INFINITY, 0.0);

        while let Some(first) = self.history.front_mut() {
            if first.print_time < print_time {
                if first.end_time() > print_time {
                    first.move_t = print_time - first.print_time;
                }
                break;
            }
            self.history.pop_front();
        }

        self.history.push_front(Move {
            print_time,
            start_pos: pos,
            ..Move::default()
        });
    }

    /// Position at the end of the last queued or retired move
    pub fn end_position(&self) -> Coord {
        self.moves
            .back()
            .or_else(|| self.history.front())
            .map_or(Coord::default(), |m| move_get_coord(m, m.move_t))
    }

    /// Active moves in time order (for itersolve)
    pub fn active_moves(&self) -> Vec<&Move> {
        self.moves.iter().collect()
    }

    /// Retired moves, most recent first
    pub fn history_moves(&self) -> Vec<&Move> {
        self.history.iter().collect()
    }

    pub fn active_len(&self) -> usize {
        self.moves.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
