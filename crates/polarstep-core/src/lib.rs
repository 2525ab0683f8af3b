//! Polar stepper kinematics and step generation.
//!
//! This crate intentionally avoids any transport- or MCU-specific
//! dependencies. It turns queued Cartesian moves into step times for the
//! radius and angle steppers of a polar machine.

pub mod itersolve;
pub mod kinematics;
pub mod step_queue;
pub mod trap_queue;
