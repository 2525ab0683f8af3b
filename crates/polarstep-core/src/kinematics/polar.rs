// Polar kinematics

use crate::{
    itersolve::{ActiveFlags, CalcPositionCallback, StepperKinematics},
    kinematics::{KinematicsError, move_get_coord},
    trap_queue::Move,
};
use std::{
    f64::consts::{PI, TAU},
    fmt,
    str::FromStr,
};

/// Polar axis type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarAxis {
    /// Radius axis
    Radius,
    /// Angle axis
    Angle,
}

impl PolarAxis {
    /// Select an axis from its single character tag, exactly `'r'` or `'a'`
    pub fn from_selector(selector: char) -> Result<Self, KinematicsError> {
        match selector {
            'r' => Ok(PolarAxis::Radius),
            'a' => Ok(PolarAxis::Angle),
            _ => Err(KinematicsError::UnknownPolarAxis(selector.to_string())),
        }
    }

    pub fn selector(self) -> char {
        match self {
            PolarAxis::Radius => 'r',
            PolarAxis::Angle => 'a',
        }
    }
}

impl FromStr for PolarAxis {
    type Err = KinematicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "r" | "radius" => Ok(PolarAxis::Radius),
            "a" | "angle" => Ok(PolarAxis::Angle),
            _ => Err(KinematicsError::UnknownPolarAxis(s.to_string())),
        }
    }
}

impl fmt::Display for PolarAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolarAxis::Radius => f.write_str("radius"),
            PolarAxis::Angle => f.write_str("angle"),
        }
    }
}

/// Polar kinematics - bed rotates and arm moves radially
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolarKin {
    axis: PolarAxis,
}

impl PolarKin {
    pub fn new(axis: PolarAxis) -> Self {
        Self { axis }
    }

    pub fn axis(&self) -> PolarAxis {
        self.axis
    }
}

impl CalcPositionCallback for PolarKin {
    fn active_flags(&self) -> ActiveFlags {
        ActiveFlags::new().with_x().with_y()
    }

    fn calc_position(&self, m: &Move, move_time: f64, commanded_pos: f64) -> f64 {
        let c = move_get_coord(m, move_time);
        match self.axis {
            PolarAxis::Radius => (c.x * c.x + c.y * c.y).sqrt(),
            // atan2(0, 0) is 0; the angle at the origin is left undefined
            PolarAxis::Angle => unwrap_angle(c.y.atan2(c.x), commanded_pos),
        }
    }
}

/// Shift `angle` by whole turns so it lies within pi of `reference`.
///
/// Only angles more than half a turn away are moved. For references
/// within a turn of zero the shift is exactly one `2pi`, and further
/// out the number of turns is rounded so multi-turn positions still
/// unwrap onto the nearest branch.
pub fn unwrap_angle(angle: f64, reference: f64) -> f64 {
    let delta = angle - reference;
    if delta > PI || delta < -PI {
        angle + ((reference - angle) / TAU).round() * TAU
    } else {
        angle
    }
}

/// Allocate the stepper kinematics for one polar axis.
///
/// `selector` must be `'r'` (radius) or `'a'` (angle); anything else is
/// rejected before a record is created.
pub fn polar_stepper_alloc(
    selector: char,
) -> Result<StepperKinematics<PolarKin>, KinematicsError> {
    let axis = PolarAxis::from_selector(selector)?;
    tracing::debug!(%axis, "allocating polar stepper kinematics");
    Ok(StepperKinematics::new(PolarKin::new(axis)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trap_queue::Coord;

    fn stationary(x: f64, y: f64) -> Move {
        Move {
            print_time: 0.0,
            move_t: 1.0,
            start_v: 0.0,
            half_accel: 0.0,
            start_pos: Coord { x, y, z: 0.0 },
            axes_r: Coord::default(),
        }
    }

    fn at_angle(angle: f64) -> Move {
        stationary(angle.cos(), angle.sin())
    }

    #[test]
    fn polar_axis_parse() {
        assert_eq!("r".parse::<PolarAxis>(), Ok(PolarAxis::Radius));
        assert_eq!("radius".parse::<PolarAxis>(), Ok(PolarAxis::Radius));
        assert_eq!("a".parse::<PolarAxis>(), Ok(PolarAxis::Angle));
        assert_eq!("Angle".parse::<PolarAxis>(), Ok(PolarAxis::Angle));
        assert!("x".parse::<PolarAxis>().is_err());
        // config text is case-insensitive, the selector it maps to is not
        assert_eq!("R".parse::<PolarAxis>().map(PolarAxis::selector), Ok('r'));
    }

    #[test]
    fn alloc_selects_transform() {
        let sk = polar_stepper_alloc('r').unwrap();
        assert_eq!(sk.kinematics().axis(), PolarAxis::Radius);
        assert_eq!(sk.commanded_pos(), 0.0);

        let sk = polar_stepper_alloc('a').unwrap();
        assert_eq!(sk.kinematics().axis(), PolarAxis::Angle);
        assert_eq!(sk.commanded_pos(), 0.0);
    }

    #[test]
    fn alloc_rejects_unknown_selector() {
        for selector in ['x', 'z', ' ', '0', 'R', 'A'] {
            assert_eq!(
                polar_stepper_alloc(selector).unwrap_err(),
                KinematicsError::UnknownPolarAxis(selector.to_string())
            );
        }
    }

    #[test]
    fn polar_radius_calculates_distance() {
        let sk = polar_stepper_alloc('r').unwrap();
        let pos = sk.calc_position(&stationary(3.0, 4.0), 0.5);
        assert!((pos - 5.0).abs() < 1e-12); // sqrt(3^2 + 4^2)
    }

    #[test]
    fn polar_radius_ignores_commanded_pos() {
        let kin = PolarKin::new(PolarAxis::Radius);
        let m = stationary(-6.0, 8.0);
        for last in [0.0, 3.0, -100.0, 1e6] {
            assert_eq!(kin.calc_position(&m, 0.0, last), 10.0);
        }
    }

    #[test]
    fn polar_angle_calculates_atan2() {
        let sk = polar_stepper_alloc('a').unwrap();
        let pos = sk.calc_position(&stationary(1.0, 0.0), 0.5);
        assert_eq!(pos, 0.0); // atan2(0, 1) = 0
    }

    #[test]
    fn angle_without_wrap_is_unchanged() {
        let kin = PolarKin::new(PolarAxis::Angle);
        let m = at_angle(0.2);
        let pos = kin.calc_position(&m, 0.0, 0.1);
        assert_eq!(pos, (0.2f64.sin()).atan2(0.2f64.cos()));
        assert!((pos - 0.2).abs() < 1e-12);
    }

    #[test]
    fn angle_wraps_forward_past_pi() {
        let kin = PolarKin::new(PolarAxis::Angle);
        let pos = kin.calc_position(&at_angle(-3.0), 0.0, 3.0);
        assert!((pos - (-3.0 + TAU)).abs() < 1e-12);
        assert!((pos - 3.2832).abs() < 1e-4);
    }

    #[test]
    fn angle_wraps_backward_past_minus_pi() {
        let kin = PolarKin::new(PolarAxis::Angle);
        let pos = kin.calc_position(&at_angle(3.0), 0.0, -3.0);
        assert!((pos - (3.0 - TAU)).abs() < 1e-12);
    }

    #[test]
    fn angle_unwraps_after_many_turns() {
        let kin = PolarKin::new(PolarAxis::Angle);
        let last = 5.0 * TAU + 0.1;
        let pos = kin.calc_position(&at_angle(0.3), 0.0, last);
        assert!((pos - (5.0 * TAU + 0.3)).abs() < 1e-9);

        let last = -7.0 * TAU - 3.1;
        let pos = kin.calc_position(&at_angle(3.1), 0.0, last);
        assert!((pos - (-8.0 * TAU + 3.1)).abs() < 1e-9);
    }

    #[test]
    fn unwrap_keeps_exact_half_turn() {
        assert_eq!(unwrap_angle(PI, 0.0), PI);
        assert_eq!(unwrap_angle(0.0, PI), 0.0);
    }

    #[test]
    fn origin_is_passed_through() {
        let radius = polar_stepper_alloc('r').unwrap();
        let angle = polar_stepper_alloc('a').unwrap();
        let m = stationary(0.0, 0.0);
        assert_eq!(radius.calc_position(&m, 0.0), 0.0);
        assert_eq!(angle.calc_position(&m, 0.0), 0.0);
    }

    #[test]
    fn angle_is_continuous_across_boundary() {
        let kin = PolarKin::new(PolarAxis::Angle);
        let mut last = 0.0;
        let mut prev: Option<f64> = None;
        // two full turns in small increments
        for i in 0..=720 {
            let true_angle = i as f64 * (4.0 * PI / 720.0);
            let pos = kin.calc_position(&at_angle(true_angle), 0.0, last);
            if let Some(prev) = prev {
                assert!((pos - prev).abs() < PI);
            }
            assert!((pos - true_angle).abs() < 1e-9, "{pos} vs {true_angle}");
            prev = Some(pos);
            last = pos;
        }
    }

    #[test]
    fn angle_stays_congruent_and_near_reference() {
        let kin = PolarKin::new(PolarAxis::Angle);
        bolero::check!()
            .with_type::<(f64, f64, f64)>()
            .for_each(|&(x, y, last)| {
                if !(x.is_finite() && y.is_finite() && last.is_finite()) {
                    return;
                }
                if x.abs() > 1e6 || y.abs() > 1e6 || last.abs() > 1e4 {
                    return;
                }
                if x.hypot(y) < 1e-6 {
                    return;
                }
                let a = kin.calc_position(&stationary(x, y), 0.0, last);
                let raw = y.atan2(x);
                let tol = 1e-9 * (1.0 + last.abs());
                assert!((a - last).abs() <= PI + tol, "a={a} last={last}");
                let turns = (a - raw) / TAU;
                assert!((turns - turns.round()).abs() < tol, "a={a} raw={raw}");
            });
    }

    #[test]
    fn radius_matches_hypot() {
        let kin = PolarKin::new(PolarAxis::Radius);
        bolero::check!()
            .with_type::<(f64, f64, f64)>()
            .for_each(|&(x, y, last)| {
                if !(x.is_finite() && y.is_finite()) || x.abs() > 1e6 || y.abs() > 1e6 {
                    return;
                }
                let r = kin.calc_position(&stationary(x, y), 0.0, last);
                assert!((r - x.hypot(y)).abs() <= 1e-9 * (1.0 + r));
            });
    }
}
