//! Small scalar helpers shared by the orbit solver and the planners

use std::f64::consts::{FRAC_1_SQRT_2, PI, TAU};

/// Below this a length or speed product is treated as zero
pub const SMALL: f64 = 1e-10;

/// Recover an angle in [0, 2π) from its sine and cosine.
///
/// The magnitude in [0, π] comes from whichever of acos/asin is well
/// conditioned (acos loses precision next to 0 and π); the sign of the sine
/// picks the half-plane. Inputs are clamped so rounding just past ±1 does
/// not produce NaN
pub fn angle_from_sin_cos(sin: f64, cos: f64) -> f64 {
    let angle = if cos.abs() < FRAC_1_SQRT_2 {
        cos.clamp(-1.0, 1.0).acos()
    } else if cos > 0.0 {
        sin.abs().min(1.0).asin()
    } else {
        PI - sin.abs().min(1.0).asin()
    };
    if sin < 0.0 {
        TAU - angle
    } else {
        angle
    }
}

/// Wrap radians into [0, 2π)
pub fn wrap_radians(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can return TAU itself for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Wrap degrees into [0, 360)
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Number of whole steps of size `h` that cover `dt`.
/// A relative slack keeps 3 * 0.1 from turning into 4 steps
pub fn steps_covering(dt: f64, h: f64) -> usize {
    if dt <= 0.0 || h <= 0.0 {
        return 0;
    }
    (dt / h - 1e-9).ceil().max(0.0) as usize
}

/// Number of whole steps of size `h` that fit inside `dt`
pub fn steps_within(dt: f64, h: f64) -> usize {
    if dt <= 0.0 || h <= 0.0 {
        return 0;
    }
    (dt / h + 1e-9).floor().max(0.0) as usize
}
