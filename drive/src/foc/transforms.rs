// Coordinate transformations for FOC (Field Oriented Control)
// Clarke/Park, their inverses, and angle helpers shared by every estimator

use core::f32::consts::{PI, TAU};
use libm::{cosf, floorf, sinf};

// Enable idsp-based fast trigonometric functions
const USE_IDSP_COSSIN: bool = true;

const INV_SQRT3: f32 = 0.577_350_26; // 1 / sqrt(3)
const SQRT3_DIV_2: f32 = 0.866_025_4; // sqrt(3) / 2

/// Wrap an angle to the half-open interval (−π, π]
///
/// # Arguments
/// * `angle` - Angle in radians, any magnitude
///
/// # Returns
/// Equivalent angle in (−π, π]
pub fn wrap_angle(angle: f32) -> f32 {
    let mut wrapped = angle - TAU * floorf((angle + PI) / TAU);
    // floorf can land one period off when angle + π rounds onto a multiple of 2π
    if wrapped <= -PI {
        wrapped += TAU;
    }
    if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

/// Sine and cosine of an electrical angle
///
/// # Returns
/// Tuple of (sin, cos)
///
/// # Implementation
/// Uses idsp::cossin() (~40 cycles on Cortex-M) unless USE_IDSP_COSSIN is off.
pub fn sin_cos(theta: f32) -> (f32, f32) {
    if USE_IDSP_COSSIN {
        sin_cos_idsp(theta)
    } else {
        (sinf(theta), cosf(theta))
    }
}

#[inline]
fn sin_cos_idsp(theta: f32) -> (f32, f32) {
    // idsp phase: i32::MIN..=i32::MAX spans −π..π
    const SCALE: f32 = 2147483648.0 / PI; // 2^31 / π
    const I32_TO_F32: f32 = 1.0 / 2147483648.0; // 1 / 2^31

    // Saturating cast maps +π onto i32::MAX
    let phase = (wrap_angle(theta) * SCALE) as i32;
    let (cos_i32, sin_i32) = idsp::cossin(phase);

    (sin_i32 as f32 * I32_TO_F32, cos_i32 as f32 * I32_TO_F32)
}

/// Project an angle forward by 1.5 sample periods of rotation
///
/// Compensates the one-period PWM update delay plus half a period of
/// averaging in the modulator.
pub fn advance_angle(theta: f32, omega: f32, dt: f32) -> f32 {
    wrap_angle(theta + 1.5 * omega * dt)
}

/// Clarke transformation (abc → αβ), amplitude invariant
///
/// Uses all three phases, so a common-mode component cancels.
///
/// # Returns
/// Tuple of (alpha, beta)
pub fn clarke(a: f32, b: f32, c: f32) -> (f32, f32) {
    let alpha = (2.0 * a - b - c) / 3.0;
    let beta = (b - c) * INV_SQRT3;
    (alpha, beta)
}

/// Park transformation (αβ → dq)
///
/// # Arguments
/// * `alpha`, `beta` - Stationary-frame components
/// * `sin_theta`, `cos_theta` - Sine/cosine of the electrical angle
///
/// # Returns
/// Tuple of (d, q)
pub fn park(alpha: f32, beta: f32, sin_theta: f32, cos_theta: f32) -> (f32, f32) {
    let d = alpha * cos_theta + beta * sin_theta;
    let q = -alpha * sin_theta + beta * cos_theta;
    (d, q)
}

/// Inverse Park transformation (dq → αβ)
///
/// Transforms from the rotating dq reference frame to the stationary αβ frame
///
/// # Returns
/// Tuple of (alpha, beta)
pub fn inverse_park(d: f32, q: f32, sin_theta: f32, cos_theta: f32) -> (f32, f32) {
    let alpha = d * cos_theta - q * sin_theta;
    let beta = d * sin_theta + q * cos_theta;
    (alpha, beta)
}

/// Inverse Clarke transformation (αβ → abc)
///
/// # Returns
/// Tuple of (a, b, c) three-phase quantities
pub fn inverse_clarke(alpha: f32, beta: f32) -> (f32, f32, f32) {
    let a = alpha;
    let b = -0.5 * alpha + SQRT3_DIV_2 * beta;
    let c = -0.5 * alpha - SQRT3_DIV_2 * beta;
    (a, b, c)
}
