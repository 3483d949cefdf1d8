// Hall sensor PLL for rotor angle and speed estimation
// Three digital Hall inputs give a 60° reference angle; a PI tracking loop
// turns that staircase into a continuous electrical angle and speed.

use super::gains::{PiGains, RAD_TO_RPM};
use super::transforms::wrap_angle;
use core::f32::consts::PI;

/// Hall code (a | b<<1 | c<<2) → electrical reference angle.
/// Codes 0 and 7 are not produced by a healthy sensor.
const HALL_ANGLE_TABLE: [Option<f32>; 8] = [
    None,                  // 0b000: Invalid
    Some(PI),              // 0b001
    Some(-PI / 3.0),       // 0b010
    Some(-2.0 * PI / 3.0), // 0b011
    Some(PI / 3.0),        // 0b100
    Some(2.0 * PI / 3.0),  // 0b101
    Some(0.0),             // 0b110
    None,                  // 0b111: Invalid
];

/// Logic levels of the three Hall inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallPins {
    pub a: bool,
    pub b: bool,
    pub c: bool,
}

impl HallPins {
    /// Pack the three levels into a 3-bit code
    pub fn code(&self) -> u8 {
        (self.a as u8) | ((self.b as u8) << 1) | ((self.c as u8) << 2)
    }
}

/// Reference angle of a Hall code, `None` for the invalid codes 0 and 7
pub fn hall_angle(code: u8) -> Option<f32> {
    HALL_ANGLE_TABLE.get(code as usize).copied().flatten()
}

/// Hall-sensor PLL state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallPll {
    /// Last 3-bit code read
    code: u8,
    /// Reference angle of the last valid code [rad]
    reference: f32,
    /// reference − estimate, wrapped [rad]
    angle_error: f32,
    /// PI integrator [rad/s]
    integral: f32,
    /// Estimated electrical angle [rad]
    theta: f32,
    /// Estimated electrical speed [rad/s]
    omega: f32,
}

impl HallPll {
    pub const fn new() -> Self {
        Self {
            code: 0,
            reference: 0.0,
            angle_error: 0.0,
            integral: 0.0,
            theta: 0.0,
            omega: 0.0,
        }
    }

    /// Read the Hall pins and advance the PLL by one sample
    ///
    /// An invalid code keeps the previous reference angle.
    ///
    /// # Arguments
    /// * `pins` - Current Hall input levels
    /// * `gains` - PLL gain pair
    /// * `dt` - Sample period (seconds)
    ///
    /// # Returns
    /// Tuple of (electrical angle in radians, electrical speed in rad/s)
    pub fn update(&mut self, pins: HallPins, gains: &PiGains, dt: f32) -> (f32, f32) {
        self.code = pins.code();
        match hall_angle(self.code) {
            Some(angle) => self.reference = angle,
            None => trace!("Invalid hall code: {}", self.code),
        }

        self.angle_error = wrap_angle(self.reference - self.theta);
        self.integral += dt * gains.ki * self.angle_error;
        self.omega = gains.kp * self.angle_error + self.integral;
        self.theta = wrap_angle(self.theta + dt * self.omega);

        (self.theta, self.omega)
    }

    /// Clear the loop state, keeping the last reference angle
    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn reference(&self) -> f32 {
        self.reference
    }

    pub fn angle_error(&self) -> f32 {
        self.angle_error
    }

    /// Estimated electrical angle [rad]
    pub fn theta(&self) -> f32 {
        self.theta
    }

    /// Estimated electrical speed [rad/s]
    pub fn omega(&self) -> f32 {
        self.omega
    }

    /// Estimated mechanical speed [rpm]
    pub fn speed_rpm(&self, inv_pole_pairs: f32) -> f32 {
        self.omega * inv_pole_pairs * RAD_TO_RPM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn pins(code: u8) -> HallPins {
        HallPins {
            a: code & 0b001 != 0,
            b: code & 0b010 != 0,
            c: code & 0b100 != 0,
        }
    }

    fn gains() -> PiGains {
        PiGains::critically_damped(2.0 * PI * 10.0)
    }

    #[test]
    fn test_code_packing() {
        for code in 0..8u8 {
            assert_eq!(pins(code).code(), code);
        }
    }

    #[test]
    fn test_mapping_table() {
        assert_eq!(hall_angle(6), Some(0.0));
        assert_eq!(hall_angle(4), Some(PI / 3.0));
        assert_eq!(hall_angle(5), Some(2.0 * PI / 3.0));
        assert_eq!(hall_angle(1), Some(PI));
        assert_eq!(hall_angle(3), Some(-2.0 * PI / 3.0));
        assert_eq!(hall_angle(2), Some(-PI / 3.0));
        assert_eq!(hall_angle(0), None);
        assert_eq!(hall_angle(7), None);
    }

    #[test]
    fn test_invalid_code_holds_last_reference() {
        let mut pll = HallPll::new();
        pll.update(pins(5), &gains(), 1.0e-4);
        assert_eq!(pll.reference(), 2.0 * PI / 3.0);

        pll.update(pins(0), &gains(), 1.0e-4);
        assert_eq!(pll.code(), 0);
        assert_eq!(pll.reference(), 2.0 * PI / 3.0);

        pll.update(pins(7), &gains(), 1.0e-4);
        assert_eq!(pll.reference(), 2.0 * PI / 3.0);
    }

    #[test]
    fn test_locks_to_static_code() {
        let mut pll = HallPll::new();
        for _ in 0..20_000 {
            pll.update(pins(4), &gains(), 1.0e-4);
        }
        assert!(approx_eq(pll.theta(), PI / 3.0));
        assert!(pll.omega().abs() < 0.01);
    }

    #[test]
    fn test_tracks_rotation_direction() {
        // Forward sequence 6 → 4 → 5 → 1 → 3 → 2 at 20 Hz electrical
        let sequence = [6u8, 4, 5, 1, 3, 2];
        let mut pll = HallPll::new();
        let dt = 1.0e-4;
        let per_sector = 83; // 1 / (20 Hz · 6) / 100 µs
        let revolution = 6 * per_sector;
        let steps = 80 * revolution;
        let mut omega_sum = 0.0;
        for step in 0..steps {
            let code = sequence[(step / per_sector) % 6];
            let (theta, omega) = pll.update(pins(code), &gains(), dt);
            assert!(theta > -PI && theta <= PI);
            if step >= steps - revolution {
                omega_sum += omega;
            }
        }
        // Kp·error ripples with the 60° staircase; the mean over one
        // electrical revolution is the true speed
        let expected = 2.0 * PI / (revolution as f32 * dt);
        let mean = omega_sum / revolution as f32;
        assert!((mean - expected).abs() < 0.05 * expected);
    }

    #[test]
    fn test_speed_rpm() {
        let mut pll = HallPll::new();
        pll.omega = 2.0 * PI * 50.0;
        assert!((pll.speed_rpm(0.5) - 1500.0).abs() < 0.01);
    }
}
