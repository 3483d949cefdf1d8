// Open-loop references, voltage model and test-mode waveforms

use super::gains::{MotorModel, RPM_TO_RAD};
use super::speed_control::ramp;
use super::transforms::wrap_angle;
use crate::config::params::open_loop::{DEFAULT_ID_SLOPE, DEFAULT_SPEED_SLOPE, RESET_SPEED_SLOPE};
use crate::output::PhaseDuty;

/// Operator-set open-loop commands
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpenLoopCommand {
    /// d-axis current target [A], slew-limited
    pub id: f32,
    /// q-axis current [A], passed through
    pub iq: f32,
    /// Speed target [rpm], slew-limited
    pub speed_rpm: f32,
    /// dq voltage for open-loop voltage control [V]
    pub vd: f32,
    pub vq: f32,
}

impl OpenLoopCommand {
    pub const fn new() -> Self {
        Self {
            id: 0.0,
            iq: 0.0,
            speed_rpm: 0.0,
            vd: 0.0,
            vq: 0.0,
        }
    }
}

/// Slewed open-loop references and the open-loop angle
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpenLoopReference {
    /// [A]
    id_ref: f32,
    /// [rpm]
    speed_rpm: f32,
    /// Electrical angle [rad]
    theta: f32,
    /// [A/s]
    id_slope: f32,
    /// [rpm/s]
    speed_slope: f32,
}

impl Default for OpenLoopReference {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenLoopReference {
    pub const fn new() -> Self {
        Self {
            id_ref: 0.0,
            speed_rpm: 0.0,
            theta: 0.0,
            id_slope: DEFAULT_ID_SLOPE,
            speed_slope: DEFAULT_SPEED_SLOPE,
        }
    }

    /// Slew the d-axis current and speed toward the command, then rotate
    pub fn advance(&mut self, command: &OpenLoopCommand, motor: &MotorModel, dt: f32) {
        self.id_ref = ramp(self.id_ref, command.id, self.id_slope * dt);
        self.speed_rpm = ramp(self.speed_rpm, command.speed_rpm, self.speed_slope * dt);
        self.rotate(motor, dt);
    }

    /// Rotate at the present speed without slewing
    pub fn rotate(&mut self, motor: &MotorModel, dt: f32) {
        self.theta = wrap_angle(self.theta + self.omega(motor) * dt);
    }

    /// Electrical speed [rad/s]
    pub fn omega(&self, motor: &MotorModel) -> f32 {
        self.speed_rpm * RPM_TO_RAD * motor.pole_pairs
    }

    /// Zero references and angle; later speed ramps use the gentler slope
    pub fn reset(&mut self) {
        self.id_ref = 0.0;
        self.speed_rpm = 0.0;
        self.theta = 0.0;
        self.speed_slope = RESET_SPEED_SLOPE;
    }

    pub fn id_ref(&self) -> f32 {
        self.id_ref
    }

    pub fn speed_rpm(&self) -> f32 {
        self.speed_rpm
    }

    pub fn theta(&self) -> f32 {
        self.theta
    }
}

/// Steady-state dq voltage of the motor model
///
/// `Vd = Rs·Id − ω·Lq·Iq`, `Vq = Rs·Iq + ω·(Ld·Id + λf)`
///
/// # Returns
/// Tuple of (vd, vq)
pub fn voltage_model(id: f32, iq: f32, omega: f32, motor: &MotorModel) -> (f32, f32) {
    let vd = motor.rs * id - omega * motor.lq * iq;
    let vq = motor.rs * iq + omega * (motor.ld * id + motor.flux_linkage);
    (vd, vq)
}

/// d-axis square wave alternating every sample, starting negative
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SquareWaveInjection {
    positive_next: bool,
}

impl SquareWaveInjection {
    /// Next injected d-axis voltage
    pub fn next(&mut self, magnitude: f32) -> f32 {
        let v = if self.positive_next { magnitude } else { -magnitude };
        self.positive_next = !self.positive_next;
        v
    }
}

/// Duty vector for the Hall position test
///
/// 1: A, 2: AB, 3: B, 4: BC, 5: C, 6: AC; anything else all phases off.
pub fn hall_test_duty(vector: u8, duty: f32) -> PhaseDuty {
    match vector {
        1 => PhaseDuty::new(duty, 0.0, 0.0),
        2 => PhaseDuty::new(duty, duty, 0.0),
        3 => PhaseDuty::new(0.0, duty, 0.0),
        4 => PhaseDuty::new(0.0, duty, duty),
        5 => PhaseDuty::new(0.0, 0.0, duty),
        6 => PhaseDuty::new(duty, 0.0, duty),
        _ => PhaseDuty::ZERO,
    }
}
