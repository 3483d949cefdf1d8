// Speed loop and torque-command sources

use super::gains::{MotorModel, PiGains, RAD_TO_RPM, RPM_TO_RAD};
use super::pi_controller::PiController;
use crate::config::params::open_loop::SPEED_REFERENCE_RATE;
use libm::sqrtf;

/// Commands below this fraction of rated are forced to zero
const DEAD_ZONE: f32 = 0.05;

/// RC duty at zero torque
const RC_DUTY_ZERO: f32 = 0.15;
/// Torque per unit RC duty, in multiples of rated torque
const RC_DUTY_GAIN: f32 = 20.0;

/// Speed PI with reference ramp
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedController {
    pi: PiController,
    /// Command after the dead-zone [rpm]
    wrpm_set: f32,
    /// Ramped reference [rad/s, mechanical]
    wrm_ref: f32,
    /// Largest reference change per sample [rad/s]
    ramp_step: f32,
    /// Last speed error [rad/s]
    wrm_err: f32,
}

impl SpeedController {
    pub fn new(gains: &PiGains, motor: &MotorModel, dt: f32) -> Self {
        let mut controller = Self {
            pi: PiController::new_symmetric(0.0, 0.0, 0.0),
            wrpm_set: 0.0,
            wrm_ref: 0.0,
            ramp_step: SPEED_REFERENCE_RATE * RPM_TO_RAD * dt,
            wrm_err: 0.0,
        };
        controller.set_gains(gains, motor);
        controller
    }

    /// Torque output is limited to ±rated torque
    pub fn set_gains(&mut self, gains: &PiGains, motor: &MotorModel) {
        self.pi.set_gains(gains.kp, gains.ki);
        self.pi.set_symmetric_limit(motor.rated_torque);
    }

    /// Run one sample
    ///
    /// # Arguments
    /// * `command_rpm` - External speed command [rpm]
    /// * `wrm` - Measured mechanical speed [rad/s]
    /// * `motor` - Rated speed for the dead-zone
    /// * `dt` - Sample period (seconds)
    ///
    /// # Returns
    /// Torque reference [N·m]
    pub fn update(&mut self, command_rpm: f32, wrm: f32, motor: &MotorModel, dt: f32) -> f32 {
        self.wrpm_set = if command_rpm.abs() < DEAD_ZONE * motor.rated_speed_rpm {
            0.0
        } else {
            command_rpm
        };

        let target = self.wrpm_set * RPM_TO_RAD;
        self.wrm_ref = ramp(self.wrm_ref, target, self.ramp_step);

        self.wrm_err = self.wrm_ref - wrm;
        self.pi.update(self.wrm_err, 0.0, dt)
    }

    pub fn reset(&mut self) {
        self.pi.reset();
        self.wrpm_set = 0.0;
        self.wrm_ref = 0.0;
        self.wrm_err = 0.0;
    }

    /// Torque reference [N·m]
    pub fn te_ref(&self) -> f32 {
        self.pi.get_output()
    }

    /// Ramped reference [rad/s, mechanical]
    pub fn wrm_ref(&self) -> f32 {
        self.wrm_ref
    }

    pub fn wrpm_ref(&self) -> f32 {
        self.wrm_ref * RAD_TO_RPM
    }

    pub fn pi(&self) -> &PiController {
        &self.pi
    }
}

/// Move `value` toward `target` by at most `step`
pub fn ramp(value: f32, target: f32, step: f32) -> f32 {
    if value < target - step {
        value + step
    } else if value > target + step {
        value - step
    } else {
        target
    }
}

/// Torque reference from an RC-style duty input
///
/// `(duty − 0.15)·20·Te_rated`, zeroed inside ±5 % of rated torque.
pub fn torque_from_duty(duty: f32, rated_torque: f32) -> f32 {
    let torque = (duty - RC_DUTY_ZERO) * RC_DUTY_GAIN * rated_torque;
    if torque.abs() < DEAD_ZONE * rated_torque {
        0.0
    } else {
        torque
    }
}

/// q-axis current for a torque reference, limited so |i| stays within `current_limit`
///
/// # Returns
/// Tuple of (unsaturated iq, limited iq)
pub fn torque_to_iq(te_ref: f32, id_ref: f32, motor: &MotorModel) -> (f32, f32) {
    let iq_unsat = te_ref * motor.inv_kt;
    let headroom = motor.current_limit * motor.current_limit - id_ref * id_ref;
    let iq_max = sqrtf(headroom.max(0.0));
    (iq_unsat, iq_unsat.clamp(-iq_max, iq_max))
}
