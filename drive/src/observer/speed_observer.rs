// Full-order mechanical speed/load-torque observer
//
// Driven by an electrical angle error. Gains place the three observer poles
// on a Butterworth pattern at the requested bandwidth.

use super::ObserverVariant;
use crate::foc::gains::MotorModel;
use crate::foc::transforms::wrap_angle;

/// Observer feedback gains
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObserverGains {
    /// Pole location, −β [rad/s]
    pub wso: f32,
    pub l1: f32,
    pub l2: f32,
    pub l3: f32,
    /// Angle-rate gain
    pub k1: f32,
    /// Torque gain, Jm·l2
    pub k2: f32,
    /// Load-torque integral gain, −l3
    pub k3: f32,
}

impl ObserverGains {
    /// Butterworth placement for bandwidth β
    ///
    /// # Arguments
    /// * `beta` - Observer bandwidth [rad/s]
    /// * `inertia` - Jm [kg·m²]
    /// * `friction` - Bm [N·m·s/rad]
    pub fn butterworth(beta: f32, inertia: f32, friction: f32) -> Self {
        let wso = -beta;
        let b_over_j = friction / inertia;
        let l1 = -2.0 * wso - b_over_j;
        let l2 = 2.0 * wso * wso - l1 * b_over_j;
        let l3 = wso * wso * wso * inertia;

        Self {
            wso,
            l1,
            l2,
            l3,
            k1: l1,
            k2: inertia * l2,
            k3: -l3,
        }
    }
}

/// Full-order speed/load observer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedObserver {
    variant: ObserverVariant,
    gains: ObserverGains,
    /// Mechanical angle error [rad]
    angle_error: f32,
    /// Electromagnetic torque correction K2·error [N·m]
    te_est: f32,
    /// Load torque integrator [N·m]
    tl_integral: f32,
    /// Torque computed from the dq currents [N·m]
    te_ff: f32,
    /// Speed integrator [rad/s]
    speed_integral: f32,
    /// Speed used in the friction term [rad/s]
    speed_feedback: f32,
    /// Output mechanical speed [rad/s]
    wrm_est: f32,
    /// Mechanical angle [rad]
    theta_rm: f32,
    /// Electrical angle [rad]
    theta_r: f32,
    /// Electrical speed [rad/s]
    wr_est: f32,
}

impl SpeedObserver {
    pub fn new(variant: ObserverVariant, gains: ObserverGains) -> Self {
        Self {
            variant,
            gains,
            angle_error: 0.0,
            te_est: 0.0,
            tl_integral: 0.0,
            te_ff: 0.0,
            speed_integral: 0.0,
            speed_feedback: 0.0,
            wrm_est: 0.0,
            theta_rm: 0.0,
            theta_r: 0.0,
            wr_est: 0.0,
        }
    }

    /// Advance one sample
    ///
    /// # Arguments
    /// * `electrical_error` - Electrical angle error (true − estimate) [rad]
    /// * `id`, `iq` - Measured dq currents for the torque feed-forward [A]
    /// * `motor` - Plant parameters
    /// * `dt` - Sample period (seconds)
    pub fn update(&mut self, electrical_error: f32, id: f32, iq: f32, motor: &MotorModel, dt: f32) {
        let g = self.gains;
        self.angle_error = electrical_error * motor.inv_pole_pairs;

        self.te_est = g.k2 * self.angle_error;
        self.tl_integral += g.k3 * self.angle_error * dt;
        self.te_ff = 1.5
            * motor.pole_pairs
            * (motor.flux_linkage * iq + (motor.ld - motor.lq) * id * iq);

        self.speed_integral += (self.te_est + self.te_ff + self.tl_integral
            - motor.friction * self.speed_feedback)
            * motor.inv_inertia
            * dt;

        match self.variant {
            ObserverVariant::RateCorrectedAngle => {
                self.wrm_est = self.speed_integral;
                self.speed_feedback = self.speed_integral;
                self.theta_rm += (self.wrm_est + g.k1 * self.angle_error) * dt;
            }
            ObserverVariant::CorrectedSpeedOutput => {
                self.wrm_est = self.speed_integral + g.k1 * self.angle_error;
                self.speed_feedback = self.speed_integral;
                self.theta_rm += self.wrm_est * dt;
            }
        }

        self.theta_rm = wrap_angle(self.theta_rm);
        self.theta_r = wrap_angle(motor.pole_pairs * self.theta_rm);
        self.wr_est = self.wrm_est * motor.pole_pairs;
    }

    pub fn set_gains(&mut self, gains: ObserverGains) {
        self.gains = gains;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.variant, self.gains);
    }

    pub fn gains(&self) -> &ObserverGains {
        &self.gains
    }

    /// Electromagnetic torque correction [N·m]
    pub fn te_est(&self) -> f32 {
        self.te_est
    }

    /// Estimated load torque [N·m]
    pub fn load_torque(&self) -> f32 {
        -self.tl_integral
    }

    pub fn tl_integral(&self) -> f32 {
        self.tl_integral
    }

    /// Mechanical speed [rad/s]
    pub fn wrm_est(&self) -> f32 {
        self.wrm_est
    }

    pub fn theta_rm(&self) -> f32 {
        self.theta_rm
    }

    /// Electrical angle [rad]
    pub fn theta_r(&self) -> f32 {
        self.theta_r
    }

    /// Electrical speed [rad/s]
    pub fn wr_est(&self) -> f32 {
        self.wr_est
    }
}
