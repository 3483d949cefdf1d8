//! Sensorless position estimation
//!
//! The EEMF observer measures how far its rotating frame is from the rotor;
//! a tracking loop (the full-order speed observer or a plain PLL) integrates
//! that error into an angle and speed and turns the frame for the next cycle.

pub mod eemf;
pub mod speed_observer;

use crate::config::ObserverConfig;
use crate::foc::gains::{MotorModel, PiGains, RAD_TO_RPM};
use crate::foc::transforms::wrap_angle;
use eemf::EemfObserver;
use speed_observer::{ObserverGains, SpeedObserver};

/// Feedback arrangement of the full-order observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ObserverVariant {
    /// Speed output is the pure integrator; K1·error is added to the angle rate
    RateCorrectedAngle,
    /// Speed output includes K1·error and the angle integrates that output
    CorrectedSpeedOutput,
}

/// How the EEMF angle error is turned into a tracked angle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackingLoop {
    /// Full-order speed/load observer
    Observer,
    /// PI phase-locked loop with the sensorless PLL gains
    Pll,
}

/// EEMF observer closed through a tracking loop
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorlessTracker {
    eemf: EemfObserver,
    observer: SpeedObserver,
    tracking: TrackingLoop,
    pll_integral: f32,
    /// Tracked electrical angle [rad]
    theta: f32,
    /// Tracked electrical speed [rad/s]
    omega: f32,
    /// Low-passed electrical speed [rad/s]
    omega_filtered: f32,
    speed_lpf: f32,
}

impl SensorlessTracker {
    pub fn new(config: &ObserverConfig, eemf_bandwidth: f32, motor: &MotorModel) -> Self {
        let gains = ObserverGains::butterworth(
            config.speed_observer_bandwidth,
            motor.inertia,
            motor.friction,
        );
        Self {
            eemf: EemfObserver::new(eemf_bandwidth, motor),
            observer: SpeedObserver::new(config.variant, gains),
            tracking: config.tracking,
            pll_integral: 0.0,
            theta: 0.0,
            omega: 0.0,
            omega_filtered: 0.0,
            speed_lpf: config.speed_lpf,
        }
    }

    /// Run the EEMF observer and the tracking loop for one sample
    ///
    /// # Arguments
    /// * `v_alpha`, `v_beta` - Stationary voltage applied this cycle [V]
    /// * `i_alpha`, `i_beta` - Measured stationary current [A]
    /// * `pll` - Gains for [`TrackingLoop::Pll`]
    /// * `motor` - Plant parameters
    /// * `dt` - Sample period (seconds)
    ///
    /// # Returns
    /// Tuple of (tracked angle, tracked speed) electrical
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        v_alpha: f32,
        v_beta: f32,
        i_alpha: f32,
        i_beta: f32,
        pll: &PiGains,
        motor: &MotorModel,
        dt: f32,
    ) -> (f32, f32) {
        let error = self.eemf.update(v_alpha, v_beta, i_alpha, i_beta, motor, dt);

        match self.tracking {
            TrackingLoop::Observer => {
                let (id, iq) = self.eemf.current();
                self.observer.update(error, id, iq, motor, dt);
                self.theta = self.observer.theta_r();
                self.omega = self.observer.wr_est();
            }
            TrackingLoop::Pll => {
                self.pll_integral += dt * pll.ki * error;
                self.omega = pll.kp * error + self.pll_integral;
                self.theta = wrap_angle(self.theta + dt * self.omega);
            }
        }

        let alpha = (self.speed_lpf * dt).min(1.0);
        self.omega_filtered += alpha * (self.omega - self.omega_filtered);

        self.eemf.set_rotation(self.theta, self.omega);
        (self.theta, self.omega)
    }

    pub fn set_eemf_bandwidth(&mut self, bandwidth: f32, motor: &MotorModel) {
        self.eemf.set_bandwidth(bandwidth, motor);
    }

    /// Re-derive the observer gains after a parameter change
    pub fn set_observer_bandwidth(&mut self, bandwidth: f32, motor: &MotorModel) {
        self.observer
            .set_gains(ObserverGains::butterworth(bandwidth, motor.inertia, motor.friction));
    }

    pub fn reset(&mut self) {
        self.eemf.reset();
        self.observer.reset();
        self.pll_integral = 0.0;
        self.theta = 0.0;
        self.omega = 0.0;
        self.omega_filtered = 0.0;
    }

    pub fn eemf(&self) -> &EemfObserver {
        &self.eemf
    }

    pub fn observer(&self) -> &SpeedObserver {
        &self.observer
    }

    /// Tracked electrical angle [rad]
    pub fn theta(&self) -> f32 {
        self.theta
    }

    /// Tracked electrical speed [rad/s]
    pub fn omega(&self) -> f32 {
        self.omega
    }

    /// Low-passed electrical speed [rad/s]
    pub fn omega_filtered(&self) -> f32 {
        self.omega_filtered
    }

    pub fn speed_rpm(&self, inv_pole_pairs: f32) -> f32 {
        self.omega_filtered * inv_pole_pairs * RAD_TO_RPM
    }
}
