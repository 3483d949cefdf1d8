// Extended back-EMF (EEMF) observer in the estimated synchronous frame
//
// A PI current observer per axis. Its output is the disturbance voltage the
// current model cannot explain, i.e. the extended back-EMF; the ratio of the
// d and q components gives the angle error of the rotating frame.

use crate::foc::gains::MotorModel;
use crate::foc::transforms::{park, sin_cos};
use libm::atan2f;

/// Floor on |EEMFq| used by the angle-error computation
const EEMF_Q_FLOOR: f32 = 1.0;

/// Synchronous-frame EEMF observer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EemfObserver {
    /// Observer bandwidth [rad/s]
    bandwidth: f32,
    kp_d: f32,
    ki_d: f32,
    kp_q: f32,
    ki_q: f32,
    /// Rotation angle of the estimated frame [rad]
    theta: f32,
    /// Electrical speed of the estimated frame [rad/s]
    omega: f32,
    /// Stationary voltage reference of the previous call
    v_alpha_old: f32,
    v_beta_old: f32,
    /// Synchronous-frame voltage and current
    vd: f32,
    vq: f32,
    id: f32,
    iq: f32,
    /// Current-model estimates
    id_est: f32,
    iq_est: f32,
    integral_d: f32,
    integral_q: f32,
    /// Estimated extended back-EMF
    eemf_d: f32,
    eemf_q: f32,
    /// Angle error (true − estimate) [rad]
    angle_error: f32,
    /// Angle used for the rotation of this call
    theta_old: f32,
}

impl EemfObserver {
    pub fn new(bandwidth: f32, motor: &MotorModel) -> Self {
        let mut observer = Self {
            bandwidth,
            kp_d: 0.0,
            ki_d: 0.0,
            kp_q: 0.0,
            ki_q: 0.0,
            theta: 0.0,
            omega: 0.0,
            v_alpha_old: 0.0,
            v_beta_old: 0.0,
            vd: 0.0,
            vq: 0.0,
            id: 0.0,
            iq: 0.0,
            id_est: 0.0,
            iq_est: 0.0,
            integral_d: 0.0,
            integral_q: 0.0,
            eemf_d: 0.0,
            eemf_q: 0.0,
            angle_error: 0.0,
            theta_old: 0.0,
        };
        observer.update_gains(motor);
        observer
    }

    /// Kp = Ld·ωc, Ki = Rs·ωc for both axes
    fn update_gains(&mut self, motor: &MotorModel) {
        self.kp_d = motor.ld * self.bandwidth;
        self.ki_d = motor.rs * self.bandwidth;
        self.kp_q = motor.ld * self.bandwidth;
        self.ki_q = motor.rs * self.bandwidth;
    }

    pub fn set_bandwidth(&mut self, bandwidth: f32, motor: &MotorModel) {
        self.bandwidth = bandwidth;
        self.update_gains(motor);
    }

    /// Set the frame the next update rotates into
    pub fn set_rotation(&mut self, theta: f32, omega: f32) {
        self.theta = theta;
        self.omega = omega;
    }

    /// Advance one sample
    ///
    /// # Arguments
    /// * `v_alpha`, `v_beta` - Stationary voltage reference applied this cycle [V]
    /// * `i_alpha`, `i_beta` - Measured stationary current [A]
    /// * `motor` - Plant parameters
    /// * `dt` - Sample period (seconds)
    ///
    /// # Returns
    /// Angle error `atan2(−EEMFd, EEMFq)` [rad]
    pub fn update(
        &mut self,
        v_alpha: f32,
        v_beta: f32,
        i_alpha: f32,
        i_beta: f32,
        motor: &MotorModel,
        dt: f32,
    ) -> f32 {
        self.update_gains(motor);

        let (sin_theta, cos_theta) = sin_cos(self.theta);

        // Half-step delay compensation
        let v_alpha_avg = 0.5 * (self.v_alpha_old + v_alpha);
        let v_beta_avg = 0.5 * (self.v_beta_old + v_beta);
        self.v_alpha_old = v_alpha;
        self.v_beta_old = v_beta;

        (self.vd, self.vq) = park(v_alpha_avg, v_beta_avg, sin_theta, cos_theta);
        (self.id, self.iq) = park(i_alpha, i_beta, sin_theta, cos_theta);

        let err_d = self.id - self.id_est;
        let err_q = self.iq - self.iq_est;
        self.integral_d += dt * self.ki_d * err_d;
        self.integral_q += dt * self.ki_q * err_q;
        self.eemf_d = -(self.kp_d * err_d + self.integral_d);
        self.eemf_q = -(self.kp_q * err_q + self.integral_q);

        // Cross-coupling of the estimated frame
        let vd_ff = self.vd + self.omega * motor.lq * self.iq;
        let vq_ff = self.vq - self.omega * motor.lq * self.id;

        let inv_ld = 1.0 / motor.ld;
        self.id_est += inv_ld * dt * (vd_ff - self.eemf_d - motor.rs * self.id);
        self.iq_est += inv_ld * dt * (vq_ff - self.eemf_q - motor.rs * self.iq);

        if self.eemf_q.abs() < EEMF_Q_FLOOR {
            self.eemf_q = EEMF_Q_FLOOR;
        }
        self.angle_error = atan2f(-self.eemf_d, self.eemf_q);
        self.theta_old = self.theta;

        self.angle_error
    }

    pub fn reset(&mut self) {
        let bandwidth = self.bandwidth;
        let (kp_d, ki_d, kp_q, ki_q) = (self.kp_d, self.ki_d, self.kp_q, self.ki_q);
        *self = Self {
            bandwidth,
            kp_d,
            ki_d,
            kp_q,
            ki_q,
            theta: 0.0,
            omega: 0.0,
            v_alpha_old: 0.0,
            v_beta_old: 0.0,
            vd: 0.0,
            vq: 0.0,
            id: 0.0,
            iq: 0.0,
            id_est: 0.0,
            iq_est: 0.0,
            integral_d: 0.0,
            integral_q: 0.0,
            eemf_d: 0.0,
            eemf_q: 0.0,
            angle_error: 0.0,
            theta_old: 0.0,
        };
    }

    pub fn bandwidth(&self) -> f32 {
        self.bandwidth
    }

    pub fn gains(&self) -> (f32, f32, f32, f32) {
        (self.kp_d, self.ki_d, self.kp_q, self.ki_q)
    }

    /// Estimated EEMF (d, q) as used for the angle error
    pub fn eemf(&self) -> (f32, f32) {
        (self.eemf_d, self.eemf_q)
    }

    /// Measured current in the estimated frame (d, q)
    pub fn current(&self) -> (f32, f32) {
        (self.id, self.iq)
    }

    /// Synchronous-frame current estimate (d, q)
    pub fn current_estimate(&self) -> (f32, f32) {
        (self.id_est, self.iq_est)
    }

    pub fn angle_error(&self) -> f32 {
        self.angle_error
    }

    pub fn theta_old(&self) -> f32 {
        self.theta_old
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotorParams;
    use core::f32::consts::PI;

    fn motor() -> MotorModel {
        let mut params = MotorParams::default();
        params.rs = 0.5;
        params.ld = 1.0e-3;
        params.lq = 1.0e-3;
        MotorModel::new(&params).unwrap()
    }

    #[test]
    fn test_gains_follow_internal_model() {
        let motor = motor();
        let wc = 2.0 * PI * 200.0;
        let obs = EemfObserver::new(wc, &motor);
        let (kp_d, ki_d, kp_q, ki_q) = obs.gains();
        assert_eq!(kp_d, motor.ld * wc);
        assert_eq!(ki_d, motor.rs * wc);
        assert_eq!(kp_d, kp_q);
        assert_eq!(ki_d, ki_q);
    }

    #[test]
    fn test_q_floor_clamp() {
        let motor = motor();
        let mut obs = EemfObserver::new(2.0 * PI * 200.0, &motor);
        // No voltage, no current: EEMF stays zero and q is floored
        for _ in 0..10 {
            let error = obs.update(0.0, 0.0, 0.0, 0.0, &motor, 1.0e-4);
            assert_eq!(obs.eemf().1, 1.0);
            assert_eq!(error, atan2f(-obs.eemf().0, 1.0));
        }
    }

    #[test]
    fn test_q_floor_keeps_d_sign() {
        let motor = motor();
        let mut obs = EemfObserver::new(2.0 * PI * 200.0, &motor);
        // A small measured d current drives a small positive EEMFd
        let error = obs.update(0.0, 0.0, -0.5, 0.0, &motor, 1.0e-4);
        let (eemf_d, eemf_q) = obs.eemf();
        assert_eq!(eemf_q, 1.0);
        assert!(eemf_d > 0.0 && eemf_d < 1.0);
        assert!(error < 0.0);
    }

    #[test]
    fn test_aligned_frame_has_small_error() {
        // Back-EMF of a surface magnet along q at θ = 0: e_β = ω·λ
        let motor = motor();
        let mut obs = EemfObserver::new(2.0 * PI * 200.0, &motor);
        let emf = 20.0;
        for _ in 0..20_000 {
            obs.update(0.0, emf, 0.0, 0.0, &motor, 1.0e-4);
        }
        let (eemf_d, eemf_q) = obs.eemf();
        assert!((eemf_q - emf).abs() < 0.1);
        assert!(eemf_d.abs() < 0.1);
        assert!(obs.angle_error().abs() < 0.01);
    }

    #[test]
    fn test_rotated_frame_reports_offset() {
        // Same EMF but the estimated frame sits 0.3 rad behind
        let motor = motor();
        let mut obs = EemfObserver::new(2.0 * PI * 200.0, &motor);
        obs.set_rotation(-0.3, 0.0);
        let emf = 20.0;
        for _ in 0..20_000 {
            obs.update(0.0, emf, 0.0, 0.0, &motor, 1.0e-4);
        }
        assert!((obs.angle_error() - 0.3).abs() < 0.01);
        assert_eq!(obs.theta_old(), -0.3);
    }

    #[test]
    fn test_voltage_averaging() {
        let motor = motor();
        let mut obs = EemfObserver::new(2.0 * PI * 200.0, &motor);
        obs.update(0.0, 10.0, 0.0, 0.0, &motor, 1.0e-4);
        assert!((obs.vq - 5.0).abs() < 1.0e-3);
        obs.update(0.0, 10.0, 0.0, 0.0, &motor, 1.0e-4);
        assert!((obs.vq - 10.0).abs() < 1.0e-3);
    }
}
