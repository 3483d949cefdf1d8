// Synchronous-frame current controller and the shared voltage output chain
//
// Every voltage-producing mode (current loop, voltage model, open-loop
// voltage, injection) ends in `apply_voltage`: dq saturation with anti-windup
// bookkeeping, inverse Park at the advanced angle, min-max modulation.

use super::gains::{CurrentGains, MotorModel};
use super::pi_controller::PiController;
use super::svpwm::{modulate, DeadTimeCompensation, Modulation};
use super::transforms::{advance_angle, clarke, inverse_clarke, inverse_park, park, sin_cos};
use crate::output::PhaseDuty;

const INV_SQRT3: f32 = 0.577_350_26; // 1 / sqrt(3)

/// Electrical angle and speed from the selected source
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotorAngle {
    /// [rad]
    pub theta: f32,
    /// [rad/s]
    pub omega: f32,
}

/// DC-link state needed for modulation
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DcLink {
    /// [V]
    pub vdc: f32,
    /// 1 / max(Vdc, 1)
    pub inv_vdc: f32,
}

/// dq current loops with decoupling feed-forward
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentController {
    d: PiController,
    q: PiController,
    r_active: f32,
    /// Smoothing of the unsaturated output, 0 disables
    lpf_alpha: f32,
    id_ref: f32,
    iq_ref: f32,
    /// Measured dq current [A]
    id: f32,
    iq: f32,
    /// Measured stationary current [A]
    i_alpha: f32,
    i_beta: f32,
    angle: RotorAngle,
    theta_adv: f32,
    /// Stationary voltage reference after saturation [V]
    v_alpha: f32,
    v_beta: f32,
    modulation: Modulation,
}

impl CurrentController {
    pub fn new(gains: &CurrentGains) -> Self {
        let mut controller = Self {
            d: PiController::new_symmetric(0.0, 0.0, 0.0),
            q: PiController::new_symmetric(0.0, 0.0, 0.0),
            r_active: 0.0,
            lpf_alpha: 0.0,
            id_ref: 0.0,
            iq_ref: 0.0,
            id: 0.0,
            iq: 0.0,
            i_alpha: 0.0,
            i_beta: 0.0,
            angle: RotorAngle::default(),
            theta_adv: 0.0,
            v_alpha: 0.0,
            v_beta: 0.0,
            modulation: Modulation::default(),
        };
        controller.set_gains(gains);
        controller
    }

    pub fn set_gains(&mut self, gains: &CurrentGains) {
        self.d.set_gains(gains.d.kp, gains.d.ki);
        self.q.set_gains(gains.q.kp, gains.q.ki);
        self.r_active = gains.r_active;
    }

    /// One-pole smoothing of the unsaturated voltage, `alpha` in [0, 1)
    pub fn set_output_filter(&mut self, alpha: f32) {
        self.lpf_alpha = alpha.clamp(0.0, 0.999);
    }

    pub fn set_references(&mut self, id_ref: f32, iq_ref: f32) {
        self.id_ref = id_ref;
        self.iq_ref = iq_ref;
    }

    /// Transform phase currents into the frame given by `angle`
    pub fn measure(&mut self, ia: f32, ib: f32, ic: f32, angle: RotorAngle, dt: f32) {
        self.angle = angle;
        self.theta_adv = advance_angle(angle.theta, angle.omega, dt);

        (self.i_alpha, self.i_beta) = clarke(ia, ib, ic);
        let (sin_theta, cos_theta) = sin_cos(angle.theta);
        (self.id, self.iq) = park(self.i_alpha, self.i_beta, sin_theta, cos_theta);
    }

    /// Run both current loops and modulate
    ///
    /// Call [`measure`](Self::measure) first in the same cycle.
    ///
    /// # Returns
    /// Duty for the three phases
    pub fn regulate(
        &mut self,
        motor: &MotorModel,
        link: DcLink,
        compensation: Option<&DeadTimeCompensation>,
        dt: f32,
    ) -> PhaseDuty {
        let omega = self.angle.omega;
        let err_d = self.id_ref - self.id;
        let err_q = self.iq_ref - self.iq;

        self.d.integrate(err_d, dt);
        self.q.integrate(err_q, dt);

        let vd_ff = -omega * motor.lq * self.iq_ref;
        let vq_ff = omega * (motor.ld * self.id_ref + motor.flux_linkage);

        let vd = self.d.get_kp() * err_d + self.d.get_integral() + vd_ff - self.r_active * self.id;
        let vq = self.q.get_kp() * err_q + self.q.get_integral() + vq_ff - self.r_active * self.iq;

        let alpha = self.lpf_alpha;
        let vd = alpha * self.d.get_unsaturated() + (1.0 - alpha) * vd;
        let vq = alpha * self.q.get_unsaturated() + (1.0 - alpha) * vq;

        self.apply_voltage(vd, vq, link, compensation)
    }

    /// Saturate a dq voltage reference and modulate it at the advanced angle
    ///
    /// Records the anti-windup terms of both axes. With `compensation`, the
    /// current references are projected to the phases for dead-time
    /// correction.
    pub fn apply_voltage(
        &mut self,
        vd_unsat: f32,
        vq_unsat: f32,
        link: DcLink,
        compensation: Option<&DeadTimeCompensation>,
    ) -> PhaseDuty {
        let (sin_adv, cos_adv) = sin_cos(self.theta_adv);
        self.modulate_at(vd_unsat, vq_unsat, sin_adv, cos_adv, link, compensation)
    }

    /// Like [`apply_voltage`](Self::apply_voltage) at a fixed angle of zero
    pub fn apply_voltage_stationary(
        &mut self,
        vd_unsat: f32,
        vq_unsat: f32,
        link: DcLink,
        compensation: Option<&DeadTimeCompensation>,
    ) -> PhaseDuty {
        self.theta_adv = 0.0;
        self.modulate_at(vd_unsat, vq_unsat, 0.0, 1.0, link, compensation)
    }

    fn modulate_at(
        &mut self,
        vd_unsat: f32,
        vq_unsat: f32,
        sin_adv: f32,
        cos_adv: f32,
        link: DcLink,
        compensation: Option<&DeadTimeCompensation>,
    ) -> PhaseDuty {
        let limit = link.vdc * INV_SQRT3;
        self.d.set_symmetric_limit(limit);
        self.q.set_symmetric_limit(limit);
        let vd = self.d.saturate(vd_unsat);
        let vq = self.q.saturate(vq_unsat);

        (self.v_alpha, self.v_beta) = inverse_park(vd, vq, sin_adv, cos_adv);

        let correction = match compensation {
            Some(comp) => {
                let (i_alpha_ref, i_beta_ref) = inverse_park(self.id_ref, self.iq_ref, sin_adv, cos_adv);
                let (ia_ref, ib_ref, ic_ref) = inverse_clarke(i_alpha_ref, i_beta_ref);
                comp.voltages(ia_ref, ib_ref, ic_ref)
            }
            None => [0.0; 3],
        };

        self.modulation = modulate(self.v_alpha, self.v_beta, link.vdc, link.inv_vdc, correction);
        self.modulation.duty
    }

    /// Zero integrators, anti-windup terms and references
    pub fn reset(&mut self) {
        self.d.reset();
        self.q.reset();
        self.lpf_alpha = 0.0;
        self.id_ref = 0.0;
        self.iq_ref = 0.0;
        self.v_alpha = 0.0;
        self.v_beta = 0.0;
        self.modulation = Modulation::default();
    }

    pub fn d_axis(&self) -> &PiController {
        &self.d
    }

    pub fn q_axis(&self) -> &PiController {
        &self.q
    }

    pub fn references(&self) -> (f32, f32) {
        (self.id_ref, self.iq_ref)
    }

    /// Measured dq current [A]
    pub fn current_dq(&self) -> (f32, f32) {
        (self.id, self.iq)
    }

    /// Measured stationary current [A]
    pub fn current_alpha_beta(&self) -> (f32, f32) {
        (self.i_alpha, self.i_beta)
    }

    pub fn angle(&self) -> RotorAngle {
        self.angle
    }

    pub fn theta_adv(&self) -> f32 {
        self.theta_adv
    }

    pub fn modulation(&self) -> &Modulation {
        &self.modulation
    }
}
