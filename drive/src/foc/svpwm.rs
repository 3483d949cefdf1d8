// Space-vector modulation by min-max zero-sequence injection
//
// Phase references get a common offset of −(max + min)/2, which centres the
// three voltages in the DC link and gives the same linear range as classical
// sector-based SVPWM without any sector detection.

use crate::output::PhaseDuty;
use libm::atanf;

/// Result of one modulation step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Modulation {
    /// Phase-to-midpoint voltages after offset, compensation and clamping [V]
    pub phase_voltage: [f32; 3],
    /// Zero-sequence offset that was injected [V]
    pub offset: f32,
    pub duty: PhaseDuty,
}

/// Dead-time compensation curve `A·atan(B·i)`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeadTimeCompensation {
    pub a: f32,
    pub b: f32,
}

impl DeadTimeCompensation {
    /// Per-phase voltage correction for the given phase current references
    pub fn voltages(&self, i_a: f32, i_b: f32, i_c: f32) -> [f32; 3] {
        [
            self.a * atanf(self.b * i_a),
            self.a * atanf(self.b * i_b),
            self.a * atanf(self.b * i_c),
        ]
    }
}

/// Min-max zero-sequence offset
///
/// # Returns
/// `−0.5·(max(Va,Vb,Vc) + min(Va,Vb,Vc))`
pub fn min_max_offset(va: f32, vb: f32, vc: f32) -> f32 {
    let max = va.max(vb).max(vc);
    let min = va.min(vb).min(vc);
    -0.5 * (max + min)
}

/// Convert a phase-to-midpoint voltage to a duty fraction
///
/// # Arguments
/// * `voltage` - Phase voltage referred to the DC-link midpoint [V]
/// * `inv_vdc` - 1 / Vdc
///
/// # Returns
/// Duty in [0, 1]
pub fn voltage_to_duty(voltage: f32, inv_vdc: f32) -> f32 {
    (voltage * inv_vdc + 0.5).clamp(0.0, 1.0)
}

/// Modulate a stationary-frame voltage reference
///
/// # Arguments
/// * `v_alpha`, `v_beta` - Voltage reference [V]
/// * `vdc` - DC-link voltage [V]
/// * `inv_vdc` - 1 / Vdc (guarded by the caller)
/// * `compensation` - Per-phase additive correction, zeros when disabled
///
/// # Algorithm
/// 1. Inverse Clarke to phase references
/// 2. Add the min-max offset and the compensation term
/// 3. Clamp each phase to ±Vdc/2
/// 4. duty = V/Vdc + 0.5, clamped to [0, 1]
pub fn modulate(
    v_alpha: f32,
    v_beta: f32,
    vdc: f32,
    inv_vdc: f32,
    compensation: [f32; 3],
) -> Modulation {
    let (va, vb, vc) = super::transforms::inverse_clarke(v_alpha, v_beta);
    let offset = min_max_offset(va, vb, vc);
    let half = 0.5 * vdc;

    let phase_voltage = [
        (va + offset + compensation[0]).clamp(-half, half),
        (vb + offset + compensation[1]).clamp(-half, half),
        (vc + offset + compensation[2]).clamp(-half, half),
    ];

    let duty = PhaseDuty::new(
        voltage_to_duty(phase_voltage[0], inv_vdc),
        voltage_to_duty(phase_voltage[1], inv_vdc),
        voltage_to_duty(phase_voltage[2], inv_vdc),
    );

    Modulation {
        phase_voltage,
        offset,
        duty,
    }
}
