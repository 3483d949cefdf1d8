// PI (Proportional-Integral) controller with back-calculation anti-windup

/// Floor applied to Kp before inverting it into the anti-windup gain
const MIN_KP: f32 = 1.0e-9;

/// PI controller with back-calculation anti-windup and output limiting
///
/// The anti-windup term `unsaturated − saturated` recorded by one cycle is fed
/// into the integrator input of the next cycle, never the one that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PiController {
    /// Proportional gain
    kp: f32,
    /// Integral gain
    ki: f32,
    /// Anti-windup gain, 1 / Kp
    ka: f32,
    /// Integral accumulator (already scaled by Ki)
    integral: f32,
    /// Output before clamping
    unsaturated: f32,
    /// Output after clamping
    output: f32,
    /// unsaturated − output of the last cycle
    anti_windup: f32,
    /// Minimum output limit
    output_min: f32,
    /// Maximum output limit
    output_max: f32,
}

impl PiController {
    /// Create a new PI controller
    ///
    /// # Arguments
    /// * `kp` - Proportional gain
    /// * `ki` - Integral gain
    /// * `output_min` - Minimum output limit
    /// * `output_max` - Maximum output limit
    pub fn new(kp: f32, ki: f32, output_min: f32, output_max: f32) -> Self {
        Self {
            kp,
            ki,
            ka: anti_windup_gain(kp),
            integral: 0.0,
            unsaturated: 0.0,
            output: 0.0,
            anti_windup: 0.0,
            output_min,
            output_max,
        }
    }

    /// Create a symmetric PI controller (output range: -limit to +limit)
    pub fn new_symmetric(kp: f32, ki: f32, output_limit: f32) -> Self {
        Self::new(kp, ki, -output_limit, output_limit)
    }

    /// Advance the integrator by one step
    ///
    /// `integral += Ki·(error − Ka·anti_windup)·dt`, using the anti-windup
    /// term recorded by the previous [`saturate`](Self::saturate).
    pub fn integrate(&mut self, error: f32, dt: f32) {
        self.integral += self.ki * (error - self.ka * self.anti_windup) * dt;
    }

    /// Clamp an unsaturated output and record the anti-windup term
    ///
    /// # Returns
    /// Output limited to output_min..output_max
    pub fn saturate(&mut self, unsaturated: f32) -> f32 {
        self.unsaturated = unsaturated;
        self.output = unsaturated.clamp(self.output_min, self.output_max);
        self.anti_windup = self.unsaturated - self.output;
        self.output
    }

    /// Update the PI controller
    ///
    /// # Arguments
    /// * `error` - Reference minus measurement
    /// * `feedforward` - Added to the output before clamping
    /// * `dt` - Time step (seconds)
    ///
    /// # Returns
    /// Controller output (limited to output_min..output_max)
    pub fn update(&mut self, error: f32, feedforward: f32, dt: f32) -> f32 {
        self.integrate(error, dt);
        self.saturate(self.kp * error + self.integral + feedforward)
    }

    /// Reset all state to zero, keeping gains and limits
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.unsaturated = 0.0;
        self.output = 0.0;
        self.anti_windup = 0.0;
    }

    /// Set the proportional and integral gains, deriving Ka = 1 / max(Kp, 1e-9)
    pub fn set_gains(&mut self, kp: f32, ki: f32) {
        self.kp = kp;
        self.ki = ki;
        self.ka = anti_windup_gain(kp);
    }

    /// Set the output limits
    pub fn set_limits(&mut self, output_min: f32, output_max: f32) {
        self.output_min = output_min;
        self.output_max = output_max;
    }

    /// Set symmetric output limits (±limit)
    pub fn set_symmetric_limit(&mut self, output_limit: f32) {
        self.output_min = -output_limit;
        self.output_max = output_limit;
    }

    /// Get the saturated output
    pub fn get_output(&self) -> f32 {
        self.output
    }

    /// Get the output before clamping
    pub fn get_unsaturated(&self) -> f32 {
        self.unsaturated
    }

    /// Get the current integral term
    pub fn get_integral(&self) -> f32 {
        self.integral
    }

    pub fn get_anti_windup(&self) -> f32 {
        self.anti_windup
    }

    /// Get the proportional gain
    pub fn get_kp(&self) -> f32 {
        self.kp
    }

    /// Get the integral gain
    pub fn get_ki(&self) -> f32 {
        self.ki
    }

    pub fn get_ka(&self) -> f32 {
        self.ka
    }

    /// Check if output is currently saturated
    pub fn is_saturated(&self) -> bool {
        self.anti_windup != 0.0
    }
}

fn anti_windup_gain(kp: f32) -> f32 {
    1.0 / kp.max(MIN_KP)
}
