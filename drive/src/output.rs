//! Inverter output sink

/// Duty fractions for the three half-bridges, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseDuty {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl PhaseDuty {
    pub const ZERO: Self = Self {
        a: 0.0,
        b: 0.0,
        c: 0.0,
    };

    pub const fn new(a: f32, b: f32, c: f32) -> Self {
        Self { a, b, c }
    }

    /// Clamp every phase to `[0, max]`
    pub fn clamped(self, max: f32) -> Self {
        Self {
            a: self.a.clamp(0.0, max),
            b: self.b.clamp(0.0, max),
            c: self.c.clamp(0.0, max),
        }
    }
}

/// Where the control cycle delivers its result.
///
/// The firmware implements this on top of the complementary PWM timer; tests
/// use a recording mock.
pub trait InverterOutput {
    /// Load new compare values. Takes effect on the next PWM period.
    fn set_duty(&mut self, duty: PhaseDuty);
    /// Enable the gate drivers.
    fn enable(&mut self);
    /// Disable the gate drivers. Must be safe to call repeatedly.
    fn disable(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped() {
        let duty = PhaseDuty::new(-0.1, 0.5, 1.2).clamped(0.95);
        assert_eq!(duty, PhaseDuty::new(0.0, 0.5, 0.95));
    }
}
