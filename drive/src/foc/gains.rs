// Motor model and bandwidth-derived controller gains

use crate::config::{Bandwidths, ConfigError, MotorParams};
use crate::config::params::bandwidth::HALL_PLL;
use core::f32::consts::PI;

/// rpm → rad/s
pub const RPM_TO_RAD: f32 = 2.0 * PI / 60.0;
/// rad/s → rpm
pub const RAD_TO_RPM: f32 = 60.0 / (2.0 * PI);

/// Speed-loop integral gain relative to Kp·ω
const SPEED_KI_SCALE: f32 = 0.25;
/// Damping used for every PLL gain pair
const PLL_DAMPING: f32 = 0.707;

/// Motor constants with the derived quantities the loops need every cycle
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorModel {
    pub rs: f32,
    pub ld: f32,
    pub lq: f32,
    pub flux_linkage: f32,
    pub pole_pairs: f32,
    pub inv_pole_pairs: f32,
    /// Torque constant 1.5·PP·λf [N·m/A]
    pub kt: f32,
    pub inv_kt: f32,
    pub inertia: f32,
    pub inv_inertia: f32,
    pub friction: f32,
    pub align_current: f32,
    pub rated_current: f32,
    pub current_limit: f32,
    pub rated_speed_rpm: f32,
    pub rated_torque: f32,
    /// Kt·current_limit
    pub torque_limit: f32,
}

impl MotorModel {
    pub fn new(params: &MotorParams) -> Result<Self, ConfigError> {
        params.validate()?;

        let pole_pairs = params.pole_pairs as f32;
        let kt = 1.5 * pole_pairs * params.flux_linkage;

        Ok(Self {
            rs: params.rs,
            ld: params.ld,
            lq: params.lq,
            flux_linkage: params.flux_linkage,
            pole_pairs,
            inv_pole_pairs: 1.0 / pole_pairs,
            kt,
            inv_kt: 1.0 / kt,
            inertia: params.inertia,
            inv_inertia: 1.0 / params.inertia,
            friction: params.friction,
            align_current: params.align_current,
            rated_current: params.rated_current,
            current_limit: params.current_limit,
            rated_speed_rpm: params.rated_speed_rpm,
            rated_torque: params.rated_torque,
            torque_limit: kt * params.current_limit,
        })
    }
}

/// Proportional/integral gain pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PiGains {
    pub kp: f32,
    pub ki: f32,
}

impl PiGains {
    /// PLL pair with ζ = 0.707: Kp = 2ζω, Ki = ω²
    pub fn critically_damped(bandwidth: f32) -> Self {
        Self {
            kp: 2.0 * PLL_DAMPING * bandwidth,
            ki: bandwidth * bandwidth,
        }
    }
}

/// Current-loop gains
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentGains {
    pub d: PiGains,
    pub q: PiGains,
    /// Active-resistance damping [Ω]
    pub r_active: f32,
}

impl CurrentGains {
    /// Kp = ωcc·L per axis, Ki = ωcc·Rs
    pub fn from_bandwidth(bandwidth: f32, motor: &MotorModel) -> Self {
        Self {
            d: PiGains {
                kp: bandwidth * motor.ld,
                ki: bandwidth * motor.rs,
            },
            q: PiGains {
                kp: bandwidth * motor.lq,
                ki: bandwidth * motor.rs,
            },
            r_active: motor.rs,
        }
    }
}

/// Speed-loop gains: Kp = Jm·ωsc, Ki = Kp·ωsc/4
pub fn speed_gains(bandwidth: f32, motor: &MotorModel) -> PiGains {
    let kp = motor.inertia * bandwidth;
    PiGains {
        kp,
        ki: kp * bandwidth * SPEED_KI_SCALE,
    }
}

/// Every bandwidth-derived gain in the drive
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GainSchedule {
    pub bandwidths: Bandwidths,
    pub current: CurrentGains,
    pub speed: PiGains,
    /// Sensorless angle-tracking PLL
    pub pll: PiGains,
    /// Hall PLL, fixed at 10 Hz
    pub hall_pll: PiGains,
}

impl GainSchedule {
    pub fn new(bandwidths: Bandwidths, motor: &MotorModel) -> Result<Self, ConfigError> {
        bandwidths.validate()?;

        let mut schedule = Self {
            bandwidths,
            current: CurrentGains::default(),
            speed: PiGains::default(),
            pll: PiGains::critically_damped(bandwidths.pll),
            hall_pll: PiGains::critically_damped(HALL_PLL),
        };
        schedule.update(motor);
        Ok(schedule)
    }

    /// Recompute current and speed gains from the stored bandwidths.
    ///
    /// Runs every cycle so parameter changes take effect immediately.
    pub fn update(&mut self, motor: &MotorModel) {
        self.current = CurrentGains::from_bandwidth(self.bandwidths.current, motor);
        self.speed = speed_gains(self.bandwidths.speed, motor);
    }

    pub fn set_current_bandwidth(&mut self, bandwidth: f32, motor: &MotorModel) -> Result<(), ConfigError> {
        if !(bandwidth > 0.0) {
            return Err(ConfigError::NonPositiveBandwidth);
        }
        self.bandwidths.current = bandwidth;
        self.update(motor);
        Ok(())
    }

    pub fn set_speed_bandwidth(
        &mut self,
        bandwidth: f32,
        damping: f32,
        motor: &MotorModel,
    ) -> Result<(), ConfigError> {
        if !(bandwidth > 0.0) {
            return Err(ConfigError::NonPositiveBandwidth);
        }
        self.bandwidths.speed = bandwidth;
        self.bandwidths.speed_damping = damping;
        self.update(motor);
        Ok(())
    }

    pub fn set_pll_bandwidth(&mut self, bandwidth: f32) -> Result<(), ConfigError> {
        if !(bandwidth > 0.0) {
            return Err(ConfigError::NonPositiveBandwidth);
        }
        self.bandwidths.pll = bandwidth;
        self.pll = PiGains::critically_damped(bandwidth);
        Ok(())
    }
}
