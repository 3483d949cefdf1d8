//! ドライブ設定
//!
//! `params` のデフォルト定数から `DriveConfig` を組み立て、`ControlContext::new`
//! に渡す前に検証する。

pub mod params;

use crate::control::RunStage;
use crate::observer::{ObserverVariant, TrackingLoop};

/// 設定値の検証エラー
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    NonPositiveInductance,
    NonPositiveInertia,
    ZeroPolePairs,
    NonPositiveFlux,
    NonPositiveBandwidth,
    NonPositiveSamplePeriod,
    /// オフセット校正の積算サンプル数が0
    ZeroOffsetSamples,
}

/// モーター・インバータ定数
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorParams {
    /// 相抵抗 [Ω]
    pub rs: f32,
    /// d軸インダクタンス [H]
    pub ld: f32,
    /// q軸インダクタンス [H]
    pub lq: f32,
    /// 鎖交磁束 [Wb]
    pub flux_linkage: f32,
    pub pole_pairs: u8,
    /// 慣性 [kg·m²]
    pub inertia: f32,
    /// 粘性摩擦 [N·m·s/rad]
    pub friction: f32,
    /// 位置合わせ電流 [A]
    pub align_current: f32,
    /// 定格電流 [A]
    pub rated_current: f32,
    /// 電流制限 [A]
    pub current_limit: f32,
    /// 定格回転数 [rpm]
    pub rated_speed_rpm: f32,
    /// 定格トルク [N·m]
    pub rated_torque: f32,
}

impl Default for MotorParams {
    fn default() -> Self {
        use params::motor::*;
        Self {
            rs: DEFAULT_RS,
            ld: DEFAULT_LD,
            lq: DEFAULT_LQ,
            flux_linkage: DEFAULT_FLUX_LINKAGE,
            pole_pairs: DEFAULT_POLE_PAIRS,
            inertia: DEFAULT_INERTIA,
            friction: DEFAULT_FRICTION,
            align_current: DEFAULT_ALIGN_CURRENT,
            rated_current: DEFAULT_RATED_CURRENT,
            current_limit: DEFAULT_CURRENT_LIMIT,
            rated_speed_rpm: DEFAULT_RATED_SPEED_RPM,
            rated_torque: DEFAULT_RATED_TORQUE,
        }
    }
}

impl MotorParams {
    /// 逆数を取る定数がすべて正であることを確認
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ld > 0.0 && self.lq > 0.0) {
            return Err(ConfigError::NonPositiveInductance);
        }
        if !(self.inertia > 0.0) {
            return Err(ConfigError::NonPositiveInertia);
        }
        if self.pole_pairs == 0 {
            return Err(ConfigError::ZeroPolePairs);
        }
        if !(self.flux_linkage > 0.0) {
            return Err(ConfigError::NonPositiveFlux);
        }
        Ok(())
    }
}

/// 制御帯域 [rad/s]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bandwidths {
    pub current: f32,
    pub speed: f32,
    /// 減衰係数（速度ゲイン計算では未使用、記録のみ）
    pub speed_damping: f32,
    pub pll: f32,
    pub eemf: f32,
}

impl Default for Bandwidths {
    fn default() -> Self {
        use params::bandwidth::*;
        Self {
            current: DEFAULT_CURRENT,
            speed: DEFAULT_SPEED,
            speed_damping: DEFAULT_SPEED_DAMPING,
            pll: DEFAULT_PLL,
            eemf: DEFAULT_EEMF,
        }
    }
}

impl Bandwidths {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all_positive = [self.current, self.speed, self.pll, self.eemf]
            .iter()
            .all(|&w| w > 0.0);
        if all_positive {
            Ok(())
        } else {
            Err(ConfigError::NonPositiveBandwidth)
        }
    }
}

/// ADC変換設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcConfig {
    /// [LSB/A]
    pub current_scale: f32,
    /// [LSB/V]
    pub voltage_scale: f32,
    /// DCバス電圧ローパス係数（前回値の重み）
    pub vdc_filter_alpha: f32,
    /// チャネル毎のゲイン補正（Ia, Ib, Ic, Vdc）
    pub channel_gain: [f32; 4],
    /// 電流チャネル共通の補正係数
    pub scale_compensation: f32,
    pub settle_samples: u32,
    pub offset_samples: u32,
    pub default_offset: f32,
}

impl Default for AdcConfig {
    fn default() -> Self {
        use params::adc::*;
        Self {
            current_scale: DEFAULT_CURRENT_SCALE,
            voltage_scale: DEFAULT_VOLTAGE_SCALE,
            vdc_filter_alpha: DEFAULT_VDC_FILTER_ALPHA,
            channel_gain: [1.0; 4],
            scale_compensation: 1.0,
            settle_samples: DEFAULT_SETTLE_SAMPLES,
            offset_samples: DEFAULT_OFFSET_SAMPLES,
            default_offset: DEFAULT_OFFSET,
        }
    }
}

impl AdcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offset_samples == 0 {
            return Err(ConfigError::ZeroOffsetSamples);
        }
        Ok(())
    }
}

/// 位置合わせ時間 [s]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlignConfig {
    pub energize_time: f32,
    pub total_time: f32,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            energize_time: params::align::DEFAULT_ENERGIZE_TIME,
            total_time: params::align::DEFAULT_TOTAL_TIME,
        }
    }
}

/// センサレス推定の設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObserverConfig {
    /// 速度・負荷オブザーバの極 [rad/s]
    pub speed_observer_bandwidth: f32,
    pub variant: ObserverVariant,
    /// EEMF角度誤差を追従する方式
    pub tracking: TrackingLoop,
    /// 推定速度ローパス [rad/s]
    pub speed_lpf: f32,
    /// 電圧出力モード中に毎周期センサレス推定を実行する
    pub sensorless_tracking: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            speed_observer_bandwidth: params::bandwidth::DEFAULT_SPEED_OBSERVER,
            variant: ObserverVariant::RateCorrectedAngle,
            tracking: TrackingLoop::Observer,
            speed_lpf: params::bandwidth::DEFAULT_SPEED_LPF,
            sensorless_tracking: true,
        }
    }
}

/// 試験モード・補償の設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestConfig {
    pub hall_test_duty: f32,
    /// デューティ試験パターン（A, B, C）
    pub duty_test: [f32; 3],
    /// 矩形波注入電圧 [V]
    pub injection_voltage: f32,
    /// 非線形補償 A·atan(B·i)
    pub nlc_a: f32,
    pub nlc_b: f32,
}

impl Default for TestConfig {
    fn default() -> Self {
        use params::open_loop::*;
        Self {
            hall_test_duty: HALL_TEST_DUTY,
            duty_test: DUTY_TEST_PATTERN,
            injection_voltage: INJECTION_VOLTAGE,
            nlc_a: DEFAULT_NLC_A,
            nlc_b: DEFAULT_NLC_B,
        }
    }
}

/// ドライブ全体の設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveConfig {
    /// 制御周期 [s]
    pub sample_period: f32,
    pub motor: MotorParams,
    pub bandwidths: Bandwidths,
    pub adc: AdcConfig,
    pub align: AlignConfig,
    pub observer: ObserverConfig,
    pub test: TestConfig,
    pub run_stage: RunStage,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            sample_period: params::DEFAULT_SAMPLE_PERIOD,
            motor: MotorParams::default(),
            bandwidths: Bandwidths::default(),
            adc: AdcConfig::default(),
            align: AlignConfig::default(),
            observer: ObserverConfig::default(),
            test: TestConfig::default(),
            run_stage: RunStage::VoltageModel,
        }
    }
}

impl DriveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_period > 0.0) {
            return Err(ConfigError::NonPositiveSamplePeriod);
        }
        self.motor.validate()?;
        self.bandwidths.validate()?;
        self.adc.validate()?;
        if !(self.observer.speed_observer_bandwidth > 0.0 && self.observer.speed_lpf > 0.0) {
            return Err(ConfigError::NonPositiveBandwidth);
        }
        Ok(())
    }
}
