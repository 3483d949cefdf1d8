//! ドライブ制御のデフォルトパラメータ
//!
//! 評価ボード用モーター（1極対、19 mΩ、3.2 µH）と100 µs制御周期を前提とした初期値。

use core::f32::consts::PI;

/// 制御周期 [s]（10 kHz）
pub const DEFAULT_SAMPLE_PERIOD: f32 = 100.0e-6;

/// モーター定数（デフォルト値）
pub mod motor {
    /// 相抵抗 [Ω]
    pub const DEFAULT_RS: f32 = 19.0e-3;
    /// d軸インダクタンス [H]
    pub const DEFAULT_LD: f32 = 3.2e-6;
    /// q軸インダクタンス [H]
    pub const DEFAULT_LQ: f32 = 3.2e-6;
    /// 永久磁石鎖交磁束 [Wb]
    pub const DEFAULT_FLUX_LINKAGE: f32 = 2.0e-3;
    /// 極対数
    pub const DEFAULT_POLE_PAIRS: u8 = 1;
    /// 慣性モーメント [kg·m²]
    pub const DEFAULT_INERTIA: f32 = 1.0e-6;
    /// 粘性摩擦係数 [N·m·s/rad]
    pub const DEFAULT_FRICTION: f32 = 1.0e-6;
    /// 位置合わせ電流 [A]
    pub const DEFAULT_ALIGN_CURRENT: f32 = 2.0;
    /// 定格電流 [A]
    pub const DEFAULT_RATED_CURRENT: f32 = 50.0;
    /// 電流制限 [A]
    pub const DEFAULT_CURRENT_LIMIT: f32 = 50.0;
    /// 定格回転数 [rpm]
    pub const DEFAULT_RATED_SPEED_RPM: f32 = 10_000.0;
    /// 定格トルク [N·m]
    pub const DEFAULT_RATED_TORQUE: f32 = 3.0;
}

/// 制御帯域（デフォルト値）
pub mod bandwidth {
    use super::PI;

    /// 電流制御帯域 [rad/s]（1 kHz）
    pub const DEFAULT_CURRENT: f32 = 2.0 * PI * 1_000.0;
    /// 速度制御帯域 [rad/s]（25 Hz）
    pub const DEFAULT_SPEED: f32 = 2.0 * PI * 25.0;
    /// 速度制御の減衰係数
    pub const DEFAULT_SPEED_DAMPING: f32 = 0.707;
    /// センサレス用PLL帯域 [rad/s]（20 Hz）
    pub const DEFAULT_PLL: f32 = 2.0 * PI * 20.0;
    /// ホールセンサPLL帯域 [rad/s]（10 Hz、固定）
    pub const HALL_PLL: f32 = 2.0 * PI * 10.0;
    /// EEMFオブザーバ帯域 [rad/s]（200 Hz）
    pub const DEFAULT_EEMF: f32 = 2.0 * PI * 200.0;
    /// 速度・負荷オブザーバ極 [rad/s]（50 Hz）
    pub const DEFAULT_SPEED_OBSERVER: f32 = 2.0 * PI * 50.0;
    /// センサレス速度表示用ローパス [rad/s]（50 Hz）
    pub const DEFAULT_SPEED_LPF: f32 = 2.0 * PI * 50.0;
}

/// ADCフロントエンド（デフォルト値）
pub mod adc {
    /// 相電流変換係数 [LSB/A]
    pub const DEFAULT_CURRENT_SCALE: f32 = 81.9;
    /// DCバス電圧変換係数 [LSB/V]
    pub const DEFAULT_VOLTAGE_SCALE: f32 = 203.4;
    /// DCバス電圧ローパス係数（前回値の重み）
    pub const DEFAULT_VDC_FILTER_ALPHA: f32 = 0.999;
    /// オフセット校正前の捨てサンプル数
    pub const DEFAULT_SETTLE_SAMPLES: u32 = 5_000;
    /// オフセット校正の積算サンプル数
    pub const DEFAULT_OFFSET_SAMPLES: u32 = 5_000;
    /// 校正前のオフセット初期値（12ビット中点）
    pub const DEFAULT_OFFSET: f32 = 2048.0;
}

/// 位置合わせシーケンス（デフォルト値）
pub mod align {
    /// 通電時間 [s]
    pub const DEFAULT_ENERGIZE_TIME: f32 = 4.0;
    /// 位置合わせ完了までの総時間 [s]
    pub const DEFAULT_TOTAL_TIME: f32 = 5.0;
}

/// 保護しきい値
pub mod protection {
    /// ソフトウェア過電流しきい値 [A]
    pub const OVERCURRENT_LIMIT: f32 = 80.0;
}

/// オープンループ・試験モード（デフォルト値）
pub mod open_loop {
    /// d軸電流指令の傾き [A/s]
    pub const DEFAULT_ID_SLOPE: f32 = 20.0;
    /// 回転数指令の傾き [rpm/s]（起動時）
    pub const DEFAULT_SPEED_SLOPE: f32 = 10.0;
    /// 回転数指令の傾き [rpm/s]（リセット後）
    pub const RESET_SPEED_SLOPE: f32 = 5.0;
    /// 速度制御の指令レート [rpm/s]
    pub const SPEED_REFERENCE_RATE: f32 = 3_000.0;
    /// 矩形波注入電圧 [V]
    pub const INJECTION_VOLTAGE: f32 = 1.0;
    /// ホール位置試験のデューティ
    pub const HALL_TEST_DUTY: f32 = 0.01;
    /// デューティ試験パターン（A, B, C）
    pub const DUTY_TEST_PATTERN: [f32; 3] = [0.2, 0.3, 0.8];
    /// デューティ試験の上限
    pub const DUTY_TEST_MAX: f32 = 0.95;
    /// 非線形補償 A·atan(B·i)
    pub const DEFAULT_NLC_A: f32 = 3.0;
    pub const DEFAULT_NLC_B: f32 = 4.0;
}
