//! ボードとハードウェアの設定パラメータ
//!
//! ## ピン割り当て
//! - PE9/PE8, PE11/PE10, PE13/PE12: TIM1 CH1/CH1N, CH2/CH2N, CH3/CH3N（U/V/W相）
//! - PA0 (ADC1_IN1), PA1 (ADC1_IN2), PA2 (ADC1_IN3): 相電流 Ia/Ib/Ic
//! - PC1 (ADC2_IN7): DCバス電圧
//! - PB6/PB7/PB8: ホールセンサ H1/H2/H3（GPIO入力）
//! - PB12 (EXTI12): ゲートドライバ異常入力（アクティブLow）

/// 制御周期 [μs]（10kHz = 100μs）
///
/// `DriveConfig::sample_period` はこの値から設定する。
pub const CONTROL_PERIOD_US: u64 = 100;

/// ステータス公開の間引き数（1000周期 = 100ms）
pub const STATUS_PUBLISH_CYCLES: u32 = 1_000;

/// ステータスログ周期 [ms]
pub const STATUS_LOG_PERIOD_MS: u64 = 1_000;

/// PWM設定
pub mod pwm {
    use embassy_stm32::time::Hertz;

    /// PWM周波数（10kHz、制御周期と同期）
    pub const DEFAULT_FREQUENCY: Hertz = Hertz(10_000);

    /// デッドタイム [タイマーカウント]（170MHzで約500ns）
    pub const DEFAULT_DEAD_TIME: u16 = 85;
}

/// 入力設定
pub mod inputs {
    use embassy_stm32::adc::SampleTime;
    use embassy_stm32::gpio::Pull;

    /// 電流・電圧のサンプル時間（4チャネル読み出しが制御周期内に収まること）
    pub const ADC_SAMPLE_TIME: SampleTime = SampleTime::CYCLES24_5;

    /// ホールセンサ入力のプル（オープンコレクタ出力用）
    pub const HALL_PULL: Pull = Pull::Up;

    /// 異常入力のプル（アクティブLow）
    pub const FAULT_PULL: Pull = Pull::Up;
}
