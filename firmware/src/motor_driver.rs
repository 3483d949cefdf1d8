//! モータードライバー抽象化レイヤー
//!
//! TIM1の相補PWMを制御コアの [`InverterOutput`] として公開します。

use embassy_stm32::{
    peripherals,
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};
use pmsm_drive::{InverterOutput, PhaseDuty};

use crate::hardware;

/// 3相インバータ出力
///
/// STM32のComplementaryPwmを使用して3相のハーフブリッジを駆動します。
pub struct MotorDriver {
    pwm: ComplementaryPwm<'static, peripherals::TIM1>,
    max_duty: u16,
    enabled: bool,
}

impl MotorDriver {
    /// 新しいモータードライバーを作成（出力は無効状態）
    ///
    /// # 引数
    /// * `pwm` - PWMペリフェラル（TIM1、デッドタイム設定済み）
    pub fn new(pwm: ComplementaryPwm<'static, peripherals::TIM1>) -> Self {
        let max_duty = pwm.get_max_duty();
        let mut driver = Self {
            pwm,
            max_duty,
            enabled: true,
        };
        driver.set_duty_uvw(0, 0, 0);
        driver.disable_all_channels();
        driver
    }

    /// PWMの最大Duty値を取得
    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    /// デューティ比 [0, 1] をコンペア値に変換
    fn to_compare(&self, duty: f32) -> u16 {
        (duty.clamp(0.0, 1.0) * self.max_duty as f32) as u16
    }

    /// 3相全てのコンペア値を設定
    fn set_duty_uvw(&mut self, duty_u: u16, duty_v: u16, duty_w: u16) {
        self.pwm.set_duty(Channel::Ch1, duty_u);
        self.pwm.set_duty(Channel::Ch2, duty_v);
        self.pwm.set_duty(Channel::Ch3, duty_w);
    }

    fn disable_all_channels(&mut self) {
        self.pwm.disable(Channel::Ch1);
        self.pwm.disable(Channel::Ch2);
        self.pwm.disable(Channel::Ch3);
        if self.enabled {
            info!("Inverter output disabled");
            self.enabled = false;
        }
    }
}

impl InverterOutput for MotorDriver {
    fn set_duty(&mut self, duty: PhaseDuty) {
        let u = self.to_compare(duty.a);
        let v = self.to_compare(duty.b);
        let w = self.to_compare(duty.c);
        self.set_duty_uvw(u, v, w);
    }

    fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.pwm.enable(Channel::Ch1);
        self.pwm.enable(Channel::Ch2);
        self.pwm.enable(Channel::Ch3);
        // 異常入力で遮断された主出力を戻す（コアは異常ラッチ中に enable しない）
        hardware::restore_main_output();
        self.enabled = true;
        info!("Inverter output enabled");
    }

    fn disable(&mut self) {
        self.disable_all_channels();
    }
}
