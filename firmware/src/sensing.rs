//! 電流・電圧・ホール入力のサンプリング
//!
//! 制御周期の先頭で4チャネルのADC変換とホールピン読み出しを行い、
//! 制御コアの [`CycleInput`] にまとめます。

use embassy_stm32::{
    adc::{Adc, AnyAdcChannel},
    gpio::Input,
    peripherals,
};
use pmsm_drive::adc::RawSamples;
use pmsm_drive::foc::hall_sensor::HallPins;
use pmsm_drive::CycleInput;

/// 相電流チャネル（ADC1）
pub struct CurrentChannels {
    pub ia: AnyAdcChannel<peripherals::ADC1>,
    pub ib: AnyAdcChannel<peripherals::ADC1>,
    pub ic: AnyAdcChannel<peripherals::ADC1>,
}

/// 制御周期ごとの入力
pub struct Sensors {
    adc1: Adc<'static, peripherals::ADC1>,
    adc2: Adc<'static, peripherals::ADC2>,
    currents: CurrentChannels,
    vdc: AnyAdcChannel<peripherals::ADC2>,
    hall: [Input<'static>; 3],
}

impl Sensors {
    pub fn new(
        adc1: Adc<'static, peripherals::ADC1>,
        adc2: Adc<'static, peripherals::ADC2>,
        currents: CurrentChannels,
        vdc: AnyAdcChannel<peripherals::ADC2>,
        hall: [Input<'static>; 3],
    ) -> Self {
        Self {
            adc1,
            adc2,
            currents,
            vdc,
            hall,
        }
    }

    /// ホールピンの現在レベル
    pub fn hall_pins(&self) -> HallPins {
        HallPins {
            a: self.hall[0].is_high(),
            b: self.hall[1].is_high(),
            c: self.hall[2].is_high(),
        }
    }

    /// 1周期分の入力を取得
    ///
    /// # 引数
    /// * `rc_duty` - RC入力デューティ [0, 1]（トルク指令モード用）
    pub fn sample(&mut self, rc_duty: f32) -> CycleInput {
        let raw = RawSamples {
            ia: self.adc1.blocking_read(&mut self.currents.ia),
            ib: self.adc1.blocking_read(&mut self.currents.ib),
            ic: self.adc1.blocking_read(&mut self.currents.ic),
            vdc: self.adc2.blocking_read(&mut self.vdc),
        };
        CycleInput {
            raw,
            hall: self.hall_pins(),
            rc_duty,
        }
    }
}
