//! ハードウェア初期化モジュール
//!
//! クロック設定とTIM1主出力の直接操作を集約します。

use embassy_stm32::{pac, Config};

/// RCCクロック設定を初期化
///
/// HSI → PLL（÷4 × 85 ÷ 2）で170MHz生成、ADCクロックはSYSCLK
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::mux::{Adcsel, ClockMux};
        use embassy_stm32::rcc::{Pll, PllMul, PllPreDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R; // システムクロックをPLLに設定
        // 150MHz超ではRange1ブーストが必要
        config.rcc.boost = true;

        let mut clock_mux = ClockMux::default();
        clock_mux.adc12sel = Adcsel::SYS;
        config.rcc.mux = clock_mux;
    }
    config
}

/// TIM1の主出力（BDTR.MOE）を即座に遮断
///
/// チャネル設定には触れないため、異常処理中の任意の時点から呼べる。
pub fn force_main_output_off() {
    pac::TIM1.bdtr().modify(|w| w.set_moe(false));
}

/// TIM1の主出力（BDTR.MOE）を再度有効化
pub fn restore_main_output() {
    pac::TIM1.bdtr().modify(|w| w.set_moe(true));
}
