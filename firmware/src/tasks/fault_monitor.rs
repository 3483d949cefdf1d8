//! ハードウェア異常監視タスク
//!
//! ゲートドライバの異常出力（アクティブLow）を待ち、検出したら
//! TIM1主出力をレジスタで遮断してから制御周期へ通知します。

use embassy_stm32::exti::ExtiInput;

use crate::hardware;
use crate::state::FAULT_LINE;

#[embassy_executor::task]
pub async fn fault_monitor_task(mut fault_input: ExtiInput<'static>) {
    info!("Fault monitor task started");

    loop {
        fault_input.wait_for_falling_edge().await;

        // 1. 出力遮断が先
        hardware::force_main_output_off();
        // 2. 次の制御周期の先頭でラッチされる
        FAULT_LINE.trigger();
        warn!("Hardware fault input asserted");

        // 解除（High復帰）まで再トリガしない
        fault_input.wait_for_high().await;
    }
}
