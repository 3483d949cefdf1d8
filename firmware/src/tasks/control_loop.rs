//! 制御周期タスク
//!
//! 100μs周期で入力をサンプリングし、制御コアの1周期を実行します。

use embassy_time::{Duration, Ticker};
use pmsm_drive::ControlContext;

use crate::config::{CONTROL_PERIOD_US, STATUS_PUBLISH_CYCLES};
use crate::motor_driver::MotorDriver;
use crate::sensing::Sensors;
use crate::state::{COMMANDS, FAULT_LINE, STATUS};

/// 制御周期タスク（10kHz）
#[embassy_executor::task]
pub async fn control_loop_task(
    mut ctx: ControlContext,
    mut driver: MotorDriver,
    mut sensors: Sensors,
) {
    info!(
        "Control loop task started: period={}us, PWM max duty={}",
        CONTROL_PERIOD_US,
        driver.max_duty()
    );

    let mut ticker = Ticker::every(Duration::from_micros(CONTROL_PERIOD_US));
    let mut publish_counter = 0u32;

    loop {
        ticker.next().await;

        {
            // 1. 周期中はロックを保持し、外部からの書き換えと競合させない
            let mut commands = COMMANDS.lock().await;

            // 2. 入力サンプリング → 1周期実行（クリアされたフラグとリセットされた指令は書き戻される）
            let input = sensors.sample(commands.rc_duty);
            ctx.run_commanded_cycle(&mut commands.drive, &input, &FAULT_LINE, &mut driver);
        }

        // 3. ステータス公開（間引き）
        publish_counter += 1;
        if publish_counter >= STATUS_PUBLISH_CYCLES {
            publish_counter = 0;
            *STATUS.lock().await = ctx.status();
        }
    }
}
