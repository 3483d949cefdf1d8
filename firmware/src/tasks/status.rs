//! ステータスログタスク
//!
//! 公開されたドライブ状態を定期的にログ出力します。

use embassy_time::{Duration, Ticker};
use pmsm_drive::FaultCode;

use crate::config::STATUS_LOG_PERIOD_MS;
use crate::state::STATUS;

#[embassy_executor::task]
pub async fn status_task() {
    info!("Status task started");

    let mut ticker = Ticker::every(Duration::from_millis(STATUS_LOG_PERIOD_MS));

    loop {
        ticker.next().await;

        let status = *STATUS.lock().await;
        if status.fault != FaultCode::None {
            warn!(
                "Fault {} latched (count {}), Vdc={}V",
                u8::from(status.fault),
                status.fault_count,
                status.vdc
            );
            continue;
        }
        info!(
            "Mode={} Speed={}rpm Vdc={}V Id={}A Iq={}A Te_ref={}Nm calibrated={} aligned={}",
            status.mode,
            status.speed_rpm,
            status.vdc,
            status.id,
            status.iq,
            status.te_ref,
            status.calibrated,
            status.align_done
        );
    }
}
