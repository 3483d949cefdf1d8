//! グローバル共有状態管理
//!
//! タスク間で共有される状態をMutexで保護して管理します。
//! 異常入力は割り込み側から触るため [`FaultLine`] (アトミック) で渡す。

use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::mutex::Mutex;
use pmsm_drive::{DriveCommands, DriveStatus, FaultLine};

/// 外部から与える運転指令
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Commands {
    /// 運転フラグと指令値（制御コアが変更した値は周期ごとに書き戻される）
    pub drive: DriveCommands,
    /// RC入力デューティ [0, 1]
    pub rc_duty: f32,
}

impl Commands {
    pub const fn new() -> Self {
        Self {
            drive: DriveCommands::new(),
            rc_duty: 0.0,
        }
    }
}

/// 運転指令
pub static COMMANDS: Mutex<ThreadModeRawMutex, Commands> = Mutex::new(Commands::new());

/// 制御コアの状態（STATUS_PUBLISH_CYCLES周期ごとに更新）
pub static STATUS: Mutex<ThreadModeRawMutex, DriveStatus> = Mutex::new(DriveStatus::new());

/// ハードウェア異常の通知線（EXTIタスク → 制御周期）
pub static FAULT_LINE: FaultLine = FaultLine::new();
