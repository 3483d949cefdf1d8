//! タスクモジュール
//!
//! 各タスクの実装を分離して管理します。

pub mod control_loop;
pub mod fault_monitor;
pub mod status;

// タスク関数を再エクスポート
pub use control_loop::control_loop_task;
pub use fault_monitor::fault_monitor_task;
pub use status::status_task;
