//! Configuration module
//!
//! ボード固有の設定（PWM、入力、制御周期）。モーター・制御パラメータの
//! デフォルト値は `pmsm_drive::config::params` にある。

pub mod params;

// params.rsから主要な定数を再エクスポート
pub use params::*;
