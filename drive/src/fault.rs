//! 異常検出とラッチ
//!
//! ハードウェア異常（外部保護回路の割り込み）とソフトウェア過電流の2系統。
//! ハードウェア異常がラッチされている間はソフトウェア異常で上書きしない。

use crate::config::params::protection::OVERCURRENT_LIMIT;
use core::sync::atomic::{AtomicBool, Ordering};

/// 異常コード（フラグ上のエンコード: 0 なし, 1 ハードウェア, 2 ソフトウェア）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultCode {
    #[default]
    None,
    Hardware,
    Software,
}

impl From<FaultCode> for u8 {
    fn from(code: FaultCode) -> Self {
        match code {
            FaultCode::None => 0,
            FaultCode::Hardware => 1,
            FaultCode::Software => 2,
        }
    }
}

impl TryFrom<u8> for FaultCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FaultCode::None),
            1 => Ok(FaultCode::Hardware),
            2 => Ok(FaultCode::Software),
            other => Err(other),
        }
    }
}

/// 異常発生時点の計測値
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultSnapshot {
    /// DCバス電圧 [V]
    pub vdc: f32,
    /// DCバス電流 [A]
    pub idc: f32,
    pub ia: f32,
    pub ib: f32,
    pub ic: f32,
    /// 推定回転数 [rpm]
    pub speed_rpm: f32,
}

/// 割り込みから制御周期へハードウェア異常を伝える
///
/// `static` に置き、保護回路のEXTI割り込みで `trigger()` を呼ぶ。
/// 制御周期は次の周期の先頭で `take()` して異常をラッチする。
pub struct FaultLine {
    pending: AtomicBool,
}

impl FaultLine {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// 割り込みコンテキストから呼び出し可能
    pub fn trigger(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// 保留中の異常を取り出してクリア
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for FaultLine {
    fn default() -> Self {
        Self::new()
    }
}

/// 異常ラッチ
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultSupervisor {
    code: FaultCode,
    snapshot: FaultSnapshot,
    count: u32,
    overcurrent_limit: f32,
}

impl Default for FaultSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultSupervisor {
    pub const fn new() -> Self {
        Self {
            code: FaultCode::None,
            snapshot: FaultSnapshot {
                vdc: 0.0,
                idc: 0.0,
                ia: 0.0,
                ib: 0.0,
                ic: 0.0,
                speed_rpm: 0.0,
            },
            count: 0,
            overcurrent_limit: OVERCURRENT_LIMIT,
        }
    }

    /// ハードウェア異常をラッチ（常に優先）
    pub fn latch_hardware(&mut self, snapshot: FaultSnapshot) {
        self.code = FaultCode::Hardware;
        self.record(snapshot);
    }

    /// ソフトウェア異常をラッチ（ハードウェア異常がラッチ中ならコードは変更しない）
    pub fn latch_software(&mut self, snapshot: FaultSnapshot) {
        if self.code != FaultCode::Hardware {
            self.code = FaultCode::Software;
        }
        self.record(snapshot);
    }

    fn record(&mut self, snapshot: FaultSnapshot) {
        self.snapshot = snapshot;
        self.count = self.count.wrapping_add(1);
        error!(
            "Fault latched: {} (count {}), Vdc={}V Ia={}A Ib={}A Ic={}A {}rpm",
            u8::from(self.code),
            self.count,
            snapshot.vdc,
            snapshot.ia,
            snapshot.ib,
            snapshot.ic,
            snapshot.speed_rpm
        );
    }

    /// 相電流が |i| ≥ しきい値ならソフトウェア異常をラッチ
    ///
    /// 相ごとに判定し、超過した相の数だけ記録する。
    ///
    /// # Returns
    /// いずれかの相が超過した場合 `true`
    pub fn check_overcurrent(&mut self, snapshot: FaultSnapshot) -> bool {
        let mut tripped = false;
        for current in [snapshot.ia, snapshot.ib, snapshot.ic] {
            if current.abs() >= self.overcurrent_limit {
                self.latch_software(snapshot);
                tripped = true;
            }
        }
        tripped
    }

    /// 外部からの解除要求（スナップショットとカウンタは保持）
    pub fn clear(&mut self) {
        if self.code != FaultCode::None {
            info!("Fault cleared: {}", u8::from(self.code));
        }
        self.code = FaultCode::None;
    }

    pub fn is_latched(&self) -> bool {
        self.code != FaultCode::None
    }

    pub fn code(&self) -> FaultCode {
        self.code
    }

    pub fn snapshot(&self) -> &FaultSnapshot {
        &self.snapshot
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ia: f32) -> FaultSnapshot {
        FaultSnapshot {
            vdc: 24.0,
            ia,
            ..FaultSnapshot::default()
        }
    }

    #[test]
    fn test_code_encoding() {
        for code in [FaultCode::None, FaultCode::Hardware, FaultCode::Software] {
            assert_eq!(FaultCode::try_from(u8::from(code)), Ok(code));
        }
        assert_eq!(FaultCode::try_from(3), Err(3));
    }

    #[test]
    fn test_hardware_dominates_software() {
        let mut sup = FaultSupervisor::new();
        sup.latch_hardware(snapshot(1.0));
        for i in 0..10 {
            sup.latch_software(snapshot(100.0 + i as f32));
            assert_eq!(sup.code(), FaultCode::Hardware);
        }
        assert_eq!(sup.count(), 11);
        assert_eq!(sup.snapshot().ia, 109.0);
    }

    #[test]
    fn test_hardware_overrides_software() {
        let mut sup = FaultSupervisor::new();
        sup.latch_software(snapshot(90.0));
        assert_eq!(sup.code(), FaultCode::Software);
        sup.latch_hardware(snapshot(0.0));
        assert_eq!(sup.code(), FaultCode::Hardware);
    }

    #[test]
    fn test_overcurrent_threshold_inclusive() {
        let mut sup = FaultSupervisor::new();
        assert!(!sup.check_overcurrent(snapshot(79.99)));
        assert!(!sup.is_latched());
        assert!(sup.check_overcurrent(snapshot(-80.0)));
        assert_eq!(sup.code(), FaultCode::Software);
    }

    #[test]
    fn test_overcurrent_counts_each_phase() {
        let mut sup = FaultSupervisor::new();
        let snap = FaultSnapshot {
            ia: 90.0,
            ib: -90.0,
            ic: 1.0,
            ..FaultSnapshot::default()
        };
        sup.check_overcurrent(snap);
        assert_eq!(sup.count(), 2);
    }

    #[test]
    fn test_clear_keeps_snapshot_and_count() {
        let mut sup = FaultSupervisor::new();
        sup.latch_hardware(snapshot(5.0));
        sup.clear();
        assert_eq!(sup.code(), FaultCode::None);
        assert_eq!(sup.snapshot().ia, 5.0);
        assert_eq!(sup.count(), 1);
    }

    #[test]
    fn test_fault_line() {
        static LINE: FaultLine = FaultLine::new();
        assert!(!LINE.take());
        LINE.trigger();
        assert!(LINE.is_pending());
        assert!(LINE.take());
        assert!(!LINE.take());
    }
}
