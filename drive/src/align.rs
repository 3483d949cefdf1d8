//! 回転子位置合わせシーケンス
//!
//! d軸に位置合わせ電流を流して回転子を電気角0に引き込み、電流を0に戻してから完了とする。
//! 経過時間は制御周期ごとに1サンプルずつ加算し、周期数で判定する（浮動小数の累積誤差を避ける）。

use crate::config::AlignConfig;
use libm::roundf;

/// 位置合わせの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlignStage {
    Init,
    Energize,
    Decay,
    Done,
}

/// 1周期分の指示
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlignAction {
    /// 電流指令を設定するのみ（電流制御は実行しない）
    Prepare { id_ref: f32 },
    /// 電気角0で電流制御を実行
    Regulate { id_ref: f32 },
    /// 最終周期の電流制御を実行し、位置合わせフラグを下ろす
    Complete { id_ref: f32 },
}

/// 位置合わせ状態
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Alignment {
    stage: AlignStage,
    /// 経過周期数
    elapsed: u32,
    energize_cycles: u32,
    total_cycles: u32,
    sample_period: f32,
    done: bool,
}

impl Alignment {
    pub fn new(config: &AlignConfig, sample_period: f32) -> Self {
        Self {
            stage: AlignStage::Init,
            elapsed: 0,
            energize_cycles: roundf(config.energize_time / sample_period) as u32,
            total_cycles: roundf(config.total_time / sample_period) as u32,
            sample_period,
            done: false,
        }
    }

    /// 1周期進める
    ///
    /// # Arguments
    /// * `align_current` - 位置合わせ電流 [A]
    pub fn step(&mut self, align_current: f32) -> AlignAction {
        let action = match self.stage {
            AlignStage::Init => {
                self.elapsed = 0;
                self.done = false;
                self.stage = AlignStage::Energize;
                debug!("Align: energize {} A", align_current);
                AlignAction::Prepare {
                    id_ref: align_current,
                }
            }
            AlignStage::Energize => AlignAction::Regulate {
                id_ref: align_current,
            },
            AlignStage::Decay | AlignStage::Done => AlignAction::Regulate { id_ref: 0.0 },
        };

        self.elapsed += 1;

        match self.stage {
            AlignStage::Energize if self.elapsed >= self.energize_cycles => {
                self.stage = AlignStage::Decay;
                debug!("Align: decay");
            }
            AlignStage::Decay if self.elapsed >= self.total_cycles => {
                self.stage = AlignStage::Done;
            }
            _ => {}
        }

        if self.stage == AlignStage::Done {
            self.stage = AlignStage::Init;
            self.done = true;
            info!("Align: done after {} cycles", self.elapsed);
            if let AlignAction::Regulate { id_ref } = action {
                return AlignAction::Complete { id_ref };
            }
        }

        action
    }

    /// 中断時に段階をInitへ戻す（完了フラグは保持）
    pub fn abort(&mut self) {
        self.stage = AlignStage::Init;
        self.elapsed = 0;
    }

    pub fn stage(&self) -> AlignStage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 経過時間 [s]
    pub fn elapsed_time(&self) -> f32 {
        self.elapsed as f32 * self.sample_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alignment() -> Alignment {
        Alignment::new(&AlignConfig::default(), 100.0e-6)
    }

    #[test]
    fn test_dwell_cycles() {
        let align = alignment();
        assert_eq!(align.energize_cycles, 40_000);
        assert_eq!(align.total_cycles, 50_000);
    }

    #[test]
    fn test_first_call_prepares() {
        let mut align = alignment();
        assert_eq!(align.step(2.0), AlignAction::Prepare { id_ref: 2.0 });
        assert_eq!(align.stage(), AlignStage::Energize);
        assert_eq!(align.step(2.0), AlignAction::Regulate { id_ref: 2.0 });
    }

    #[test]
    fn test_done_after_exactly_50000_cycles() {
        let mut align = alignment();
        for cycle in 1..50_000u32 {
            let action = align.step(2.0);
            assert!(!align.is_done(), "done early at {}", cycle);
            if cycle == 40_000 {
                assert_eq!(align.stage(), AlignStage::Decay);
            }
            if cycle > 40_000 {
                assert_eq!(action, AlignAction::Regulate { id_ref: 0.0 });
            }
        }
        assert_eq!(align.step(2.0), AlignAction::Complete { id_ref: 0.0 });
        assert!(align.is_done());
        assert_eq!(align.stage(), AlignStage::Init);
    }

    #[test]
    fn test_energize_holds_current_until_dwell() {
        let mut align = alignment();
        for _ in 0..39_999 {
            align.step(2.0);
        }
        assert_eq!(align.stage(), AlignStage::Energize);
        assert_eq!(align.step(2.0), AlignAction::Regulate { id_ref: 2.0 });
        assert_eq!(align.stage(), AlignStage::Decay);
    }

    #[test]
    fn test_restart_clears_done() {
        let mut align = Alignment::new(
            &AlignConfig {
                energize_time: 0.0004,
                total_time: 0.0005,
            },
            100.0e-6,
        );
        for _ in 0..5 {
            align.step(1.0);
        }
        assert!(align.is_done());
        align.step(1.0);
        assert!(!align.is_done());
    }

    #[test]
    fn test_abort_returns_to_init() {
        let mut align = alignment();
        for _ in 0..10 {
            align.step(2.0);
        }
        align.abort();
        assert_eq!(align.stage(), AlignStage::Init);
        assert_eq!(align.elapsed_time(), 0.0);
    }
}
