//! ADCフロントエンド
//!
//! 相電流3ch・DCバス電圧1chの12ビット生値を物理量へ変換する。
//! 起動直後は電流チャネルのオフセットを校正し、完了までは変換を行わない。

use crate::config::AdcConfig;

/// 1周期分のADC生値（0-4095）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSamples {
    pub ia: u16,
    pub ib: u16,
    pub ic: u16,
    pub vdc: u16,
}

/// 変換後の計測値
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurements {
    /// 相電流 [A]
    pub ia: f32,
    pub ib: f32,
    pub ic: f32,
    /// DCバス電圧 [V]（フィルタ済み）
    pub vdc: f32,
    /// 1 / max(Vdc, 1)
    pub inv_vdc: f32,
    /// DCバス電流 [A]（このボードには計測チャネルがなく常に0）
    pub idc: f32,
}

/// オフセット校正と単位変換
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcFrontEnd {
    config: AdcConfig,
    /// 電流チャネルのオフセット [LSB]
    offsets: [f32; 3],
    offset_sum: [u32; 3],
    settle_count: u32,
    offset_count: u32,
    calibrated: bool,
    /// ローパス後のDCバス電圧 [V]
    vdc_filtered: f32,
}

impl AdcFrontEnd {
    pub fn new(config: AdcConfig) -> Self {
        Self {
            offsets: [config.default_offset; 3],
            config,
            offset_sum: [0; 3],
            settle_count: 0,
            offset_count: 0,
            calibrated: false,
            vdc_filtered: 0.0,
        }
    }

    /// 生値を処理する
    ///
    /// 校正中は計測値を更新しない。
    ///
    /// # Returns
    /// オフセット校正が完了していれば `true`
    pub fn process(&mut self, raw: &RawSamples, meas: &mut Measurements) -> bool {
        if self.calibrated {
            self.convert(raw, meas);
        } else {
            self.accumulate_offset(raw);
        }
        self.calibrated
    }

    /// 捨てサンプルの後、指定数のサンプルを積算して平均をオフセットとする
    fn accumulate_offset(&mut self, raw: &RawSamples) {
        if self.settle_count < self.config.settle_samples {
            self.settle_count += 1;
            return;
        }

        self.offset_sum[0] += raw.ia as u32;
        self.offset_sum[1] += raw.ib as u32;
        self.offset_sum[2] += raw.ic as u32;
        self.offset_count += 1;

        if self.offset_count >= self.config.offset_samples {
            let n = self.config.offset_samples as f32;
            for (offset, sum) in self.offsets.iter_mut().zip(self.offset_sum) {
                *offset = sum as f32 / n;
            }
            self.calibrated = true;
            info!(
                "ADC offsets calibrated: Ia={} Ib={} Ic={}",
                self.offsets[0], self.offsets[1], self.offsets[2]
            );
        }
    }

    fn convert(&mut self, raw: &RawSamples, meas: &mut Measurements) {
        let cfg = &self.config;
        let current = |code: u16, ch: usize| {
            cfg.channel_gain[ch] * ((code as f32 - self.offsets[ch]) / cfg.current_scale)
                * cfg.scale_compensation
        };

        meas.ia = current(raw.ia, 0);
        meas.ib = current(raw.ib, 1);
        meas.ic = current(raw.ic, 2);

        let vdc = cfg.channel_gain[3] * (raw.vdc as f32 / cfg.voltage_scale) * cfg.scale_compensation;
        let alpha = cfg.vdc_filter_alpha;
        self.vdc_filtered = vdc * (1.0 - alpha) + alpha * self.vdc_filtered;

        meas.vdc = self.vdc_filtered;
        meas.inv_vdc = 1.0 / self.vdc_filtered.max(1.0);
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn offsets(&self) -> [f32; 3] {
        self.offsets
    }
}
