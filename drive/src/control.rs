//! 制御周期ディスパッチャ
//!
//! 100µs周期で呼ばれ、ADC処理 → 異常判定 → ゲイン更新 → ホールPLL → モード選択 →
//! 電圧生成・変調 の順に1周期分の処理を行う。ハードウェアには触れず、結果は
//! [`InverterOutput`] に渡す。

use crate::adc::{AdcFrontEnd, Measurements, RawSamples};
use crate::align::{AlignAction, Alignment};
use crate::config::params::open_loop::DUTY_TEST_MAX;
use crate::config::{ConfigError, DriveConfig, MotorParams};
use crate::fault::{FaultCode, FaultLine, FaultSnapshot, FaultSupervisor};
use crate::foc::current_control::{CurrentController, DcLink, RotorAngle};
use crate::foc::gains::{GainSchedule, MotorModel};
use crate::foc::hall_sensor::{HallPins, HallPll};
use crate::foc::open_loop::{
    hall_test_duty, voltage_model, OpenLoopCommand, OpenLoopReference, SquareWaveInjection,
};
use crate::foc::speed_control::{torque_from_duty, torque_to_iq, SpeedController};
use crate::foc::svpwm::DeadTimeCompensation;
use crate::foc::transforms::clarke;
use crate::observer::SensorlessTracker;
use crate::output::{InverterOutput, PhaseDuty};

/// Iq limit of the voltage-model stage, in multiples of rated current
const VOLTAGE_MODEL_IQ_SCALE: f32 = 1.3;
/// Iq limit of the current-loop stage, in multiples of rated current
const CURRENT_LOOP_IQ_SCALE: f32 = 3.0;

/// 閉ループ運転で速度制御の後段に置く処理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunStage {
    /// 定常電圧モデルで電圧指令を直接生成
    VoltageModel,
    /// 電流制御（Iq = Te/Kt, ±3·定格電流）
    CurrentLoop,
}

/// 電圧指令生成モードの角度・電流の出どころ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VrefMode {
    /// 開ループ角度と開ループ電流指令
    #[default]
    OpenLoop,
    /// ホール角度と速度制御のトルク指令
    Speed,
}

/// 電圧開ループ制御で使う角度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageAngle {
    #[default]
    OpenLoop,
    /// センサレス推定角とフィルタ後の推定速度
    Sensorless,
}

/// 外部から設定される運転フラグ
///
/// コアは異常時・モード終了時に自分でクリアするフラグ以外は書き換えない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeFlags {
    pub ready: bool,
    /// 異常解除要求（処理後にクリア）
    pub fault_clear: bool,
    /// 閉ループ運転
    pub run: bool,
    pub open_loop_current: bool,
    pub open_loop_voltage: bool,
    pub voltage_reference: bool,
    pub align: bool,
    /// デッドタイム非線形補償
    pub nonlinear_comp: bool,
    /// 閉ループ運転中、RCデューティをトルク指令とする
    pub torque_mode: bool,
    pub duty_test: bool,
    /// 矩形波電圧注入
    pub param_estimation: bool,
    pub hall_position_test: bool,
}

impl ModeFlags {
    /// 全フラグ0（`static` 初期化用）
    pub const fn new() -> Self {
        Self {
            ready: false,
            fault_clear: false,
            run: false,
            open_loop_current: false,
            open_loop_voltage: false,
            voltage_reference: false,
            align: false,
            nonlinear_comp: false,
            torque_mode: false,
            duty_test: false,
            param_estimation: false,
            hall_position_test: false,
        }
    }

    /// 優先順位に従って1つのモードを選ぶ
    pub fn select(&self) -> Mode {
        if self.run {
            Mode::ClosedLoop
        } else if self.hall_position_test {
            Mode::HallTest
        } else if self.duty_test {
            Mode::DutyTest
        } else if self.open_loop_current {
            Mode::OpenLoopCurrent
        } else if self.voltage_reference {
            Mode::VoltageReference
        } else if self.open_loop_voltage {
            Mode::OpenLoopVoltage
        } else if self.param_estimation {
            Mode::Injection
        } else if self.align {
            Mode::Align
        } else {
            Mode::Idle
        }
    }

    /// 停止時にクリアする運転系フラグ
    fn clear_run_modes(&mut self) {
        self.run = false;
        self.open_loop_current = false;
        self.open_loop_voltage = false;
        self.align = false;
        self.nonlinear_comp = false;
        self.torque_mode = false;
    }
}

/// 1周期で実行される動作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    ClosedLoop,
    HallTest,
    DutyTest,
    OpenLoopCurrent,
    VoltageReference,
    OpenLoopVoltage,
    Injection,
    Align,
    #[default]
    Idle,
}

impl Mode {
    /// 電流制御の座標が実際のロータ回転に追従するモード
    ///
    /// 位置合わせ（角度0固定）と電圧注入ではセンサレス推定を回さない。
    pub fn tracks_rotor(self) -> bool {
        matches!(
            self,
            Mode::ClosedLoop
                | Mode::OpenLoopCurrent
                | Mode::VoltageReference
                | Mode::OpenLoopVoltage
        )
    }
}

/// 外部から設定される指令値
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Setpoints {
    /// 速度指令 [rpm]
    pub speed_rpm: f32,
    pub open_loop: OpenLoopCommand,
    /// ホール位置試験のベクトル番号（1-6）
    pub hall_vector: u8,
    pub vref_mode: VrefMode,
    pub voltage_angle: VoltageAngle,
}

impl Setpoints {
    pub const fn new() -> Self {
        Self {
            speed_rpm: 0.0,
            open_loop: OpenLoopCommand::new(),
            hall_vector: 0,
            vref_mode: VrefMode::OpenLoop,
            voltage_angle: VoltageAngle::OpenLoop,
        }
    }
}

/// 外部とやり取りする運転フラグと指令値の組
///
/// コアは周期内でフラグをクリアし、停止時には開ループ指令をリセットする。
/// 外部側の保持値は [`ControlContext::run_commanded_cycle`] で周期ごとに
/// 書き戻される。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveCommands {
    pub flags: ModeFlags,
    pub setpoints: Setpoints,
}

impl DriveCommands {
    pub const fn new() -> Self {
        Self {
            flags: ModeFlags::new(),
            setpoints: Setpoints::new(),
        }
    }
}

/// 1周期分の入力
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleInput {
    pub raw: RawSamples,
    pub hall: HallPins,
    /// RC入力デューティ [0, 1]
    pub rc_duty: f32,
}

/// 運転状態のスナップショット
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveStatus {
    pub mode: Mode,
    pub fault: FaultCode,
    pub fault_count: u32,
    /// ホールPLL推定速度 [rpm]
    pub speed_rpm: f32,
    /// 電流制御の電気角 [rad]
    pub theta: f32,
    pub vdc: f32,
    pub id: f32,
    pub iq: f32,
    pub te_ref: f32,
    pub align_done: bool,
    pub calibrated: bool,
    pub cycle: u32,
}

impl DriveStatus {
    pub const fn new() -> Self {
        Self {
            mode: Mode::Idle,
            fault: FaultCode::None,
            fault_count: 0,
            speed_rpm: 0.0,
            theta: 0.0,
            vdc: 0.0,
            id: 0.0,
            iq: 0.0,
            te_ref: 0.0,
            align_done: false,
            calibrated: false,
            cycle: 0,
        }
    }
}

/// 制御コアの全状態
pub struct ControlContext {
    config: DriveConfig,
    dt: f32,
    motor: MotorModel,
    gains: GainSchedule,
    adc: AdcFrontEnd,
    meas: Measurements,
    hall: HallPll,
    current: CurrentController,
    speed: SpeedController,
    open_loop: OpenLoopReference,
    injection: SquareWaveInjection,
    align: Alignment,
    tracker: SensorlessTracker,
    fault: FaultSupervisor,
    compensation: DeadTimeCompensation,
    /// トルク指令 [N·m]
    te_ref: f32,
    /// 制限前のq軸電流指令 [A]
    iq_ref_unsat: f32,
    cycle: u32,
    mode: Mode,
    duty: PhaseDuty,
    pub flags: ModeFlags,
    pub setpoints: Setpoints,
}

impl ControlContext {
    /// 設定を検証し、全状態をゼロから構築する
    ///
    /// パラメータ → 電流制御帯域 → 速度制御帯域 → PLL帯域 → センサレス帯域の順に導出する。
    pub fn new(config: DriveConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let dt = config.sample_period;
        let motor = MotorModel::new(&config.motor)?;
        let gains = GainSchedule::new(config.bandwidths, &motor)?;

        info!(
            "Drive core: Ts={}s PP={} Kt={} Wcc={} Wsc={}",
            dt,
            config.motor.pole_pairs,
            motor.kt,
            config.bandwidths.current,
            config.bandwidths.speed
        );

        Ok(Self {
            dt,
            motor,
            adc: AdcFrontEnd::new(config.adc),
            meas: Measurements::default(),
            hall: HallPll::new(),
            current: CurrentController::new(&gains.current),
            speed: SpeedController::new(&gains.speed, &motor, dt),
            open_loop: OpenLoopReference::new(),
            injection: SquareWaveInjection::default(),
            align: Alignment::new(&config.align, dt),
            tracker: SensorlessTracker::new(&config.observer, config.bandwidths.eemf, &motor),
            fault: FaultSupervisor::new(),
            compensation: DeadTimeCompensation {
                a: config.test.nlc_a,
                b: config.test.nlc_b,
            },
            te_ref: 0.0,
            iq_ref_unsat: 0.0,
            cycle: 0,
            mode: Mode::Idle,
            duty: PhaseDuty::ZERO,
            flags: ModeFlags::default(),
            setpoints: Setpoints::default(),
            gains,
            config,
        })
    }

    /// 1制御周期を実行する
    ///
    /// # Arguments
    /// * `input` - ADC生値・ホール入力・RCデューティ
    /// * `fault_line` - 割り込みから立てられるハードウェア異常線
    /// * `output` - インバータ出力
    ///
    /// # Returns
    /// この周期に実行したモード
    pub fn run_cycle<O: InverterOutput>(
        &mut self,
        input: &CycleInput,
        fault_line: &FaultLine,
        output: &mut O,
    ) -> Mode {
        self.cycle = self.cycle.wrapping_add(1);

        // 1. 異常解除要求
        if self.flags.fault_clear {
            self.flags.fault_clear = false;
            self.fault.clear();
        }

        // 2. ハードウェア異常（解除要求より優先）
        if fault_line.take() {
            let snapshot = self.snapshot();
            self.fault.latch_hardware(snapshot);
            self.shutdown(output);
        }

        // 3. ADC：校正中はオフセット積算のみ
        self.adc.process(&input.raw, &mut self.meas);

        // 4. ソフトウェア過電流
        let snapshot = self.snapshot();
        if self.fault.check_overcurrent(snapshot) {
            self.shutdown(output);
        }

        // 5. ゲイン更新
        self.gains.update(&self.motor);
        self.current.set_gains(&self.gains.current);
        self.speed.set_gains(&self.gains.speed, &self.motor);

        // 6. ホールPLL
        self.hall.update(input.hall, &self.gains.hall_pll, self.dt);

        // 7. モード選択と実行
        let active = self.flags.ready && !self.fault.is_latched();
        let mode = if active { self.flags.select() } else { Mode::Idle };

        let duty = match mode {
            Mode::ClosedLoop => Some(self.closed_loop(input.rc_duty)),
            Mode::HallTest => Some(hall_test_duty(
                self.setpoints.hall_vector,
                self.config.test.hall_test_duty,
            )),
            Mode::DutyTest => {
                let [a, b, c] = self.config.test.duty_test;
                Some(PhaseDuty::new(a, b, c).clamped(DUTY_TEST_MAX))
            }
            Mode::OpenLoopCurrent => Some(self.open_loop_current()),
            Mode::VoltageReference => {
                let vref_mode = self.setpoints.vref_mode;
                Some(self.voltage_reference(vref_mode))
            }
            Mode::OpenLoopVoltage => Some(self.open_loop_voltage()),
            Mode::Injection => Some(self.injection()),
            Mode::Align => self.align_step(),
            Mode::Idle => {
                self.idle(active, output);
                None
            }
        };

        if let Some(duty) = duty {
            self.duty = duty;
            output.set_duty(duty);
            if !self.fault.is_latched() && !fault_line.is_pending() {
                output.enable();
            }
        }

        // 8. センサレス推定は印加した電圧で回す
        if mode.tracks_rotor() && self.config.observer.sensorless_tracking {
            self.track_sensorless();
        }

        if mode != self.mode {
            debug!("Mode change: {} -> {}", self.mode, mode);
            self.mode = mode;
        }

        mode
    }

    /// 外部指令を取り込んで1周期を実行し、コアが変更した指令を書き戻す
    ///
    /// 異常・停止時にクリアされたフラグと開ループ指令が、次の周期で
    /// 外部の古い値に戻されないようにする。
    pub fn run_commanded_cycle<O: InverterOutput>(
        &mut self,
        commands: &mut DriveCommands,
        input: &CycleInput,
        fault_line: &FaultLine,
        output: &mut O,
    ) -> Mode {
        self.flags = commands.flags;
        self.setpoints = commands.setpoints;
        let mode = self.run_cycle(input, fault_line, output);
        commands.flags = self.flags;
        commands.setpoints = self.setpoints;
        mode
    }

    /// 速度制御（またはトルク指令）→ 電圧モデル／電流制御
    fn closed_loop(&mut self, rc_duty: f32) -> PhaseDuty {
        let angle = self.hall_angle();
        self.current
            .measure(self.meas.ia, self.meas.ib, self.meas.ic, angle, self.dt);

        if self.flags.torque_mode {
            self.te_ref = torque_from_duty(rc_duty, self.motor.rated_torque);
            let (iq_unsat, iq_ref) = torque_to_iq(self.te_ref, 0.0, &self.motor);
            self.iq_ref_unsat = iq_unsat;
            self.current.set_references(0.0, iq_ref);
            return self.regulate_current();
        }

        let wrm = angle.omega * self.motor.inv_pole_pairs;
        self.te_ref = self
            .speed
            .update(self.setpoints.speed_rpm, wrm, &self.motor, self.dt);

        match self.config.run_stage {
            RunStage::VoltageModel => self.voltage_reference(VrefMode::Speed),
            RunStage::CurrentLoop => {
                self.iq_ref_unsat = self.te_ref * self.motor.inv_kt;
                let limit = CURRENT_LOOP_IQ_SCALE * self.motor.rated_current;
                self.current
                    .set_references(0.0, self.iq_ref_unsat.clamp(-limit, limit));
                self.regulate_current()
            }
        }
    }

    /// 開ループ電流制御
    fn open_loop_current(&mut self) -> PhaseDuty {
        let command = self.setpoints.open_loop;
        self.open_loop.advance(&command, &self.motor, self.dt);
        self.current
            .set_references(self.open_loop.id_ref(), command.iq);

        let angle = self.open_loop_angle();
        self.current
            .measure(self.meas.ia, self.meas.ib, self.meas.ic, angle, self.dt);
        self.regulate_current()
    }

    /// 定常電圧モデルによる電圧指令生成
    fn voltage_reference(&mut self, vref_mode: VrefMode) -> PhaseDuty {
        let (id, iq, omega_model, angle) = match vref_mode {
            VrefMode::OpenLoop => {
                let command = self.setpoints.open_loop;
                self.open_loop.advance(&command, &self.motor, self.dt);
                let angle = self.open_loop_angle();
                (self.open_loop.id_ref(), command.iq, angle.omega, angle)
            }
            VrefMode::Speed => {
                self.iq_ref_unsat = self.te_ref * self.motor.inv_kt;
                let limit = VOLTAGE_MODEL_IQ_SCALE * self.motor.rated_current;
                let iq = self.iq_ref_unsat.clamp(-limit, limit);
                let omega_model = self.speed.wrm_ref() * self.motor.pole_pairs;
                (0.0, iq, omega_model, self.hall_angle())
            }
        };

        self.current.set_references(id, iq);
        let (vd, vq) = voltage_model(id, iq, omega_model, &self.motor);

        let link = self.link();
        self.current
            .measure(self.meas.ia, self.meas.ib, self.meas.ic, angle, self.dt);
        self.current.apply_voltage(vd, vq, link, None)
    }

    /// 電圧開ループ制御
    fn open_loop_voltage(&mut self) -> PhaseDuty {
        self.open_loop.rotate(&self.motor, self.dt);

        let angle = match self.setpoints.voltage_angle {
            VoltageAngle::OpenLoop => self.open_loop_angle(),
            VoltageAngle::Sensorless => RotorAngle {
                theta: self.tracker.theta(),
                omega: self.tracker.omega_filtered(),
            },
        };

        let command = self.setpoints.open_loop;
        let link = self.link();
        self.current
            .measure(self.meas.ia, self.meas.ib, self.meas.ic, angle, self.dt);
        self.current.apply_voltage(command.vd, command.vq, link, None)
    }

    /// d軸矩形波電圧注入（電気角0固定）
    fn injection(&mut self) -> PhaseDuty {
        let vd = self.injection.next(self.config.test.injection_voltage);
        let angle = RotorAngle {
            theta: self.open_loop.theta(),
            omega: 0.0,
        };
        let link = self.link();
        let nlc = self.nlc();
        self.current
            .measure(self.meas.ia, self.meas.ib, self.meas.ic, angle, self.dt);
        self.current
            .apply_voltage_stationary(vd, 0.0, link, nlc.as_ref())
    }

    /// 位置合わせ：電気角0でd軸電流を流す
    fn align_step(&mut self) -> Option<PhaseDuty> {
        let (id_ref, complete) = match self.align.step(self.motor.align_current) {
            AlignAction::Prepare { id_ref } => {
                self.current.set_references(id_ref, 0.0);
                return None;
            }
            AlignAction::Regulate { id_ref } => (id_ref, false),
            AlignAction::Complete { id_ref } => (id_ref, true),
        };

        self.current.set_references(id_ref, 0.0);
        self.current.measure(
            self.meas.ia,
            self.meas.ib,
            self.meas.ic,
            RotorAngle::default(),
            self.dt,
        );
        let duty = self.regulate_current();

        if complete {
            self.flags.align = false;
        }
        Some(duty)
    }

    /// 出力停止・状態リセット・運転フラグクリア
    fn idle<O: InverterOutput>(&mut self, active: bool, output: &mut O) {
        output.disable();
        output.set_duty(PhaseDuty::ZERO);
        self.duty = PhaseDuty::ZERO;
        self.reset_controller_state();
        self.flags.clear_run_modes();
        if !active {
            self.flags.ready = false;
        }
    }

    /// 異常ラッチ直後の即時停止
    fn shutdown<O: InverterOutput>(&mut self, output: &mut O) {
        output.disable();
        output.set_duty(PhaseDuty::ZERO);
        self.duty = PhaseDuty::ZERO;
        self.flags.ready = false;
    }

    /// 積分器・指令・開ループ状態・センサレス推定をゼロに戻す
    ///
    /// 開ループd軸電流の目標値は保持し、それ以外の開ループ指令はクリアする。
    fn reset_controller_state(&mut self) {
        self.speed.reset();
        self.current.reset();
        self.open_loop.reset();
        self.align.abort();
        self.tracker.reset();
        self.te_ref = 0.0;
        self.iq_ref_unsat = 0.0;

        let command = &mut self.setpoints.open_loop;
        command.iq = 0.0;
        command.vd = 0.0;
        command.vq = 0.0;
        command.speed_rpm = 0.0;
    }

    /// 電流制御（measure済みであること）
    fn regulate_current(&mut self) -> PhaseDuty {
        let link = self.link();
        let nlc = self.nlc();
        self.current
            .regulate(&self.motor, link, nlc.as_ref(), self.dt)
    }

    fn track_sensorless(&mut self) {
        let [va, vb, vc] = self.current.modulation().phase_voltage;
        let (v_alpha, v_beta) = clarke(va, vb, vc);
        let (i_alpha, i_beta) = self.current.current_alpha_beta();
        self.tracker.update(
            v_alpha,
            v_beta,
            i_alpha,
            i_beta,
            &self.gains.pll,
            &self.motor,
            self.dt,
        );
    }

    fn hall_angle(&self) -> RotorAngle {
        RotorAngle {
            theta: self.hall.theta(),
            omega: self.hall.omega(),
        }
    }

    fn open_loop_angle(&self) -> RotorAngle {
        RotorAngle {
            theta: self.open_loop.theta(),
            omega: self.open_loop.omega(&self.motor),
        }
    }

    fn link(&self) -> DcLink {
        DcLink {
            vdc: self.meas.vdc,
            inv_vdc: self.meas.inv_vdc,
        }
    }

    fn nlc(&self) -> Option<DeadTimeCompensation> {
        self.flags.nonlinear_comp.then_some(self.compensation)
    }

    fn snapshot(&self) -> FaultSnapshot {
        FaultSnapshot {
            vdc: self.meas.vdc,
            idc: self.meas.idc,
            ia: self.meas.ia,
            ib: self.meas.ib,
            ic: self.meas.ic,
            speed_rpm: self.hall.speed_rpm(self.motor.inv_pole_pairs),
        }
    }

    /// モーター定数を差し替え、依存するゲインを再計算する
    pub fn set_motor_params(&mut self, params: MotorParams) -> Result<(), ConfigError> {
        self.motor = MotorModel::new(&params)?;
        self.config.motor = params;
        self.gains.update(&self.motor);
        self.tracker
            .set_eemf_bandwidth(self.gains.bandwidths.eemf, &self.motor);
        self.tracker.set_observer_bandwidth(
            self.config.observer.speed_observer_bandwidth,
            &self.motor,
        );
        info!("Motor params updated: Kt={}", self.motor.kt);
        Ok(())
    }

    pub fn set_current_bandwidth(&mut self, bandwidth: f32) -> Result<(), ConfigError> {
        self.gains.set_current_bandwidth(bandwidth, &self.motor)?;
        self.config.bandwidths.current = bandwidth;
        Ok(())
    }

    pub fn set_speed_bandwidth(&mut self, bandwidth: f32, damping: f32) -> Result<(), ConfigError> {
        self.gains
            .set_speed_bandwidth(bandwidth, damping, &self.motor)?;
        self.config.bandwidths.speed = bandwidth;
        self.config.bandwidths.speed_damping = damping;
        Ok(())
    }

    pub fn set_pll_bandwidth(&mut self, bandwidth: f32) -> Result<(), ConfigError> {
        self.gains.set_pll_bandwidth(bandwidth)?;
        self.config.bandwidths.pll = bandwidth;
        Ok(())
    }

    pub fn set_eemf_bandwidth(&mut self, bandwidth: f32) -> Result<(), ConfigError> {
        if !(bandwidth > 0.0) {
            return Err(ConfigError::NonPositiveBandwidth);
        }
        self.gains.bandwidths.eemf = bandwidth;
        self.config.bandwidths.eemf = bandwidth;
        self.tracker.set_eemf_bandwidth(bandwidth, &self.motor);
        Ok(())
    }

    /// 電流制御出力のローパス係数（停止時に0へ戻る）
    pub fn set_output_filter(&mut self, alpha: f32) {
        self.current.set_output_filter(alpha);
    }

    pub fn status(&self) -> DriveStatus {
        let (id, iq) = self.current.current_dq();
        DriveStatus {
            mode: self.mode,
            fault: self.fault.code(),
            fault_count: self.fault.count(),
            speed_rpm: self.hall.speed_rpm(self.motor.inv_pole_pairs),
            theta: self.current.angle().theta,
            vdc: self.meas.vdc,
            id,
            iq,
            te_ref: self.te_ref,
            align_done: self.align.is_done(),
            calibrated: self.adc.is_calibrated(),
            cycle: self.cycle,
        }
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn motor(&self) -> &MotorModel {
        &self.motor
    }

    pub fn gains(&self) -> &GainSchedule {
        &self.gains
    }

    pub fn measurements(&self) -> &Measurements {
        &self.meas
    }

    pub fn adc(&self) -> &AdcFrontEnd {
        &self.adc
    }

    pub fn hall(&self) -> &HallPll {
        &self.hall
    }

    pub fn current_controller(&self) -> &CurrentController {
        &self.current
    }

    pub fn speed_controller(&self) -> &SpeedController {
        &self.speed
    }

    pub fn open_loop(&self) -> &OpenLoopReference {
        &self.open_loop
    }

    pub fn tracker(&self) -> &SensorlessTracker {
        &self.tracker
    }

    pub fn fault(&self) -> &FaultSupervisor {
        &self.fault
    }

    pub fn te_ref(&self) -> f32 {
        self.te_ref
    }

    pub fn iq_ref_unsat(&self) -> f32 {
        self.iq_ref_unsat
    }

    /// 最後に出力したデューティ
    pub fn duty(&self) -> PhaseDuty {
        self.duty
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[derive(Debug, Default)]
    struct Recorder {
        duty: PhaseDuty,
        enabled: bool,
        enables: u32,
        disables: u32,
    }

    impl InverterOutput for Recorder {
        fn set_duty(&mut self, duty: PhaseDuty) {
            self.duty = duty;
        }

        fn enable(&mut self) {
            self.enabled = true;
            self.enables += 1;
        }

        fn disable(&mut self) {
            self.enabled = false;
            self.disables += 1;
        }
    }

    const MIDSCALE: RawSamples = RawSamples {
        ia: 2048,
        ib: 2048,
        ic: 2048,
        vdc: 2441,
    };

    fn input(raw: RawSamples) -> CycleInput {
        CycleInput {
            raw,
            hall: HallPins {
                a: false,
                b: true,
                c: true,
            },
            rc_duty: 0.0,
        }
    }

    /// Calibrates on the first sample so tests can reach converted values immediately
    fn quick_config() -> DriveConfig {
        let mut config = DriveConfig::default();
        config.adc.settle_samples = 0;
        config.adc.offset_samples = 1;
        // 10 LSB/A so 90 A fits in 12 bits
        config.adc.current_scale = 10.0;
        config.adc.vdc_filter_alpha = 0.0;
        config
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = DriveConfig::default();
        config.motor.ld = -1.0;
        assert!(matches!(
            ControlContext::new(config),
            Err(ConfigError::NonPositiveInductance)
        ));
    }

    #[test]
    fn test_rejects_zero_offset_samples() {
        let mut config = quick_config();
        config.adc.offset_samples = 0;
        assert!(matches!(
            ControlContext::new(config),
            Err(ConfigError::ZeroOffsetSamples)
        ));
    }

    #[test]
    fn test_state_starts_at_zero() {
        let ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let status = ctx.status();
        assert_eq!(status.mode, Mode::Idle);
        assert_eq!(status.fault, FaultCode::None);
        assert_eq!(status.cycle, 0);
        assert_eq!(ctx.current_controller().references(), (0.0, 0.0));
        assert_eq!(ctx.speed_controller().te_ref(), 0.0);
        assert_eq!(ctx.hall().theta(), 0.0);
        assert_eq!(ctx.tracker().theta(), 0.0);
    }

    #[test]
    fn test_offset_calibration_completes_at_cycle_10000() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        let raw = RawSamples {
            ia: 2000,
            ib: 2010,
            ic: 2020,
            vdc: 2441,
        };

        for _ in 0..9_999 {
            ctx.run_cycle(&input(raw), &line, &mut out);
        }
        assert!(!ctx.status().calibrated);

        ctx.run_cycle(&input(raw), &line, &mut out);
        let status = ctx.status();
        assert!(status.calibrated);
        assert_eq!(status.cycle, 10_000);
        assert_eq!(ctx.adc().offsets(), [2000.0, 2010.0, 2020.0]);
    }

    #[test]
    fn test_hardware_fault_dominates_software() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();

        // Calibrate, then run the Hall test so the output is enabled
        ctx.flags.ready = true;
        ctx.flags.hall_position_test = true;
        ctx.setpoints.hall_vector = 1;
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert_eq!(ctx.mode(), Mode::HallTest);
        assert!(out.enabled);

        line.trigger();
        let overcurrent = RawSamples {
            ia: 2048 + 900,
            ..MIDSCALE
        };
        let mode = ctx.run_cycle(&input(overcurrent), &line, &mut out);
        assert_eq!(mode, Mode::Idle);
        assert_eq!(ctx.fault().code(), FaultCode::Hardware);
        assert!(!out.enabled);
        assert_eq!(out.duty, PhaseDuty::ZERO);
        assert!(!ctx.flags.ready);

        for _ in 0..10 {
            ctx.run_cycle(&input(overcurrent), &line, &mut out);
            assert_eq!(ctx.fault().code(), FaultCode::Hardware);
        }
        assert!(ctx.fault().count() >= 12);
        assert!(approx_eq(ctx.fault().snapshot().ia, 90.0));

        // Clear keeps the snapshot and the counter
        let count = ctx.fault().count();
        ctx.flags.fault_clear = true;
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert_eq!(ctx.fault().code(), FaultCode::None);
        assert!(!ctx.flags.fault_clear);
        assert_eq!(ctx.fault().count(), count);
        assert!(approx_eq(ctx.fault().snapshot().ia, 90.0));
    }

    #[test]
    fn test_software_fault_shuts_down() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.duty_test = true;
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert!(out.enabled);

        let overcurrent = RawSamples {
            ib: 2048 - 850,
            ..MIDSCALE
        };
        let mode = ctx.run_cycle(&input(overcurrent), &line, &mut out);
        assert_eq!(mode, Mode::Idle);
        assert_eq!(ctx.fault().code(), FaultCode::Software);
        assert!(!out.enabled);
        assert!(!ctx.flags.ready);
    }

    #[test]
    fn test_fault_line_latches_before_dispatch() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.duty_test = true;
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert_eq!(out.enables, 1);

        line.trigger();
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert_eq!(out.enables, 1);
        assert_eq!(ctx.fault().code(), FaultCode::Hardware);
    }

    #[test]
    fn test_alignment_completes_at_cycle_50000() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.align = true;

        for cycle in 1..50_000 {
            assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::Align);
            assert!(!ctx.status().align_done, "done early at {}", cycle);
        }
        assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::Align);
        assert!(ctx.status().align_done);
        assert!(!ctx.flags.align);

        assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::Idle);
        assert!(ctx.status().align_done);
    }

    #[test]
    fn test_alignment_forces_zero_angle() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.align = true;

        // First cycle only prepares the reference
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert_eq!(out.enables, 0);
        assert_eq!(ctx.current_controller().references(), (2.0, 0.0));

        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert_eq!(out.enables, 1);
        assert_eq!(ctx.current_controller().angle(), RotorAngle::default());
    }

    #[test]
    fn test_torque_command_scenario() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.run = true;
        ctx.flags.torque_mode = true;

        let mut cycle_input = input(MIDSCALE);
        cycle_input.rc_duty = 0.20;
        assert_eq!(ctx.run_cycle(&cycle_input, &line, &mut out), Mode::ClosedLoop);

        let rated = ctx.motor().rated_torque;
        assert!(approx_eq(ctx.te_ref(), rated));
        assert_eq!(ctx.iq_ref_unsat(), ctx.te_ref() * ctx.motor().inv_kt);
        assert!((ctx.iq_ref_unsat() - rated / ctx.motor().kt).abs() < 1.0e-2);

        // Clamped to the current limit with Id = 0
        let (id_ref, iq_ref) = ctx.current_controller().references();
        assert_eq!(id_ref, 0.0);
        assert!(approx_eq(iq_ref, ctx.motor().current_limit));
        assert!(out.enabled);
    }

    #[test]
    fn test_torque_dead_zone() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.run = true;
        ctx.flags.torque_mode = true;

        let mut cycle_input = input(MIDSCALE);
        cycle_input.rc_duty = 0.152;
        ctx.run_cycle(&cycle_input, &line, &mut out);
        assert_eq!(ctx.te_ref(), 0.0);
    }

    #[test]
    fn test_speed_run_uses_voltage_model() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.run = true;
        ctx.setpoints.speed_rpm = 3_000.0;

        for _ in 0..100 {
            ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        }
        let wrm_ref = ctx.speed_controller().wrm_ref();
        // 3000 rpm/s ramp for 100 samples of 100 µs
        assert!((ctx.speed_controller().wrpm_ref() - 30.0).abs() < 0.1);
        assert!(wrm_ref > 0.0);
        let (id_ref, iq_ref) = ctx.current_controller().references();
        assert_eq!(id_ref, 0.0);
        let limit = VOLTAGE_MODEL_IQ_SCALE * ctx.motor().rated_current;
        assert!(iq_ref.abs() <= limit);
        assert!(ctx.te_ref() > 0.0);
    }

    #[test]
    fn test_mode_priority() {
        let mut flags = ModeFlags {
            run: true,
            hall_position_test: true,
            duty_test: true,
            open_loop_current: true,
            voltage_reference: true,
            open_loop_voltage: true,
            param_estimation: true,
            align: true,
            ..ModeFlags::default()
        };
        assert_eq!(flags.select(), Mode::ClosedLoop);
        flags.run = false;
        assert_eq!(flags.select(), Mode::HallTest);
        flags.hall_position_test = false;
        assert_eq!(flags.select(), Mode::DutyTest);
        flags.duty_test = false;
        assert_eq!(flags.select(), Mode::OpenLoopCurrent);
        flags.open_loop_current = false;
        assert_eq!(flags.select(), Mode::VoltageReference);
        flags.voltage_reference = false;
        assert_eq!(flags.select(), Mode::OpenLoopVoltage);
        flags.open_loop_voltage = false;
        assert_eq!(flags.select(), Mode::Injection);
        flags.param_estimation = false;
        assert_eq!(flags.select(), Mode::Align);
        flags.align = false;
        assert_eq!(flags.select(), Mode::Idle);
    }

    #[test]
    fn test_duty_test_pattern() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.duty_test = true;
        ctx.flags.open_loop_current = true;

        assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::DutyTest);
        assert_eq!(out.duty, PhaseDuty::new(0.2, 0.3, 0.8));
        assert!(out.enabled);
    }

    #[test]
    fn test_hall_test_vector() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.hall_position_test = true;
        ctx.setpoints.hall_vector = 4;

        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert_eq!(out.duty, PhaseDuty::new(0.0, 0.01, 0.01));
    }

    #[test]
    fn test_injection_alternates_sign() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        // Calibrate while idle so Vdc is available from the next cycle
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        ctx.flags.ready = true;
        ctx.flags.param_estimation = true;

        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert!(ctx.current_controller().d_axis().get_output() < 0.0);
        assert!(out.duty.a < 0.5);
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        assert!(ctx.current_controller().d_axis().get_output() > 0.0);
        assert!(out.duty.a > 0.5);
    }

    #[test]
    fn test_open_loop_voltage_rotates_at_command_speed() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.open_loop_current = true;
        ctx.setpoints.open_loop.speed_rpm = 60.0;
        ctx.setpoints.open_loop.id = 1.0;

        for _ in 0..1_000 {
            ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        }
        // 0.1 s of slewing at 10 rpm/s and 20 A/s
        assert!((ctx.open_loop().speed_rpm() - 1.0).abs() < 1.0e-3);
        assert!((ctx.current_controller().references().0 - 1.0).abs() < 1.0e-3);
        assert!(ctx.open_loop().theta() > 0.0);

        ctx.flags.open_loop_current = false;
        ctx.flags.open_loop_voltage = true;
        ctx.setpoints.open_loop.vd = 0.5;
        let before = ctx.open_loop().theta();
        assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::OpenLoopVoltage);
        assert!(ctx.open_loop().theta() > before);
        assert!(out.enabled);
    }

    #[test]
    fn test_idle_shutdown_clears_run_flags() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.ready = true;
        ctx.flags.nonlinear_comp = true;
        ctx.flags.torque_mode = true;
        ctx.setpoints.open_loop = OpenLoopCommand {
            id: 2.0,
            iq: 1.0,
            speed_rpm: 100.0,
            vd: 1.0,
            vq: 1.0,
        };

        assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::Idle);
        assert!(!out.enabled);
        assert_eq!(out.duty, PhaseDuty::ZERO);
        assert!(ctx.flags.ready);
        assert!(!ctx.flags.nonlinear_comp);
        assert!(!ctx.flags.torque_mode);
        // Only the d-axis current target survives a reset
        assert_eq!(
            ctx.setpoints.open_loop,
            OpenLoopCommand {
                id: 2.0,
                ..OpenLoopCommand::default()
            }
        );
    }

    #[test]
    fn test_not_ready_clears_ready_and_run() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.flags.run = true;
        ctx.flags.align = true;

        assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::Idle);
        assert!(!ctx.flags.run);
        assert!(!ctx.flags.align);
        assert!(!ctx.flags.ready);
        assert_eq!(out.disables, 1);
    }

    #[test]
    fn test_retune_validates() {
        let mut ctx = ControlContext::new(DriveConfig::default()).unwrap();
        assert_eq!(
            ctx.set_current_bandwidth(0.0),
            Err(ConfigError::NonPositiveBandwidth)
        );
        assert_eq!(ctx.set_speed_bandwidth(100.0, 0.8), Ok(()));
        assert_eq!(ctx.config().bandwidths.speed, 100.0);

        let mut params = ctx.config().motor;
        params.flux_linkage = 4.0e-3;
        assert_eq!(ctx.set_motor_params(params), Ok(()));
        assert!(approx_eq(ctx.motor().kt, 1.5 * 4.0e-3));

        params.pole_pairs = 0;
        assert_eq!(ctx.set_motor_params(params), Err(ConfigError::ZeroPolePairs));
        assert!(approx_eq(ctx.motor().kt, 1.5 * 4.0e-3));
    }

    #[test]
    fn test_commanded_cycle_writes_back_reset_commands() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        let mut commands = DriveCommands::new();

        // Calibrate while idle
        ctx.run_commanded_cycle(&mut commands, &input(MIDSCALE), &line, &mut out);
        commands.flags.ready = true;
        commands.flags.open_loop_voltage = true;
        commands.setpoints.open_loop.vd = 1.0;
        assert_eq!(
            ctx.run_commanded_cycle(&mut commands, &input(MIDSCALE), &line, &mut out),
            Mode::OpenLoopVoltage
        );
        assert!(out.enabled);
        assert!(out.duty.a > 0.5);

        // The fault reset must reach the caller's copy
        line.trigger();
        ctx.run_commanded_cycle(&mut commands, &input(MIDSCALE), &line, &mut out);
        assert_eq!(commands.setpoints.open_loop.vd, 0.0);
        assert!(!commands.flags.open_loop_voltage);
        assert!(!commands.flags.ready);

        commands.flags.fault_clear = true;
        ctx.run_commanded_cycle(&mut commands, &input(MIDSCALE), &line, &mut out);
        assert_eq!(ctx.fault().code(), FaultCode::None);
        assert!(!commands.flags.fault_clear);

        // Re-entering the mode applies no stale voltage
        commands.flags.ready = true;
        commands.flags.open_loop_voltage = true;
        assert_eq!(
            ctx.run_commanded_cycle(&mut commands, &input(MIDSCALE), &line, &mut out),
            Mode::OpenLoopVoltage
        );
        assert!(approx_eq(out.duty.a, 0.5));
        assert!(approx_eq(out.duty.b, 0.5));
        assert!(approx_eq(out.duty.c, 0.5));
    }

    #[test]
    fn test_tracker_holds_during_alignment() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        assert!(ctx.config().observer.sensorless_tracking);
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        ctx.flags.ready = true;
        ctx.flags.align = true;

        for _ in 0..100 {
            assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::Align);
        }
        assert_eq!(ctx.tracker().theta(), 0.0);
        assert_eq!(ctx.tracker().omega(), 0.0);

        ctx.flags.align = false;
        ctx.flags.param_estimation = true;
        for _ in 0..10 {
            assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::Injection);
        }
        assert_eq!(ctx.tracker().theta(), 0.0);
        assert_eq!(ctx.tracker().omega(), 0.0);
    }

    #[test]
    fn test_idle_resets_tracker() {
        let mut ctx = ControlContext::new(quick_config()).unwrap();
        let line = FaultLine::new();
        let mut out = Recorder::default();
        ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        ctx.flags.ready = true;
        ctx.flags.open_loop_voltage = true;
        ctx.setpoints.open_loop.vd = 1.0;
        for _ in 0..100 {
            ctx.run_cycle(&input(MIDSCALE), &line, &mut out);
        }

        ctx.flags.open_loop_voltage = false;
        assert_eq!(ctx.run_cycle(&input(MIDSCALE), &line, &mut out), Mode::Idle);
        assert_eq!(ctx.tracker().theta(), 0.0);
        assert_eq!(ctx.tracker().omega(), 0.0);
        assert_eq!(ctx.tracker().omega_filtered(), 0.0);
        assert_eq!(ctx.tracker().eemf().angle_error(), 0.0);
    }
}
