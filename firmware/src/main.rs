#![no_std]
#![no_main]

#[macro_use]
mod fmt;
mod config;
mod hardware;
mod motor_driver;
mod sensing;
mod state;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::{
    adc::{Adc, AdcChannel},
    exti::ExtiInput,
    gpio::{Input, OutputType},
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
    },
};
use embassy_time::{Duration, Timer};
use pmsm_drive::{ControlContext, DriveConfig};

use motor_driver::MotorDriver;
use sensing::{CurrentChannels, Sensors};
use tasks::{control_loop_task, fault_monitor_task, status_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let clock_config = hardware::create_clock_config();
    let p = embassy_stm32::init(clock_config);

    info!("═══════════════════════════════════════════════════════════════════");
    info!("        PMSM FOC Drive • STM32G431VB @ 170MHz");
    info!("═══════════════════════════════════════════════════════════════════");

    // 制御コア初期化（パラメータ → 電流帯域 → 速度帯域 → PLL → センサレス）
    let drive_config = DriveConfig {
        sample_period: config::CONTROL_PERIOD_US as f32 * 1.0e-6,
        ..DriveConfig::default()
    };
    let ctx = match ControlContext::new(drive_config) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("Drive configuration rejected: {}", err);
            loop {
                Timer::after(Duration::from_millis(1000)).await;
            }
        }
    };

    // PWM初期化（TIM1、3相相補PWM）
    let mut uvw_pwm = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE8, OutputType::PushPull)),
        Some(PwmPin::new(p.PE11, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE10, OutputType::PushPull)),
        Some(PwmPin::new(p.PE13, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE12, OutputType::PushPull)),
        None,
        None,
        config::pwm::DEFAULT_FREQUENCY,
        CountingMode::CenterAlignedUpInterrupts,
    );
    uvw_pwm.set_dead_time(config::pwm::DEFAULT_DEAD_TIME);
    // 出力は制御コアが enable するまで無効
    let driver = MotorDriver::new(uvw_pwm);

    // ADC初期化（ADC1: 相電流、ADC2: DCバス電圧）
    let mut adc1 = Adc::new(p.ADC1);
    adc1.set_sample_time(config::inputs::ADC_SAMPLE_TIME);
    let mut adc2 = Adc::new(p.ADC2);
    adc2.set_sample_time(config::inputs::ADC_SAMPLE_TIME);

    let currents = CurrentChannels {
        ia: p.PA0.degrade_adc(),
        ib: p.PA1.degrade_adc(),
        ic: p.PA2.degrade_adc(),
    };
    let vdc = p.PC1.degrade_adc();

    // ホールセンサ入力
    let hall = [
        Input::new(p.PB6, config::inputs::HALL_PULL),
        Input::new(p.PB7, config::inputs::HALL_PULL),
        Input::new(p.PB8, config::inputs::HALL_PULL),
    ];

    let sensors = Sensors::new(adc1, adc2, currents, vdc, hall);
    let initial_hall = sensors.hall_pins();
    info!("Initial Hall code: {}", initial_hall.code());

    // 異常入力（EXTI）
    let fault_input = ExtiInput::new(p.PB12, p.EXTI12, config::inputs::FAULT_PULL);
    if fault_input.is_low() {
        // 起動時点で異常が出ている場合も最初の周期でラッチさせる
        hardware::force_main_output_off();
        state::FAULT_LINE.trigger();
        warn!("Fault input asserted at startup");
    }

    spawner.spawn(fault_monitor_task(fault_input)).unwrap();
    spawner.spawn(status_task()).unwrap();

    info!("Starting control loop...");
    spawner
        .spawn(control_loop_task(ctx, driver, sensors))
        .unwrap();

    // READYを立てる（オフセット校正後はアイドル待機、運転は外部フラグで）
    state::COMMANDS.lock().await.drive.flags.ready = true;

    // 制御はタスク側で行う
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
