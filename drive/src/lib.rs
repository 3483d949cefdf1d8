//! PMSM field-oriented drive core
//!
//! Everything that runs inside the 100 µs control interrupt: gain model,
//! transforms and modulation, current/speed loops, Hall PLL, speed/load and
//! EEMF observers, rotor alignment, fault supervision and the per-cycle mode
//! dispatcher. Peripheral access lives in the firmware crate; the core only
//! sees raw ADC codes, Hall pin levels and an [`output::InverterOutput`] sink.

#![cfg_attr(not(test), no_std)]

// Must stay first so the logging macros are in scope for every module below.
mod fmt;

pub mod adc;
pub mod align;
pub mod config;
pub mod control;
pub mod fault;
pub mod foc;
pub mod observer;
pub mod output;

pub use config::{ConfigError, DriveConfig};
pub use control::{
    ControlContext, CycleInput, DriveCommands, DriveStatus, Mode, ModeFlags, Setpoints,
};
pub use fault::{FaultCode, FaultLine, FaultSnapshot};
pub use output::{InverterOutput, PhaseDuty};
