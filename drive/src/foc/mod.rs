//! Field-oriented control building blocks

pub mod current_control;
pub mod gains;
pub mod hall_sensor;
pub mod open_loop;
pub mod pi_controller;
pub mod speed_control;
pub mod svpwm;
pub mod transforms;
