pub mod boot;
pub mod calib;
pub mod comm;
pub mod config;
pub mod control;
pub mod display;
pub mod drive;
pub mod iot;
pub mod ring;
pub mod robot;
pub mod state;
