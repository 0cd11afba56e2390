pub mod adc;
pub mod button;
pub mod motion;
pub mod timer;
pub mod uart;
