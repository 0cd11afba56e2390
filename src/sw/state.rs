use crate::hw::adc::{self, Channel, Sampler};
use crate::hw::button::Debouncer;
use crate::hw::timer::Tick;
use crate::hw::uart::Link;
use crate::sw::config::EBRAKE_TICKS;
use embedded_hal::digital::v2::OutputPin;

/// Buttons
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Button {
    B1,
    B2,
}

impl Button {
    fn index(self) -> usize {
        match self {
            Button::B1 => 0,
            Button::B2 => 1,
        }
    }
}

/// Everything shared between interrupt handlers and the main loop
///
/// Handlers only touch counters and flags here and never run control
/// logic. The main loop picks the flags up with the `take_*` methods.
/// A flag raised again before it was taken is merged with the pending one.
pub struct SharedDeviceState<LED> {
    pub sampler: Sampler<LED>,
    pub link: Link,
    buttons: [Debouncer; 2],
    drive_tick: bool,
    boot_tick: bool,
    /// debounce ticks left of the brake pulse
    brake: u8,
    brake_done: bool,
}

impl<LED> SharedDeviceState<LED>
where
    LED: OutputPin,
{
    pub fn new(led: LED) -> Self {
        SharedDeviceState {
            sampler: Sampler::new(led),
            link: Link::new(),
            buttons: [Debouncer::new(); 2],
            drive_tick: false,
            boot_tick: false,
            brake: 0,
            brake_done: false,
        }
    }

    /// Periodic timer handler: returns the channel to convert, if any
    pub fn on_timer(&mut self, tick: Tick) -> Option<Channel> {
        match tick {
            Tick::Adc => return self.sampler.on_tick(),
            Tick::Debounce => {
                self.on_debounce_tick();
            }
            Tick::Drive => {
                self.on_drive_tick().ok();
            }
            Tick::Boot => self.on_boot_tick(),
        }

        None
    }

    /// 50 msec tick: returns the buttons whose edge interrupt may be unmasked
    pub fn on_debounce_tick(&mut self) -> [bool; 2] {
        if self.brake > 0 {
            self.brake -= 1;
            if self.brake == 0 {
                self.brake_done = true;
            }
        }

        [self.buttons[0].on_tick(), self.buttons[1].on_tick()]
    }

    /// 100 msec tick
    pub fn on_drive_tick(&mut self) -> Result<(), adc::Error> {
        self.drive_tick = true;
        self.sampler.start_cycle()
    }

    /// 200 msec tick
    pub fn on_boot_tick(&mut self) {
        self.boot_tick = true;
    }

    /// Edge interrupt: returns true if the edge interrupt must be masked
    pub fn on_button_edge(&mut self, button: Button) -> bool {
        self.buttons[button.index()].on_edge()
    }

    /// Conversion complete: returns the next channel to convert, if any
    pub fn on_conversion(&mut self, raw: u16) -> Result<Option<Channel>, adc::Error> {
        self.sampler.on_conversion(raw)
    }

    pub fn take_press(&mut self, button: Button) -> bool {
        self.buttons[button.index()].take()
    }

    pub fn take_drive_tick(&mut self) -> bool {
        let t = self.drive_tick;
        self.drive_tick = false;
        t
    }

    pub fn take_boot_tick(&mut self) -> bool {
        let t = self.boot_tick;
        self.boot_tick = false;
        t
    }

    /// Time the brake pulse
    pub fn start_brake(&mut self) {
        self.brake = EBRAKE_TICKS;
        self.brake_done = false;
    }

    pub fn braking(&self) -> bool {
        self.brake > 0
    }

    /// Brake pulse is over and the wheels should be released
    pub fn take_brake_done(&mut self) -> bool {
        let d = self.brake_done;
        self.brake_done = false;
        d
    }
}

/// Short exclusive access to the shared state
///
/// The main loop takes one lock per flag or ring access, so handlers are
/// held off only for the access itself and never for a whole loop pass.
pub trait Lock {
    type Led: OutputPin;

    fn lock<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut SharedDeviceState<Self::Led>) -> R;
}

impl<LED> Lock for SharedDeviceState<LED>
where
    LED: OutputPin,
{
    type Led = LED;

    fn lock<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut SharedDeviceState<LED>) -> R,
    {
        f(self)
    }
}
