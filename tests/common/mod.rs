#![allow(dead_code)]

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::v2::OutputPin;
use embedded_hal::PwmPin;

use linebot::hw::adc::Channel;
use linebot::hw::motion::{Motion, Wheels};
use linebot::hw::timer::Ticker;
use linebot::sw::boot::PowerStage;
use linebot::sw::comm::{Actions, Events, MotorCommand, Supply};
use linebot::sw::config::{Config, WHEEL_PERIOD};
use linebot::sw::drive::DriveState;
use linebot::sw::robot::Robot;
use linebot::sw::state::{Button, SharedDeviceState};

/*
 * Mock hardware
 *
 */

#[derive(Clone)]
pub struct MockPwm {
    duty: Rc<Cell<u16>>,
}

impl MockPwm {
    fn new() -> Self {
        MockPwm {
            duty: Rc::new(Cell::new(0)),
        }
    }
}

impl PwmPin for MockPwm {
    type Duty = u16;

    fn disable(&mut self) {}
    fn enable(&mut self) {}

    fn get_duty(&self) -> u16 {
        self.duty.get()
    }

    fn get_max_duty(&self) -> u16 {
        WHEEL_PERIOD
    }

    fn set_duty(&mut self, duty: u16) {
        self.duty.set(duty);
    }
}

#[derive(Clone)]
pub struct MockLed {
    on: Rc<Cell<bool>>,
}

impl OutputPin for MockLed {
    type Error = Infallible;

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.on.set(true);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.on.set(false);
        Ok(())
    }
}

pub type TestMotion = Motion<MockPwm, MockPwm, MockPwm, MockPwm>;

/*
 * Robot on a virtual clock
 *
 */

pub struct Sim {
    pub robot: Robot<TestMotion>,
    pub dev: SharedDeviceState<MockLed>,
    pub ticker: Ticker,
    pub actions: Vec<Actions>,
    /// working 10-bit (left, right) sensor values
    pub sensors: (u16, u16),
    pins: [MockPwm; 4],
}

impl Sim {
    pub fn new(cfg: Config) -> Self {
        let pins = [MockPwm::new(), MockPwm::new(), MockPwm::new(), MockPwm::new()];
        let motion = Motion::init(
            (pins[0].clone(), pins[1].clone()),
            (pins[2].clone(), pins[3].clone()),
            cfg.drive.enforce_direction_change_delay,
        );

        let led = MockLed {
            on: Rc::new(Cell::new(false)),
        };

        Sim {
            robot: Robot::new(motion, cfg),
            dev: SharedDeviceState::new(led),
            ticker: Ticker::new(),
            actions: Vec::new(),
            sensors: (0, 0),
            pins,
        }
    }

    /// Run the clock for `ms` msec, one main loop pass per msec
    pub fn run(&mut self, ms: u32) {
        for _ in 0..ms {
            let dev = &mut self.dev;
            let (left, right) = self.sensors;

            self.ticker.advance(1, |t| {
                let mut next = dev.on_timer(t);
                while let Some(ch) = next {
                    let value = match ch {
                        Channel::Left => left,
                        Channel::Right => right,
                        Channel::Thumb => 0,
                    };
                    next = dev.on_conversion(value << 2).unwrap();
                }
            });

            self.robot.run_once(&mut self.dev);

            while let Some(a) = self.robot.pop_action() {
                if let Actions::Baud(_) = a {
                    // ports switched: release the transmitters
                    self.dev.link.resume();
                }
                self.actions.push(a);
            }
        }
    }

    /// Run until `done` holds, at most `max` msec: returns the msec taken
    pub fn run_until<F>(&mut self, max: u32, done: F) -> Option<u32>
    where
        F: Fn(&Sim) -> bool,
    {
        for ms in 0..max {
            if done(self) {
                return Some(ms);
            }
            self.run(1);
        }

        None
    }

    pub fn press(&mut self, button: Button) {
        self.dev.on_button_edge(button);
        // let the contact settle
        self.run(250);
    }

    /// Boot without a modem: skip the IoT boot with button 1
    pub fn boot_offline(&mut self) {
        assert_eq!(self.robot.power_stage(), PowerStage::Init);

        let t = self.run_until(2000, |s| s.robot.power_stage() == PowerStage::IotSequence);
        assert!(t.is_some());

        self.press(Button::B1);

        let t = self.run_until(2000, |s| s.robot.power_stage() == PowerStage::Complete);
        assert!(t.is_some());
    }

    /// Both calibration phases
    pub fn calibrate(&mut self, black: (u16, u16), white: (u16, u16)) {
        self.sensors = black;
        self.press(Button::B1);
        self.run(1500);

        self.sensors = white;
        self.press(Button::B2);
        self.run(1500);

        assert!(self.robot.is_calibrated());
    }

    /// Bytes from the modem
    pub fn modem(&mut self, text: &[u8]) {
        for b in text {
            self.dev.link.on_iot_rx(*b);
        }
    }

    /// Bytes from the host PC
    pub fn host(&mut self, text: &[u8]) {
        for b in text {
            self.dev.link.on_pc_rx(*b);
        }
    }

    /// Everything queued for the modem
    pub fn to_modem(&mut self) -> Vec<u8> {
        let mut v = Vec::new();
        while let Some(b) = self.dev.link.on_iot_tx() {
            v.push(b);
        }
        v
    }

    /// Everything queued for the host PC
    pub fn to_host(&mut self) -> Vec<u8> {
        let mut v = Vec::new();
        while let Some(b) = self.dev.link.on_pc_tx() {
            v.push(b);
        }
        v
    }

    pub fn state(&self) -> DriveState {
        self.robot.drive_state()
    }

    /// Duties on the PWM outputs: left fwd, left rev, right fwd, right rev
    pub fn duties(&self) -> [u16; 4] {
        [
            self.pins[0].get_duty(),
            self.pins[1].get_duty(),
            self.pins[2].get_duty(),
            self.pins[3].get_duty(),
        ]
    }

    pub fn command(&self) -> MotorCommand {
        self.robot.wheels().command()
    }

    pub fn supply(&self) -> Supply {
        self.robot.wheels().supply()
    }

    pub fn logged(&self, e: &Events) -> bool {
        self.actions.contains(&Actions::Debug(e.clone()))
    }
}
