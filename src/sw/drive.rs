use crate::sw::calib::Profile;
use crate::sw::comm::{Maneuver, Rotation, Supply};
use crate::sw::config::{DriveConfig, TIPTOE};
use crate::sw::control;
use crate::sw::display::Display;

/// Line-follow states
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum DriveState {
    Idle,
    /// forward until a sensor sees the line
    Start,
    /// wheels at rest after the intercept brake pulse
    BrakeRecover,
    /// spin until both sensors are on the line
    Align,
    /// wheels stopped before moving on to the staged state
    BrakeDelay,
    /// optional dwell on the line
    Intercept,
    /// turn onto the line
    Turn,
    Travel,
    Circle,
    /// straight out of the circle
    Exit,
    Stop,
}

impl DriveState {
    pub fn label(self) -> &'static [u8] {
        match self {
            DriveState::Idle => b"STOPPED   ",
            DriveState::Start => b"BL Start  ",
            DriveState::BrakeRecover => b"Brake     ",
            DriveState::Align => b"Align     ",
            DriveState::BrakeDelay => b"Brake ... ",
            DriveState::Intercept => b"Intercept ",
            DriveState::Turn => b"BL Turn   ",
            DriveState::Travel => b"BL Travel ",
            DriveState::Circle => b"BL Circle ",
            DriveState::Exit => b"BL Exit   ",
            DriveState::Stop => b"BL Stop   ",
        }
    }

    /// Wheels under autonomous control
    pub fn is_driving(self) -> bool {
        self != DriveState::Idle && self != DriveState::Stop
    }
}

/// What one state machine step asks of the wheels
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
pub struct Output {
    pub maneuver: Option<Maneuver>,
    pub supply: Option<Supply>,
}

impl Output {
    fn drive(m: Maneuver) -> Self {
        Output {
            maneuver: Some(m),
            supply: None,
        }
    }

    fn with(m: Maneuver, s: Supply) -> Self {
        Output {
            maneuver: Some(m),
            supply: Some(s),
        }
    }
}

/// Line-follow state machine
///
/// `step` runs once per 100 msec drive tick and is the only place where
/// the state changes, apart from `start` and `emergency_stop`. The timer
/// counts drive ticks since the last transition.
pub struct LineFollower {
    cfg: DriveConfig,
    state: DriveState,
    /// successor of BrakeDelay
    next: DriveState,
    timer: u32,
    threshold: [u16; 2],
    /// travel/circle pause elapsed
    paused: bool,
    exit_requested: bool,
    /// side that met the line first
    first: Rotation,
}

impl LineFollower {
    pub fn new(cfg: DriveConfig) -> Self {
        LineFollower {
            cfg,
            state: DriveState::Idle,
            next: DriveState::Idle,
            timer: 0,
            threshold: [0; 2],
            paused: false,
            exit_requested: false,
            first: Rotation::Left,
        }
    }

    /// Start autonomous driving: refused without a calibration profile
    pub fn start(&mut self, profile: Option<Profile>, display: &mut Display) -> Option<Output> {
        let profile = match profile {
            Some(p) => p,
            None => {
                display.set_all([b"ERROR:    ", b"Must      ", b"calibrate ", b"first!    "]);
                return None;
            }
        };

        self.threshold = profile.threshold;
        self.exit_requested = false;
        self.paused = false;
        self.goto(DriveState::Start, display);

        Some(Output::with(Maneuver::Forward(self.cfg.cautious), Supply::Medium))
    }

    /// Leave the circle once the minimum circle time is done
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    /// Stop from any state, bypassing every delay
    pub fn emergency_stop(&mut self, display: &mut Display) -> Output {
        self.exit_requested = false;
        self.goto(DriveState::Idle, display);

        Output::with(Maneuver::FullStop, Supply::Off)
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    pub fn timer(&self) -> u32 {
        self.timer
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Drive tick: `sensors` are the latest (left, right) values,
    /// `braking` is true while the intercept brake pulse is running
    pub fn step(&mut self, (left, right): (u16, u16), braking: bool, display: &mut Display) -> Output {
        if !self.state.is_driving() {
            return Output::default();
        }

        self.timer = self.timer.saturating_add(1);

        let left_on = left > self.threshold[0];
        let right_on = right > self.threshold[1];
        let cfg = self.cfg;

        match self.state {
            DriveState::Start => {
                if left_on || right_on {
                    self.first = match (left_on, right_on) {
                        (true, false) => Rotation::Left,
                        (false, true) => Rotation::Right,
                        _ => {
                            if control::steering_error(left, right, self.threshold) > 0 {
                                Rotation::Right
                            } else {
                                Rotation::Left
                            }
                        }
                    };
                    self.goto(DriveState::BrakeRecover, display);
                    return Output::drive(Maneuver::EBrake);
                }

                Output::drive(Maneuver::Forward(cfg.cautious))
            }

            DriveState::BrakeRecover => {
                if self.timer >= cfg.brake_recover {
                    self.goto(DriveState::Align, display);
                }

                if braking {
                    Output::default()
                } else {
                    Output::drive(Maneuver::FullStop)
                }
            }

            DriveState::Align => {
                let (m, timeout) = match (left_on, right_on) {
                    (true, true) if self.timer >= cfg.align_min => {
                        self.brake_to(self.after_align(), display);
                        return Output::drive(Maneuver::FullStop);
                    }
                    (true, true) => (Maneuver::Forward(TIPTOE), None),
                    (true, false) => (Maneuver::Rotate(Rotation::Left, cfg.align), Some(cfg.align_timeout)),
                    (false, true) => (Maneuver::Rotate(Rotation::Right, cfg.align), Some(cfg.align_timeout)),
                    (false, false) => (Maneuver::FullStop, Some(cfg.search_timeout)),
                };

                match timeout {
                    Some(t) if self.timer >= t => {
                        self.brake_to(self.after_align(), display);
                        Output::drive(Maneuver::FullStop)
                    }
                    _ => Output::drive(m),
                }
            }

            DriveState::BrakeDelay => {
                if self.timer >= cfg.settle {
                    let next = self.next;
                    self.paused = false;
                    self.goto(next, display);

                    return match next {
                        DriveState::Exit => Output::with(Maneuver::Forward(cfg.cautious), Supply::Medium),
                        _ => Output::drive(Maneuver::FullStop),
                    };
                }

                Output::drive(Maneuver::FullStop)
            }

            DriveState::Intercept => {
                let dwell = cfg.intercept.unwrap_or(0);
                if self.timer >= dwell {
                    self.goto(DriveState::Turn, display);
                    return Output::with(Maneuver::FullStop, Supply::Slow);
                }

                Output::drive(Maneuver::FullStop)
            }

            DriveState::Turn => {
                if (left_on && right_on) || self.timer >= cfg.turn_timeout {
                    self.brake_to(DriveState::Travel, display);
                    return Output::drive(Maneuver::FullStop);
                }

                let rot = match (left_on, right_on) {
                    (true, false) => Rotation::Left,
                    (false, true) => Rotation::Right,
                    _ => self.first,
                };

                Output::with(Maneuver::Turn(rot, cfg.align), Supply::Slow)
            }

            DriveState::Travel => {
                if !self.pause(cfg.travel_pause) {
                    return Output::drive(Maneuver::FullStop);
                }

                if self.timer >= cfg.travel {
                    self.brake_to(DriveState::Circle, display);
                    return Output::drive(Maneuver::FullStop);
                }

                self.follow(left, right)
            }

            DriveState::Circle => {
                if !self.pause(cfg.circle_pause) {
                    return Output::drive(Maneuver::FullStop);
                }

                if self.exit_requested && self.timer >= cfg.circle_min {
                    self.brake_to(DriveState::Exit, display);
                    return Output::drive(Maneuver::FullStop);
                }

                self.follow(left, right)
            }

            DriveState::Exit => {
                if self.timer >= cfg.exit {
                    self.goto(DriveState::Stop, display);
                    display.set_all([b"BL Stop   ", b"Course    ", b"Complete! ", b""]);
                    return Output::with(Maneuver::FullStop, Supply::Off);
                }

                Output::drive(Maneuver::Forward(cfg.cautious))
            }

            DriveState::Idle | DriveState::Stop => Output::default(),
        }
    }

    fn follow(&self, left: u16, right: u16) -> Output {
        let (regime, m) = control::steer(left, right, self.threshold, &self.cfg);
        Output::with(m, regime.supply())
    }

    /// Hold still for `ticks` after entering the state, then restart the timer
    fn pause(&mut self, ticks: u32) -> bool {
        if self.paused {
            return true;
        }

        if self.timer >= ticks {
            self.paused = true;
            self.timer = 0;
        }

        false
    }

    fn after_align(&self) -> DriveState {
        match self.cfg.intercept {
            Some(_) => DriveState::Intercept,
            None => DriveState::Travel,
        }
    }

    fn brake_to(&mut self, next: DriveState, display: &mut Display) {
        self.next = next;
        self.goto(DriveState::BrakeDelay, display);
    }

    fn goto(&mut self, state: DriveState, display: &mut Display) {
        self.state = state;
        self.timer = 0;
        display.set_line(0, state.label());
    }
}
