use crate::sw::comm::{Direction, Maneuver, MotorCommand, Rotation, Supply, Wheel};
use crate::sw::config::{DIRECTION_CHANGE_TICKS, WHEEL_PERIOD};
use embedded_hal::PwmPin;

// Line robot motion
//
// Four PWM channels, two per wheel. On the target these are TIM4:
//
// PB6 (TIM4_CH1) left wheel forward speed
// PB7 (TIM4_CH2) left wheel reverse speed
// PB8 (TIM4_CH3) right wheel forward speed
// PB9 (TIM4_CH4) right wheel reverse speed
//
// Duties are given in `0..=WHEEL_PERIOD` and scaled to the timer range.
// A wheel is never driven forward and reverse at the same time.

/// Motion error
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Error {
    /// Forward and reverse duty both set on one wheel
    Conflict,
    /// Duty above WHEEL_PERIOD
    OutOfRange,
}

/// Wheel control used by the robot main loop
pub trait Wheels {
    /// Request a semantic maneuver, subject to the direction change policy
    fn apply(&mut self, m: Maneuver) -> Result<(), Error>;
    /// Reverse pulse: bypasses the direction change policy
    fn ebrake(&mut self);
    /// Stop all wheels at once and forget their directions
    fn full_stop(&mut self);
    fn set_supply(&mut self, supply: Supply);
    /// Drive tick: counts down a pending direction change
    fn tick(&mut self);
    /// Duties currently on the outputs
    fn command(&self) -> MotorCommand;
}

/// One wheel: (forward, reverse) channels
struct WheelPwm<F, R> {
    gc: (F, R),
}

impl<F, R> WheelPwm<F, R>
where
    F: PwmPin<Duty = u16>,
    R: PwmPin<Duty = u16>,
{
    fn set(&mut self, fwd: u16, rev: u16, max: u16) {
        // zero the idle direction first
        if fwd == 0 {
            self.gc.0.set_duty(0);
            self.gc.1.set_duty(scale(rev, max));
        } else {
            self.gc.1.set_duty(0);
            self.gc.0.set_duty(scale(fwd, max));
        }
    }
}

fn scale(duty: u16, max: u16) -> u16 {
    (u32::from(duty) * u32::from(max) / u32::from(WHEEL_PERIOD)) as u16
}

/// Motion
pub struct Motion<LF, LR, RF, RR> {
    left: WheelPwm<LF, LR>,
    right: WheelPwm<RF, RR>,
    /// max pwm duty
    max_duty: u16,
    supply: Supply,
    /// hold wheels stopped before reversing their direction
    enforce: bool,
    /// duties on the outputs
    out: MotorCommand,
    /// last requested direction of each wheel
    dir: [Direction; 2],
    /// request held during a direction change
    pending: Option<MotorCommand>,
    settle: u8,
}

impl<LF, LR, RF, RR> Motion<LF, LR, RF, RR>
where
    LF: PwmPin<Duty = u16>,
    LR: PwmPin<Duty = u16>,
    RF: PwmPin<Duty = u16>,
    RR: PwmPin<Duty = u16>,
{
    pub fn init((lf, lr): (LF, LR), (rf, rr): (RF, RR), enforce: bool) -> Self {
        let mut m = Motion {
            left: WheelPwm { gc: (lf, lr) },
            right: WheelPwm { gc: (rf, rr) },
            max_duty: 0,
            supply: Supply::Off,
            enforce,
            out: MotorCommand::stop(),
            dir: [Direction::None; 2],
            pending: None,
            settle: 0,
        };

        m.max_duty = m.left.gc.0.get_max_duty();

        m.left.gc.0.set_duty(0);
        m.left.gc.1.set_duty(0);
        m.right.gc.0.set_duty(0);
        m.right.gc.1.set_duty(0);

        m.left.gc.0.enable();
        m.left.gc.1.enable();
        m.right.gc.0.enable();
        m.right.gc.1.enable();

        m
    }

    /// Low level: write four duties, subject to the direction change policy
    pub fn set_wheel_speeds(&mut self, cmd: MotorCommand) -> Result<(), Error> {
        if !cmd.is_valid() {
            return Err(Error::Conflict);
        }

        let duties = [cmd.left_fwd, cmd.left_rev, cmd.right_fwd, cmd.right_rev];
        if duties.iter().any(|d| *d > WHEEL_PERIOD) {
            return Err(Error::OutOfRange);
        }

        if self.supply == Supply::Off {
            self.write(MotorCommand::stop());
            return Ok(());
        }

        if cmd.is_stopped() {
            self.full_stop();
            return Ok(());
        }

        let reversing = self.reverses(cmd);
        self.dir = [cmd.direction(Wheel::Left), cmd.direction(Wheel::Right)];

        if self.enforce && (reversing || self.pending.is_some()) {
            if reversing {
                self.settle = DIRECTION_CHANGE_TICKS;
            }
            self.pending = Some(cmd);
            self.write(MotorCommand::stop());
            return Ok(());
        }

        self.write(cmd);
        Ok(())
    }

    pub fn forward(&mut self, speed: u16) -> Result<(), Error> {
        self.set_wheel_speeds(Maneuver::Forward(speed).command())
    }

    pub fn reverse(&mut self, speed: u16) -> Result<(), Error> {
        self.set_wheel_speeds(Maneuver::Reverse(speed).command())
    }

    pub fn turn(&mut self, rot: Rotation, speed: u16) -> Result<(), Error> {
        self.set_wheel_speeds(Maneuver::Turn(rot, speed).command())
    }

    pub fn rotate(&mut self, rot: Rotation, speed: u16) -> Result<(), Error> {
        self.set_wheel_speeds(Maneuver::Rotate(rot, speed).command())
    }

    pub fn nudge(&mut self, rot: Rotation, speed: u16) -> Result<(), Error> {
        self.set_wheel_speeds(Maneuver::Nudge(rot, speed).command())
    }

    pub fn supply(&self) -> Supply {
        self.supply
    }

    pub fn is_settling(&self) -> bool {
        self.pending.is_some()
    }

    fn reverses(&self, cmd: MotorCommand) -> bool {
        let new = [cmd.direction(Wheel::Left), cmd.direction(Wheel::Right)];

        self.dir
            .iter()
            .zip(new.iter())
            .any(|(old, new)| *old != Direction::None && *new != Direction::None && old != new)
    }

    fn write(&mut self, cmd: MotorCommand) {
        self.left.set(cmd.left_fwd, cmd.left_rev, self.max_duty);
        self.right.set(cmd.right_fwd, cmd.right_rev, self.max_duty);
        self.out = cmd;
    }
}

impl<LF, LR, RF, RR> Wheels for Motion<LF, LR, RF, RR>
where
    LF: PwmPin<Duty = u16>,
    LR: PwmPin<Duty = u16>,
    RF: PwmPin<Duty = u16>,
    RR: PwmPin<Duty = u16>,
{
    fn apply(&mut self, m: Maneuver) -> Result<(), Error> {
        match m {
            Maneuver::EBrake => {
                self.ebrake();
                Ok(())
            }
            Maneuver::FullStop => {
                self.full_stop();
                Ok(())
            }
            _ => self.set_wheel_speeds(m.command()),
        }
    }

    fn ebrake(&mut self) {
        if self.supply == Supply::Off {
            return;
        }

        let cmd = Maneuver::EBrake.command();
        self.pending = None;
        self.settle = 0;
        self.dir = [Direction::Reverse; 2];
        self.write(cmd);
    }

    fn full_stop(&mut self) {
        self.pending = None;
        self.settle = 0;
        self.dir = [Direction::None; 2];
        self.write(MotorCommand::stop());
    }

    fn set_supply(&mut self, supply: Supply) {
        self.supply = supply;
        if supply == Supply::Off {
            self.full_stop();
        }
    }

    fn tick(&mut self) {
        if self.settle > 0 {
            self.settle -= 1;
            if self.settle > 0 {
                return;
            }
        }

        if let Some(cmd) = self.pending.take() {
            if self.supply != Supply::Off {
                self.write(cmd);
            }
        }
    }

    fn command(&self) -> MotorCommand {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sw::config::{FAST, LINE_SPEED, SLOW};
    use std::cell::Cell;
    use std::rc::Rc;

    /// PWM channel recording its duty
    #[derive(Clone)]
    struct Pwm {
        duty: Rc<Cell<u16>>,
        max: u16,
    }

    impl Pwm {
        fn new(max: u16) -> Self {
            Pwm {
                duty: Rc::new(Cell::new(0xffff)),
                max,
            }
        }
    }

    impl PwmPin for Pwm {
        type Duty = u16;

        fn disable(&mut self) {}
        fn enable(&mut self) {}

        fn get_duty(&self) -> u16 {
            self.duty.get()
        }

        fn get_max_duty(&self) -> u16 {
            self.max
        }

        fn set_duty(&mut self, duty: u16) {
            self.duty.set(duty)
        }
    }

    type TestMotion = Motion<Pwm, Pwm, Pwm, Pwm>;

    fn motion(max: u16, enforce: bool) -> (TestMotion, [Pwm; 4]) {
        let pins = [Pwm::new(max), Pwm::new(max), Pwm::new(max), Pwm::new(max)];
        let mut m = Motion::init(
            (pins[0].clone(), pins[1].clone()),
            (pins[2].clone(), pins[3].clone()),
            enforce,
        );
        m.set_supply(Supply::Medium);
        (m, pins)
    }

    fn duties(pins: &[Pwm; 4]) -> [u16; 4] {
        [
            pins[0].get_duty(),
            pins[1].get_duty(),
            pins[2].get_duty(),
            pins[3].get_duty(),
        ]
    }

    #[test]
    fn test_init_all_off() {
        let (_, pins) = motion(WHEEL_PERIOD, false);
        assert_eq!(duties(&pins), [0; 4]);
    }

    #[test]
    fn test_forward_then_reverse_clears_forward() {
        let (mut m, pins) = motion(WHEEL_PERIOD, false);

        m.forward(SLOW).unwrap();
        assert_eq!(duties(&pins), [SLOW, 0, SLOW, 0]);

        m.reverse(FAST).unwrap();
        assert_eq!(duties(&pins), [0, FAST, 0, FAST]);
        assert!(m.command().is_valid());
    }

    #[test]
    fn test_duty_scaled_to_timer() {
        let (mut m, pins) = motion(1000, false);

        m.forward(WHEEL_PERIOD).unwrap();
        assert_eq!(duties(&pins), [1000, 0, 1000, 0]);

        m.rotate(Rotation::Right, WHEEL_PERIOD / 2).unwrap();
        assert_eq!(duties(&pins), [499, 0, 0, 499]);
    }

    #[test]
    fn test_rejects_conflict_and_range() {
        let (mut m, pins) = motion(WHEEL_PERIOD, false);
        m.forward(SLOW).unwrap();

        let bad = MotorCommand {
            left_fwd: SLOW,
            left_rev: SLOW,
            right_fwd: 0,
            right_rev: 0,
        };
        assert_eq!(m.set_wheel_speeds(bad), Err(Error::Conflict));

        let big = MotorCommand {
            left_fwd: WHEEL_PERIOD + 1,
            ..MotorCommand::stop()
        };
        assert_eq!(m.set_wheel_speeds(big), Err(Error::OutOfRange));

        assert_eq!(duties(&pins), [SLOW, 0, SLOW, 0]);
    }

    #[test]
    fn test_supply_off_ignores_requests() {
        let (mut m, pins) = motion(WHEEL_PERIOD, false);

        m.forward(SLOW).unwrap();
        m.set_supply(Supply::Off);
        assert_eq!(duties(&pins), [0; 4]);

        m.forward(SLOW).unwrap();
        m.ebrake();
        assert_eq!(duties(&pins), [0; 4]);
        assert_eq!(m.supply(), Supply::Off);
    }

    #[test]
    fn test_direction_change_delay() {
        let (mut m, pins) = motion(WHEEL_PERIOD, true);

        m.forward(SLOW).unwrap();
        assert_eq!(duties(&pins), [SLOW, 0, SLOW, 0]);

        m.rotate(Rotation::Left, LINE_SPEED).unwrap();
        assert_eq!(duties(&pins), [0; 4]);
        assert!(m.is_settling());

        for _ in 0..DIRECTION_CHANGE_TICKS - 1 {
            m.tick();
            assert_eq!(duties(&pins), [0; 4]);
        }
        m.tick();
        assert_eq!(duties(&pins), [0, LINE_SPEED, LINE_SPEED, 0]);
        assert!(!m.is_settling());
    }

    #[test]
    fn test_direction_change_without_policy_is_immediate() {
        let (mut m, pins) = motion(WHEEL_PERIOD, false);

        m.forward(SLOW).unwrap();
        m.rotate(Rotation::Left, LINE_SPEED).unwrap();
        assert_eq!(duties(&pins), [0, LINE_SPEED, LINE_SPEED, 0]);
    }

    #[test]
    fn test_stop_cancels_pending_change() {
        let (mut m, pins) = motion(WHEEL_PERIOD, true);

        m.forward(SLOW).unwrap();
        m.reverse(SLOW).unwrap();
        m.full_stop();
        for _ in 0..10 {
            m.tick();
        }
        assert_eq!(duties(&pins), [0; 4]);

        // directions forgotten: reverse applies at once
        m.reverse(SLOW).unwrap();
        assert_eq!(duties(&pins), [0, SLOW, 0, SLOW]);
    }

    #[test]
    fn test_same_direction_no_delay() {
        let (mut m, pins) = motion(WHEEL_PERIOD, true);

        m.forward(SLOW).unwrap();
        m.turn(Rotation::Left, FAST).unwrap();
        assert_eq!(duties(&pins), [0, 0, FAST, 0]);
        m.nudge(Rotation::Right, SLOW).unwrap();
        assert_eq!(duties(&pins), [SLOW, 0, 0, 0]);
    }

    #[test]
    fn test_ebrake_bypasses_policy() {
        let (mut m, pins) = motion(WHEEL_PERIOD, true);

        m.forward(FAST).unwrap();
        m.apply(Maneuver::EBrake).unwrap();
        assert_eq!(duties(&pins), [0, LINE_SPEED, 0, LINE_SPEED]);
    }
}
