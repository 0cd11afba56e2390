use crate::sw::boot::{IotStage, PowerStage};
use crate::sw::calib::Phase;
use crate::sw::config::{LINE_SPEED, MOVE_TICKS};
use crate::sw::drive::DriveState;
use heapless::consts::*;
use heapless::String;

/*
 * Events: notifications from controller to firmware log
 *
 */

#[derive(Debug, Clone, PartialEq)]
pub enum Events {
    /// Power-on sequence stage entered
    Boot(PowerStage),
    /// IoT modem boot stage entered
    Iot(IotStage),
    /// Network name reported by the modem
    Ssid(String<U32>),
    /// Station address reported by the modem
    IpAddress(String<U16>),
    /// Remote command with a wrong PIN
    BadActor,
    /// Remote command accepted for dispatch
    Remote(Command),
    /// Remote command payload not understood
    UnknownCommand,
    /// Remote command dropped: queue full
    CommandDropped,
    /// Calibration phase complete: (phase, left mean, right mean)
    Calibration(Phase, u16, u16),
    /// Thresholds ready: (left, right)
    Calibrated(u16, u16),
    /// Autonomous start refused: not calibrated
    NotCalibrated,
    /// Line-follow state change
    Drive(DriveState),
    /// Emergency stop from a button or remote command
    EmergencyStop,
    /// ADC sampler stalled and was reset
    AdcWatchdog,
    /// Serial link speed changed
    Baud(Baud),
}

/*
 * Actions: directions from controller to hardware
 *
 */

/// Wheel rotation direction
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Direction {
    Forward,
    None,
    Reverse,
}

/// Vehicle rotation direction
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Rotation {
    Left,
    Right,
}

/// Wheel selector
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Wheel {
    Left,
    Right,
}

/// Motor supply reference level
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Supply {
    Off,
    Slow,
    Medium,
    Fast,
}

/// Serial link speed
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Baud {
    B115200,
    B460800,
}

impl Baud {
    pub fn bps(self) -> u32 {
        match self {
            Baud::B115200 => 115_200,
            Baud::B460800 => 460_800,
        }
    }

    pub fn reply(self) -> &'static [u8] {
        match self {
            Baud::B115200 => b"115,200\r\n",
            Baud::B460800 => b"460,800\r\n",
        }
    }
}

/// Four PWM duties of both wheels
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
pub struct MotorCommand {
    pub left_fwd: u16,
    pub left_rev: u16,
    pub right_fwd: u16,
    pub right_rev: u16,
}

impl MotorCommand {
    pub const fn stop() -> Self {
        MotorCommand {
            left_fwd: 0,
            left_rev: 0,
            right_fwd: 0,
            right_rev: 0,
        }
    }

    pub fn wheels(left: (Direction, u16), right: (Direction, u16)) -> Self {
        let (left_fwd, left_rev) = split(left);
        let (right_fwd, right_rev) = split(right);

        MotorCommand {
            left_fwd,
            left_rev,
            right_fwd,
            right_rev,
        }
    }

    /// No wheel is driven in both directions at once
    pub fn is_valid(&self) -> bool {
        !(self.left_fwd != 0 && self.left_rev != 0) && !(self.right_fwd != 0 && self.right_rev != 0)
    }

    pub fn direction(&self, wheel: Wheel) -> Direction {
        let (fwd, rev) = match wheel {
            Wheel::Left => (self.left_fwd, self.left_rev),
            Wheel::Right => (self.right_fwd, self.right_rev),
        };

        if fwd != 0 {
            Direction::Forward
        } else if rev != 0 {
            Direction::Reverse
        } else {
            Direction::None
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self == MotorCommand::stop()
    }
}

fn split((dir, duty): (Direction, u16)) -> (u16, u16) {
    match dir {
        Direction::Forward => (duty, 0),
        Direction::Reverse => (0, duty),
        Direction::None => (0, 0),
    }
}

/// Semantic wheel maneuvers
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Maneuver {
    FullStop,
    /// both wheels forward
    Forward(u16),
    /// both wheels reverse
    Reverse(u16),
    /// inside wheel off, outside wheel forward
    Turn(Rotation, u16),
    /// spin in place: inside wheel reverse, outside wheel forward
    Rotate(Rotation, u16),
    /// single outside wheel creep
    Nudge(Rotation, u16),
    /// reverse pulse killing forward momentum
    EBrake,
    /// forward-only differential steering: (left, right)
    Steer(u16, u16),
}

impl Maneuver {
    pub fn command(self) -> MotorCommand {
        use Direction::*;

        match self {
            Maneuver::FullStop => MotorCommand::stop(),
            Maneuver::Forward(s) => MotorCommand::wheels((Forward, s), (Forward, s)),
            Maneuver::Reverse(s) => MotorCommand::wheels((Reverse, s), (Reverse, s)),
            Maneuver::Turn(Rotation::Left, s) => MotorCommand::wheels((None, 0), (Forward, s)),
            Maneuver::Turn(Rotation::Right, s) => MotorCommand::wheels((Forward, s), (None, 0)),
            Maneuver::Rotate(Rotation::Left, s) => MotorCommand::wheels((Reverse, s), (Forward, s)),
            Maneuver::Rotate(Rotation::Right, s) => {
                MotorCommand::wheels((Forward, s), (Reverse, s))
            }
            Maneuver::Nudge(Rotation::Left, s) => MotorCommand::wheels((None, 0), (Forward, s)),
            Maneuver::Nudge(Rotation::Right, s) => MotorCommand::wheels((Forward, s), (None, 0)),
            Maneuver::EBrake => {
                MotorCommand::wheels((Reverse, LINE_SPEED), (Reverse, LINE_SPEED))
            }
            Maneuver::Steer(l, r) => MotorCommand::wheels((Forward, l), (Forward, r)),
        }
    }
}

/// Manual move requested over the network
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Move {
    Forward,
    Reverse,
    RotateLeft,
    RotateRight,
}

/// Remote command payload (after the PIN)
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Command {
    /// start autonomous line following
    Autonomous,
    /// leave the circle once allowed
    Exit,
    /// emergency stop
    Stop,
    /// manual move for a number of drive ticks
    Manual(Move, u16),
}

impl Command {
    pub fn parse(payload: &[u8]) -> Option<Command> {
        let (op, arg) = payload.split_first()?;

        match op {
            b'A' if arg.is_empty() => Some(Command::Autonomous),
            b'X' if arg.is_empty() => Some(Command::Exit),
            b'S' if arg.is_empty() => Some(Command::Stop),
            b'F' => Some(Command::Manual(Move::Forward, parse_ticks(arg)?)),
            b'B' => Some(Command::Manual(Move::Reverse, parse_ticks(arg)?)),
            b'L' => Some(Command::Manual(Move::RotateLeft, parse_ticks(arg)?)),
            b'R' => Some(Command::Manual(Move::RotateRight, parse_ticks(arg)?)),
            _ => None,
        }
    }
}

fn parse_ticks(arg: &[u8]) -> Option<u16> {
    if arg.is_empty() {
        return Some(MOVE_TICKS);
    }

    let mut n: u16 = 0;
    for c in arg {
        if !c.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(u16::from(c - b'0'))?;
    }

    Some(n)
}

/// Command payload storage
pub type Payload = heapless::Vec<u8, U20>;

/// SSID storage
pub type Ssid = String<U32>;

/// IP address storage
pub type IpAddr = String<U16>;

#[derive(Debug, Clone, PartialEq)]
pub enum Actions {
    Debug(Events),
    /// reconfigure both UARTs
    Baud(Baud),
    /// IoT modem reset line: released when true
    IotPower(bool),
    /// re-enable the ADC after a watchdog reset
    AdcReset,
}
