use crate::sw::comm::{Maneuver, Rotation, Supply};
use crate::sw::config::DriveConfig;

/// Controller regime by steering error magnitude
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Regime {
    /// |e| <= deadzone
    Centered,
    /// deadzone < |e| < sharp
    Proportional,
    /// |e| >= sharp
    Sharp,
}

impl Regime {
    /// Motor supply level used in this regime
    pub fn supply(self) -> Supply {
        match self {
            Regime::Centered => Supply::Fast,
            Regime::Proportional => Supply::Medium,
            Regime::Sharp => Supply::Slow,
        }
    }
}

/// Steering error: positive when drifting right
pub fn steering_error(left: u16, right: u16, threshold: [u16; 2]) -> i32 {
    let left_error = i32::from(left) - i32::from(threshold[0]);
    let right_error = i32::from(right) - i32::from(threshold[1]);

    right_error - left_error
}

pub fn regime(error: i32, cfg: &DriveConfig) -> Regime {
    let e = error.abs();

    if e <= cfg.deadzone {
        Regime::Centered
    } else if e < cfg.sharp {
        Regime::Proportional
    } else {
        Regime::Sharp
    }
}

/// Proportional line following, forward only
///
/// Positive error slows the left wheel by `e * kp` (never below
/// `cfg.minimum`); a sharp error stops it. Negative error mirrors this on
/// the right wheel.
pub fn steer(left: u16, right: u16, threshold: [u16; 2], cfg: &DriveConfig) -> (Regime, Maneuver) {
    let error = steering_error(left, right, threshold);
    let r = regime(error, cfg);

    let m = match r {
        Regime::Centered => Maneuver::Steer(cfg.nominal, cfg.nominal),
        Regime::Proportional => {
            let slowed = i32::from(cfg.nominal) - error.abs() * cfg.kp;
            let slowed = slowed.max(i32::from(cfg.minimum)) as u16;

            if error > 0 {
                Maneuver::Steer(slowed, cfg.nominal)
            } else {
                Maneuver::Steer(cfg.nominal, slowed)
            }
        }
        Regime::Sharp => {
            if error > 0 {
                Maneuver::Turn(Rotation::Left, cfg.nominal)
            } else {
                Maneuver::Turn(Rotation::Right, cfg.nominal)
            }
        }
    };

    (r, m)
}
