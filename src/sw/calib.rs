use crate::sw::config::CALIBRATION_SAMPLES;

/// Reference surface under the sensors
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Phase {
    Black,
    White,
}

/// Per-sensor calibration: index 0 is left, 1 is right
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
pub struct Profile {
    pub black: [u16; 2],
    pub white: [u16; 2],
    pub threshold: [u16; 2],
}

/// Two-phase sensor calibration
///
/// Each phase averages `CALIBRATION_SAMPLES` fresh readings of both
/// sensors. Only values the sampler marked fresh are counted, so the
/// procedure never outruns the converter. Once both phases are done the
/// threshold of each sensor is the midpoint of its black and white means.
pub struct Calibration {
    phase: Option<Phase>,
    sum: [u32; 2],
    count: usize,
    /// fresh value waiting for its pair
    held: [Option<u16>; 2],
    black: Option<[u16; 2]>,
    white: Option<[u16; 2]>,
    profile: Option<Profile>,
}

impl Calibration {
    pub const fn new() -> Self {
        Calibration {
            phase: None,
            sum: [0; 2],
            count: 0,
            held: [None; 2],
            black: None,
            white: None,
            profile: None,
        }
    }

    /// Start averaging over a reference surface
    pub fn begin(&mut self, phase: Phase) {
        self.phase = Some(phase);
        self.sum = [0; 2];
        self.count = 0;
        self.held = [None; 2];
    }

    /// Forget everything and start over
    pub fn reset(&mut self) {
        *self = Calibration::new();
    }

    /// Feed fresh readings: returns the phase means once the phase completes
    pub fn feed(&mut self, left: Option<u16>, right: Option<u16>) -> Option<(Phase, [u16; 2])> {
        let phase = self.phase?;

        if left.is_some() {
            self.held[0] = left;
        }
        if right.is_some() {
            self.held[1] = right;
        }

        let (l, r) = match self.held {
            [Some(l), Some(r)] => (l, r),
            _ => return None,
        };

        self.held = [None; 2];
        self.sum[0] += u32::from(l);
        self.sum[1] += u32::from(r);
        self.count += 1;

        if self.count < CALIBRATION_SAMPLES {
            return None;
        }

        let n = CALIBRATION_SAMPLES as u32;
        let mean = [(self.sum[0] / n) as u16, (self.sum[1] / n) as u16];

        match phase {
            Phase::Black => self.black = Some(mean),
            Phase::White => self.white = Some(mean),
        }
        self.phase = None;

        if let (Some(black), Some(white)) = (self.black, self.white) {
            self.profile = Some(Profile {
                black,
                white,
                threshold: [midpoint(black[0], white[0]), midpoint(black[1], white[1])],
            });
        }

        Some((phase, mean))
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_some()
    }

    pub fn is_done(&self, phase: Phase) -> bool {
        match phase {
            Phase::Black => self.black.is_some(),
            Phase::White => self.white.is_some(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.profile.is_some()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.profile
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

fn midpoint(black: u16, white: u16) -> u16 {
    ((u32::from(black) + u32::from(white)) / 2) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(c: &mut Calibration, phase: Phase, left: u16, right: u16) -> Option<(Phase, [u16; 2])> {
        c.begin(phase);
        let mut out = None;
        for _ in 0..CALIBRATION_SAMPLES {
            out = c.feed(Some(left), Some(right));
        }
        out
    }

    #[test]
    fn test_threshold_is_midpoint() {
        let mut c = Calibration::new();

        assert_eq!(run(&mut c, Phase::Black, 800, 790), Some((Phase::Black, [800, 790])));
        assert!(!c.is_complete());
        assert_eq!(run(&mut c, Phase::White, 560, 561), Some((Phase::White, [560, 561])));

        let p = c.profile().unwrap();
        assert_eq!(p.threshold, [680, 675]);
        assert_eq!(p.black, [800, 790]);
        assert_eq!(p.white, [560, 561]);
    }

    #[test]
    fn test_mean_truncates() {
        let mut c = Calibration::new();
        c.begin(Phase::Black);

        let samples = [1u16, 2, 2, 2, 2, 2, 2, 2, 2, 2];
        let mut out = None;
        for s in samples.iter() {
            out = c.feed(Some(*s), Some(*s));
        }
        assert_eq!(out, Some((Phase::Black, [1, 1])));
    }

    #[test]
    fn test_waits_for_fresh_pairs() {
        let mut c = Calibration::new();
        c.begin(Phase::White);

        for _ in 0..CALIBRATION_SAMPLES * 3 {
            assert_eq!(c.feed(None, None), None);
            assert_eq!(c.feed(Some(100), None), None);
        }
        assert!(c.is_busy());

        let mut out = None;
        for _ in 0..CALIBRATION_SAMPLES {
            out = c.feed(Some(100), Some(200));
        }
        assert_eq!(out, Some((Phase::White, [100, 200])));
        assert!(!c.is_busy());
    }

    #[test]
    fn test_idle_ignores_samples() {
        let mut c = Calibration::new();
        assert_eq!(c.feed(Some(1), Some(1)), None);
        assert!(!c.is_done(Phase::Black));
    }

    #[test]
    fn test_reset() {
        let mut c = Calibration::new();
        run(&mut c, Phase::Black, 800, 800);
        run(&mut c, Phase::White, 560, 560);
        assert!(c.is_complete());

        c.reset();
        assert!(!c.is_complete());
        assert!(!c.is_done(Phase::Black));
    }
}
