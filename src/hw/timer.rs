use crate::sw::config::{ADC_PERIOD_MS, BOOT_PERIOD_MS, DEBOUNCE_PERIOD_MS, DRIVE_PERIOD_MS};
use embedded_hal::timer::CountDown;
use embedded_hal::timer::Periodic;
use void::Void;

/// Duration in msec
#[derive(Debug, Eq, PartialEq, Clone, Copy, PartialOrd, Ord)]
pub struct Millis(pub u32);

impl From<u32> for Millis {
    fn from(ms: u32) -> Self {
        Millis(ms)
    }
}

/// Self re-arming periodic timer on a virtual clock
///
/// The clock is moved forward by `advance`. Each elapsed period is
/// reported once by `wait`, then the compare point moves one period on.
pub struct PeriodicTimer {
    /// period in msec
    period: u32,
    /// msec since the last reported expiry
    elapsed: u32,
}

impl PeriodicTimer {
    pub fn new<T>(period: T) -> Self
    where
        T: Into<Millis>,
    {
        PeriodicTimer {
            period: period.into().0,
            elapsed: 0,
        }
    }

    pub fn advance(&mut self, ms: u32) {
        self.elapsed = self.elapsed.saturating_add(ms);
    }

    pub fn period(&self) -> Millis {
        Millis(self.period)
    }
}

impl Periodic for PeriodicTimer {}

impl CountDown for PeriodicTimer {
    type Time = Millis;

    fn start<T>(&mut self, timeout: T)
    where
        T: Into<Millis>,
    {
        self.period = timeout.into().0;
        self.elapsed = 0;
    }

    fn wait(&mut self) -> nb::Result<(), Void> {
        if self.period == 0 || self.elapsed < self.period {
            return Err(nb::Error::WouldBlock);
        }

        self.elapsed -= self.period;
        Ok(())
    }
}

/// Periodic tick sources
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Tick {
    /// 5 msec: ADC channel stepping
    Adc,
    /// 50 msec: debounce and short timeouts
    Debounce,
    /// 100 msec: drive state timer
    Drive,
    /// 200 msec: boot stages and AT pacing
    Boot,
}

/// Four periodic timers on one virtual clock
pub struct Ticker {
    timers: [(Tick, PeriodicTimer); 4],
    now: u32,
}

impl Ticker {
    pub fn new() -> Self {
        Ticker {
            timers: [
                (Tick::Adc, PeriodicTimer::new(ADC_PERIOD_MS)),
                (Tick::Debounce, PeriodicTimer::new(DEBOUNCE_PERIOD_MS)),
                (Tick::Drive, PeriodicTimer::new(DRIVE_PERIOD_MS)),
                (Tick::Boot, PeriodicTimer::new(BOOT_PERIOD_MS)),
            ],
            now: 0,
        }
    }

    /// Move the clock forward in 1 msec steps, reporting every expiry in order
    pub fn advance<F>(&mut self, ms: u32, mut f: F)
    where
        F: FnMut(Tick),
    {
        for _ in 0..ms {
            self.now = self.now.wrapping_add(1);
            for (tick, tmr) in self.timers.iter_mut() {
                tmr.advance(1);
                while tmr.wait().is_ok() {
                    f(*tick);
                }
            }
        }
    }

    pub fn now(&self) -> Millis {
        Millis(self.now)
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}
