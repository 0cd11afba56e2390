use crate::sw::config::ADC_WATCHDOG_TICKS;
use embedded_hal::digital::v2::OutputPin;

/// Sampler error
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Error {
    /// Conversion result while no conversion was requested
    Idle,
    /// Excitation LED failure
    HwError,
}

/// Multiplexed analog inputs in conversion order
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Channel {
    Left,
    Right,
    Thumb,
}

const CHANNELS: [Channel; 3] = [Channel::Left, Channel::Right, Channel::Thumb];

impl Channel {
    fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
            Channel::Thumb => 2,
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
pub struct Reading {
    /// 12-bit conversion result
    pub raw: u16,
    /// working 10-bit value
    pub value: u16,
    /// not yet consumed by the main loop
    pub fresh: bool,
}

/// Reflectance sampler
///
/// One converter is shared by three inputs. Each 100 msec cycle lights
/// the IR emitter and converts Left, Right and Thumb back to back; the
/// emitter goes dark once both line detectors are read.
pub struct Sampler<LED> {
    led: LED,
    readings: [Reading; 3],
    channel: usize,
    sampling: bool,
    converting: bool,
    /// 5 msec ticks since start
    ticks: u32,
    /// tick of the last completed conversion
    last: u32,
}

impl<LED> Sampler<LED>
where
    LED: OutputPin,
{
    pub fn new(led: LED) -> Self {
        Sampler {
            led,
            readings: [Reading::default(); 3],
            channel: 0,
            sampling: false,
            converting: false,
            ticks: 0,
            last: 0,
        }
    }

    /// 100 msec tick: light the emitter and enable one sampling cycle
    pub fn start_cycle(&mut self) -> Result<(), Error> {
        if self.sampling {
            return Ok(());
        }

        self.led.set_high().map_err(|_| Error::HwError)?;
        self.channel = 0;
        self.sampling = true;

        Ok(())
    }

    /// 5 msec tick: returns the channel to convert, if any
    pub fn on_tick(&mut self) -> Option<Channel> {
        self.ticks = self.ticks.wrapping_add(1);

        if !self.sampling || self.converting {
            return None;
        }

        self.converting = true;
        Some(CHANNELS[self.channel])
    }

    /// Conversion complete: returns the next channel to convert, if any
    pub fn on_conversion(&mut self, raw: u16) -> Result<Option<Channel>, Error> {
        if !self.converting {
            return Err(Error::Idle);
        }

        let ch = CHANNELS[self.channel];
        self.readings[ch.index()] = Reading {
            raw,
            value: raw >> 2,
            fresh: true,
        };
        self.last = self.ticks;

        if ch == Channel::Right {
            self.led.set_low().map_err(|_| Error::HwError)?;
        }

        self.channel += 1;
        if self.channel < CHANNELS.len() {
            return Ok(Some(CHANNELS[self.channel]));
        }

        self.channel = 0;
        self.sampling = false;
        self.converting = false;

        Ok(None)
    }

    /// Reset a stalled sampler: returns true if a reset was done
    pub fn watchdog(&mut self) -> bool {
        if self.ticks.wrapping_sub(self.last) <= ADC_WATCHDOG_TICKS {
            return false;
        }

        self.led.set_low().ok();
        self.channel = 0;
        self.sampling = false;
        self.converting = false;
        self.last = self.ticks;

        true
    }

    pub fn value(&self, ch: Channel) -> u16 {
        self.readings[ch.index()].value
    }

    pub fn reading(&self, ch: Channel) -> Reading {
        self.readings[ch.index()]
    }

    /// Read-and-clear the fresh value of a channel
    pub fn take_fresh(&mut self, ch: Channel) -> Option<u16> {
        let r = &mut self.readings[ch.index()];
        if !r.fresh {
            return None;
        }

        r.fresh = false;
        Some(r.value)
    }

    pub fn is_sampling(&self) -> bool {
        self.sampling
    }
}
