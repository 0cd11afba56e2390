use crate::hw::motion::Wheels;
use crate::hw::uart::Link;
use crate::sw::comm::Supply;
use crate::sw::config::{AT_PING, AT_REQUEST_IP, AT_REQUEST_SSID, AT_SET_MUX, AT_SET_SERVER};
use crate::sw::display::Display;
use crate::sw::iot::Scanner;

/*
 * Power-on sequence
 *
 */

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum PowerStage {
    Init,
    Lcd,
    LcdWait,
    IotInit,
    IotSequence,
    PwrEnable,
    PwrInit,
    PwrWait,
    Complete,
}

/// Stepped on every 200 msec boot tick until Complete
pub struct PowerOn {
    stage: PowerStage,
}

impl PowerOn {
    pub const fn new() -> Self {
        PowerOn {
            stage: PowerStage::Init,
        }
    }

    /// Boot tick: returns the stage entered, if any
    pub fn step<W: Wheels>(
        &mut self,
        iot: &mut IotBoot,
        link: &mut Link,
        wheels: &mut W,
        display: &mut Display,
    ) -> Option<PowerStage> {
        let next = match self.stage {
            PowerStage::Init => {
                display.set_all([b" BOOTING..", b"LCD Init..", b"", b""]);
                PowerStage::Lcd
            }
            PowerStage::Lcd => PowerStage::LcdWait,
            PowerStage::LcdWait => {
                display.set_line(1, b"LCD Ready ");
                PowerStage::IotInit
            }
            PowerStage::IotInit => {
                display.set_line(1, b"IOT Init..");
                link.enable_comms();
                iot.arm();
                PowerStage::IotSequence
            }
            PowerStage::IotSequence => {
                if !iot.is_complete() {
                    return None;
                }
                display.set_line(1, b"IOT Ready ");
                PowerStage::PwrEnable
            }
            PowerStage::PwrEnable => {
                display.set_line(1, b"PWR Init..");
                wheels.set_supply(Supply::Medium);
                PowerStage::PwrInit
            }
            PowerStage::PwrInit => PowerStage::PwrWait,
            PowerStage::PwrWait => {
                display.set_line(1, b"PWR Ready ");
                PowerStage::Complete
            }
            PowerStage::Complete => return None,
        };

        if next == PowerStage::Complete {
            display.set_line(0, b"  BOOTED  ");
        }

        self.stage = next;
        Some(next)
    }

    /// Give up on the modem and carry on with the power stages
    pub fn skip_iot(&mut self, iot: &mut IotBoot) -> Option<PowerStage> {
        if self.stage != PowerStage::IotSequence {
            return None;
        }

        iot.disarm();
        self.stage = PowerStage::PwrEnable;
        Some(self.stage)
    }

    pub fn stage(&self) -> PowerStage {
        self.stage
    }

    pub fn is_complete(&self) -> bool {
        self.stage == PowerStage::Complete
    }
}

impl Default for PowerOn {
    fn default() -> Self {
        Self::new()
    }
}

/*
 * IoT modem boot
 *
 */

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum IotStage {
    Enable,
    WaitReady,
    MuxSet,
    MuxOk,
    ServerSet,
    ServerOk,
    SsidRequest,
    SsidWait,
    IpRequest,
    IpWait,
    Complete,
}

/// Modem boot: power up, wait for the banner, then one AT command per
/// boot tick, each acknowledged by "OK" before the next one goes out.
/// Complete is terminal until `disarm`; from then on the modem is pinged
/// periodically.
pub struct IotBoot {
    stage: IotStage,
    armed: bool,
    power: Option<bool>,
    ping: u16,
}

impl IotBoot {
    pub const fn new() -> Self {
        IotBoot {
            stage: IotStage::Enable,
            armed: false,
            power: None,
            ping: 0,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.stage = IotStage::Enable;
    }

    /// Boot tick: returns the stage entered, if any
    pub fn step(&mut self, scanner: &mut Scanner, link: &mut Link) -> Option<IotStage> {
        let next = match self.stage {
            IotStage::Enable => {
                if !self.armed {
                    return None;
                }
                self.power = Some(true);
                IotStage::WaitReady
            }
            IotStage::WaitReady => {
                if !scanner.take_ready() {
                    return None;
                }
                IotStage::MuxSet
            }
            IotStage::MuxSet => send(scanner, link, AT_SET_MUX, IotStage::MuxOk)?,
            IotStage::MuxOk => acked(scanner, IotStage::ServerSet)?,
            IotStage::ServerSet => send(scanner, link, AT_SET_SERVER, IotStage::ServerOk)?,
            IotStage::ServerOk => acked(scanner, IotStage::SsidRequest)?,
            IotStage::SsidRequest => send(scanner, link, AT_REQUEST_SSID, IotStage::SsidWait)?,
            IotStage::SsidWait => acked(scanner, IotStage::IpRequest)?,
            IotStage::IpRequest => send(scanner, link, AT_REQUEST_IP, IotStage::IpWait)?,
            IotStage::IpWait => {
                acked(scanner, IotStage::Complete)?;
                self.armed = false;
                IotStage::Complete
            }
            IotStage::Complete => return None,
        };

        self.stage = next;
        Some(next)
    }

    /// Boot tick after completion: ping the modem every `period` ticks
    pub fn keep_alive(&mut self, link: &mut Link, period: u16) -> bool {
        if !self.is_complete() || period == 0 {
            return false;
        }

        self.ping += 1;
        if self.ping < period {
            return false;
        }

        self.ping = 0;
        link.send_at(AT_PING)
    }

    /// Modem reset line request
    pub fn take_power(&mut self) -> Option<bool> {
        self.power.take()
    }

    pub fn stage(&self) -> IotStage {
        self.stage
    }

    pub fn is_complete(&self) -> bool {
        self.stage == IotStage::Complete
    }
}

impl Default for IotBoot {
    fn default() -> Self {
        Self::new()
    }
}

fn send(scanner: &mut Scanner, link: &mut Link, cmd: &[u8], next: IotStage) -> Option<IotStage> {
    // stale acks must not complete this command
    scanner.take_ok();

    if link.send_at(cmd) {
        Some(next)
    } else {
        None
    }
}

fn acked(scanner: &mut Scanner, next: IotStage) -> Option<IotStage> {
    if scanner.take_ok() {
        Some(next)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::motion::Error;
    use crate::sw::comm::{Maneuver, MotorCommand};

    #[derive(Default)]
    struct Supplied(Option<Supply>);

    impl Wheels for Supplied {
        fn apply(&mut self, _: Maneuver) -> Result<(), Error> {
            Ok(())
        }
        fn ebrake(&mut self) {}
        fn full_stop(&mut self) {}
        fn set_supply(&mut self, supply: Supply) {
            self.0 = Some(supply);
        }
        fn tick(&mut self) {}
        fn command(&self) -> MotorCommand {
            MotorCommand::stop()
        }
    }

    fn modem(scanner: &mut Scanner, text: &[u8]) {
        for b in text {
            scanner.push(*b);
        }
    }

    fn sent(link: &mut Link) -> std::vec::Vec<u8> {
        let mut v = std::vec::Vec::new();
        while let Some(b) = link.on_iot_tx() {
            v.push(b);
        }
        v
    }

    #[test]
    fn test_iot_waits_for_arm() {
        let mut iot = IotBoot::new();
        let mut scanner = Scanner::new();
        let mut link = Link::new();

        assert_eq!(iot.step(&mut scanner, &mut link), None);
        assert_eq!(iot.take_power(), None);

        iot.arm();
        assert_eq!(iot.step(&mut scanner, &mut link), Some(IotStage::WaitReady));
        assert_eq!(iot.take_power(), Some(true));
    }

    #[test]
    fn test_iot_sequence() {
        let mut iot = IotBoot::new();
        let mut scanner = Scanner::new();
        let mut link = Link::new();
        link.enable_comms();
        iot.arm();

        iot.step(&mut scanner, &mut link);
        assert_eq!(iot.step(&mut scanner, &mut link), None);

        modem(&mut scanner, b"ready\r\n");
        assert_eq!(iot.step(&mut scanner, &mut link), Some(IotStage::MuxSet));

        let script: [(&[u8], IotStage, IotStage); 4] = [
            (AT_SET_MUX, IotStage::MuxOk, IotStage::ServerSet),
            (AT_SET_SERVER, IotStage::ServerOk, IotStage::SsidRequest),
            (AT_REQUEST_SSID, IotStage::SsidWait, IotStage::IpRequest),
            (AT_REQUEST_IP, IotStage::IpWait, IotStage::Complete),
        ];

        for (cmd, wait, next) in script.iter() {
            assert_eq!(iot.step(&mut scanner, &mut link), Some(*wait));
            assert_eq!(sent(&mut link), cmd.to_vec());

            assert_eq!(iot.step(&mut scanner, &mut link), None);
            modem(&mut scanner, b"OK\r\n");
            assert_eq!(iot.step(&mut scanner, &mut link), Some(*next));
        }

        assert!(iot.is_complete());
        assert!(!iot.armed);

        // terminal: stays complete and sends nothing more
        assert_eq!(iot.step(&mut scanner, &mut link), None);
        assert_eq!(iot.stage(), IotStage::Complete);
        assert!(sent(&mut link).is_empty());
    }

    #[test]
    fn test_disarm_resets_complete() {
        let mut iot = IotBoot::new();
        iot.stage = IotStage::Complete;

        iot.disarm();
        assert_eq!(iot.stage(), IotStage::Enable);
        assert!(!iot.is_complete());
    }

    #[test]
    fn test_stale_ok_ignored() {
        let mut iot = IotBoot::new();
        let mut scanner = Scanner::new();
        let mut link = Link::new();
        link.enable_comms();
        iot.arm();

        iot.step(&mut scanner, &mut link);
        modem(&mut scanner, b"ready\r\nOK\r\n");
        iot.step(&mut scanner, &mut link);
        assert_eq!(iot.step(&mut scanner, &mut link), Some(IotStage::MuxOk));
        assert_eq!(iot.step(&mut scanner, &mut link), None);
    }

    #[test]
    fn test_commands_held_while_comms_closed() {
        let mut iot = IotBoot::new();
        let mut scanner = Scanner::new();
        let mut link = Link::new();
        iot.arm();

        iot.step(&mut scanner, &mut link);
        modem(&mut scanner, b"ready\r\n");
        iot.step(&mut scanner, &mut link);

        assert_eq!(iot.step(&mut scanner, &mut link), None);
        assert_eq!(iot.stage(), IotStage::MuxSet);

        link.enable_comms();
        assert_eq!(iot.step(&mut scanner, &mut link), Some(IotStage::MuxOk));
    }

    #[test]
    fn test_keep_alive() {
        let mut iot = IotBoot::new();
        let mut link = Link::new();
        link.enable_comms();

        assert!(!iot.keep_alive(&mut link, 3));

        iot.stage = IotStage::Complete;
        assert!(!iot.keep_alive(&mut link, 3));
        assert!(!iot.keep_alive(&mut link, 3));
        assert!(iot.keep_alive(&mut link, 3));
        assert_eq!(sent(&mut link), AT_PING.to_vec());
        assert!(!iot.keep_alive(&mut link, 3));
    }

    #[test]
    fn test_power_on_sequence() {
        let mut power = PowerOn::new();
        let mut iot = IotBoot::new();
        let mut link = Link::new();
        let mut wheels = Supplied::default();
        let mut display = Display::new();

        let mut step = |p: &mut PowerOn, iot: &mut IotBoot, display: &mut Display| {
            p.step(iot, &mut link, &mut wheels, display)
        };

        assert_eq!(step(&mut power, &mut iot, &mut display), Some(PowerStage::Lcd));
        assert_eq!(display.line(0), b" BOOTING..");
        assert_eq!(step(&mut power, &mut iot, &mut display), Some(PowerStage::LcdWait));
        assert_eq!(step(&mut power, &mut iot, &mut display), Some(PowerStage::IotInit));
        assert_eq!(display.line(1), b"LCD Ready ");
        assert_eq!(step(&mut power, &mut iot, &mut display), Some(PowerStage::IotSequence));
        assert_eq!(display.line(1), b"IOT Init..");

        // modem not done yet
        assert_eq!(step(&mut power, &mut iot, &mut display), None);
        iot.stage = IotStage::Complete;

        assert_eq!(step(&mut power, &mut iot, &mut display), Some(PowerStage::PwrEnable));
        assert_eq!(display.line(1), b"IOT Ready ");
        assert_eq!(step(&mut power, &mut iot, &mut display), Some(PowerStage::PwrInit));
        assert_eq!(step(&mut power, &mut iot, &mut display), Some(PowerStage::PwrWait));
        assert_eq!(step(&mut power, &mut iot, &mut display), Some(PowerStage::Complete));
        assert_eq!(display.line(0), b"  BOOTED  ");
        assert_eq!(display.line(1), b"PWR Ready ");
        assert_eq!(step(&mut power, &mut iot, &mut display), None);

        assert!(power.is_complete());
        assert!(link.comms());
        assert_eq!(wheels.0, Some(Supply::Medium));
    }

    #[test]
    fn test_skip_iot() {
        let mut power = PowerOn::new();
        let mut iot = IotBoot::new();

        assert_eq!(power.skip_iot(&mut iot), None);

        power.stage = PowerStage::IotSequence;
        iot.arm();
        assert_eq!(power.skip_iot(&mut iot), Some(PowerStage::PwrEnable));
        assert!(!iot.armed);
        assert_eq!(iot.stage(), IotStage::Enable);
    }
}
