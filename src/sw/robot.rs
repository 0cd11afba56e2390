use crate::hw::adc::Channel;
use crate::hw::motion::Wheels;
use crate::hw::uart::HostCommand;
use crate::sw::boot::{IotBoot, IotStage, PowerOn, PowerStage};
use crate::sw::calib::{Calibration, Phase};
use crate::sw::comm::{Actions, Command, Events, Maneuver, Move, Rotation, Supply};
use crate::sw::config::{Config, LINE_SPEED, RING_SIZE, SLOW};
use crate::sw::display::Display;
use crate::sw::drive::{DriveState, LineFollower, Output};
use crate::sw::iot::{CommandQueue, Remote, Scanner};
use crate::sw::state::{Button, Lock};
use heapless::consts::*;
use heapless::spsc::Queue;
use heapless::Vec;

/// Robot controller: the cooperative main loop
///
/// `run_once` is one pass of the loop. It consumes the flags raised by the
/// interrupt handlers in `SharedDeviceState` in a fixed order, drives the
/// wheels directly and leaves everything else for the firmware on the
/// action queue. The shared state is only touched under short locks;
/// control logic runs with interrupts enabled.
pub struct Robot<W> {
    wheels: W,
    cfg: Config,
    display: Display,
    power: PowerOn,
    iot: IotBoot,
    scanner: Scanner,
    commands: CommandQueue,
    calib: Calibration,
    follower: LineFollower,
    /// drive ticks left of a manual move
    manual: u16,
    reported: DriveState,
    actions: Queue<Actions, U16>,
}

impl<W> Robot<W>
where
    W: Wheels,
{
    pub fn new(wheels: W, cfg: Config) -> Self {
        Robot {
            wheels,
            cfg,
            display: Display::new(),
            power: PowerOn::new(),
            iot: IotBoot::new(),
            scanner: Scanner::new(),
            commands: CommandQueue::new(),
            calib: Calibration::new(),
            follower: LineFollower::new(cfg.drive),
            manual: 0,
            reported: DriveState::Idle,
            actions: Queue::new(),
        }
    }

    pub fn run_once<D: Lock>(&mut self, dev: &mut D) {
        self.buttons(dev);

        if dev.lock(|d| d.sampler.watchdog()) {
            self.notify(Actions::AdcReset);
            self.debug(Events::AdcWatchdog);
        }

        if dev.lock(|d| d.take_boot_tick()) {
            self.boot(dev);
        }

        self.host(dev);
        self.modem(dev);

        if let Some(cmd) = self.commands.pop() {
            self.dispatch(&cmd);
        }

        if self.calib.is_busy() {
            self.calibrate(dev);
        }

        if dev.lock(|d| d.take_brake_done()) && self.follower.state().is_driving() {
            self.wheels.full_stop();
        }

        if dev.lock(|d| d.take_drive_tick()) {
            self.drive(dev);
        }
    }

    /// Next directive for the firmware
    pub fn pop_action(&mut self) -> Option<Actions> {
        self.actions.dequeue()
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut Display {
        &mut self.display
    }

    pub fn wheels(&self) -> &W {
        &self.wheels
    }

    pub fn drive_state(&self) -> DriveState {
        self.follower.state()
    }

    pub fn exit_requested(&self) -> bool {
        self.follower.exit_requested()
    }

    pub fn power_stage(&self) -> PowerStage {
        self.power.stage()
    }

    pub fn iot_stage(&self) -> IotStage {
        self.iot.stage()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calib.is_complete()
    }

    pub fn bad_actor(&self) -> bool {
        self.scanner.bad_actor()
    }

    pub fn queued_commands(&self) -> usize {
        self.commands.len()
    }

    /*
     * Main loop stages
     *
     */

    fn buttons<D: Lock>(&mut self, dev: &mut D) {
        let (b1, b2) = dev.lock(|d| (d.take_press(Button::B1), d.take_press(Button::B2)));

        if !b1 && !b2 {
            return;
        }

        if self.follower.state().is_driving() {
            self.emergency_stop();
            return;
        }

        if !self.power.is_complete() {
            if b1 {
                if let Some(s) = self.power.skip_iot(&mut self.iot) {
                    self.debug(Events::Boot(s));
                }
            }
            return;
        }

        if self.calib.is_busy() {
            return;
        }

        if self.calib.is_complete() {
            if b1 {
                self.calib.reset();
                self.begin_calibration(Phase::Black, dev);
            } else {
                self.start_autonomous();
            }
            return;
        }

        if b1 {
            self.begin_calibration(Phase::Black, dev);
        } else {
            self.begin_calibration(Phase::White, dev);
        }
    }

    fn boot<D: Lock>(&mut self, dev: &mut D) {
        let power = &mut self.power;
        let iot = &mut self.iot;
        let scanner = &mut self.scanner;
        let wheels = &mut self.wheels;
        let display = &mut self.display;
        let ping = self.cfg.ping;

        // one AT command at most: short enough to run locked
        let (iot_stage, boot_stage) = dev.lock(|d| {
            let mut iot_stage = None;
            if power.stage() == PowerStage::IotSequence {
                iot_stage = iot.step(scanner, &mut d.link);
            }

            let mut boot_stage = None;
            if !power.is_complete() {
                boot_stage = power.step(iot, &mut d.link, wheels, display);
            }

            iot.keep_alive(&mut d.link, ping);
            (iot_stage, boot_stage)
        });

        if let Some(s) = iot_stage {
            self.debug(Events::Iot(s));
        }

        if let Some(on) = self.iot.take_power() {
            self.notify(Actions::IotPower(on));
        }

        if let Some(s) = boot_stage {
            self.debug(Events::Boot(s));
        }
    }

    fn host<D: Lock>(&mut self, dev: &mut D) {
        let reply: &[u8] = match dev.lock(|d| d.link.take_host_command()) {
            Some(HostCommand::Ping) => b"I'm here\r\n",
            Some(HostCommand::Baud(baud)) => {
                // the reply goes out once the firmware has switched both ports
                dev.lock(|d| d.link.quiesce(baud));
                self.notify(Actions::Baud(baud));
                self.debug(Events::Baud(baud));
                return;
            }
            Some(HostCommand::Unknown) => b"Unknown command\r\n",
            None => return,
        };

        dev.lock(|d| d.link.respond(reply));
    }

    fn modem<D: Lock>(&mut self, dev: &mut D) {
        loop {
            let chunk = dev.lock(|d| {
                let mut chunk: Vec<u8, U32> = Vec::new();
                while chunk.len() < RING_SIZE {
                    match d.link.take_iot_rx() {
                        Some(b) => {
                            chunk.push(b).ok();
                        }
                        None => break,
                    }
                }
                chunk
            });

            if chunk.is_empty() {
                return;
            }

            for byte in chunk.iter() {
                self.scan(*byte);
            }
        }
    }

    fn scan(&mut self, byte: u8) {
        if !self.scanner.push(byte) {
            return;
        }

        let parsed = self.scanner.parse(self.cfg.pin);

        if let Some(ssid) = parsed.ssid {
            self.display.show_ssid(ssid.as_bytes());
            self.debug(Events::Ssid(ssid));
        }

        if let Some(ip) = parsed.ip {
            self.display.show_ip(ip.as_bytes());
            self.debug(Events::IpAddress(ip));
        }

        match parsed.remote {
            Some(Remote::Accepted(cmd)) => {
                if !self.commands.push(cmd) {
                    self.debug(Events::CommandDropped);
                }
            }
            Some(Remote::Rejected) => self.debug(Events::BadActor),
            None => {}
        }
    }

    fn dispatch(&mut self, payload: &[u8]) {
        let cmd = match Command::parse(payload) {
            Some(cmd) => cmd,
            None => {
                self.debug(Events::UnknownCommand);
                return;
            }
        };

        self.debug(Events::Remote(cmd));

        match cmd {
            Command::Autonomous => self.start_autonomous(),
            Command::Exit => self.follower.request_exit(),
            Command::Stop => self.emergency_stop(),
            Command::Manual(m, ticks) => {
                if self.follower.state().is_driving() || ticks == 0 {
                    return;
                }

                let maneuver = match m {
                    Move::Forward => Maneuver::Forward(SLOW),
                    Move::Reverse => Maneuver::Reverse(SLOW),
                    Move::RotateLeft => Maneuver::Rotate(Rotation::Left, LINE_SPEED),
                    Move::RotateRight => Maneuver::Rotate(Rotation::Right, LINE_SPEED),
                };

                self.manual = ticks;
                self.apply(Output {
                    maneuver: Some(maneuver),
                    supply: Some(Supply::Medium),
                });
            }
        }
    }

    fn calibrate<D: Lock>(&mut self, dev: &mut D) {
        let (left, right) = dev.lock(|d| {
            (
                d.sampler.take_fresh(Channel::Left),
                d.sampler.take_fresh(Channel::Right),
            )
        });

        let (phase, mean) = match self.calib.feed(left, right) {
            Some(done) => done,
            None => return,
        };

        self.debug(Events::Calibration(phase, mean[0], mean[1]));

        match self.calib.profile() {
            Some(p) => {
                self.display.set_all([b"Calibrated", b"B2: start ", b"B1: redo  ", b""]);
                self.debug(Events::Calibrated(p.threshold[0], p.threshold[1]));
            }
            None => {
                self.display.set_line(1, b"Done      ");
            }
        }
    }

    fn drive<D: Lock>(&mut self, dev: &mut D) {
        self.wheels.tick();

        let (sensors, braking) = dev.lock(|d| {
            (
                (d.sampler.value(Channel::Left), d.sampler.value(Channel::Right)),
                d.braking(),
            )
        });
        let out = self.follower.step(sensors, braking, &mut self.display);

        if out.maneuver == Some(Maneuver::EBrake) {
            dev.lock(|d| d.start_brake());
        }
        self.apply(out);
        self.report();

        if self.manual > 0 {
            self.manual -= 1;
            if self.manual == 0 {
                self.wheels.full_stop();
            }
        }
    }

    /*
     * Helpers
     *
     */

    fn begin_calibration<D: Lock>(&mut self, phase: Phase, dev: &mut D) {
        // readings taken before the press do not count
        dev.lock(|d| {
            d.sampler.take_fresh(Channel::Left);
            d.sampler.take_fresh(Channel::Right);
        });

        let surface: &[u8] = match phase {
            Phase::Black => b"BLACK     ",
            Phase::White => b"WHITE     ",
        };

        self.display.set_all([b"Calibrate ", surface, b"", b""]);
        self.calib.begin(phase);
    }

    fn start_autonomous(&mut self) {
        if self.follower.state().is_driving() {
            return;
        }

        match self.follower.start(self.calib.profile(), &mut self.display) {
            Some(out) => {
                self.manual = 0;
                self.apply(out);
                self.report();
            }
            None => self.debug(Events::NotCalibrated),
        }
    }

    fn emergency_stop(&mut self) {
        let out = self.follower.emergency_stop(&mut self.display);
        self.manual = 0;
        self.apply(out);
        self.reported = self.follower.state();
        self.debug(Events::EmergencyStop);
    }

    fn apply(&mut self, out: Output) {
        if let Some(s) = out.supply {
            self.wheels.set_supply(s);
        }

        if let Some(m) = out.maneuver {
            if self.wheels.apply(m).is_err() {
                self.wheels.full_stop();
            }
        }
    }

    fn report(&mut self) {
        let state = self.follower.state();
        if state != self.reported {
            self.reported = state;
            self.debug(Events::Drive(state));
        }
    }

    fn debug(&mut self, e: Events) {
        self.notify(Actions::Debug(e));
    }

    fn notify(&mut self, a: Actions) {
        // firmware not keeping up: drop
        self.actions.enqueue(a).ok();
    }
}
