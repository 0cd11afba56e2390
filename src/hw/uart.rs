use crate::sw::comm::Baud;
use crate::sw::config::COMMAND_PREFIX;
use crate::sw::config::COMMAND_TERMINATOR;
use crate::sw::ring::RingBuffer;
use embedded_hal::serial;
use heapless::consts::*;
use heapless::Vec;

/// Link error
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Error<E> {
    /// Serial writer failure
    Serial(E),
}

/// Serial ports
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Port {
    /// host PC
    Pc,
    /// IoT modem
    Iot,
}

/// Caret command typed on the host PC
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum HostCommand {
    /// `^^`: are you there
    Ping,
    /// `^F` / `^S`: switch link speed
    Baud(Baud),
    Unknown,
}

impl HostCommand {
    fn parse(cmd: &[u8]) -> HostCommand {
        match cmd {
            b"^^" => HostCommand::Ping,
            b"^F" => HostCommand::Baud(Baud::B460800),
            b"^S" => HostCommand::Baud(Baud::B115200),
            _ => HostCommand::Unknown,
        }
    }
}

/// Both serial links: PC and IoT modem
///
/// Receive handlers are the ring producers, transmit handlers the consumers.
/// A transmit handler disables itself once its ring is drained; anyone
/// queueing bytes enables it again. Nothing moves until the host sends
/// its first byte or comms are opened with `enable_comms`, and nothing is
/// sent between `quiesce` and `resume` while the link speed changes.
pub struct Link {
    /// to PC: modem traffic and host replies
    pc_tx: RingBuffer,
    /// to modem: host passthrough and AT commands
    iot_tx: RingBuffer,
    /// from modem: input of the line parser
    iot_rx: RingBuffer,
    pc_txe: bool,
    iot_txe: bool,
    comms: bool,
    /// speed change in progress: transmitters held
    switching: Option<Baud>,
    /// caret command being typed on the host
    host: Vec<u8, U32>,
    host_mode: bool,
    host_ready: bool,
}

impl Link {
    pub fn new() -> Self {
        Link {
            pc_tx: RingBuffer::new(),
            iot_tx: RingBuffer::new(),
            iot_rx: RingBuffer::new(),
            pc_txe: false,
            iot_txe: false,
            comms: false,
            switching: None,
            host: Vec::new(),
            host_mode: false,
            host_ready: false,
        }
    }

    /// PC receive interrupt
    pub fn on_pc_rx(&mut self, byte: u8) {
        self.comms = true;

        if self.host_mode {
            if byte != COMMAND_TERMINATOR {
                self.host.push(byte).ok();
            }

            if byte == COMMAND_TERMINATOR || self.host[..] == b"^^"[..] {
                self.host_mode = false;
                self.host_ready = true;
            }

            return;
        }

        if byte == COMMAND_PREFIX {
            self.host.clear();
            self.host.push(byte).ok();
            self.host_mode = true;
            self.host_ready = false;
            return;
        }

        self.iot_tx.push(byte);
        self.iot_txe = true;
    }

    /// IoT modem receive interrupt
    pub fn on_iot_rx(&mut self, byte: u8) {
        if !self.comms {
            return;
        }

        self.pc_tx.push(byte);
        self.pc_txe = true;
        self.iot_rx.push(byte);
    }

    /// PC transmit interrupt: next byte to send
    pub fn on_pc_tx(&mut self) -> Option<u8> {
        let byte = if self.sending() { self.pc_tx.pop() } else { None };
        if byte.is_none() {
            self.pc_txe = false;
        }
        byte
    }

    /// IoT modem transmit interrupt: next byte to send
    pub fn on_iot_tx(&mut self) -> Option<u8> {
        let byte = if self.sending() { self.iot_tx.pop() } else { None };
        if byte.is_none() {
            self.iot_txe = false;
        }
        byte
    }

    /// Move queued bytes into a serial writer until it would block
    pub fn pump<W>(&mut self, port: Port, w: &mut W) -> Result<(), Error<W::Error>>
    where
        W: serial::Write<u8>,
    {
        if !self.comms {
            self.set_txe(port, false);
            return Ok(());
        }

        if self.switching.is_some() {
            return Ok(());
        }

        loop {
            let ring = match port {
                Port::Pc => &mut self.pc_tx,
                Port::Iot => &mut self.iot_tx,
            };

            let byte = match ring.peek() {
                Some(b) => b,
                None => break,
            };

            match w.write(byte) {
                Ok(()) => {
                    ring.pop();
                }
                Err(nb::Error::WouldBlock) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(Error::Serial(e)),
            }
        }

        self.set_txe(port, false);
        Ok(())
    }

    /// Queue an AT command for the modem: false while comms are closed
    pub fn send_at(&mut self, cmd: &[u8]) -> bool {
        if !self.comms {
            return false;
        }

        self.iot_tx.push_slice(cmd);
        self.iot_txe = true;
        true
    }

    /// Queue a reply for the host
    pub fn respond(&mut self, text: &[u8]) {
        self.pc_tx.push_slice(text);
        self.pc_txe = true;
    }

    pub fn enable_comms(&mut self) {
        self.comms = true;
    }

    pub fn comms(&self) -> bool {
        self.comms
    }

    /// Hold both transmitters ahead of a speed change
    ///
    /// Bytes queued meanwhile stay in the rings until `resume`.
    pub fn quiesce(&mut self, baud: Baud) {
        self.switching = Some(baud);
        self.pc_txe = false;
        self.iot_txe = false;
    }

    /// Both ports run at the new speed: release the transmitters and
    /// queue the speed reply for the host
    pub fn resume(&mut self) -> Option<Baud> {
        let baud = self.switching.take()?;

        self.respond(baud.reply());
        self.iot_txe = !self.iot_tx.is_empty();

        Some(baud)
    }

    pub fn is_switching(&self) -> bool {
        self.switching.is_some()
    }

    pub fn tx_enabled(&self, port: Port) -> bool {
        let txe = match port {
            Port::Pc => self.pc_txe,
            Port::Iot => self.iot_txe,
        };

        txe && self.sending()
    }

    pub fn take_host_command(&mut self) -> Option<HostCommand> {
        if !self.host_ready {
            return None;
        }

        self.host_ready = false;
        let cmd = HostCommand::parse(&self.host);
        self.host.clear();

        Some(cmd)
    }

    /// Next modem byte for the line parser
    pub fn take_iot_rx(&mut self) -> Option<u8> {
        self.iot_rx.pop()
    }

    fn sending(&self) -> bool {
        self.comms && self.switching.is_none()
    }

    fn set_txe(&mut self, port: Port, on: bool) {
        match port {
            Port::Pc => self.pc_txe = on,
            Port::Iot => self.iot_txe = on,
        }
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}
