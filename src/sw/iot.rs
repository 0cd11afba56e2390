use crate::sw::comm::{IpAddr, Payload, Ssid};
use crate::sw::config::{
    COMMAND_PREFIX, COMMAND_SIZE, COMMAND_SLOTS, COMMAND_TERMINATOR, IP_OFFSET, LINE_SIZE,
    LINE_SLOTS, LINE_TERMINATOR, MAX_IP_LEN, MAX_SSID_LEN, SSID_OFFSET,
};
use heapless::consts::*;
use heapless::spsc::Queue;

/// Inbound `+IPD` datagram located in a line
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
struct Ipd {
    line: usize,
    /// datagram length from the preamble
    len: Option<usize>,
    /// offset of the command prefix
    start: Option<usize>,
}

/// Remote command extracted from a datagram
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Remote {
    /// PIN matched: command bytes after the PIN
    Accepted(Payload),
    /// PIN mismatch: datagram dropped
    Rejected,
}

/// Result of parsing one completed line
#[derive(Debug, Default, Eq, PartialEq, Clone)]
pub struct Parsed {
    pub ssid: Option<Ssid>,
    pub ip: Option<IpAddr>,
    pub remote: Option<Remote>,
}

/// Modem response scanner
///
/// Bytes are collected into four rotating line buffers. While a line is
/// collected, single characters at fixed offsets classify it:
///
///  offset | char | meaning
///  -------|------|---------------------------------------
///    0    | '+'  | structured response follows
///    0    | 'O'  | "OK"
///    3    | 'D'  | "+IPD" (with 'I' 'P' at 1 and 2)
///    4    | 'y'  | "ready" boot banner
///    5    | 'P'  | "+CWJAP:" SSID response
///   10    | 'I'  | "+CIFSR:STAIP" station address
///
/// Inside a datagram ':' closes the length field and '^' marks the
/// command. The offsets match the modem firmware responses exactly.
pub struct Scanner {
    buf: [[u8; LINE_SIZE]; LINE_SLOTS],
    len: [usize; LINE_SLOTS],
    line: usize,
    structured: bool,
    ok: bool,
    ready: bool,
    ipd: Option<Ipd>,
    ssid_line: Option<usize>,
    ip_line: Option<usize>,
    bad_actor: bool,
}

impl Scanner {
    pub const fn new() -> Self {
        Scanner {
            buf: [[0; LINE_SIZE]; LINE_SLOTS],
            len: [0; LINE_SLOTS],
            line: 0,
            structured: false,
            ok: false,
            ready: false,
            ipd: None,
            ssid_line: None,
            ip_line: None,
            bad_actor: false,
        }
    }

    /// Scan one byte: returns true when a completed line has data to parse
    pub fn push(&mut self, byte: u8) -> bool {
        let line = self.line;
        let pos = self.len[line];

        if byte == LINE_TERMINATOR {
            self.line = (line + 1) % LINE_SLOTS;
            self.len[self.line] = 0;
            self.structured = false;

            return self.ipd.map_or(false, |i| i.line == line)
                || self.ssid_line == Some(line)
                || self.ip_line == Some(line);
        }

        // long lines are truncated
        if pos >= LINE_SIZE - 1 {
            return false;
        }

        self.buf[line][pos] = byte;
        self.len[line] = pos + 1;

        if let Some(ipd) = self.ipd.as_mut().filter(|i| i.line == line) {
            if byte == b':' && ipd.len.is_none() {
                ipd.len = Some(field_length(&self.buf[line][..pos]));
                return false;
            }

            if byte == COMMAND_PREFIX && ipd.len.is_some() && ipd.start.is_none() {
                ipd.start = Some(pos);
                return false;
            }
        }

        match (pos, byte) {
            (0, b'+') => self.structured = true,
            (0, b'O') => self.ok = true,
            (3, b'D') if self.structured && &self.buf[line][1..3] == b"IP" => {
                self.ipd = Some(Ipd {
                    line,
                    len: None,
                    start: None,
                });
                self.structured = false;
            }
            (4, b'y') => self.ready = true,
            (5, b'P') if self.structured => {
                self.ssid_line = Some(line);
                self.structured = false;
            }
            (10, b'I') if self.structured => {
                self.ip_line = Some(line);
                self.structured = false;
            }
            _ => {}
        }

        false
    }

    /// Extract SSID, address and remote command from completed lines
    pub fn parse(&mut self, pin: &[u8]) -> Parsed {
        let mut parsed = Parsed::default();

        if let Some(line) = self.ssid_line.take() {
            let mut ssid = Ssid::new();
            for c in quoted(self.text(line, SSID_OFFSET), MAX_SSID_LEN - 1) {
                ssid.push(char::from(*c)).ok();
            }
            parsed.ssid = Some(ssid);
        }

        if let Some(line) = self.ip_line.take() {
            let mut ip = IpAddr::new();
            for c in quoted(self.text(line, IP_OFFSET), MAX_IP_LEN - 1) {
                ip.push(char::from(*c)).ok();
            }
            parsed.ip = Some(ip);
        }

        if let Some(ipd) = self.ipd.take() {
            if let (Some(len), Some(start)) = (ipd.len, ipd.start) {
                let text = self.text(ipd.line, start);
                let remote = check(&text[..len.min(text.len())], pin);

                if remote == Remote::Rejected {
                    self.bad_actor = true;
                }
                parsed.remote = Some(remote);
            }
        }

        parsed
    }

    fn text(&self, line: usize, from: usize) -> &[u8] {
        let len = self.len[line];
        if from >= len {
            return &[];
        }
        &self.buf[line][from..len]
    }

    /// Consume the "OK" flag
    pub fn take_ok(&mut self) -> bool {
        let ok = self.ok;
        self.ok = false;
        ok
    }

    /// Consume the "ready" flag
    pub fn take_ready(&mut self) -> bool {
        let ready = self.ready;
        self.ready = false;
        ready
    }

    pub fn bad_actor(&self) -> bool {
        self.bad_actor
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Decimal digits before ':' back to the last ','
fn field_length(preamble: &[u8]) -> usize {
    let digits = preamble
        .iter()
        .rposition(|c| *c == b',')
        .map_or(preamble, |i| &preamble[i + 1..]);

    digits
        .iter()
        .take_while(|c| c.is_ascii_digit())
        .fold(0usize, |n, c| n.saturating_mul(10).saturating_add(usize::from(c - b'0')))
}

/// Text up to the closing quote, at most `max` bytes
fn quoted(text: &[u8], max: usize) -> &[u8] {
    let end = text.iter().position(|c| *c == b'"').unwrap_or_else(|| text.len());
    &text[..end.min(max)]
}

/// PIN gate: the command after a full PIN match, trailing CR/LF trimmed
fn check(data: &[u8], pin: &[u8]) -> Remote {
    if data.len() < pin.len() || &data[..pin.len()] != pin {
        return Remote::Rejected;
    }

    let mut cmd = &data[pin.len()..];
    while let Some((last, rest)) = cmd.split_last() {
        if *last == COMMAND_TERMINATOR || *last == LINE_TERMINATOR {
            cmd = rest;
        } else {
            break;
        }
    }

    let mut payload = Payload::new();
    payload
        .extend_from_slice(&cmd[..cmd.len().min(COMMAND_SIZE - 1)])
        .ok();

    Remote::Accepted(payload)
}

/// Remote commands waiting for the dispatcher
pub struct CommandQueue {
    q: Queue<Payload, U4>,
}

impl CommandQueue {
    pub fn new() -> Self {
        CommandQueue { q: Queue::new() }
    }

    /// Queue a command: false if the queue is full and the command is dropped
    pub fn push(&mut self, cmd: Payload) -> bool {
        if self.q.len() >= COMMAND_SLOTS {
            return false;
        }
        self.q.enqueue(cmd).is_ok()
    }

    pub fn pop(&mut self) -> Option<Payload> {
        self.q.dequeue()
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
