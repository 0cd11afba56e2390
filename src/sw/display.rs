use crate::sw::config::{DISPLAY_LINES, DISPLAY_WIDTH};

type Line = [u8; DISPLAY_WIDTH];

/// Text buffer of the 4 x 10 character display
///
/// Lines are written whole; the renderer polls `take_changed` and
/// redraws when it returns true.
pub struct Display {
    lines: [Line; DISPLAY_LINES],
    changed: bool,
}

impl Display {
    pub const fn new() -> Self {
        Display {
            lines: [[b' '; DISPLAY_WIDTH]; DISPLAY_LINES],
            changed: false,
        }
    }

    /// Write a line: longer text is cut, shorter text is padded with spaces
    pub fn set_line(&mut self, n: usize, text: &[u8]) {
        if let Some(line) = self.lines.get_mut(n) {
            for (i, c) in line.iter_mut().enumerate() {
                *c = text.get(i).copied().unwrap_or(b' ');
            }
            self.changed = true;
        }
    }

    /// Write a line with text padded symmetrically
    pub fn centered(&mut self, n: usize, text: &[u8]) {
        let len = text.len().min(DISPLAY_WIDTH);
        let pad = (DISPLAY_WIDTH - len) / 2;
        let mut line = [b' '; DISPLAY_WIDTH];

        line[pad..pad + len].copy_from_slice(&text[..len]);
        self.set_line(n, &line);
    }

    pub fn set_all(&mut self, text: [&[u8]; DISPLAY_LINES]) {
        for (n, t) in text.iter().enumerate() {
            self.set_line(n, t);
        }
    }

    pub fn show_ssid(&mut self, ssid: &[u8]) {
        if ssid.is_empty() {
            self.set_line(0, b" NO  SSID ");
        } else {
            self.centered(0, ssid);
        }
    }

    /// Show an address split at its second dot on lines 2 and 3
    pub fn show_ip(&mut self, ip: &[u8]) {
        let (head, tail) = match ip
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == b'.')
            .nth(1)
        {
            Some((i, _)) => (&ip[..i], &ip[i + 1..]),
            None => (ip, &ip[ip.len()..]),
        };

        self.set_line(1, b"IP ADDRESS");
        self.centered(2, head);
        self.centered(3, tail);
    }

    pub fn line(&self, n: usize) -> &[u8] {
        match self.lines.get(n) {
            Some(l) => &l[..],
            None => &[],
        }
    }

    pub fn take_changed(&mut self) -> bool {
        let changed = self.changed;
        self.changed = false;
        changed
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}
