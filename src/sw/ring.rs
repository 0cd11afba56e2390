use crate::sw::config::RING_SIZE;

/// Byte ring between an interrupt producer and a main loop consumer
///
/// Indices are free running: `wr` is only advanced by the producer,
/// `rd` only by the consumer, and the buffer is empty when they match.
/// The producer never blocks: if it laps the consumer the oldest unread
/// bytes are overwritten and the consumer skips forward to the newest
/// `RING_SIZE` bytes on its next read.
pub struct RingBuffer {
    buf: [u8; RING_SIZE],
    wr: usize,
    rd: usize,
}

impl RingBuffer {
    pub const fn new() -> Self {
        RingBuffer {
            buf: [0; RING_SIZE],
            wr: 0,
            rd: 0,
        }
    }

    pub fn push(&mut self, byte: u8) {
        self.buf[self.wr % RING_SIZE] = byte;
        self.wr = self.wr.wrapping_add(1);
    }

    pub fn push_slice(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.push(*b);
        }
    }

    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.rd = self.rd.wrapping_add(1);
        Some(byte)
    }

    pub fn peek(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }

        // overrun: everything older than one lap is gone
        if self.wr.wrapping_sub(self.rd) > RING_SIZE {
            self.rd = self.wr.wrapping_sub(RING_SIZE);
        }

        Some(self.buf[self.rd % RING_SIZE])
    }

    pub fn len(&self) -> usize {
        let n = self.wr.wrapping_sub(self.rd);
        if n > RING_SIZE {
            RING_SIZE
        } else {
            n
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wr == self.rd
    }

    pub fn clear(&mut self) {
        self.rd = self.wr;
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(r: &mut RingBuffer) -> Vec<u8> {
        let mut v = Vec::new();
        while let Some(b) = r.pop() {
            v.push(b);
        }
        v
    }

    #[test]
    fn test_empty() {
        let mut r = RingBuffer::new();
        assert!(r.is_empty());
        assert_eq!(r.len(), 0);
        assert_eq!(r.pop(), None);
        assert_eq!(r.peek(), None);
    }

    #[test]
    fn test_order_up_to_capacity() {
        let mut r = RingBuffer::new();
        let data: Vec<u8> = (0..RING_SIZE as u8).collect();

        r.push_slice(&data);
        assert_eq!(r.len(), RING_SIZE);
        assert_eq!(drain(&mut r), data);
        assert!(r.is_empty());
    }

    #[test]
    fn test_wraparound_with_reader_keeping_up() {
        let mut r = RingBuffer::new();

        for round in 0..10u8 {
            r.push_slice(&[round, round + 1, round + 2]);
            assert_eq!(drain(&mut r), vec![round, round + 1, round + 2]);
        }
    }

    #[test]
    fn test_overrun_loses_oldest() {
        let mut r = RingBuffer::new();
        let data: Vec<u8> = (0..=RING_SIZE as u8).collect();

        r.push_slice(&data);

        let out = drain(&mut r);
        assert_eq!(out.len(), RING_SIZE);
        assert!(!out.contains(&0));
        assert_eq!(out[..], data[1..]);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut r = RingBuffer::new();
        r.push(b'a');
        assert_eq!(r.peek(), Some(b'a'));
        assert_eq!(r.peek(), Some(b'a'));
        assert_eq!(r.pop(), Some(b'a'));
        assert_eq!(r.pop(), None);
    }

    #[test]
    fn test_clear() {
        let mut r = RingBuffer::new();
        r.push_slice(b"abc");
        r.clear();
        assert!(r.is_empty());
        r.push(b'd');
        assert_eq!(r.pop(), Some(b'd'));
    }
}
