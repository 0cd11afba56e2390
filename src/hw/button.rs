use crate::sw::config::DEBOUNCE_TICKS;

/// Button debounce
///
/// An edge is accepted only while armed. Accepting it disarms the edge
/// interrupt for `DEBOUNCE_TICKS` full debounce periods, so one press
/// yields one event however much the contact bounces. The first tick
/// after the edge ends a partial period and is not counted.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct Debouncer {
    armed: bool,
    pressed: bool,
    count: u8,
}

impl Debouncer {
    pub const fn new() -> Self {
        Debouncer {
            armed: true,
            pressed: false,
            count: 0,
        }
    }

    /// Edge interrupt: returns true if the edge interrupt must now be masked
    pub fn on_edge(&mut self) -> bool {
        if !self.armed {
            return false;
        }

        self.armed = false;
        self.pressed = true;
        self.count = 0;

        true
    }

    /// Debounce tick: returns true if the edge interrupt must now be unmasked
    pub fn on_tick(&mut self) -> bool {
        if self.armed {
            return false;
        }

        self.count += 1;
        if self.count > DEBOUNCE_TICKS {
            self.armed = true;
            self.count = 0;
            return true;
        }

        false
    }

    /// Consume the pending press
    pub fn take(&mut self) -> bool {
        let pressed = self.pressed;
        self.pressed = false;
        pressed
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounce_yields_one_press() {
        let mut b = Debouncer::new();

        assert!(b.on_edge());
        for _ in 0..10 {
            assert!(!b.on_edge());
        }

        assert!(b.take());
        assert!(!b.take());
    }

    #[test]
    fn test_rearm_after_settle() {
        let mut b = Debouncer::new();

        b.on_edge();
        for _ in 0..DEBOUNCE_TICKS {
            assert!(!b.on_tick());
            assert!(!b.is_armed());
        }
        assert!(b.on_tick());
        assert!(b.is_armed());

        b.take();
        assert!(b.on_edge());
        assert!(b.take());
    }

    #[test]
    fn test_settle_covers_full_window() {
        use crate::sw::config::DEBOUNCE_PERIOD_MS;

        // edge 1 msec ahead of the next tick: msec until unmasked
        let mut b = Debouncer::new();
        b.on_edge();

        let mut masked = 1;
        while !b.on_tick() {
            masked += DEBOUNCE_PERIOD_MS;
        }

        assert!(masked >= u32::from(DEBOUNCE_TICKS) * DEBOUNCE_PERIOD_MS);
        assert!(masked <= u32::from(DEBOUNCE_TICKS + 1) * DEBOUNCE_PERIOD_MS);
    }

    #[test]
    fn test_idle_ticks_do_nothing() {
        let mut b = Debouncer::new();

        for _ in 0..10 {
            assert!(!b.on_tick());
        }
        assert!(!b.take());
    }

    #[test]
    fn test_edges_during_settle_are_ignored() {
        let mut b = Debouncer::new();

        b.on_edge();
        b.take();
        b.on_tick();
        b.on_edge();
        b.on_tick();
        b.on_edge();

        assert!(!b.take());
    }
}
