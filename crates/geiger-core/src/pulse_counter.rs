//! Edge counter shared between the tube interrupt and the window aggregator
//!
//! The interrupt handler is the only writer and the aggregator the only
//! reader. Both go through a `critical_section`, so the aggregator's
//! read-and-reset ([`PulseCounter::take`]) cannot interleave with an increment:
//! an edge lands either in the window being closed or in the next one, never
//! in both and never in neither.

use core::cell::Cell;

use critical_section::Mutex;

/// Acknowledges the interrupt condition on the pulse input line.
///
/// Implemented by the firmware for its GPIO input; tests use a recorder.
pub trait EdgeAck {
    fn acknowledge(&mut self);
}

/// Raw count of tube edges since the last window boundary.
pub struct PulseCounter {
    edges: Mutex<Cell<u32>>,
}

impl Default for PulseCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    pub(crate) const fn starting_at(edges: u32) -> Self {
        Self {
            edges: Mutex::new(Cell::new(edges)),
        }
    }

    /// Interrupt entry point: count one edge, then clear the line's pending
    /// flag so the next edge can fire.
    ///
    /// Constant time, no allocation, no blocking.
    #[inline]
    pub fn on_edge<A: EdgeAck>(&self, line: &mut A) {
        self.record_edge();
        line.acknowledge();
    }

    /// Count one edge. Saturates at `u32::MAX`.
    #[inline]
    pub fn record_edge(&self) {
        critical_section::with(|cs| {
            let edges = self.edges.borrow(cs);
            edges.set(edges.get().saturating_add(1));
        });
    }

    /// Edges counted so far in the current window, without resetting.
    pub fn peek(&self) -> u32 {
        critical_section::with(|cs| self.edges.borrow(cs).get())
    }

    /// Read and zero the count as one step.
    pub fn take(&self) -> u32 {
        critical_section::with(|cs| self.edges.borrow(cs).replace(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingLine {
        acks: u32,
    }

    impl EdgeAck for RecordingLine {
        fn acknowledge(&mut self) {
            self.acks += 1;
        }
    }

    #[test]
    fn test_each_edge_is_counted_and_acknowledged() {
        let counter = PulseCounter::new();
        let mut line = RecordingLine::default();

        for _ in 0..5 {
            counter.on_edge(&mut line);
        }

        assert_eq!(counter.peek(), 5);
        assert_eq!(line.acks, 5);
    }

    #[test]
    fn test_take_resets() {
        let counter = PulseCounter::new();
        counter.record_edge();
        counter.record_edge();

        assert_eq!(counter.take(), 2);
        assert_eq!(counter.peek(), 0);
        assert_eq!(counter.take(), 0);
    }

    #[test]
    fn test_edge_after_take_belongs_to_next_window() {
        let counter = PulseCounter::new();
        counter.record_edge();
        counter.record_edge();
        counter.record_edge();

        let closed = counter.take();
        counter.record_edge();

        assert_eq!(closed, 3);
        assert_eq!(counter.take(), 1);
    }

    #[test]
    fn test_count_saturates() {
        let counter = PulseCounter::starting_at(u32::MAX - 1);
        counter.record_edge();
        counter.record_edge();

        assert_eq!(counter.peek(), u32::MAX);
    }
}
