//! Bounded log ring: exactly the last 100 lines of a child's combined
//! stdout/stderr.

use std::collections::VecDeque;
use std::sync::Mutex;

const CAPACITY: usize = 100;

#[derive(Default)]
pub struct LogRing {
    lines: Mutex<VecDeque<String>>,
}

impl LogRing {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    /// Appends a line, discarding the oldest one if the ring is already at
    /// capacity. Never blocks on anything but the in-process mutex, so a
    /// slow consumer of `snapshot()` can't stall the reader task.
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap();
        if lines.len() == CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// A point-in-time copy of the ring, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_discards_oldest_past_capacity() {
        let ring = LogRing::new();
        for i in 0..150 {
            ring.push(format!("line {i}"));
        }
        let snap = ring.snapshot();
        assert_eq!(snap.len(), CAPACITY);
        assert_eq!(snap.first().unwrap(), "line 50");
        assert_eq!(snap.last().unwrap(), "line 149");
    }

    #[test]
    fn ring_under_capacity_keeps_everything_in_order() {
        let ring = LogRing::new();
        ring.push("a");
        ring.push("b");
        ring.push("c");
        assert_eq!(ring.snapshot(), vec!["a", "b", "c"]);
    }
}
