use super::{RingBuffer, SlidingWindowStat};

/// Running total over the last `window` samples.
#[derive(Debug, Clone)]
pub struct SlidingSum {
    buf: RingBuffer,
    window: usize,
    sum: f64,
}

impl SlidingSum {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            buf: RingBuffer::new(window),
            window,
            sum: 0.0,
        }
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of samples currently inside the window.
    pub fn effective_len(&self) -> usize {
        self.buf.len().min(self.window)
    }

    pub fn last(&self) -> f64 {
        self.buf.last()
    }
}

impl SlidingWindowStat for SlidingSum {
    fn add(&mut self, v: f64) -> usize {
        if self.buf.len() >= self.window {
            self.sum -= self.buf.ago(self.window - 1);
        }
        self.sum += v;
        self.buf.add(v)
    }

    fn reset(&mut self) {
        self.buf.reset();
        self.sum = 0.0;
    }

    fn is_ready(&self) -> bool {
        self.buf.len() >= self.window
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_only_the_window() {
        let mut s = SlidingSum::new(3);
        for v in [1.0, 2.0, 3.0] {
            s.add(v);
        }
        assert!(s.is_ready());
        assert_eq!(s.sum(), 6.0);
        s.add(10.0);
        assert_eq!(s.sum(), 15.0);
        s.add(0.0);
        assert_eq!(s.sum(), 13.0);
    }

    #[test]
    fn window_smaller_than_capacity() {
        // capacity rounds to 8 but the window stays at 5
        let mut s = SlidingSum::new(5);
        for _ in 0..20 {
            s.add(1.0);
        }
        assert_eq!(s.sum(), 5.0);
        assert_eq!(s.effective_len(), 5);
    }

    #[test]
    fn reset_zeroes_total() {
        let mut s = SlidingSum::new(2);
        s.add(4.0);
        s.reset();
        assert_eq!(s.sum(), 0.0);
        assert!(!s.is_ready());
        assert!(s.is_empty());
    }
}
