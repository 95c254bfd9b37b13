/// Fixed-capacity circular store of the most recent samples.
///
/// Capacity is always a power of two so a slot index is the insertion
/// position masked by `capacity - 1`. The position is an `i32` that is
/// allowed to run past its range: on overflow it is clamped back to `0`.
/// Physical slots stay aligned across the clamp (every power-of-two capacity
/// divides `2^31`), but index values derived from the position restart at
/// zero, which breaks any regression that uses them as abscissae.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<f64>,
    mask: i32,
    pos: i32,
    size: usize,
}

impl RingBuffer {
    /// Creates a buffer able to hold at least `min_capacity` samples.
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(1).next_power_of_two().min(1 << 30);
        Self {
            data: vec![0.0; capacity],
            mask: (capacity - 1) as i32,
            pos: 0,
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Position the next sample will be written at.
    pub fn position(&self) -> i32 {
        self.pos
    }

    /// Stores `v` and returns the new number of resident samples.
    pub fn add(&mut self, v: f64) -> usize {
        self.data[(self.pos & self.mask) as usize] = v;
        self.pos = self.pos.wrapping_add(1);
        if self.pos < 0 {
            // overflow: restart positions at zero
            self.pos = 0;
        }
        if self.size < self.data.len() {
            self.size += 1;
        }
        self.size
    }

    /// Most recently inserted value, `0.0` when empty.
    pub fn last(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        self.ago(0)
    }

    /// Value inserted `age` steps before the most recent one (`age == 0` is
    /// the last value). Callers must keep `age < len()`.
    pub fn ago(&self, age: usize) -> f64 {
        let offset = (age as i32).wrapping_add(1);
        self.data[(self.pos.wrapping_sub(offset) & self.mask) as usize]
    }

    /// Position at which the sample `age` steps back was written.
    pub fn position_ago(&self, age: usize) -> i32 {
        self.pos.wrapping_sub((age as i32).wrapping_add(1))
    }

    pub fn reset(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
        self.pos = 0;
        self.size = 0;
    }

    /// Sum of every physical slot, resident or not. Diagnostics only.
    pub fn raw_sum(&self) -> f64 {
        self.data.iter().sum()
    }

    #[cfg(test)]
    pub(crate) fn seek(&mut self, pos: i32) {
        self.pos = pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        assert_eq!(RingBuffer::new(5).capacity(), 8);
        assert_eq!(RingBuffer::new(8).capacity(), 8);
        assert_eq!(RingBuffer::new(0).capacity(), 1);
    }

    #[test]
    fn last_is_zero_when_empty() {
        let buf = RingBuffer::new(4);
        assert_eq!(buf.last(), 0.0);
        assert!(buf.is_empty());
    }

    #[test]
    fn keeps_only_most_recent_values() {
        let mut buf = RingBuffer::new(4);
        for v in 1..=6 {
            buf.add(v as f64);
        }
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.last(), 6.0);
        assert_eq!(buf.ago(3), 3.0);
        assert_eq!(buf.raw_sum(), 3.0 + 4.0 + 5.0 + 6.0);
    }

    #[test]
    fn reset_clears_contents_and_counters() {
        let mut buf = RingBuffer::new(4);
        buf.add(1.5);
        buf.add(2.5);
        buf.reset();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.raw_sum(), 0.0);
        assert_eq!(buf.last(), 0.0);
    }

    #[test]
    fn position_overflow_clamps_to_zero_and_keeps_slots_aligned() {
        let mut buf = RingBuffer::new(8);
        buf.seek(i32::MAX - 2);
        for v in 1..=5 {
            buf.add(v as f64);
        }
        // MAX-2, MAX-1, MAX, then clamp to 0 and continue at 0, 1
        assert_eq!(buf.position(), 2);
        assert_eq!(buf.last(), 5.0);
        assert_eq!(buf.ago(1), 4.0);
        assert_eq!(buf.ago(2), 3.0);
        assert_eq!(buf.ago(4), 1.0);
        assert_eq!(buf.len(), 5);
        // index values no longer describe the insertion order across the clamp
        assert_eq!(buf.position_ago(2), -1);
    }

    proptest! {
        #[test]
        fn size_and_last_track_insertions(
            k in 0u32..8,
            values in prop::collection::vec(-1.0e6f64..1.0e6f64, 1..256),
        ) {
            let capacity = 1usize << k;
            let mut buf = RingBuffer::new(capacity);
            let n = values.len().min(capacity);
            for v in values.iter().take(n) {
                buf.add(*v);
            }
            prop_assert_eq!(buf.len(), n);
            prop_assert_eq!(buf.last(), values[n - 1]);
        }
    }
}
