//! Fixed-capacity history ring shared by the stabilizer and the calibration
//! accumulator.

use std::collections::VecDeque;

/// A FIFO that keeps at most `capacity` items, evicting the oldest on push.
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryRing<T> {
    /// # Panics
    /// If `capacity` is 0. Capacities come from a validated `Config`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "HistoryRing capacity must be greater than 0");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, returning the evicted oldest item when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }
}

impl HistoryRing<f32> {
    /// True when every pair of neighbouring entries differs by at most
    /// `tolerance`. Rings with fewer than two entries are trivially consistent.
    pub fn is_consistent(&self, tolerance: f32) -> bool {
        self.items
            .iter()
            .zip(self.items.iter().skip(1))
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    pub fn max(&self) -> Option<f32> {
        self.items.iter().copied().reduce(f32::max)
    }

    pub fn mean(&self) -> Option<f32> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items.iter().sum::<f32>() / self.items.len() as f32)
    }

    /// Median of the entries; the mean of the middle pair for even lengths.
    pub fn median(&self) -> Option<f32> {
        if self.items.is_empty() {
            return None;
        }
        let mut sorted: Vec<f32> = self.items.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut ring = HistoryRing::new(3);
        assert_eq!(ring.push(1.0), None);
        assert_eq!(ring.push(2.0), None);
        assert_eq!(ring.push(3.0), None);
        assert!(ring.is_full());
        assert_eq!(ring.push(4.0), Some(1.0));
        assert_eq!(ring.iter().copied().collect::<Vec<f32>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(ring.newest(), Some(&4.0));
    }

    #[test]
    fn test_consistency_checks_neighbours_only() {
        let mut ring = HistoryRing::new(3);
        for v in [440.0, 441.5, 443.0] {
            ring.push(v);
        }
        // 440 -> 443 spans 3 Hz but every step is 1.5 Hz.
        assert!(ring.is_consistent(2.0));
        ring.push(500.0);
        assert!(!ring.is_consistent(2.0));
    }

    #[test]
    fn test_statistics() {
        let mut ring = HistoryRing::new(4);
        assert_eq!(ring.max(), None);
        assert_eq!(ring.median(), None);
        for v in [3.0, 1.0, 4.0, 2.0] {
            ring.push(v);
        }
        assert_eq!(ring.max(), Some(4.0));
        assert_eq!(ring.mean(), Some(2.5));
        assert_eq!(ring.median(), Some(2.5));
        ring.push(10.0);
        assert_eq!(ring.median(), Some(3.0));
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity() {
        HistoryRing::<f32>::new(0);
    }
}
