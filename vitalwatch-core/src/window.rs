//! Fixed-capacity sliding window for trend display.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use vitalwatch_types::DEFAULT_WINDOW_CAPACITY;

/// An append-only, FIFO-evicting sequence of at most `capacity` items.
///
/// Items are kept in arrival order; once full, each append evicts the oldest
/// item first.
///
/// # Example
///
/// ```rust
/// use std::num::NonZeroUsize;
/// use vitalwatch_core::SlidingWindow;
///
/// let mut window = SlidingWindow::new(NonZeroUsize::new(2).unwrap());
/// window.append(1);
/// window.append(2);
/// window.append(3);
/// assert_eq!(window.snapshot(), vec![2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    items: VecDeque<T>,
    capacity: NonZeroUsize,
}

impl<T> SlidingWindow<T> {
    /// Create an empty window.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    /// Append an item, evicting the oldest one if the window is full.
    ///
    /// Returns the evicted item, if any.
    pub fn append(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity.get() {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Most recently appended item.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> SlidingWindow<T> {
    /// Copy of the contents, oldest to newest.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T> Default for SlidingWindow<T> {
    fn default() -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_WINDOW_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(capacity: usize) -> SlidingWindow<u32> {
        SlidingWindow::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn default_capacity_is_200() {
        let window: SlidingWindow<u32> = SlidingWindow::default();
        assert_eq!(window.capacity(), 200);
        assert!(window.is_empty());
    }

    #[test]
    fn append_below_capacity_keeps_everything() {
        let mut w = window(5);
        for i in 0..3 {
            assert_eq!(w.append(i), None);
        }
        assert_eq!(w.snapshot(), vec![0, 1, 2]);
    }

    #[test]
    fn append_at_capacity_evicts_oldest() {
        let mut w = window(3);
        w.append(1);
        w.append(2);
        w.append(3);

        assert_eq!(w.append(4), Some(1));
        assert_eq!(w.snapshot(), vec![2, 3, 4]);
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn keeps_most_recent_items_in_arrival_order() {
        // N + k appends leave exactly min(N + k, capacity) items, the newest ones
        for total in [0usize, 1, 199, 200, 201, 450] {
            let mut w: SlidingWindow<usize> = SlidingWindow::default();
            for i in 0..total {
                w.append(i);
                assert!(w.len() <= 200);
            }

            let expected: Vec<usize> = (total.saturating_sub(200)..total).collect();
            assert_eq!(w.len(), total.min(200));
            assert_eq!(w.snapshot(), expected);
        }
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut w = window(2);
        w.append(7);
        let first = w.snapshot();
        let second = w.snapshot();
        assert_eq!(first, second);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn latest_and_clear() {
        let mut w = window(2);
        assert_eq!(w.latest(), None);
        w.append(1);
        w.append(2);
        assert_eq!(w.latest(), Some(&2));
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.capacity(), 2);
    }
}
