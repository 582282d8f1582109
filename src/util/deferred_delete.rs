//! Keeps objects alive until the GPU work that may still reference them has retired.

#[derive(Debug)]
struct Item<T> {
    value: T,
    // Submission serial that must retire before the value may be dropped.
    serial: u64,
}

/// Queue of objects waiting for a submission serial to retire before they are dropped.
#[derive(Debug)]
pub struct DeletionQueue<T> {
    items: Vec<Item<T>>,
}

impl<T> Default for DeletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeletionQueue<T> {
    pub fn new() -> DeletionQueue<T> {
        DeletionQueue {
            items: vec![],
        }
    }

    /// Pushes a value onto the deletion queue. It will be dropped once `serial` has retired.
    /// Note that this moves out of the parameter so that you can't access an object after
    /// it is pushed.
    pub fn push(&mut self, value: T, serial: u64) {
        self.items.push(Item {
            value,
            serial,
        });
    }

    /// Drop every value whose serial is at or below the retired serial. Returns the number of dropped values.
    pub fn collect(&mut self, retired: u64) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.serial > retired);
        before - self.items.len()
    }

    /// Number of values still waiting.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::DeletionQueue;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn values_live_until_their_serial_retires() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut queue = DeletionQueue::new();
        queue.push(DropCounter(drops.clone()), 3);
        queue.push(DropCounter(drops.clone()), 5);

        assert_eq!(queue.collect(2), 0);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(queue.collect(3), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(queue.collect(10), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }
}
