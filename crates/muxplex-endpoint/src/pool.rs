use std::collections::VecDeque;

use crate::error::{MuxError, Result};

/// FIFO pool of unused local stream ids.
///
/// Released ids go to the back, so a just-ended id is the last to be handed
/// out again. This keeps late frames for an old stream from landing on its
/// successor in all but the most crowded cases.
#[derive(Debug, Clone)]
pub struct IdPool {
    queue: VecDeque<u8>,
    present: [u64; 4],
}

impl IdPool {
    /// A pool holding every id, in ascending order.
    pub fn new() -> Self {
        Self {
            queue: (0..=u8::MAX).collect(),
            present: [u64::MAX; 4],
        }
    }

    /// Take the id at the front of the pool.
    pub fn allocate(&mut self) -> Result<u8> {
        let id = self.queue.pop_front().ok_or(MuxError::PoolExhausted)?;
        self.clear(id);
        Ok(id)
    }

    /// Return an id to the back of the pool. Ids already present are ignored.
    pub fn release(&mut self, id: u8) {
        if self.contains(id) {
            return;
        }
        self.set(id);
        self.queue.push_back(id);
    }

    /// Remove a specific id. Returns `false` if it was not in the pool.
    pub fn take(&mut self, id: u8) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.clear(id);
        self.queue.retain(|&queued| queued != id);
        true
    }

    pub fn contains(&self, id: u8) -> bool {
        let (word, bit) = slot(id);
        self.present[word] & bit != 0
    }

    /// Number of ids available.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn set(&mut self, id: u8) {
        let (word, bit) = slot(id);
        self.present[word] |= bit;
    }

    fn clear(&mut self, id: u8) {
        let (word, bit) = slot(id);
        self.present[word] &= !bit;
    }
}

impl Default for IdPool {
    fn default() -> Self {
        Self::new()
    }
}

fn slot(id: u8) -> (usize, u64) {
    (usize::from(id >> 6), 1u64 << (id & 63))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_in_ascending_order() {
        let mut pool = IdPool::new();
        assert_eq!(pool.len(), 256);
        assert_eq!(pool.allocate().unwrap(), 0);
        assert_eq!(pool.allocate().unwrap(), 1);
        assert_eq!(pool.allocate().unwrap(), 2);
        assert!(!pool.contains(1));
    }

    #[test]
    fn exhaustion_after_256() {
        let mut pool = IdPool::new();
        for expected in 0..=255u8 {
            assert_eq!(pool.allocate().unwrap(), expected);
        }
        assert!(pool.is_empty());
        assert!(matches!(pool.allocate(), Err(MuxError::PoolExhausted)));

        pool.release(17);
        assert_eq!(pool.allocate().unwrap(), 17);
    }

    #[test]
    fn release_is_fifo() {
        let mut pool = IdPool::new();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.release(b);
        pool.release(a);

        // 2..=255 come first, then the released ids in release order.
        let order: Vec<u8> = std::iter::from_fn(|| pool.allocate().ok()).collect();
        assert_eq!(order.len(), 256);
        assert_eq!(&order[254..], &[b, a]);
    }

    #[test]
    fn duplicate_release_ignored() {
        let mut pool = IdPool::new();
        pool.release(5);
        assert_eq!(pool.len(), 256);

        let id = pool.allocate().unwrap();
        pool.release(id);
        pool.release(id);
        assert_eq!(pool.len(), 256);
    }

    #[test]
    fn take_specific_id() {
        let mut pool = IdPool::new();
        assert!(pool.take(200));
        assert!(!pool.take(200));
        assert!(!pool.contains(200));
        assert_eq!(pool.len(), 255);

        pool.release(200);
        assert!(pool.contains(200));
    }
}
