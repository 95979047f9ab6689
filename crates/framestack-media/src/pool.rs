// crates/framestack-media/src/pool.rs
//! Size-class buffer pool. Decoded frames supersede each other thousands of
//! times per render, so their backing vectors are recycled instead of
//! reallocated. Buffers are bucketed by exact length; a render touches only a
//! handful of distinct sizes (one per source geometry) so buckets stay small.

use std::collections::HashMap;

#[derive(Debug)]
pub struct SlabPool<T> {
    slabs: HashMap<usize, Vec<Vec<T>>>,
}

impl<T: Default + Clone> SlabPool<T> {
    pub fn new() -> Self {
        Self {
            slabs: HashMap::new(),
        }
    }

    /// Returns a zero-initialized vector of exactly `len` elements, reusing a
    /// previously released buffer of the same length when one is available.
    pub fn acquire(&mut self, len: usize) -> Vec<T> {
        match self.slabs.get_mut(&len).and_then(Vec::pop) {
            Some(mut buf) => {
                buf.fill(T::default());
                buf
            }
            None => vec![T::default(); len],
        }
    }

    /// Hands a buffer back for reuse. Length is whatever the buffer currently
    /// holds; it re-enters the matching size class.
    pub fn release(&mut self, buf: Vec<T>) {
        if buf.capacity() == 0 {
            return;
        }
        self.slabs.entry(buf.len()).or_default().push(buf);
    }

    #[cfg(test)]
    fn pooled(&self, len: usize) -> usize {
        self.slabs.get(&len).map_or(0, Vec::len)
    }
}

impl<T: Default + Clone> Default for SlabPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_round_trips_allocation() {
        let mut pool: SlabPool<u8> = SlabPool::new();
        let mut buf = pool.acquire(64);
        assert_eq!(buf.len(), 64);
        buf[0] = 0xAB;
        let ptr = buf.as_ptr();
        pool.release(buf);
        assert_eq!(pool.pooled(64), 1);

        let again = pool.acquire(64);
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(again[0], 0, "recycled buffers come back zeroed");
        assert_eq!(pool.pooled(64), 0);
    }

    #[test]
    fn size_classes_do_not_mix() {
        let mut pool: SlabPool<u8> = SlabPool::new();
        pool.release(vec![1u8; 16]);
        let other = pool.acquire(32);
        assert_eq!(other.len(), 32);
        assert_eq!(pool.pooled(16), 1);
    }

    #[test]
    fn works_for_sample_pairs() {
        let mut pool: SlabPool<(f32, f32)> = SlabPool::new();
        let buf = pool.acquire(1024);
        assert_eq!(buf.len(), 1024);
        assert_eq!(buf[0], (0.0, 0.0));
        pool.release(buf);
        assert_eq!(pool.pooled(1024), 1);
    }
}
