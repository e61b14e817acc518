//! Instance id allocation.
//!
//! Ids are short decimal strings players type into chat (`/game join 07`).
//! The namespace is every `width`-digit number, zero padded.

use std::collections::HashSet;

use rand::Rng;
use thiserror::Error;

/// Every id in the namespace is taken. The namespace is too small for the
/// number of concurrent games; raise `ids.width`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("all {capacity} instance ids are in use (width {width})")]
pub struct AllocationExhausted {
    pub width: u32,
    pub capacity: u64,
}

#[derive(Debug, Clone)]
pub struct IdAllocator {
    width: u32,
}

impl IdAllocator {
    /// `width` must be in `1..=9`; config validation enforces this.
    pub fn new(width: u32) -> Self {
        Self {
            width: width.clamp(1, 9),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of distinct ids.
    pub fn capacity(&self) -> u64 {
        10u64.pow(self.width)
    }

    pub fn format(&self, value: u64) -> String {
        format!("{value:0width$}", width = self.width as usize)
    }

    /// Pick an id not present in `existing`.
    ///
    /// Starts at a random value and probes forward, wrapping once around
    /// the namespace, so a free id is always found when one exists.
    pub fn allocate(&self, existing: &HashSet<String>) -> Result<String, AllocationExhausted> {
        let capacity = self.capacity();
        let offset = rand::thread_rng().gen_range(0..capacity);

        (0..capacity)
            .map(|i| self.format((offset + i) % capacity))
            .find(|id| !existing.contains(id))
            .ok_or(AllocationExhausted {
                width: self.width,
                capacity,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_zero_padded() {
        let alloc = IdAllocator::new(2);
        assert_eq!(alloc.format(7), "07");
        assert_eq!(alloc.capacity(), 100);

        let id = alloc.allocate(&HashSet::new()).unwrap();
        assert_eq!(id.len(), 2);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn never_returns_an_existing_id() {
        let alloc = IdAllocator::new(2);
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            // Random non-full subset of the namespace.
            let taken = rng.gen_range(0..100);
            let existing: HashSet<String> = (0..100u64)
                .filter(|_| rng.gen_range(0..100) < taken)
                .map(|v| alloc.format(v))
                .collect();
            if existing.len() == 100 {
                continue;
            }
            let id = alloc.allocate(&existing).unwrap();
            assert!(!existing.contains(&id), "allocated taken id {id}");
        }
    }

    #[test]
    fn finds_the_last_free_id() {
        let alloc = IdAllocator::new(1);
        let existing: HashSet<String> = (0..10u64).filter(|v| *v != 6).map(|v| alloc.format(v)).collect();
        for _ in 0..20 {
            assert_eq!(alloc.allocate(&existing).unwrap(), "6");
        }
    }

    #[test]
    fn full_namespace_is_exhausted() {
        let alloc = IdAllocator::new(1);
        let existing: HashSet<String> = (0..10u64).map(|v| alloc.format(v)).collect();
        let err = alloc.allocate(&existing).unwrap_err();
        assert_eq!(err, AllocationExhausted { width: 1, capacity: 10 });
    }

    #[test]
    fn foreign_ids_do_not_count_against_the_namespace() {
        let alloc = IdAllocator::new(1);
        let mut existing: HashSet<String> = (0..9u64).map(|v| alloc.format(v)).collect();
        existing.insert("42".to_string());
        existing.insert("beans".to_string());
        assert_eq!(alloc.allocate(&existing).unwrap(), "9");
    }
}
