//! Bounded allocator for touch pointer ids.

use super::error::ChannelError;
use super::message::Point;
use crate::config::MAX_TOUCH_POINTS;
use std::sync::{Arc, Mutex};

/// Hands out pointer ids `0..limit`; a bitmask guarded by a mutex.
#[derive(Debug)]
pub struct PointerPool {
    limit: u8,
    in_use: Mutex<u16>,
}

impl PointerPool {
    pub fn new(limit: u8) -> Arc<Self> {
        Arc::new(Self {
            limit: limit.clamp(1, MAX_TOUCH_POINTS),
            in_use: Mutex::new(0),
        })
    }

    pub fn limit(&self) -> u8 {
        self.limit
    }

    pub fn in_use(&self) -> usize {
        self.in_use
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .count_ones() as usize
    }

    /// Takes the lowest free id.
    pub fn allocate(self: &Arc<Self>, at: Point) -> Result<PointerLease, ChannelError> {
        let mut mask = self.in_use.lock().unwrap_or_else(|e| e.into_inner());
        let id = (0..self.limit)
            .find(|id| *mask & (1u16 << *id) == 0)
            .ok_or(ChannelError::PointerExhausted { limit: self.limit })?;
        *mask |= 1u16 << id;
        Ok(PointerLease {
            id,
            position: at,
            pool: Arc::clone(self),
        })
    }

    fn free(&self, id: u8) {
        let mut mask = self.in_use.lock().unwrap_or_else(|e| e.into_inner());
        *mask &= !(1u16 << id);
    }
}

/// Exclusive ownership of one pointer id. The id returns to the pool on drop,
/// so two owners can never address the same contact.
#[derive(Debug)]
pub struct PointerLease {
    id: u8,
    position: Point,
    pool: Arc<PointerPool>,
}

impl PointerLease {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub(crate) fn set_position(&mut self, at: Point) {
        self.position = at;
    }
}

impl Drop for PointerLease {
    fn drop(&mut self) {
        self.pool.free(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_bounded_by_limit() {
        let pool = PointerPool::new(2);
        let a = pool.allocate(Point::default()).unwrap();
        let b = pool.allocate(Point::default()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(
            pool.allocate(Point::default()).unwrap_err(),
            ChannelError::PointerExhausted { limit: 2 }
        );
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn dropped_lease_frees_its_id() {
        let pool = PointerPool::new(1);
        let first = pool.allocate(Point::default()).unwrap();
        let id = first.id();
        drop(first);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.allocate(Point::default()).unwrap().id(), id);
    }

    #[test]
    fn limit_is_clamped_to_supported_range() {
        assert_eq!(PointerPool::new(0).limit(), 1);
        assert_eq!(PointerPool::new(42).limit(), MAX_TOUCH_POINTS);
    }

    #[test]
    fn concurrent_allocation_never_exceeds_limit() {
        let pool = PointerPool::new(4);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.allocate(Point::default()).ok())
            })
            .collect();
        let leases: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(leases.len(), 4);
        assert_eq!(pool.in_use(), 4);
    }
}
