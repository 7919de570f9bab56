use std::time::Instant;

use crate::error::{BridgeError, Result};
use crate::session::{ListenerKind, Session, SessionId};

/// Fixed-capacity arena of sessions.
///
/// A full pool refuses new sessions; existing ones are never evicted.
#[derive(Debug)]
pub struct SessionPool {
    slots: Vec<Option<Session>>,
    generation: u32,
    tx_capacity: usize,
}

impl SessionPool {
    pub fn new(capacity: usize, tx_capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            generation: 0,
            tx_capacity,
        }
    }

    /// Open a session in the first free slot.
    pub fn allocate(&mut self, listener: ListenerKind, now: Instant) -> Result<SessionId> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(BridgeError::PoolFull { capacity })?;
        self.generation = self.generation.wrapping_add(1);
        let id = SessionId {
            slot,
            generation: self.generation,
        };
        self.slots[slot] = Some(Session::new(id, listener, self.tx_capacity, now));
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.slots
            .get(id.slot)
            .and_then(Option::as_ref)
            .filter(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.slots
            .get_mut(id.slot)
            .and_then(Option::as_mut)
            .filter(|s| s.id == id)
    }

    /// Close a session, returning it.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let slot = self.slots.get_mut(id.slot)?;
        if slot.as_ref().is_some_and(|s| s.id == id) {
            slot.take()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.slots.iter_mut().flatten()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.iter().map(|s| s.id).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_beyond_capacity_without_eviction() {
        let now = Instant::now();
        let mut pool = SessionPool::new(4, 64);
        let ids: Vec<_> = (0..4)
            .map(|_| pool.allocate(ListenerKind::Bridge, now).unwrap())
            .collect();

        let err = pool.allocate(ListenerKind::Bridge, now).unwrap_err();
        assert!(matches!(err, BridgeError::PoolFull { capacity: 4 }));
        for id in &ids {
            assert!(pool.get(*id).is_some(), "session {id} was evicted");
        }
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let now = Instant::now();
        let mut pool = SessionPool::new(1, 64);
        let first = pool.allocate(ListenerKind::Bridge, now).unwrap();
        assert!(pool.remove(first).is_some());

        let second = pool.allocate(ListenerKind::Programming, now).unwrap();
        assert_eq!(second.slot, first.slot);
        assert_ne!(second, first);
        assert!(pool.get(first).is_none());
        assert!(pool.remove(first).is_none());
        assert!(pool.get(second).is_some());
    }

    #[test]
    fn empty_pool() {
        let pool = SessionPool::new(2, 64);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 2);
        assert!(pool.ids().is_empty());
    }
}
