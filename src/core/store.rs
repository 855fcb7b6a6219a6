/// Session storage — keyed, per-session serialized access to session state.

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::session::{SessionId, SessionState};

/// Keyed storage for live sessions.
///
/// Operations on one session are serialized; distinct sessions never block
/// each other beyond map bookkeeping.
pub trait SessionStore: Send + Sync {
    /// Snapshot of a session's state.
    fn get(&self, id: SessionId) -> Option<SessionState>;

    fn put(&self, id: SessionId, state: SessionState);

    fn evict(&self, id: SessionId) -> Option<SessionState>;

    /// Run `f` against the stored state while holding that session's lock.
    /// Returns `None` if the session is unknown.
    fn update<R>(&self, id: SessionId, f: impl FnOnce(&mut SessionState) -> R) -> Option<R>
    where
        Self: Sized;
}

#[derive(Debug)]
struct Slot {
    state: SessionState,
    touched: Instant,
}

type SharedSlot = Arc<Mutex<Slot>>;

/// Process-local store. The map lock is held only to find a slot; the slot's
/// own mutex guards the state.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<FxHashMap<SessionId, SharedSlot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: SessionId) -> Option<SharedSlot> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every session untouched for longer than `max_idle`, returning
    /// the evicted ids.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = Vec::new();
        sessions.retain(|id, slot| {
            let idle = slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .touched
                .elapsed();
            let keep = idle <= max_idle;
            if !keep {
                evicted.push(*id);
            }
            keep
        });
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted idle sessions");
        }
        evicted
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: SessionId) -> Option<SessionState> {
        let slot = self.slot(id)?;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(slot.state.clone())
    }

    fn put(&self, id: SessionId, state: SessionState) {
        let slot = Arc::new(Mutex::new(Slot {
            state,
            touched: Instant::now(),
        }));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, slot);
    }

    fn evict(&self, id: SessionId) -> Option<SessionState> {
        let slot = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)?;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(slot.state.clone())
    }

    fn update<R>(&self, id: SessionId, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.touched = Instant::now();
        Some(f(&mut slot.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::Phase;
    use std::collections::VecDeque;
    use std::thread;

    fn state(id: u64) -> SessionState {
        SessionState {
            session_id: SessionId(id),
            seed: id,
            remaining_pairings: VecDeque::new(),
            selections: Vec::new(),
            phase: Phase::Selecting,
            offered: Vec::new(),
            keepsake: None,
        }
    }

    #[test]
    fn put_get_evict() {
        let store = InMemorySessionStore::new();
        assert!(store.get(SessionId(1)).is_none());
        store.put(SessionId(1), state(1));
        assert_eq!(store.get(SessionId(1)).unwrap().seed, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.evict(SessionId(1)).unwrap().session_id, SessionId(1));
        assert!(store.is_empty());
        assert!(store.evict(SessionId(1)).is_none());
    }

    #[test]
    fn update_mutates_in_place() {
        let store = InMemorySessionStore::new();
        store.put(SessionId(4), state(4));
        let phase = store.update(SessionId(4), |s| {
            s.phase = Phase::Complete;
            s.phase
        });
        assert_eq!(phase, Some(Phase::Complete));
        assert_eq!(store.get(SessionId(4)).unwrap().phase, Phase::Complete);
        assert_eq!(store.update(SessionId(5), |s| s.seed), None);
    }

    #[test]
    fn updates_to_one_session_are_serialized() {
        let store = Arc::new(InMemorySessionStore::new());
        store.put(SessionId(1), state(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..100 {
                        store.update(SessionId(1), |s| s.seed += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get(SessionId(1)).unwrap().seed, 800);
    }

    #[test]
    fn evict_idle_keeps_recent_sessions() {
        let store = InMemorySessionStore::new();
        store.put(SessionId(1), state(1));
        store.put(SessionId(2), state(2));
        assert!(store.evict_idle(Duration::from_secs(3600)).is_empty());
        thread::sleep(Duration::from_millis(20));
        store.update(SessionId(2), |_| ());
        let evicted = store.evict_idle(Duration::from_millis(10));
        assert_eq!(evicted, vec![SessionId(1)]);
        assert!(store.get(SessionId(2)).is_some());
    }
}
