//! In-memory registry of conversation threads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::models::session::{Mode, SessionState, ThreadId};

/// A session shared between requests of the same thread.
pub type SharedSession = Arc<tokio::sync::Mutex<SessionState>>;

/// Default number of threads kept in memory.
pub const DEFAULT_CAPACITY: usize = 256;

struct Entry {
    session: SharedSession,
    last_used: u64,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<ThreadId, Entry>,
    clock: u64,
}

impl Slots {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            debug!(thread = %id, "Evicting least recently used session");
            self.entries.remove(&id);
        }
    }
}

/// Sessions keyed by thread id. Each session is locked for the whole of a run,
/// so two requests on one thread never interleave.
///
/// At most `capacity` threads are kept; creating one more drops the thread that
/// was used least recently. A request already holding the evicted session keeps
/// working on its own handle.
pub struct SessionStore {
    slots: Mutex<Slots>,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            capacity: capacity.max(1),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up `thread_id`, creating a session in `mode` when absent or when no id is given.
    pub fn get_or_create(&self, thread_id: Option<ThreadId>, mode: Mode) -> (ThreadId, SharedSession) {
        let id = thread_id.unwrap_or_else(ThreadId::generate);
        let mut slots = self.slots();
        let now = slots.tick();

        if let Some(entry) = slots.entries.get_mut(&id) {
            entry.last_used = now;
            return (id, entry.session.clone());
        }

        if slots.entries.len() >= self.capacity {
            slots.evict_oldest();
        }

        debug!(thread = %id, "Creating session");
        let session = Arc::new(tokio::sync::Mutex::new(SessionState::new(id.clone(), mode)));
        slots.entries.insert(
            id.clone(),
            Entry {
                session: session.clone(),
                last_used: now,
            },
        );
        (id, session)
    }

    pub fn get(&self, thread_id: &ThreadId) -> Option<SharedSession> {
        let mut slots = self.slots();
        let now = slots.tick();
        slots.entries.get_mut(thread_id).map(|entry| {
            entry.last_used = now;
            entry.session.clone()
        })
    }

    pub fn remove(&self, thread_id: &ThreadId) -> Option<SharedSession> {
        self.slots().entries.remove(thread_id).map(|entry| entry.session)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().entries.is_empty()
    }
}
