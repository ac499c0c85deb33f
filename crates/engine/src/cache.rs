use std::collections::HashMap;

use snafu::OptionExt;
use tokio::sync::{RwLock, broadcast};

use crate::error::{CacheEntryMissingSnafu, EngineResult};
use crate::ids::DialogId;
use crate::types::DialogCacheEntry;

const CACHE_EVENT_CAPACITY: usize = 64;

/// Emitted once per mutated key on every write, rekey, or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheChanged {
    pub dialog_id: DialogId,
}

/// In-memory keyed store of conversation message lists, addressable by
/// provisional or real identity. No network or timer behavior; single
/// writer per key is assumed, rekey is the only cross-key mutation.
pub struct CacheStore {
    entries: RwLock<HashMap<DialogId, DialogCacheEntry>>,
    events: broadcast::Sender<CacheChanged>,
}

impl CacheStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CACHE_EVENT_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Change feed for UI-layer subscribers. Lagging or dropped receivers
    /// never block writers.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheChanged> {
        self.events.subscribe()
    }

    pub async fn read(&self, dialog_id: &DialogId) -> Option<DialogCacheEntry> {
        let entries = self.entries.read().await;
        entries.get(dialog_id).cloned()
    }

    pub async fn contains(&self, dialog_id: &DialogId) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(dialog_id)
    }

    /// Atomic read-modify-write. The updater sees `None` on the first write
    /// for an identity and must produce the complete next entry.
    pub async fn write<F>(&self, dialog_id: &DialogId, updater: F)
    where
        F: FnOnce(Option<DialogCacheEntry>) -> DialogCacheEntry,
    {
        self.mutate(dialog_id, |previous| Some(updater(previous)))
            .await;
    }

    /// Atomic read-modify-write that may also delete the entry by returning
    /// `None`. Rollback paths use this to restore a "no entry" pre-state in
    /// one critical section.
    pub async fn mutate<F>(&self, dialog_id: &DialogId, updater: F) -> Option<DialogCacheEntry>
    where
        F: FnOnce(Option<DialogCacheEntry>) -> Option<DialogCacheEntry>,
    {
        let next = {
            let mut entries = self.entries.write().await;
            let previous = entries.remove(dialog_id);
            let next = updater(previous);
            if let Some(entry) = &next {
                entries.insert(dialog_id.clone(), entry.clone());
            }
            next
        };
        self.notify(dialog_id);
        next
    }

    /// Moves an entry to a new key, used exactly once per conversation at
    /// promotion time. Both keys mutate under one write lock, so a reader
    /// sees either the old or the new key populated, never neither.
    pub async fn rekey(&self, old: &DialogId, new: &DialogId) -> EngineResult<()> {
        {
            let mut entries = self.entries.write().await;
            let entry = entries.remove(old).context(CacheEntryMissingSnafu {
                stage: "rekey-source",
                dialog_id: old.to_string(),
            })?;
            entries.insert(new.clone(), entry);
        }
        self.notify(old);
        self.notify(new);
        Ok(())
    }

    pub async fn remove(&self, dialog_id: &DialogId) -> bool {
        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(dialog_id).is_some()
        };
        if removed {
            self.notify(dialog_id);
        }
        removed
    }

    fn notify(&self, dialog_id: &DialogId) {
        let _ = self.events.send(CacheChanged {
            dialog_id: dialog_id.clone(),
        });
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
