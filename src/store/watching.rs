use crate::client::ClientId;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};

/// Keep track of which clients are watching which keys, and which clients
/// have had a watched key written since their WATCH.
#[derive(Debug, Default)]
pub struct Watching {
    watchers: HashMap<Bytes, HashSet<ClientId>>,
    clients: HashMap<ClientId, HashSet<Bytes>>,
    dirty: HashSet<ClientId>,
}

impl Watching {
    /// Watch `key` for `id`, with a reverse entry for cheap removal.
    pub fn add(&mut self, id: ClientId, key: Bytes) {
        self.watchers.entry(key.clone()).or_default().insert(id);
        self.clients.entry(id).or_default().insert(key);
    }

    /// Forget every watched key for `id` and its dirty mark.
    pub fn remove(&mut self, id: ClientId) {
        self.dirty.remove(&id);
        let Some(keys) = self.clients.remove(&id) else {
            return;
        };
        for key in keys {
            if let Some(ids) = self.watchers.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.watchers.remove(&key);
                }
            }
        }
    }

    /// A write landed on `key`: mark every watcher dirty. Watches are
    /// one-shot, so the bookkeeping for the key is dropped at once.
    pub fn touch(&mut self, key: &[u8]) {
        let Some(ids) = self.watchers.remove(key) else {
            return;
        };
        for id in ids {
            if let Some(keys) = self.clients.get_mut(&id) {
                keys.remove(key);
            }
            self.dirty.insert(id);
        }
    }

    pub fn is_dirty(&self, id: ClientId) -> bool {
        self.dirty.contains(&id)
    }

    /// A sweeping write (flush, full resync) dirties every watcher.
    pub fn touch_all(&mut self) {
        for (id, keys) in self.clients.drain() {
            let _ = keys;
            self.dirty.insert(id);
        }
        self.watchers.clear();
    }
}
