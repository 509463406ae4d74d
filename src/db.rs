mod value;

pub use value::{
    Edge, Extreme, HashValue, HyperLogLog, IdSpec, Insertion, ListValue, ScoreBound, SetValue,
    SortedSet, StrValue, StreamEntry, StreamError, StreamId, StreamValue, Value, ValueError,
    REGISTERS,
};

use crate::time::now_ms;
use bytes::Bytes;
use hashbrown::HashMap;
use rand::seq::IteratorRandom;

/// The keyspace: key to value, with a side map holding the absolute
/// millisecond expiry of volatile keys. Expiry is lazy; an expired entry
/// behaves exactly like a missing one and is purged when touched.
#[derive(Clone, Debug, Default)]
pub struct Db {
    objects: HashMap<Bytes, Value>,
    expires: HashMap<Bytes, u128>,
}

impl Db {
    fn is_expired(&self, key: &[u8]) -> bool {
        match self.expires.get(key) {
            Some(at) => now_ms() >= *at,
            None => false,
        }
    }

    /// Get the value for `key`, unless it has expired.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        if self.is_expired(key) {
            None
        } else {
            self.objects.get(key)
        }
    }

    /// Get the mutable value for `key`, purging it when expired.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        if self.is_expired(key) {
            self.remove(key);
            None
        } else {
            self.objects.get_mut(key)
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Set `key` to `value`, discarding any previous value and expiry.
    pub fn set(&mut self, key: Bytes, value: impl Into<Value>) -> Option<Value> {
        let expired = self.is_expired(&key);
        self.expires.remove(&key[..]);
        let previous = self.objects.insert(key, value.into());
        if expired {
            None
        } else {
            previous
        }
    }

    /// Set `key` to `value`, keeping a live expiry.
    pub fn overwrite(&mut self, key: Bytes, value: impl Into<Value>) -> Option<Value> {
        if self.is_expired(&key) {
            return self.set(key, value);
        }
        self.objects.insert(key, value.into())
    }

    /// Insert an entry with an optional absolute expiry, as the persistence
    /// loaders do.
    pub fn restore(&mut self, key: Bytes, value: Value, expires_at: Option<u128>) {
        if let Some(at) = expires_at {
            self.expires.insert(key.clone(), at);
        } else {
            self.expires.remove(&key[..]);
        }
        self.objects.insert(key, value);
    }

    /// Remove `key`, returning the live value it held.
    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        let expired = self.is_expired(key);
        self.expires.remove(key);
        let value = self.objects.remove(key);
        if expired {
            None
        } else {
            value
        }
    }

    /// Remove `key`, returning the live value and its expiry.
    pub fn take(&mut self, key: &[u8]) -> Option<(Value, Option<u128>)> {
        let expired = self.is_expired(key);
        let expiry = self.expires.remove(key);
        let value = self.objects.remove(key);
        if expired {
            None
        } else {
            value.map(|value| (value, expiry))
        }
    }

    /// Drop `key` when its container value has become empty.
    pub fn purge_if_vacant(&mut self, key: &[u8]) {
        if self.objects.get(key).is_some_and(Value::vacant) {
            self.expires.remove(key);
            self.objects.remove(key);
        }
    }

    /// Set the expiry for `key`. False when the key does not exist.
    pub fn expire(&mut self, key: &[u8], at: u128) -> bool {
        if self.is_expired(key) {
            self.remove(key);
            return false;
        }
        let Some((key, _)) = self.objects.get_key_value(key) else {
            return false;
        };
        self.expires.insert(key.clone(), at);
        true
    }

    /// Remove the expiry for `key`. True when a live expiry existed.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        if self.is_expired(key) {
            self.remove(key);
            return false;
        }
        self.expires.remove(key).is_some()
    }

    /// Remaining milliseconds before `key` expires.
    pub fn ttl(&self, key: &[u8]) -> Option<u128> {
        let at = self.expires.get(key)?;
        let now = now_ms();
        if now >= *at {
            None
        } else {
            Some(at - now)
        }
    }

    /// The absolute expiry of `key` in milliseconds.
    pub fn expires_at(&self, key: &[u8]) -> Option<u128> {
        if self.is_expired(key) {
            None
        } else {
            self.expires.get(key).copied()
        }
    }

    /// Iterate over all live keys.
    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.objects.keys().filter(|key| !self.is_expired(key))
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.keys().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entries with their expiry, for the persistence encoders.
    pub fn entries(&self) -> impl Iterator<Item = (&Bytes, &Value, Option<u128>)> {
        self.objects.iter().filter_map(|(key, value)| {
            if self.is_expired(key) {
                None
            } else {
                Some((key, value, self.expires.get(&key[..]).copied()))
            }
        })
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.expires.clear();
    }

    /// Move `src` to `dst`, carrying the expiry. False when `src` is missing.
    pub fn rename(&mut self, src: &[u8], dst: Bytes) -> bool {
        let Some((value, expiry)) = self.take(src) else {
            return false;
        };
        self.restore(dst, value, expiry);
        true
    }

    pub fn random_key(&self) -> Option<Bytes> {
        let mut rng = rand::thread_rng();
        self.keys().choose(&mut rng).cloned()
    }

    pub fn get_str(&self, key: &[u8]) -> Result<Option<&StrValue>, ValueError> {
        self.get(key).map(Value::as_str).transpose()
    }

    pub fn mut_str(&mut self, key: &[u8]) -> Result<Option<&mut StrValue>, ValueError> {
        self.get_mut(key).map(Value::mut_str).transpose()
    }

    pub fn str_or_default(&mut self, key: &Bytes) -> Result<&mut StrValue, ValueError> {
        self.entry_or(key, Value::str).mut_str()
    }

    pub fn get_list(&self, key: &[u8]) -> Result<Option<&ListValue>, ValueError> {
        self.get(key).map(Value::as_list).transpose()
    }

    pub fn mut_list(&mut self, key: &[u8]) -> Result<Option<&mut ListValue>, ValueError> {
        self.get_mut(key).map(Value::mut_list).transpose()
    }

    pub fn list_or_default(&mut self, key: &Bytes) -> Result<&mut ListValue, ValueError> {
        self.entry_or(key, Value::list).mut_list()
    }

    pub fn get_set(&self, key: &[u8]) -> Result<Option<&SetValue>, ValueError> {
        self.get(key).map(Value::as_set).transpose()
    }

    pub fn mut_set(&mut self, key: &[u8]) -> Result<Option<&mut SetValue>, ValueError> {
        self.get_mut(key).map(Value::mut_set).transpose()
    }

    pub fn set_or_default(&mut self, key: &Bytes) -> Result<&mut SetValue, ValueError> {
        self.entry_or(key, Value::set).mut_set()
    }

    pub fn get_hash(&self, key: &[u8]) -> Result<Option<&HashValue>, ValueError> {
        self.get(key).map(Value::as_hash).transpose()
    }

    pub fn mut_hash(&mut self, key: &[u8]) -> Result<Option<&mut HashValue>, ValueError> {
        self.get_mut(key).map(Value::mut_hash).transpose()
    }

    pub fn hash_or_default(&mut self, key: &Bytes) -> Result<&mut HashValue, ValueError> {
        self.entry_or(key, Value::hash).mut_hash()
    }

    pub fn get_zset(&self, key: &[u8]) -> Result<Option<&SortedSet>, ValueError> {
        self.get(key).map(Value::as_zset).transpose()
    }

    pub fn mut_zset(&mut self, key: &[u8]) -> Result<Option<&mut SortedSet>, ValueError> {
        self.get_mut(key).map(Value::mut_zset).transpose()
    }

    pub fn zset_or_default(&mut self, key: &Bytes) -> Result<&mut SortedSet, ValueError> {
        self.entry_or(key, Value::zset).mut_zset()
    }

    pub fn get_stream(&self, key: &[u8]) -> Result<Option<&StreamValue>, ValueError> {
        self.get(key).map(Value::as_stream).transpose()
    }

    pub fn mut_stream(&mut self, key: &[u8]) -> Result<Option<&mut StreamValue>, ValueError> {
        self.get_mut(key).map(Value::mut_stream).transpose()
    }

    pub fn stream_or_default(&mut self, key: &Bytes) -> Result<&mut StreamValue, ValueError> {
        self.entry_or(key, Value::stream).mut_stream()
    }

    pub fn get_hll(&self, key: &[u8]) -> Result<Option<&HyperLogLog>, ValueError> {
        self.get(key).map(Value::as_hll).transpose()
    }

    pub fn hll_or_default(&mut self, key: &Bytes) -> Result<&mut HyperLogLog, ValueError> {
        self.entry_or(key, Value::hll).mut_hll()
    }

    /// The slot for `key`, inserting a fresh value when absent. Expired
    /// entries are purged first so they never resurface.
    fn entry_or(&mut self, key: &Bytes, default: fn() -> Value) -> &mut Value {
        if self.is_expired(key) {
            self.remove(key);
        }
        self.objects.entry(key.clone()).or_insert_with(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> Bytes {
        Bytes::copy_from_slice(text.as_bytes())
    }

    #[test]
    fn set_get_remove() {
        let mut db = Db::default();
        assert!(db.set(key("a"), StrValue::from(&b"x"[..])).is_none());
        assert!(db.get(b"a").is_some());
        assert!(db.set(key("a"), StrValue::from(&b"y"[..])).is_some());
        assert!(db.remove(b"a").is_some());
        assert!(db.get(b"a").is_none());
    }

    #[test]
    fn expired_keys_are_missing() {
        let mut db = Db::default();
        db.set(key("a"), StrValue::from(&b"x"[..]));
        assert!(db.expire(b"a", now_ms() + 10_000));
        assert!(db.get(b"a").is_some());
        db.expire(b"a", now_ms().saturating_sub(1));
        assert!(db.get(b"a").is_none());
        assert!(!db.exists(b"a"));
        assert_eq!(db.len(), 0);
        // A dead entry cannot be renewed.
        assert!(!db.expire(b"a", now_ms() + 10_000));
    }

    #[test]
    fn set_clears_expiry() {
        let mut db = Db::default();
        db.set(key("a"), StrValue::from(&b"x"[..]));
        db.expire(b"a", now_ms() + 10_000);
        db.set(key("a"), StrValue::from(&b"y"[..]));
        assert_eq!(db.ttl(b"a"), None);
    }

    #[test]
    fn ttl_reports_remaining() {
        let mut db = Db::default();
        db.set(key("a"), StrValue::from(&b"x"[..]));
        db.expire(b"a", now_ms() + 10_000);
        let ttl = db.ttl(b"a").unwrap();
        assert!((9_000..=10_000).contains(&ttl));
        assert!(db.persist(b"a"));
        assert!(!db.persist(b"a"));
        assert_eq!(db.ttl(b"a"), None);
    }

    #[test]
    fn wrong_type_is_an_error() {
        let mut db = Db::default();
        db.set(key("a"), StrValue::from(&b"x"[..]));
        assert!(db.get_list(b"a").is_err());
        assert!(db.list_or_default(&key("a")).is_err());
        assert!(db.get_str(b"a").unwrap().is_some());
    }

    #[test]
    fn purges_vacant_containers() {
        let mut db = Db::default();
        db.list_or_default(&key("l")).unwrap().push(Edge::Right, "x".into());
        db.mut_list(b"l").unwrap().unwrap().pop(Edge::Left);
        db.purge_if_vacant(b"l");
        assert!(!db.exists(b"l"));
        // Strings survive a purge check.
        db.set(key("s"), StrValue::default());
        db.purge_if_vacant(b"s");
        assert!(db.exists(b"s"));
    }

    #[test]
    fn rename_carries_expiry() {
        let mut db = Db::default();
        db.set(key("a"), StrValue::from(&b"x"[..]));
        db.expire(b"a", now_ms() + 10_000);
        assert!(db.rename(b"a", key("b")));
        assert!(!db.exists(b"a"));
        assert!(db.ttl(b"b").is_some());
        assert!(!db.rename(b"zz", key("c")));
    }
}
