use bytes::Bytes;
use hashbrown::HashMap;

/// A hash value: a field to value mapping with no ordering guarantees.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HashValue {
    fields: HashMap<Bytes, Bytes>,
}

impl HashValue {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set a field. True when the field is new.
    pub fn set(&mut self, field: Bytes, value: Bytes) -> bool {
        self.fields.insert(field, value).is_none()
    }

    pub fn get(&self, field: &[u8]) -> Option<&Bytes> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &[u8]) -> bool {
        self.fields.remove(field).is_some()
    }

    pub fn contains(&self, field: &[u8]) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.fields.iter()
    }
}

impl FromIterator<(Bytes, Bytes)> for HashValue {
    fn from_iter<I: IntoIterator<Item = (Bytes, Bytes)>>(iter: I) -> Self {
        HashValue {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields() {
        let mut value = HashValue::default();
        assert!(value.set("a".into(), "1".into()));
        assert!(!value.set("a".into(), "2".into()));
        assert_eq!(value.get(b"a").unwrap(), "2");
        assert!(value.contains(b"a"));
        assert!(value.remove(b"a"));
        assert!(!value.remove(b"a"));
        assert!(value.is_empty());
    }
}
