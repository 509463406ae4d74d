use bytes::Bytes;
use hashbrown::HashSet;
use rand::seq::IteratorRandom;

/// A set value: unique byte strings, unordered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetValue {
    members: HashSet<Bytes>,
}

impl SetValue {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn add(&mut self, member: Bytes) -> bool {
        self.members.insert(member)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.members.remove(member)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.members.contains(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.members.iter()
    }

    /// Up to `count` distinct random members.
    pub fn random_members(&self, count: usize) -> Vec<Bytes> {
        let mut rng = rand::thread_rng();
        self.members
            .iter()
            .cloned()
            .choose_multiple(&mut rng, count)
    }

    /// `count` random members, repetition allowed.
    pub fn random_members_with_repetition(&self, count: usize) -> Vec<Bytes> {
        let mut rng = rand::thread_rng();
        (0..count)
            .filter_map(|_| self.members.iter().choose(&mut rng).cloned())
            .collect()
    }

    /// Remove and return up to `count` random members.
    pub fn pop_random(&mut self, count: usize) -> Vec<Bytes> {
        let popped = self.random_members(count);
        for member in &popped {
            self.members.remove(&member[..]);
        }
        popped
    }
}

impl FromIterator<Bytes> for SetValue {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        SetValue {
            members: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(members: &[&str]) -> SetValue {
        members
            .iter()
            .map(|m| Bytes::copy_from_slice(m.as_bytes()))
            .collect()
    }

    #[test]
    fn membership() {
        let mut value = set(&["a", "b"]);
        assert!(value.contains(b"a"));
        assert!(!value.contains(b"c"));
        assert!(value.add("c".into()));
        assert!(!value.add("c".into()));
        assert!(value.remove(b"a"));
        assert!(!value.remove(b"a"));
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn random_members_are_members() {
        let value = set(&["a", "b", "c"]);
        for member in value.random_members(2) {
            assert!(value.contains(&member[..]));
        }
        assert_eq!(value.random_members(10).len(), 3);
        assert_eq!(value.random_members_with_repetition(10).len(), 10);
    }

    #[test]
    fn pop_random_removes() {
        let mut value = set(&["a", "b", "c"]);
        let popped = value.pop_random(2);
        assert_eq!(popped.len(), 2);
        assert_eq!(value.len(), 1);
        for member in popped {
            assert!(!value.contains(&member[..]));
        }
    }
}
