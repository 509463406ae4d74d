use crate::db::Extreme;
use bytes::Bytes;
use hashbrown::HashMap;
use ordered_float::NotNan;
use rand::seq::IteratorRandom;

/// The outcome of a sorted set insert.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Insertion {
    Added,
    Updated,
    Unchanged,
}

/// One end of a score range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScoreBound {
    NegInf,
    PosInf,
    Incl(f64),
    Excl(f64),
}

impl ScoreBound {
    /// Parse `-inf`, `+inf`, `3.5`, or the exclusive form `(3.5`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (exclusive, rest) = match bytes {
            [b'(', rest @ ..] => (true, rest),
            _ => (false, bytes),
        };
        let text = std::str::from_utf8(rest).ok()?;
        match text.to_ascii_lowercase().as_str() {
            "-inf" => return Some(ScoreBound::NegInf),
            "inf" | "+inf" => return Some(ScoreBound::PosInf),
            _ => {}
        }
        let value: f64 = text.parse().ok()?;
        if value.is_nan() {
            return None;
        }
        Some(if exclusive {
            ScoreBound::Excl(value)
        } else {
            ScoreBound::Incl(value)
        })
    }
}

/// A sorted set: members ordered by score, ties broken by member bytes, with
/// a side map for constant-time score lookup. The two structures agree on
/// membership and score at every return point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortedSet {
    sorted: Vec<(NotNan<f64>, Bytes)>,
    scores: HashMap<Bytes, NotNan<f64>>,
}

impl SortedSet {
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// The full ordering, ascending by (score, member).
    pub fn items(&self) -> &[(NotNan<f64>, Bytes)] {
        &self.sorted
    }

    pub fn score(&self, member: &[u8]) -> Option<NotNan<f64>> {
        self.scores.get(member).copied()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.scores.contains_key(member)
    }

    /// The ascending rank of a member.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        self.position(score, member).ok()
    }

    fn position(&self, score: NotNan<f64>, member: &[u8]) -> Result<usize, usize> {
        self.sorted
            .binary_search_by(|(s, m)| s.cmp(&score).then_with(|| m[..].cmp(member)))
    }

    pub fn upsert(&mut self, member: Bytes, score: NotNan<f64>) -> Insertion {
        match self.scores.get(&member).copied() {
            Some(old) if old == score => Insertion::Unchanged,
            Some(old) => {
                let at = self
                    .position(old, &member)
                    .expect("side map entry missing from order");
                self.sorted.remove(at);
                let at = self.position(score, &member).unwrap_err();
                self.sorted.insert(at, (score, member.clone()));
                self.scores.insert(member, score);
                Insertion::Updated
            }
            None => {
                let at = self.position(score, &member).unwrap_err();
                self.sorted.insert(at, (score, member.clone()));
                self.scores.insert(member, score);
                Insertion::Added
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        let Some(score) = self.scores.get(member).copied() else {
            return false;
        };
        let at = self
            .position(score, member)
            .expect("side map entry missing from order");
        self.sorted.remove(at);
        self.scores.remove(member);
        true
    }

    /// Remove and return the minimum or maximum entry.
    pub fn pop(&mut self, extreme: Extreme) -> Option<(NotNan<f64>, Bytes)> {
        let entry = match extreme {
            Extreme::Min if self.sorted.is_empty() => return None,
            Extreme::Min => self.sorted.remove(0),
            Extreme::Max => self.sorted.pop()?,
        };
        self.scores.remove(&entry.1);
        Some(entry)
    }

    /// The half-open index range of entries whose scores fall between the
    /// bounds.
    pub fn score_range(&self, min: ScoreBound, max: ScoreBound) -> (usize, usize) {
        let start = match min {
            ScoreBound::NegInf => 0,
            ScoreBound::PosInf => self.sorted.len(),
            ScoreBound::Incl(v) => self.sorted.partition_point(|(s, _)| s.into_inner() < v),
            ScoreBound::Excl(v) => self.sorted.partition_point(|(s, _)| s.into_inner() <= v),
        };
        let end = match max {
            ScoreBound::NegInf => 0,
            ScoreBound::PosInf => self.sorted.len(),
            ScoreBound::Incl(v) => self.sorted.partition_point(|(s, _)| s.into_inner() <= v),
            ScoreBound::Excl(v) => self.sorted.partition_point(|(s, _)| s.into_inner() < v),
        };
        (start, end.max(start))
    }

    pub fn count(&self, min: ScoreBound, max: ScoreBound) -> usize {
        let (start, end) = self.score_range(min, max);
        end - start
    }

    /// Up to `count` distinct random members.
    pub fn random_members(&self, count: usize) -> Vec<Bytes> {
        let mut rng = rand::thread_rng();
        self.sorted
            .iter()
            .map(|(_, m)| m.clone())
            .choose_multiple(&mut rng, count)
    }

    /// `count` random members, repetition allowed.
    pub fn random_members_with_repetition(&self, count: usize) -> Vec<Bytes> {
        let mut rng = rand::thread_rng();
        (0..count)
            .filter_map(|_| self.sorted.iter().choose(&mut rng))
            .map(|(_, m)| m.clone())
            .collect()
    }
}
