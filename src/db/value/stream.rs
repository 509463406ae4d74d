use crate::bytes::parse;
use bytes::Bytes;

/// A stream entry id: millisecond timestamp plus a sequence number, ordered
/// lexicographically.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        StreamId { ms, seq }
    }

    /// Parse `ms-seq`. With `default_seq`, a bare `ms` is accepted too.
    fn split(bytes: &[u8], default_seq: Option<u64>) -> Option<Self> {
        match bytes.iter().position(|&b| b == b'-') {
            Some(at) => {
                let ms = parse(&bytes[..at])?;
                let seq = parse(&bytes[at + 1..])?;
                Some(StreamId { ms, seq })
            }
            None => Some(StreamId {
                ms: parse(bytes)?,
                seq: default_seq?,
            }),
        }
    }

    /// A range start: `-` is the minimum, a bare `ms` starts at `ms-0`.
    pub fn parse_start(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"-" => Some(StreamId::ZERO),
            _ => Self::split(bytes, Some(0)),
        }
    }

    /// A range end: `+` is the maximum, a bare `ms` ends at `ms-MAX`.
    pub fn parse_end(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"+" => Some(StreamId::MAX),
            _ => Self::split(bytes, Some(u64::MAX)),
        }
    }

    /// An exact id, as accepted by XDEL.
    pub fn parse_exact(bytes: &[u8]) -> Option<Self> {
        Self::split(bytes, Some(0))
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// The id argument to XADD.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdSpec {
    /// `*`: current time, sequence auto-assigned.
    Auto,

    /// `ms` or `ms-*`: fixed timestamp, sequence auto-assigned.
    AutoSeq(u64),

    /// `ms-seq`.
    Exact(StreamId),
}

impl IdSpec {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes == b"*" {
            return Some(IdSpec::Auto);
        }
        match bytes.iter().position(|&b| b == b'-') {
            Some(at) => {
                let ms = parse(&bytes[..at])?;
                if &bytes[at + 1..] == b"*" {
                    Some(IdSpec::AutoSeq(ms))
                } else {
                    let seq = parse(&bytes[at + 1..])?;
                    Some(IdSpec::Exact(StreamId { ms, seq }))
                }
            }
            None => Some(IdSpec::AutoSeq(parse(bytes)?)),
        }
    }
}

/// Why an append was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamError {
    /// The id does not exceed the last assigned id.
    IdSmaller,

    /// `0-0` is never a valid entry id.
    IdZero,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// A stream value: entries in strictly increasing id order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamValue {
    entries: Vec<StreamEntry>,
    pub last_id: StreamId,
}

impl StreamValue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Append an entry, resolving auto ids against `now_ms`. The assigned id
    /// strictly exceeds `last_id` or the append is rejected.
    pub fn add(
        &mut self,
        spec: IdSpec,
        fields: Vec<(Bytes, Bytes)>,
        now_ms: u64,
    ) -> Result<StreamId, StreamError> {
        let id = match spec {
            IdSpec::Auto => {
                if now_ms > self.last_id.ms {
                    StreamId::new(now_ms, 0)
                } else {
                    StreamId::new(self.last_id.ms, self.last_id.seq.wrapping_add(1))
                }
            }
            IdSpec::AutoSeq(ms) => {
                if ms < self.last_id.ms {
                    return Err(StreamError::IdSmaller);
                } else if ms == self.last_id.ms {
                    StreamId::new(ms, self.last_id.seq.wrapping_add(1))
                } else {
                    StreamId::new(ms, 0)
                }
            }
            IdSpec::Exact(id) => id,
        };

        if id == StreamId::ZERO {
            return Err(StreamError::IdZero);
        }
        if !self.entries.is_empty() || self.last_id != StreamId::ZERO {
            if id <= self.last_id {
                return Err(StreamError::IdSmaller);
            }
        }

        self.last_id = id;
        self.entries.push(StreamEntry { id, fields });
        Ok(id)
    }

    /// Entries with `start <= id <= end`, at most `count` (zero = no limit),
    /// optionally in reverse order.
    pub fn range(&self, start: StreamId, end: StreamId, count: usize, rev: bool) -> Vec<&StreamEntry> {
        let limit = if count == 0 { usize::MAX } else { count };
        let lo = self.entries.partition_point(|e| e.id < start);
        let hi = self.entries.partition_point(|e| e.id <= end);
        let selected = &self.entries[lo..hi.max(lo)];
        if rev {
            selected.iter().rev().take(limit).collect()
        } else {
            selected.iter().take(limit).collect()
        }
    }

    /// Delete entries by exact id; returns how many existed.
    pub fn delete(&mut self, ids: &[StreamId]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !ids.contains(&e.id));
        before - self.entries.len()
    }

    /// Drop entries from the head until at most `maxlen` remain; returns how
    /// many were removed.
    pub fn trim_maxlen(&mut self, maxlen: usize) -> usize {
        if self.entries.len() <= maxlen {
            return 0;
        }
        let removed = self.entries.len() - maxlen;
        self.entries.drain(..removed);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(Bytes, Bytes)> {
        pairs
            .iter()
            .map(|(f, v)| {
                (
                    Bytes::copy_from_slice(f.as_bytes()),
                    Bytes::copy_from_slice(v.as_bytes()),
                )
            })
            .collect()
    }

    #[test]
    fn id_parsing() {
        assert_eq!(StreamId::parse_exact(b"5-3"), Some(StreamId::new(5, 3)));
        assert_eq!(StreamId::parse_exact(b"5"), Some(StreamId::new(5, 0)));
        assert_eq!(StreamId::parse_exact(b"x"), None);
        assert_eq!(StreamId::parse_start(b"-"), Some(StreamId::ZERO));
        assert_eq!(StreamId::parse_end(b"+"), Some(StreamId::MAX));
        assert_eq!(StreamId::parse_end(b"7"), Some(StreamId::new(7, u64::MAX)));
        assert_eq!(IdSpec::parse(b"*"), Some(IdSpec::Auto));
        assert_eq!(IdSpec::parse(b"7-*"), Some(IdSpec::AutoSeq(7)));
        assert_eq!(IdSpec::parse(b"7-2"), Some(IdSpec::Exact(StreamId::new(7, 2))));
    }

    #[test]
    fn ids_are_strictly_monotonic() {
        let mut value = StreamValue::default();
        let id = value
            .add(IdSpec::Exact(StreamId::new(1000, 0)), fields(&[("f", "v")]), 0)
            .unwrap();
        assert_eq!(id.to_string(), "1000-0");
        assert_eq!(
            value.add(IdSpec::Exact(StreamId::new(999, 0)), fields(&[("f", "v")]), 0),
            Err(StreamError::IdSmaller)
        );
        assert_eq!(
            value.add(IdSpec::Exact(StreamId::new(1000, 0)), fields(&[("f", "v")]), 0),
            Err(StreamError::IdSmaller)
        );
        value
            .add(IdSpec::Exact(StreamId::new(1000, 1)), fields(&[("f", "v")]), 0)
            .unwrap();
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn auto_ids() {
        let mut value = StreamValue::default();
        let first = value.add(IdSpec::Auto, fields(&[("a", "1")]), 50).unwrap();
        assert_eq!(first, StreamId::new(50, 0));
        let second = value.add(IdSpec::Auto, fields(&[("a", "2")]), 50).unwrap();
        assert_eq!(second, StreamId::new(50, 1));
        let third = value.add(IdSpec::AutoSeq(50), fields(&[("a", "3")]), 0).unwrap();
        assert_eq!(third, StreamId::new(50, 2));
        assert_eq!(
            value.add(IdSpec::AutoSeq(49), fields(&[("a", "4")]), 0),
            Err(StreamError::IdSmaller)
        );
    }

    #[test]
    fn zero_id_is_rejected() {
        let mut value = StreamValue::default();
        assert_eq!(
            value.add(IdSpec::Exact(StreamId::ZERO), fields(&[("f", "v")]), 0),
            Err(StreamError::IdZero)
        );
    }

    #[test]
    fn ranges() {
        let mut value = StreamValue::default();
        for ms in [1, 2, 3, 4] {
            value
                .add(IdSpec::Exact(StreamId::new(ms, 0)), fields(&[("n", "x")]), 0)
                .unwrap();
        }
        let ids: Vec<_> = value
            .range(StreamId::new(2, 0), StreamId::new(3, u64::MAX), 0, false)
            .iter()
            .map(|e| e.id.ms)
            .collect();
        assert_eq!(ids, vec![2, 3]);
        let ids: Vec<_> = value
            .range(StreamId::ZERO, StreamId::MAX, 2, true)
            .iter()
            .map(|e| e.id.ms)
            .collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn delete_and_trim() {
        let mut value = StreamValue::default();
        for ms in 1..=5 {
            value
                .add(IdSpec::Exact(StreamId::new(ms, 0)), fields(&[("n", "x")]), 0)
                .unwrap();
        }
        assert_eq!(value.delete(&[StreamId::new(2, 0), StreamId::new(9, 0)]), 1);
        assert_eq!(value.len(), 4);
        assert_eq!(value.trim_maxlen(2), 2);
        assert_eq!(value.len(), 2);
        assert_eq!(value.entries()[0].id, StreamId::new(4, 0));
        // The deleted history still fences new ids.
        assert_eq!(
            value.add(IdSpec::Exact(StreamId::new(5, 0)), fields(&[("n", "x")]), 0),
            Err(StreamError::IdSmaller)
        );
    }
}
