mod hash;
mod hyperloglog;
mod list;
mod set;
mod sorted_set;
mod stream;
mod string;

pub use hash::HashValue;
pub use hyperloglog::{HyperLogLog, REGISTERS};
pub use list::ListValue;
pub use set::SetValue;
pub use sorted_set::{Insertion, ScoreBound, SortedSet};
pub use stream::{IdSpec, StreamEntry, StreamError, StreamId, StreamValue};
pub use string::StrValue;

/// The minimum or maximum end of a sorted set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Extreme {
    Min,
    Max,
}

/// The left or right edge of a list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Edge {
    Left,
    Right,
}

/// An error from an operation on a `Value`.
#[derive(Debug)]
pub enum ValueError {
    /// The stored value has a different kind than the command family.
    WrongType,
}

/// A value in the keyspace: exactly one of the supported kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Hash(Box<HashValue>),
    Hll(Box<HyperLogLog>),
    List(Box<ListValue>),
    Set(Box<SetValue>),
    Str(StrValue),
    Stream(Box<StreamValue>),
    Zset(Box<SortedSet>),
}

impl Value {
    pub fn hash() -> Self {
        Value::Hash(Box::default())
    }

    pub fn hll() -> Self {
        Value::Hll(Box::default())
    }

    pub fn list() -> Self {
        Value::List(Box::default())
    }

    pub fn set() -> Self {
        Value::Set(Box::default())
    }

    pub fn str() -> Self {
        Value::Str(StrValue::default())
    }

    pub fn stream() -> Self {
        Value::Stream(Box::default())
    }

    pub fn zset() -> Self {
        Value::Zset(Box::default())
    }

    /// The kind name, as returned by TYPE and matched by SCAN's TYPE filter.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Hash(_) => "hash",
            Value::Hll(_) => "hyperloglog",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Str(_) => "string",
            Value::Stream(_) => "stream",
            Value::Zset(_) => "zset",
        }
    }

    /// True for an empty container kind; such values never persist in the
    /// keyspace. Strings, streams and sketches always remain.
    pub fn vacant(&self) -> bool {
        match self {
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Zset(z) => z.is_empty(),
            Value::Str(_) | Value::Stream(_) | Value::Hll(_) => false,
        }
    }

    pub fn as_hash(&self) -> Result<&HashValue, ValueError> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn mut_hash(&mut self) -> Result<&mut HashValue, ValueError> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn as_hll(&self) -> Result<&HyperLogLog, ValueError> {
        match self {
            Value::Hll(h) => Ok(h),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn mut_hll(&mut self) -> Result<&mut HyperLogLog, ValueError> {
        match self {
            Value::Hll(h) => Ok(h),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&ListValue, ValueError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn mut_list(&mut self) -> Result<&mut ListValue, ValueError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&SetValue, ValueError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn mut_set(&mut self) -> Result<&mut SetValue, ValueError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn as_str(&self) -> Result<&StrValue, ValueError> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn mut_str(&mut self) -> Result<&mut StrValue, ValueError> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn as_stream(&self) -> Result<&StreamValue, ValueError> {
        match self {
            Value::Stream(s) => Ok(s),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn mut_stream(&mut self) -> Result<&mut StreamValue, ValueError> {
        match self {
            Value::Stream(s) => Ok(s),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&SortedSet, ValueError> {
        match self {
            Value::Zset(z) => Ok(z),
            _ => Err(ValueError::WrongType),
        }
    }

    pub fn mut_zset(&mut self) -> Result<&mut SortedSet, ValueError> {
        match self {
            Value::Zset(z) => Ok(z),
            _ => Err(ValueError::WrongType),
        }
    }
}

impl From<StrValue> for Value {
    fn from(value: StrValue) -> Self {
        Value::Str(value)
    }
}

impl From<ListValue> for Value {
    fn from(value: ListValue) -> Self {
        Value::List(Box::new(value))
    }
}

impl From<SetValue> for Value {
    fn from(value: SetValue) -> Self {
        Value::Set(Box::new(value))
    }
}

impl From<HashValue> for Value {
    fn from(value: HashValue) -> Self {
        Value::Hash(Box::new(value))
    }
}

impl From<SortedSet> for Value {
    fn from(value: SortedSet) -> Self {
        Value::Zset(Box::new(value))
    }
}

impl From<StreamValue> for Value {
    fn from(value: StreamValue) -> Self {
        Value::Stream(Box::new(value))
    }
}

impl From<HyperLogLog> for Value {
    fn from(value: HyperLogLog) -> Self {
        Value::Hll(Box::new(value))
    }
}
