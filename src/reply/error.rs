use crate::{bytes::Output, config::ConfigError, resp::FrameError};
use bytes::Bytes;
use thiserror::Error;

/// Every error a command can put on the wire. The display form is the full
/// error line, beginning with its uppercase tag.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("ERR bit is not an integer or out of range")]
    BitValue,

    #[error("ERR bit offset is not an integer or out of range")]
    BitOffset,

    #[error("ERR BITOP NOT must be called with a single source key.")]
    BitopNot,

    #[error("ERR CONFIG SET failed - can't set immutable config option '{0}'")]
    ConfigReadonly(&'static str),

    #[error("ERR Invalid argument '{}' for CONFIG SET '{}' - {}", Output(.0), .1, .2)]
    ConfigSet(Bytes, &'static str, ConfigError),

    #[error("ERR count should be greater than 0")]
    CountZero,

    #[error("{}", Output(&.0[..]))]
    Custom(Bytes),

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR invalid expire time in '{0}' command")]
    ExpireTime(&'static str),

    #[error("ERR value is not a valid float")]
    Float,

    #[error("ERR GT, LT, and/or NX options at the same time are not compatible")]
    GtLtNx,

    #[error("WRONGTYPE Key is not a valid HyperLogLog string value.")]
    HyperLogLog,

    #[error("ERR increment or decrement would overflow")]
    IncrOverflow,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR value is not an integer or out of range")]
    Integer,

    #[error("ERR invalid cursor")]
    InvalidCursor,

    #[error("ERR timeout is not a float or out of range")]
    InvalidTimeout,

    #[error("ERR invalid usize reply")]
    InvalidUsize,

    #[error("ERR {0}")]
    Io(String),

    #[error("ERR min or max is not a float")]
    MinMaxFloat,

    #[error("ERR MULTI calls can not be nested")]
    MultiNested,

    #[error("ERR increment would produce NaN or Infinity")]
    NanOrInfinity,

    #[error("ERR timeout is negative")]
    NegativeTimeout,

    #[error("ERR The server is running without a config file")]
    NoConfigFile,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR Number of keys can't be greater than number of args")]
    NumberOfKeys,

    #[error("ERR numkeys should be greater than 0")]
    NumkeysZero,

    #[error("ERR offset is out of range")]
    OffsetRange,

    #[error("ERR Protocol error: {0}")]
    Protocol(#[from] FrameError),

    #[error(
        "ERR RANK can't be zero. Use 1 to start searching from the first matching element in the head of the list or -1 in the tail."
    )]
    RankZero,

    #[error("READONLY You can't write against a read only replica.")]
    Readonly,

    #[error("ERR Invalid stream ID specified as stream command argument")]
    StreamIdInvalid,

    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdSmaller,

    #[error("ERR The ID specified in XADD must be greater than 0-0")]
    StreamIdZero,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR unknown command '{}'", Output(&.0[..]))]
    UnknownCommand(Bytes),

    #[error("ERR Unknown subcommand or wrong number of arguments for '{}'. Try {} HELP.", Output(&.0[..]), .1)]
    UnknownSubcommand(Bytes, &'static str),

    #[error("ERR Unknown option or number of arguments for CONFIG SET - '{}'", Output(&.0[..]))]
    UnsupportedParameter(Bytes),

    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInMulti,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArguments(&'static str),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR XX and NX options at the same time are not compatible")]
    XxAndNx,
}
