use thiserror::Error;

/// Why a CONFIG SET argument was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("argument couldn't be parsed into an integer")]
    Integer,

    #[error("argument must be a memory value")]
    Memory,

    #[error("argument must be one of the supported values")]
    Enumeration,

    #[error("argument must be 'yes' or 'no'")]
    YesNo,
}
