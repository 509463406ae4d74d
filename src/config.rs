mod error;

pub use error::ConfigError;

use crate::{bytes::lex, store::Store};
use bytes::Bytes;
use logos::Logos;
use std::path::{Path, PathBuf};

/// An option accepting "yes" or "no".
#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum YesNoOption {
    #[regex(b"(?i:yes)")]
    Yes,

    #[regex(b"(?i:no)")]
    No,
}

/// Convert a "yes" or "no" value into a boolean.
pub fn yes_no(value: &[u8]) -> Result<bool, ConfigError> {
    match lex(value) {
        Some(YesNoOption::Yes) => Ok(true),
        Some(YesNoOption::No) => Ok(false),
        None => Err(ConfigError::YesNo),
    }
}

fn bool_name(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Parse a memory amount: a byte count with an optional `k`/`kb`/`m`/`mb`/
/// `g`/`gb` suffix. The two-letter forms are powers of two.
pub fn memory(value: &[u8]) -> Result<u64, ConfigError> {
    let text = std::str::from_utf8(value).map_err(|_| ConfigError::Memory)?;
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, suffix) = text.split_at(split);
    let base: u64 = digits.parse().map_err(|_| ConfigError::Memory)?;
    let unit: u64 = match suffix.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" => 1_000,
        "kb" => 1 << 10,
        "m" => 1_000_000,
        "mb" => 1 << 20,
        "g" => 1_000_000_000,
        "gb" => 1 << 30,
        _ => return Err(ConfigError::Memory),
    };
    base.checked_mul(unit).ok_or(ConfigError::Memory)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum MaxmemoryPolicy {
    #[regex(b"(?i:noeviction)")]
    Noeviction,

    #[regex(b"(?i:allkeys-lru)")]
    AllkeysLru,

    #[regex(b"(?i:allkeys-lfu)")]
    AllkeysLfu,

    #[regex(b"(?i:allkeys-random)")]
    AllkeysRandom,

    #[regex(b"(?i:volatile-lru)")]
    VolatileLru,

    #[regex(b"(?i:volatile-lfu)")]
    VolatileLfu,

    #[regex(b"(?i:volatile-random)")]
    VolatileRandom,

    #[regex(b"(?i:volatile-ttl)")]
    VolatileTtl,
}

impl MaxmemoryPolicy {
    pub fn name(self) -> &'static str {
        match self {
            MaxmemoryPolicy::Noeviction => "noeviction",
            MaxmemoryPolicy::AllkeysLru => "allkeys-lru",
            MaxmemoryPolicy::AllkeysLfu => "allkeys-lfu",
            MaxmemoryPolicy::AllkeysRandom => "allkeys-random",
            MaxmemoryPolicy::VolatileLru => "volatile-lru",
            MaxmemoryPolicy::VolatileLfu => "volatile-lfu",
            MaxmemoryPolicy::VolatileRandom => "volatile-random",
            MaxmemoryPolicy::VolatileTtl => "volatile-ttl",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum Appendfsync {
    #[regex(b"(?i:always)")]
    Always,

    #[regex(b"(?i:everysec)")]
    Everysec,

    #[regex(b"(?i:no)")]
    No,
}

impl Appendfsync {
    pub fn name(self) -> &'static str {
        match self {
            Appendfsync::Always => "always",
            Appendfsync::Everysec => "everysec",
            Appendfsync::No => "no",
        }
    }
}

/// The typed server settings behind the config registry.
#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub bind: String,
    pub dir: PathBuf,
    pub maxmemory: u64,
    pub maxmemory_policy: MaxmemoryPolicy,
    pub timeout: u64,
    pub tcp_keepalive: u64,
    pub save: String,
    pub appendonly: bool,
    pub appendfsync: Appendfsync,
    pub dbfilename: String,
    pub appendfilename: String,

    /// The config file the server was started with, for CONFIG REWRITE.
    pub config_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: 6379,
            bind: "127.0.0.1".into(),
            dir: ".".into(),
            maxmemory: 0,
            maxmemory_policy: MaxmemoryPolicy::Noeviction,
            timeout: 0,
            tcp_keepalive: 300,
            save: "3600 1 300 100 60 10000".into(),
            appendonly: false,
            appendfsync: Appendfsync::Everysec,
            dbfilename: "dump.zdb".into(),
            appendfilename: "appendonly.zol".into(),
            config_file: None,
        }
    }
}

impl Settings {
    pub fn rdb_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }

    pub fn aof_path(&self) -> PathBuf {
        self.dir.join(&self.appendfilename)
    }

    /// Apply one `name value` pair from a config file. Unknown names and
    /// immutable-at-runtime names are both accepted here; this is the
    /// startup path.
    pub fn apply_file_line(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "port" => self.port = value.parse().map_err(|_| ConfigError::Integer)?,
            "bind" => self.bind = value.into(),
            "dir" => self.dir = value.into(),
            "maxmemory" => self.maxmemory = memory(value.as_bytes())?,
            "maxmemory-policy" => {
                self.maxmemory_policy =
                    lex(value.as_bytes()).ok_or(ConfigError::Enumeration)?;
            }
            "timeout" => self.timeout = value.parse().map_err(|_| ConfigError::Integer)?,
            "tcp-keepalive" => {
                self.tcp_keepalive = value.parse().map_err(|_| ConfigError::Integer)?;
            }
            "save" => self.save = value.into(),
            "appendonly" => self.appendonly = yes_no(value.as_bytes())?,
            "appendfsync" => {
                self.appendfsync = lex(value.as_bytes()).ok_or(ConfigError::Enumeration)?;
            }
            "dbfilename" => self.dbfilename = value.into(),
            "appendfilename" => self.appendfilename = value.into(),
            _ => {}
        }
        Ok(())
    }
}

/// Load `name value` lines from a config file. `#` starts a comment.
pub fn load_file(path: &Path, settings: &mut Settings) -> std::io::Result<()> {
    let contents = std::fs::read_to_string(path)?;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        if settings.apply_file_line(name, value.trim()).is_err() {
            tracing::warn!(name, value, "ignoring invalid config line");
        }
    }
    settings.config_file = Some(path.to_path_buf());
    Ok(())
}

/// One named parameter: how to read it, how to write it, and whether it is
/// immutable at runtime.
pub struct Param {
    pub name: &'static str,
    pub readonly: bool,
    pub get: fn(&Store) -> String,
    pub set: fn(&mut Store, &Bytes) -> Result<(), ConfigError>,
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param").field("name", &self.name).finish()
    }
}

fn set_immutable(_: &mut Store, _: &Bytes) -> Result<(), ConfigError> {
    // Unreachable: CONFIG SET rejects read-only parameters before calling.
    Ok(())
}

pub static PORT: Param = Param {
    name: "port",
    readonly: true,
    get: |store| store.settings.port.to_string(),
    set: set_immutable,
};

pub static BIND: Param = Param {
    name: "bind",
    readonly: true,
    get: |store| store.settings.bind.clone(),
    set: set_immutable,
};

pub static DATABASES: Param = Param {
    name: "databases",
    readonly: true,
    get: |_| "1".into(),
    set: set_immutable,
};

pub static DIR: Param = Param {
    name: "dir",
    readonly: true,
    get: |store| store.settings.dir.display().to_string(),
    set: set_immutable,
};

pub static MAXMEMORY: Param = Param {
    name: "maxmemory",
    readonly: false,
    get: |store| store.settings.maxmemory.to_string(),
    set: |store, value| {
        store.settings.maxmemory = memory(value)?;
        Ok(())
    },
};

pub static MAXMEMORY_POLICY: Param = Param {
    name: "maxmemory-policy",
    readonly: false,
    get: |store| store.settings.maxmemory_policy.name().into(),
    set: |store, value| {
        store.settings.maxmemory_policy = lex(value).ok_or(ConfigError::Enumeration)?;
        Ok(())
    },
};

pub static TIMEOUT: Param = Param {
    name: "timeout",
    readonly: false,
    get: |store| store.settings.timeout.to_string(),
    set: |store, value| {
        store.settings.timeout = crate::bytes::parse(value).ok_or(ConfigError::Integer)?;
        Ok(())
    },
};

pub static TCP_KEEPALIVE: Param = Param {
    name: "tcp-keepalive",
    readonly: false,
    get: |store| store.settings.tcp_keepalive.to_string(),
    set: |store, value| {
        store.settings.tcp_keepalive = crate::bytes::parse(value).ok_or(ConfigError::Integer)?;
        Ok(())
    },
};

pub static SAVE: Param = Param {
    name: "save",
    readonly: false,
    get: |store| store.settings.save.clone(),
    set: |store, value| {
        store.settings.save = String::from_utf8_lossy(value).into_owned();
        Ok(())
    },
};

pub static APPENDONLY: Param = Param {
    name: "appendonly",
    readonly: false,
    get: |store| bool_name(store.settings.appendonly).into(),
    set: |store, value| {
        let enabled = yes_no(value)?;
        store.set_appendonly(enabled);
        Ok(())
    },
};

pub static APPENDFSYNC: Param = Param {
    name: "appendfsync",
    readonly: false,
    get: |store| store.settings.appendfsync.name().into(),
    set: |store, value| {
        store.settings.appendfsync = lex(value).ok_or(ConfigError::Enumeration)?;
        Ok(())
    },
};

pub static DBFILENAME: Param = Param {
    name: "dbfilename",
    readonly: false,
    get: |store| store.settings.dbfilename.clone(),
    set: |store, value| {
        store.settings.dbfilename = String::from_utf8_lossy(value).into_owned();
        Ok(())
    },
};

pub static APPENDFILENAME: Param = Param {
    name: "appendfilename",
    readonly: true,
    get: |store| store.settings.appendfilename.clone(),
    set: set_immutable,
};

pub static PARAMS: [&Param; 13] = [
    &PORT,
    &BIND,
    &DATABASES,
    &DIR,
    &MAXMEMORY,
    &MAXMEMORY_POLICY,
    &TIMEOUT,
    &TCP_KEEPALIVE,
    &SAVE,
    &APPENDONLY,
    &APPENDFSYNC,
    &DBFILENAME,
    &APPENDFILENAME,
];

/// Case-insensitive parameter lookup.
pub fn lookup(name: &[u8]) -> Option<&'static Param> {
    PARAMS
        .iter()
        .find(|param| param.name.as_bytes().eq_ignore_ascii_case(name))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_suffixes() {
        assert_eq!(memory(b"100").unwrap(), 100);
        assert_eq!(memory(b"1k").unwrap(), 1_000);
        assert_eq!(memory(b"1kb").unwrap(), 1_024);
        assert_eq!(memory(b"2MB").unwrap(), 2 << 20);
        assert_eq!(memory(b"1g").unwrap(), 1_000_000_000);
        assert!(memory(b"1x").is_err());
        assert!(memory(b"abc").is_err());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup(b"MAXMEMORY").unwrap().name, "maxmemory");
        assert_eq!(lookup(b"maxmemory-POLICY").unwrap().name, "maxmemory-policy");
        assert!(lookup(b"nope").is_none());
    }

    #[test]
    fn yes_no_parsing() {
        assert_eq!(yes_no(b"yes").unwrap(), true);
        assert_eq!(yes_no(b"NO").unwrap(), false);
        assert!(yes_no(b"maybe").is_err());
    }

    #[test]
    fn file_lines() {
        let mut settings = Settings::default();
        settings.apply_file_line("maxmemory", "100mb").unwrap();
        assert_eq!(settings.maxmemory, 100 << 20);
        settings.apply_file_line("appendonly", "yes").unwrap();
        assert!(settings.appendonly);
        settings.apply_file_line("maxmemory-policy", "allkeys-lru").unwrap();
        assert_eq!(settings.maxmemory_policy, MaxmemoryPolicy::AllkeysLru);
        assert!(settings.apply_file_line("appendonly", "maybe").is_err());
        // Unknown names are tolerated.
        settings.apply_file_line("unknown-knob", "1").unwrap();
    }
}
