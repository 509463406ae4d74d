use crate::{
    bytes::{lex, parse},
    client::Client,
    command::{Arity, Command, CommandKind},
    glob,
    reply::{Reply, ReplyError},
    store::Store,
    CommandResult,
};
use bytes::Bytes;
use logos::Logos;

pub static DEL: Command = Command {
    kind: CommandKind::Del,
    name: "del",
    arity: Arity::Minimum(2),
    run: del,
    readonly: false,
    write: true,
};

pub static UNLINK: Command = Command {
    kind: CommandKind::Unlink,
    name: "unlink",
    arity: Arity::Minimum(2),
    run: del,
    readonly: false,
    write: true,
};

fn del(client: &mut Client, store: &mut Store) -> CommandResult {
    let mut removed = 0;
    while let Some(key) = client.request.try_pop() {
        if store.db.remove(&key).is_some() {
            removed += 1;
            store.mark_dirty();
            store.touch(&key);
        }
    }
    client.reply(removed);
    Ok(None)
}

pub static EXISTS: Command = Command {
    kind: CommandKind::Exists,
    name: "exists",
    arity: Arity::Minimum(2),
    run: exists,
    readonly: true,
    write: false,
};

fn exists(client: &mut Client, store: &mut Store) -> CommandResult {
    let mut found = 0;
    while let Some(key) = client.request.try_pop() {
        if store.db.exists(&key) {
            found += 1;
        }
    }
    client.reply(found);
    Ok(None)
}

pub static TYPE: Command = Command {
    kind: CommandKind::Type,
    name: "type",
    arity: Arity::Exact(2),
    run: type_command,
    readonly: true,
    write: false,
};

fn type_command(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    match store.db.get(&key) {
        Some(value) => client.reply(value.type_name()),
        None => client.reply("none"),
    }
    Ok(None)
}

pub static KEYS: Command = Command {
    kind: CommandKind::Keys,
    name: "keys",
    arity: Arity::Exact(2),
    run: keys,
    readonly: true,
    write: false,
};

fn keys(client: &mut Client, store: &mut Store) -> CommandResult {
    let pattern = client.request.pop()?;
    let matches: Vec<Bytes> = store
        .db
        .keys()
        .filter(|key| glob::matches(key, &pattern))
        .cloned()
        .collect();
    client.reply(Reply::Array(matches.len()));
    for key in matches {
        client.reply(key);
    }
    Ok(None)
}

pub static RANDOMKEY: Command = Command {
    kind: CommandKind::Randomkey,
    name: "randomkey",
    arity: Arity::Exact(1),
    run: randomkey,
    readonly: true,
    write: false,
};

fn randomkey(client: &mut Client, store: &mut Store) -> CommandResult {
    match store.db.random_key() {
        Some(key) => client.reply(key),
        None => client.reply(Reply::Nil),
    }
    Ok(None)
}

pub static RENAME: Command = Command {
    kind: CommandKind::Rename,
    name: "rename",
    arity: Arity::Exact(3),
    run: rename,
    readonly: false,
    write: true,
};

fn rename(client: &mut Client, store: &mut Store) -> CommandResult {
    let src = client.request.pop()?;
    let dst = client.request.pop()?;
    if !store.db.rename(&src, dst.clone()) {
        return Err(ReplyError::NoSuchKey.into());
    }
    store.mark_dirty();
    store.touch(&src);
    store.touch(&dst);
    client.reply("OK");
    Ok(None)
}

pub static RENAMENX: Command = Command {
    kind: CommandKind::Renamenx,
    name: "renamenx",
    arity: Arity::Exact(3),
    run: renamenx,
    readonly: false,
    write: true,
};

fn renamenx(client: &mut Client, store: &mut Store) -> CommandResult {
    let src = client.request.pop()?;
    let dst = client.request.pop()?;
    if !store.db.exists(&src) {
        return Err(ReplyError::NoSuchKey.into());
    }
    if store.db.exists(&dst) {
        client.reply(0);
        return Ok(None);
    }
    store.db.rename(&src, dst.clone());
    store.mark_dirty();
    store.touch(&src);
    store.touch(&dst);
    client.reply(1);
    Ok(None)
}

pub static DBSIZE: Command = Command {
    kind: CommandKind::Dbsize,
    name: "dbsize",
    arity: Arity::Exact(1),
    run: dbsize,
    readonly: true,
    write: false,
};

fn dbsize(client: &mut Client, store: &mut Store) -> CommandResult {
    client.reply(store.db.len());
    Ok(None)
}

pub static FLUSHALL: Command = Command {
    kind: CommandKind::Flushall,
    name: "flushall",
    arity: Arity::Minimum(1),
    run: flush,
    readonly: false,
    write: true,
};

pub static FLUSHDB: Command = Command {
    kind: CommandKind::Flushdb,
    name: "flushdb",
    arity: Arity::Minimum(1),
    run: flush,
    readonly: false,
    write: true,
};

fn flush(client: &mut Client, store: &mut Store) -> CommandResult {
    if let Some(option) = client.request.try_pop() {
        if !option.eq_ignore_ascii_case(b"async") && !option.eq_ignore_ascii_case(b"sync") {
            return Err(ReplyError::Syntax.into());
        }
    }
    if !store.db.is_empty() {
        store.mark_dirty();
    }
    store.db.clear();
    store.watching.touch_all();
    client.reply("OK");
    Ok(None)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum ScanOption {
    #[regex(b"(?i:match)")]
    Match,

    #[regex(b"(?i:count)")]
    Count,

    #[regex(b"(?i:type)")]
    Type,
}

/// The parsed options common to the whole scan family.
pub(crate) struct ScanArgs {
    pub cursor: u64,
    pub pattern: Option<Bytes>,
    pub count: usize,
    pub type_filter: Option<Bytes>,
}

pub(crate) fn parse_scan(client: &mut Client, allow_type: bool) -> Result<ScanArgs, ReplyError> {
    let cursor: u64 = parse(&client.request.pop()?).ok_or(ReplyError::InvalidCursor)?;
    let mut args = ScanArgs {
        cursor,
        pattern: None,
        count: 10,
        type_filter: None,
    };

    while !client.request.is_empty() {
        let option = client.request.pop()?;
        match lex(&option[..]) {
            Some(ScanOption::Match) => args.pattern = Some(client.request.pop()?),
            Some(ScanOption::Count) => {
                let count: i64 = parse(&client.request.pop()?).ok_or(ReplyError::Integer)?;
                if count < 1 {
                    return Err(ReplyError::Syntax);
                }
                args.count = usize::try_from(count).map_err(|_| ReplyError::Integer)?;
            }
            Some(ScanOption::Type) if allow_type => {
                args.type_filter = Some(client.request.pop()?);
            }
            _ => return Err(ReplyError::Syntax),
        }
    }

    Ok(args)
}

/// One scan step over a sorted element list: the window after `resume`, and
/// the position to save for the continuation (`None` when finished).
pub(crate) fn scan_window<'a>(
    sorted: &'a [Bytes],
    resume: Option<&[u8]>,
    count: usize,
) -> (&'a [Bytes], Option<Bytes>) {
    let start = match resume {
        Some(resume) => sorted.partition_point(|key| &key[..] <= resume),
        None => 0,
    };
    let end = (start + count).min(sorted.len());
    let window = &sorted[start..end];
    let next = if end < sorted.len() {
        window.last().cloned()
    } else {
        None
    };
    (window, next)
}

pub static SCAN: Command = Command {
    kind: CommandKind::Scan,
    name: "scan",
    arity: Arity::Minimum(2),
    run: scan,
    readonly: true,
    write: false,
};

fn scan(client: &mut Client, store: &mut Store) -> CommandResult {
    let args = parse_scan(client, true)?;

    let resume = if args.cursor == 0 {
        None
    } else {
        match store.cursors.take(args.cursor) {
            Some(position) => Some(position),
            None => {
                // Expired cursor: report completion rather than restart.
                client.reply(Reply::Array(2));
                client.reply(Bytes::from_static(b"0"));
                client.reply(Reply::Array(0));
                return Ok(None);
            }
        }
    };

    let mut sorted: Vec<Bytes> = store.db.keys().cloned().collect();
    sorted.sort();
    let (window, next) = scan_window(&sorted, resume.as_deref(), args.count);

    let selected: Vec<Bytes> = window
        .iter()
        .filter(|key| {
            args.pattern
                .as_ref()
                .map_or(true, |pattern| glob::matches(key, pattern))
        })
        .filter(|key| {
            args.type_filter.as_ref().map_or(true, |wanted| {
                store
                    .db
                    .get(key)
                    .map_or(false, |value| value.type_name().as_bytes() == &wanted[..])
            })
        })
        .cloned()
        .collect();

    let token = match next {
        Some(position) => store.cursors.save(position),
        None => 0,
    };

    client.reply(Reply::Array(2));
    client.reply(token.to_string().into_bytes());
    client.reply(Reply::Array(selected.len()));
    for key in selected {
        client.reply(key);
    }
    Ok(None)
}
