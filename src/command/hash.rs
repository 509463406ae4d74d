use crate::{
    bytes::{format_f64, parse},
    client::Client,
    command::{keys::parse_scan, keys::scan_window, Arity, Command, CommandKind},
    db::HashValue,
    reply::{Reply, ReplyError},
    store::Store,
    CommandResult,
};
use bytes::Bytes;

pub static HSET: Command = Command {
    kind: CommandKind::Hset,
    name: "hset",
    arity: Arity::Minimum(4),
    run: hset,
    readonly: false,
    write: true,
};

pub static HMSET: Command = Command {
    kind: CommandKind::Hmset,
    name: "hmset",
    arity: Arity::Minimum(4),
    run: hmset,
    readonly: false,
    write: true,
};

fn hset(client: &mut Client, store: &mut Store) -> CommandResult {
    let added = hset_pairs(client, store)?;
    client.reply(added);
    Ok(None)
}

fn hmset(client: &mut Client, store: &mut Store) -> CommandResult {
    hset_pairs(client, store)?;
    client.reply("OK");
    Ok(None)
}

fn hset_pairs(client: &mut Client, store: &mut Store) -> Result<usize, Reply> {
    let key = client.request.pop()?;
    client.request.assert_pairs()?;
    let hash = store.db.hash_or_default(&key)?;
    let mut added = 0;
    while let Some(field) = client.request.try_pop() {
        let value = client.request.pop()?;
        if hash.set(field, value) {
            added += 1;
        }
    }
    store.mark_dirty();
    store.touch(&key);
    Ok(added)
}

pub static HSETNX: Command = Command {
    kind: CommandKind::Hsetnx,
    name: "hsetnx",
    arity: Arity::Exact(4),
    run: hsetnx,
    readonly: false,
    write: true,
};

fn hsetnx(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let value = client.request.pop()?;
    let taken = store.db.hash_or_default(&key)?.contains(&field);
    if taken {
        client.reply(0);
        return Ok(None);
    }
    store.db.hash_or_default(&key)?.set(field, value);
    store.mark_dirty();
    store.touch(&key);
    client.reply(1);
    Ok(None)
}

pub static HDEL: Command = Command {
    kind: CommandKind::Hdel,
    name: "hdel",
    arity: Arity::Minimum(3),
    run: hdel,
    readonly: false,
    write: true,
};

fn hdel(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut removed = 0;
    if let Some(hash) = store.db.mut_hash(&key)? {
        while let Some(field) = client.request.try_pop() {
            if hash.remove(&field) {
                removed += 1;
            }
        }
    }
    if removed > 0 {
        store.mark_dirty();
        store.touch(&key);
        store.db.purge_if_vacant(&key);
    }
    client.reply(removed);
    Ok(None)
}

pub static HGET: Command = Command {
    kind: CommandKind::Hget,
    name: "hget",
    arity: Arity::Exact(3),
    run: hget,
    readonly: true,
    write: false,
};

fn hget(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let value = store
        .db
        .get_hash(&key)?
        .and_then(|hash| hash.get(&field).cloned());
    client.reply(value);
    Ok(None)
}

pub static HMGET: Command = Command {
    kind: CommandKind::Hmget,
    name: "hmget",
    arity: Arity::Minimum(3),
    run: hmget,
    readonly: true,
    write: false,
};

fn hmget(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let fields: Vec<Bytes> = client.request.iter().collect();
    client.reply(Reply::Array(fields.len()));
    for field in fields {
        let value = store
            .db
            .get_hash(&key)?
            .and_then(|hash| hash.get(&field).cloned());
        client.reply(value);
    }
    Ok(None)
}

pub static HGETALL: Command = Command {
    kind: CommandKind::Hgetall,
    name: "hgetall",
    arity: Arity::Exact(2),
    run: hgetall,
    readonly: true,
    write: false,
};

fn hgetall(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let pairs: Vec<(Bytes, Bytes)> = match store.db.get_hash(&key)? {
        Some(hash) => hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect(),
        None => Vec::new(),
    };
    client.reply(Reply::Array(pairs.len() * 2));
    for (field, value) in pairs {
        client.reply(field);
        client.reply(value);
    }
    Ok(None)
}

pub static HKEYS: Command = Command {
    kind: CommandKind::Hkeys,
    name: "hkeys",
    arity: Arity::Exact(2),
    run: hkeys,
    readonly: true,
    write: false,
};

fn hkeys(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let fields: Vec<Bytes> = match store.db.get_hash(&key)? {
        Some(hash) => hash.iter().map(|(f, _)| f.clone()).collect(),
        None => Vec::new(),
    };
    client.reply(Reply::Array(fields.len()));
    for field in fields {
        client.reply(field);
    }
    Ok(None)
}

pub static HVALS: Command = Command {
    kind: CommandKind::Hvals,
    name: "hvals",
    arity: Arity::Exact(2),
    run: hvals,
    readonly: true,
    write: false,
};

fn hvals(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let values: Vec<Bytes> = match store.db.get_hash(&key)? {
        Some(hash) => hash.iter().map(|(_, v)| v.clone()).collect(),
        None => Vec::new(),
    };
    client.reply(Reply::Array(values.len()));
    for value in values {
        client.reply(value);
    }
    Ok(None)
}

pub static HLEN: Command = Command {
    kind: CommandKind::Hlen,
    name: "hlen",
    arity: Arity::Exact(2),
    run: hlen,
    readonly: true,
    write: false,
};

fn hlen(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let len = store.db.get_hash(&key)?.map_or(0, HashValue::len);
    client.reply(len);
    Ok(None)
}

pub static HSTRLEN: Command = Command {
    kind: CommandKind::Hstrlen,
    name: "hstrlen",
    arity: Arity::Exact(3),
    run: hstrlen,
    readonly: true,
    write: false,
};

fn hstrlen(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let len = store
        .db
        .get_hash(&key)?
        .and_then(|hash| hash.get(&field))
        .map_or(0, Bytes::len);
    client.reply(len);
    Ok(None)
}

pub static HEXISTS: Command = Command {
    kind: CommandKind::Hexists,
    name: "hexists",
    arity: Arity::Exact(3),
    run: hexists,
    readonly: true,
    write: false,
};

fn hexists(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let found = store
        .db
        .get_hash(&key)?
        .map_or(false, |hash| hash.contains(&field));
    client.reply(found);
    Ok(None)
}

pub static HINCRBY: Command = Command {
    kind: CommandKind::Hincrby,
    name: "hincrby",
    arity: Arity::Exact(4),
    run: hincrby,
    readonly: false,
    write: true,
};

fn hincrby(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let by = client.request.i64()?;

    let hash = store.db.hash_or_default(&key)?;
    let current: i64 = match hash.get(&field) {
        Some(value) => parse(value).ok_or(ReplyError::Integer)?,
        None => 0,
    };
    let next = current.checked_add(by).ok_or(ReplyError::IncrOverflow)?;
    hash.set(field, next.to_string().into_bytes().into());
    store.mark_dirty();
    store.touch(&key);
    client.reply(next);
    Ok(None)
}

pub static HINCRBYFLOAT: Command = Command {
    kind: CommandKind::Hincrbyfloat,
    name: "hincrbyfloat",
    arity: Arity::Exact(4),
    run: hincrbyfloat,
    readonly: false,
    write: true,
};

fn hincrbyfloat(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let by = client.request.finite_f64()?;

    let hash = store.db.hash_or_default(&key)?;
    let current = match hash.get(&field) {
        Some(value) => parse::<f64>(value).ok_or(ReplyError::Float)?,
        None => 0.0,
    };
    let next = current + by;
    if !next.is_finite() {
        return Err(ReplyError::NanOrInfinity.into());
    }
    let encoded: Bytes = format_f64(next).into_bytes().into();
    hash.set(field.clone(), encoded.clone());
    store.mark_dirty();
    store.touch(&key);
    store.propagate_as(vec![Bytes::from_static(b"HSET"), key, field, encoded.clone()]);
    client.reply(encoded);
    Ok(None)
}

pub static HSCAN: Command = Command {
    kind: CommandKind::Hscan,
    name: "hscan",
    arity: Arity::Minimum(3),
    run: hscan,
    readonly: true,
    write: false,
};

fn hscan(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let args = parse_scan(client, false)?;

    let resume = if args.cursor == 0 {
        None
    } else {
        store.cursors.take(args.cursor)
    };
    if args.cursor != 0 && resume.is_none() {
        client.reply(Reply::Array(2));
        client.reply(Bytes::from_static(b"0"));
        client.reply(Reply::Array(0));
        return Ok(None);
    }

    let mut sorted: Vec<Bytes> = match store.db.get_hash(&key)? {
        Some(hash) => hash.iter().map(|(f, _)| f.clone()).collect(),
        None => Vec::new(),
    };
    sorted.sort();
    let (window, next) = scan_window(&sorted, resume.as_deref(), args.count);

    let selected: Vec<Bytes> = window
        .iter()
        .filter(|field| {
            args.pattern
                .as_ref()
                .map_or(true, |pattern| crate::glob::matches(field, pattern))
        })
        .cloned()
        .collect();

    let token = match next {
        Some(position) => store.cursors.save(position),
        None => 0,
    };

    client.reply(Reply::Array(2));
    client.reply(token.to_string().into_bytes());
    client.reply(Reply::Array(selected.len() * 2));
    for field in selected {
        let value = store
            .db
            .get_hash(&key)?
            .and_then(|hash| hash.get(&field).cloned())
            .unwrap_or_default();
        client.reply(field);
        client.reply(value);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{run, store};

    #[test]
    fn set_get() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["HSET", "h", "a", "1", "b", "2"])[..], b":2\r\n");
        assert_eq!(&run(&mut store, &["HSET", "h", "a", "9"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["HGET", "h", "a"])[..], b"$1\r\n9\r\n");
        assert_eq!(&run(&mut store, &["HGET", "h", "zz"])[..], b"$-1\r\n");
        assert_eq!(&run(&mut store, &["HLEN", "h"])[..], b":2\r\n");
        assert_eq!(&run(&mut store, &["HSTRLEN", "h", "a"])[..], b":1\r\n");
        assert!(run(&mut store, &["HSET", "h", "dangling"]).starts_with(b"-ERR wrong number"));
    }

    #[test]
    fn hsetnx() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["HSETNX", "h", "f", "1"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["HSETNX", "h", "f", "2"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["HGET", "h", "f"])[..], b"$1\r\n1\r\n");
    }

    #[test]
    fn hdel_purges_empty_hashes() {
        let mut store = store();
        run(&mut store, &["HSET", "h", "a", "1", "b", "2"]);
        assert_eq!(&run(&mut store, &["HDEL", "h", "a", "zz"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["HDEL", "h", "b"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["EXISTS", "h"])[..], b":0\r\n");
    }

    #[test]
    fn bulk_reads() {
        let mut store = store();
        run(&mut store, &["HSET", "h", "a", "1"]);
        assert_eq!(
            &run(&mut store, &["HMGET", "h", "a", "zz"])[..],
            b"*2\r\n$1\r\n1\r\n$-1\r\n"
        );
        assert_eq!(
            &run(&mut store, &["HGETALL", "h"])[..],
            b"*2\r\n$1\r\na\r\n$1\r\n1\r\n"
        );
        assert_eq!(&run(&mut store, &["HKEYS", "h"])[..], b"*1\r\n$1\r\na\r\n");
        assert_eq!(&run(&mut store, &["HVALS", "h"])[..], b"*1\r\n$1\r\n1\r\n");
        assert_eq!(&run(&mut store, &["HGETALL", "missing"])[..], b"*0\r\n");
    }

    #[test]
    fn increments() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["HINCRBY", "h", "n", "5"])[..], b":5\r\n");
        assert_eq!(&run(&mut store, &["HINCRBY", "h", "n", "-7"])[..], b":-2\r\n");
        run(&mut store, &["HSET", "h", "s", "abc"]);
        assert!(run(&mut store, &["HINCRBY", "h", "s", "1"]).starts_with(b"-ERR value is not"));
        assert_eq!(
            &run(&mut store, &["HINCRBYFLOAT", "h", "f", "10.5"])[..],
            b"$4\r\n10.5\r\n"
        );
        assert_eq!(
            &run(&mut store, &["HINCRBYFLOAT", "h", "f", "0.1"])[..],
            b"$4\r\n10.6\r\n"
        );
    }

    #[test]
    fn hscan_returns_pairs() {
        let mut store = store();
        run(&mut store, &["HSET", "h", "f1", "v1", "f2", "v2"]);
        let reply = run(&mut store, &["HSCAN", "h", "0"]);
        let text = String::from_utf8_lossy(&reply);
        assert!(text.starts_with("*2\r\n$1\r\n0\r\n*4\r\n"));
        assert!(text.contains("f1"));
        assert!(text.contains("v2"));
    }
}
