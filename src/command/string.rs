use crate::{
    bytes::{lex, parse},
    client::Client,
    command::{Arity, Command, CommandKind},
    db::StrValue,
    reply::{Reply, ReplyError},
    store::Store,
    time::now_ms,
    CommandResult,
};
use bytes::Bytes;
use logos::Logos;

/// Bit offsets address at most 512MB of string.
const MAX_BIT_OFFSET: usize = 1 << 32;

pub static GET: Command = Command {
    kind: CommandKind::Get,
    name: "get",
    arity: Arity::Exact(2),
    run: get,
    readonly: true,
    write: false,
};

fn get(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let value = store.db.get_str(&key)?.ok_or(Reply::Nil)?;
    let value = value.to_bytes();
    client.reply(value);
    Ok(None)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum SetOption {
    #[regex(b"(?i:ex)")]
    Ex,

    #[regex(b"(?i:px)")]
    Px,

    #[regex(b"(?i:exat)")]
    Exat,

    #[regex(b"(?i:pxat)")]
    Pxat,

    #[regex(b"(?i:keepttl)")]
    Keepttl,

    #[regex(b"(?i:nx)")]
    Nx,

    #[regex(b"(?i:xx)")]
    Xx,

    #[regex(b"(?i:get)")]
    Get,
}

#[derive(Debug, Default, Eq, PartialEq)]
enum SetTtl {
    #[default]
    Discard,
    Keep,
    At(u128),
}

pub static SET: Command = Command {
    kind: CommandKind::Set,
    name: "set",
    arity: Arity::Minimum(3),
    run: set,
    readonly: false,
    write: true,
};

fn set(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let value = client.request.pop()?;

    let mut ttl = None;
    let mut nx = false;
    let mut xx = false;
    let mut get_old = false;

    while let Some(argument) = client.request.try_pop() {
        let option: SetOption = lex(&argument[..]).ok_or(ReplyError::Syntax)?;
        match option {
            SetOption::Ex | SetOption::Px => {
                if ttl.is_some() {
                    return Err(ReplyError::Syntax.into());
                }
                let amount: i128 = parse(&client.request.pop()?).ok_or(ReplyError::Integer)?;
                if amount <= 0 {
                    return Err(ReplyError::ExpireTime("set").into());
                }
                let unit = if option == SetOption::Ex { 1000 } else { 1 };
                let amount = u128::try_from(amount).map_err(|_| ReplyError::Integer)?;
                ttl = Some(SetTtl::At(now_ms() + amount * unit));
            }
            SetOption::Exat | SetOption::Pxat => {
                if ttl.is_some() {
                    return Err(ReplyError::Syntax.into());
                }
                let at: u128 = parse(&client.request.pop()?).ok_or(ReplyError::Integer)?;
                let unit = if option == SetOption::Exat { 1000 } else { 1 };
                ttl = Some(SetTtl::At(at * unit));
            }
            SetOption::Keepttl => {
                if ttl.is_some() {
                    return Err(ReplyError::Syntax.into());
                }
                ttl = Some(SetTtl::Keep);
            }
            SetOption::Nx if !xx => nx = true,
            SetOption::Xx if !nx => xx = true,
            SetOption::Nx | SetOption::Xx => return Err(ReplyError::XxAndNx.into()),
            SetOption::Get => get_old = true,
        }
    }
    let ttl = ttl.unwrap_or_default();

    // The old value is needed for GET and for the NX/XX decision. GET on a
    // non-string value is an error; a plain SET silently replaces it.
    let old = if get_old {
        store.db.get_str(&key)?.map(StrValue::to_bytes)
    } else {
        None
    };
    let exists = store.db.exists(&key);

    if (nx && exists) || (xx && !exists) {
        if get_old {
            client.reply(old);
        } else {
            client.reply(Reply::Nil);
        }
        return Ok(None);
    }

    let new = StrValue::from(value.clone());
    match ttl {
        SetTtl::Discard => {
            store.db.set(key.clone(), new);
            store.propagate_as(vec![Bytes::from_static(b"SET"), key.clone(), value]);
        }
        SetTtl::Keep => {
            store.db.overwrite(key.clone(), new);
            store.propagate_as(vec![
                Bytes::from_static(b"SET"),
                key.clone(),
                value,
                Bytes::from_static(b"KEEPTTL"),
            ]);
        }
        SetTtl::At(at) => {
            store.db.set(key.clone(), new);
            store.db.expire(&key, at);
            store.propagate_as(vec![
                Bytes::from_static(b"SET"),
                key.clone(),
                value,
                Bytes::from_static(b"PXAT"),
                at.to_string().into_bytes().into(),
            ]);
        }
    }
    store.mark_dirty();
    store.touch(&key);

    if get_old {
        client.reply(old);
    } else {
        client.reply("OK");
    }
    Ok(None)
}

pub static SETNX: Command = Command {
    kind: CommandKind::Setnx,
    name: "setnx",
    arity: Arity::Exact(3),
    run: setnx,
    readonly: false,
    write: true,
};

fn setnx(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let value = client.request.pop()?;
    if store.db.exists(&key) {
        client.reply(0);
        return Ok(None);
    }
    store.db.set(key.clone(), StrValue::from(value));
    store.mark_dirty();
    store.touch(&key);
    client.reply(1);
    Ok(None)
}

pub static GETSET: Command = Command {
    kind: CommandKind::Getset,
    name: "getset",
    arity: Arity::Exact(3),
    run: getset,
    readonly: false,
    write: true,
};

fn getset(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let value = client.request.pop()?;
    let old = store.db.get_str(&key)?.map(StrValue::to_bytes);
    store.db.set(key.clone(), StrValue::from(value));
    store.mark_dirty();
    store.touch(&key);
    client.reply(old);
    Ok(None)
}

pub static GETDEL: Command = Command {
    kind: CommandKind::Getdel,
    name: "getdel",
    arity: Arity::Exact(2),
    run: getdel,
    readonly: false,
    write: true,
};

fn getdel(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let Some(value) = store.db.get_str(&key)? else {
        client.reply(Reply::Nil);
        return Ok(None);
    };
    let value = value.to_bytes();
    store.db.remove(&key);
    store.mark_dirty();
    store.touch(&key);
    client.reply(value);
    Ok(None)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum GetexOption {
    #[regex(b"(?i:ex)")]
    Ex,

    #[regex(b"(?i:px)")]
    Px,

    #[regex(b"(?i:exat)")]
    Exat,

    #[regex(b"(?i:pxat)")]
    Pxat,

    #[regex(b"(?i:persist)")]
    Persist,
}

pub static GETEX: Command = Command {
    kind: CommandKind::Getex,
    name: "getex",
    arity: Arity::Minimum(2),
    run: getex,
    readonly: false,
    write: true,
};

fn getex(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;

    let mut change = None;
    while let Some(argument) = client.request.try_pop() {
        if change.is_some() {
            return Err(ReplyError::Syntax.into());
        }
        let option: GetexOption = lex(&argument[..]).ok_or(ReplyError::Syntax)?;
        change = Some(match option {
            GetexOption::Ex => Some(client.request.ttl()?),
            GetexOption::Px => Some(client.request.pttl()?),
            GetexOption::Exat => Some(client.request.expiretime()?),
            GetexOption::Pxat => Some(client.request.pexpiretime()?),
            GetexOption::Persist => None,
        });
    }

    let Some(value) = store.db.get_str(&key)? else {
        client.reply(Reply::Nil);
        return Ok(None);
    };
    let value = value.to_bytes();

    match change {
        None => {}
        Some(Some(at)) => {
            store.db.expire(&key, at);
            store.mark_dirty();
            store.touch(&key);
            store.propagate_as(vec![
                Bytes::from_static(b"PEXPIREAT"),
                key.clone(),
                at.to_string().into_bytes().into(),
            ]);
        }
        Some(None) => {
            if store.db.persist(&key) {
                store.mark_dirty();
                store.touch(&key);
                store.propagate_as(vec![Bytes::from_static(b"PERSIST"), key.clone()]);
            }
        }
    }

    client.reply(value);
    Ok(None)
}

pub static APPEND: Command = Command {
    kind: CommandKind::Append,
    name: "append",
    arity: Arity::Exact(3),
    run: append,
    readonly: false,
    write: true,
};

fn append(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let data = client.request.pop()?;
    let value = store.db.str_or_default(&key)?;
    let len = value.append(&data);
    store.mark_dirty();
    store.touch(&key);
    client.reply(len);
    Ok(None)
}

pub static STRLEN: Command = Command {
    kind: CommandKind::Strlen,
    name: "strlen",
    arity: Arity::Exact(2),
    run: strlen,
    readonly: true,
    write: false,
};

fn strlen(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let len = store.db.get_str(&key)?.map_or(0, StrValue::len);
    client.reply(len);
    Ok(None)
}

pub static MGET: Command = Command {
    kind: CommandKind::Mget,
    name: "mget",
    arity: Arity::Minimum(2),
    run: mget,
    readonly: true,
    write: false,
};

fn mget(client: &mut Client, store: &mut Store) -> CommandResult {
    let keys: Vec<Bytes> = client.request.iter().collect();
    client.reply(Reply::Array(keys.len()));
    for key in keys {
        // Non-string values read as nil here, not as an error.
        match store.db.get_str(&key) {
            Ok(Some(value)) => {
                let value = value.to_bytes();
                client.reply(value);
            }
            _ => client.reply(Reply::Nil),
        }
    }
    Ok(None)
}

pub static MSET: Command = Command {
    kind: CommandKind::Mset,
    name: "mset",
    arity: Arity::Minimum(3),
    run: mset,
    readonly: false,
    write: true,
};

fn mset(client: &mut Client, store: &mut Store) -> CommandResult {
    client.request.assert_pairs()?;
    while let Some(key) = client.request.try_pop() {
        let value = client.request.pop()?;
        store.db.set(key.clone(), StrValue::from(value));
        store.mark_dirty();
        store.touch(&key);
    }
    client.reply("OK");
    Ok(None)
}

pub static INCR: Command = Command {
    kind: CommandKind::Incr,
    name: "incr",
    arity: Arity::Exact(2),
    run: incr,
    readonly: false,
    write: true,
};

fn incr(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    increment(client, store, key, 1)
}

pub static DECR: Command = Command {
    kind: CommandKind::Decr,
    name: "decr",
    arity: Arity::Exact(2),
    run: decr,
    readonly: false,
    write: true,
};

fn decr(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    increment(client, store, key, -1)
}

pub static INCRBY: Command = Command {
    kind: CommandKind::Incrby,
    name: "incrby",
    arity: Arity::Exact(3),
    run: incrby,
    readonly: false,
    write: true,
};

fn incrby(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let by = client.request.i64()?;
    increment(client, store, key, by)
}

pub static DECRBY: Command = Command {
    kind: CommandKind::Decrby,
    name: "decrby",
    arity: Arity::Exact(3),
    run: decrby,
    readonly: false,
    write: true,
};

fn decrby(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let by = client
        .request
        .i64()?
        .checked_neg()
        .ok_or(ReplyError::IncrOverflow)?;
    increment(client, store, key, by)
}

/// The shared INCR/DECR path: the integer view of the bytes, checked
/// arithmetic, and the canonical re-encoding.
fn increment(client: &mut Client, store: &mut Store, key: Bytes, by: i64) -> CommandResult {
    let missing = store.db.get_str(&key)?.is_none();
    let value = store.db.str_or_default(&key)?;
    let current = if missing {
        0
    } else {
        value.as_i64().ok_or(ReplyError::Integer)?
    };
    let next = current.checked_add(by).ok_or(ReplyError::IncrOverflow)?;
    value.set_i64(next);
    store.mark_dirty();
    store.touch(&key);
    client.reply(next);
    Ok(None)
}

pub static INCRBYFLOAT: Command = Command {
    kind: CommandKind::Incrbyfloat,
    name: "incrbyfloat",
    arity: Arity::Exact(3),
    run: incrbyfloat,
    readonly: false,
    write: true,
};

fn incrbyfloat(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let by = client.request.finite_f64()?;
    let missing = store.db.get_str(&key)?.is_none();
    let value = store.db.str_or_default(&key)?;
    let current = if missing {
        0.0
    } else {
        value.as_f64().ok_or(ReplyError::Float)?
    };
    let next = current + by;
    if !next.is_finite() {
        return Err(ReplyError::NanOrInfinity.into());
    }
    value.set_f64(next);
    let encoded = value.to_bytes();
    store.mark_dirty();
    store.touch(&key);
    // Propagate the resolved value so replicas agree bit for bit.
    store.propagate_as(vec![Bytes::from_static(b"SET"), key, encoded.clone()]);
    client.reply(encoded);
    Ok(None)
}

pub static GETRANGE: Command = Command {
    kind: CommandKind::Getrange,
    name: "getrange",
    arity: Arity::Exact(4),
    run: getrange,
    readonly: true,
    write: false,
};

fn getrange(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;
    let slice = match store.db.get_str(&key)? {
        Some(value) => Bytes::copy_from_slice(value.getrange(start, stop)),
        None => Bytes::new(),
    };
    client.reply(slice);
    Ok(None)
}

pub static SETRANGE: Command = Command {
    kind: CommandKind::Setrange,
    name: "setrange",
    arity: Arity::Exact(4),
    run: setrange,
    readonly: false,
    write: true,
};

fn setrange(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let offset = client
        .request
        .i64()?
        .try_into()
        .map_err(|_| ReplyError::OffsetRange)?;
    let data = client.request.pop()?;

    if data.is_empty() {
        let len = store.db.get_str(&key)?.map_or(0, StrValue::len);
        client.reply(len);
        return Ok(None);
    }

    let value = store.db.str_or_default(&key)?;
    let len = value.setrange(offset, &data);
    store.mark_dirty();
    store.touch(&key);
    client.reply(len);
    Ok(None)
}

pub static GETBIT: Command = Command {
    kind: CommandKind::Getbit,
    name: "getbit",
    arity: Arity::Exact(3),
    run: getbit,
    readonly: true,
    write: false,
};

fn bit_offset(client: &mut Client) -> Result<usize, ReplyError> {
    let offset: usize = parse(&client.request.pop()?).ok_or(ReplyError::BitOffset)?;
    if offset >= MAX_BIT_OFFSET {
        return Err(ReplyError::BitOffset);
    }
    Ok(offset)
}

fn getbit(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let offset = bit_offset(client)?;
    let bit = store
        .db
        .get_str(&key)?
        .map_or(false, |value| value.getbit(offset));
    client.reply(bit);
    Ok(None)
}

pub static SETBIT: Command = Command {
    kind: CommandKind::Setbit,
    name: "setbit",
    arity: Arity::Exact(4),
    run: setbit,
    readonly: false,
    write: true,
};

fn setbit(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let offset = bit_offset(client)?;
    let bit = match &client.request.pop()?[..] {
        b"0" => false,
        b"1" => true,
        _ => return Err(ReplyError::BitValue.into()),
    };
    let value = store.db.str_or_default(&key)?;
    let old = value.setbit(offset, bit);
    store.mark_dirty();
    store.touch(&key);
    client.reply(old);
    Ok(None)
}

pub static BITCOUNT: Command = Command {
    kind: CommandKind::Bitcount,
    name: "bitcount",
    arity: Arity::Minimum(2),
    run: bitcount,
    readonly: true,
    write: false,
};

fn bitcount(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let range = match client.request.remaining() {
        0 => (0, -1),
        2 => {
            let start = client.request.i64()?;
            let stop = client.request.i64()?;
            (start, stop)
        }
        _ => return Err(ReplyError::Syntax.into()),
    };
    let count = store
        .db
        .get_str(&key)?
        .map_or(0, |value| value.bitcount(range.0, range.1));
    client.reply(count);
    Ok(None)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum BitopKind {
    #[regex(b"(?i:and)")]
    And,

    #[regex(b"(?i:or)")]
    Or,

    #[regex(b"(?i:xor)")]
    Xor,

    #[regex(b"(?i:not)")]
    Not,
}

pub static BITOP: Command = Command {
    kind: CommandKind::Bitop,
    name: "bitop",
    arity: Arity::Minimum(4),
    run: bitop,
    readonly: false,
    write: true,
};

fn bitop(client: &mut Client, store: &mut Store) -> CommandResult {
    let op: BitopKind = lex(&client.request.pop()?[..]).ok_or(ReplyError::Syntax)?;
    let dest = client.request.pop()?;
    let sources: Vec<Bytes> = client.request.iter().collect();

    if op == BitopKind::Not && sources.len() != 1 {
        return Err(ReplyError::BitopNot.into());
    }

    let mut inputs = Vec::with_capacity(sources.len());
    for source in &sources {
        let bytes = store
            .db
            .get_str(source)?
            .map_or_else(Vec::new, |value| value.as_bytes().to_vec());
        inputs.push(bytes);
    }

    let len = inputs.iter().map(Vec::len).max().unwrap_or(0);
    let mut result = vec![0u8; len];
    match op {
        BitopKind::Not => {
            result.copy_from_slice(&inputs[0]);
            for byte in &mut result {
                *byte = !*byte;
            }
        }
        BitopKind::And | BitopKind::Or | BitopKind::Xor => {
            for (index, input) in inputs.iter().enumerate() {
                for at in 0..len {
                    let byte = input.get(at).copied().unwrap_or(0);
                    let current = &mut result[at];
                    if index == 0 {
                        *current = byte;
                    } else {
                        match op {
                            BitopKind::And => *current &= byte,
                            BitopKind::Or => *current |= byte,
                            BitopKind::Xor => *current ^= byte,
                            BitopKind::Not => unreachable!(),
                        }
                    }
                }
            }
        }
    }

    if result.is_empty() {
        store.db.remove(&dest);
    } else {
        store.db.set(dest.clone(), StrValue::from(result.clone()));
    }
    store.mark_dirty();
    store.touch(&dest);
    client.reply(result.len());
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{run, store};

    #[test]
    fn set_then_get() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["SET", "foo", "bar"])[..], b"+OK\r\n");
        assert_eq!(&run(&mut store, &["GET", "foo"])[..], b"$3\r\nbar\r\n");
        assert_eq!(&run(&mut store, &["GET", "nope"])[..], b"$-1\r\n");
    }

    #[test]
    fn set_nx_xx() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["SET", "k", "a", "NX"])[..], b"+OK\r\n");
        assert_eq!(&run(&mut store, &["SET", "k", "b", "NX"])[..], b"$-1\r\n");
        assert_eq!(&run(&mut store, &["GET", "k"])[..], b"$1\r\na\r\n");
        assert_eq!(&run(&mut store, &["SET", "k", "c", "XX"])[..], b"+OK\r\n");
        assert_eq!(&run(&mut store, &["SET", "zz", "x", "XX"])[..], b"$-1\r\n");
        assert!(run(&mut store, &["SET", "k", "v", "NX", "XX"]).starts_with(b"-ERR XX and NX"));
    }

    #[test]
    fn set_with_get_returns_old() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["SET", "k", "a", "GET"])[..], b"$-1\r\n");
        assert_eq!(&run(&mut store, &["SET", "k", "b", "GET"])[..], b"$1\r\na\r\n");
        run(&mut store, &["RPUSH", "l", "x"]);
        assert!(run(&mut store, &["SET", "l", "v", "GET"]).starts_with(b"-WRONGTYPE"));
    }

    #[test]
    fn set_expiry_options() {
        let mut store = store();
        run(&mut store, &["SET", "k", "v", "EX", "100"]);
        assert_eq!(&run(&mut store, &["TTL", "k"])[..], b":100\r\n");
        // Plain SET discards the deadline, KEEPTTL retains it.
        run(&mut store, &["SET", "k", "v2", "KEEPTTL"]);
        assert_eq!(&run(&mut store, &["TTL", "k"])[..], b":100\r\n");
        run(&mut store, &["SET", "k", "v3"]);
        assert_eq!(&run(&mut store, &["TTL", "k"])[..], b":-1\r\n");
        assert!(run(&mut store, &["SET", "k", "v", "EX", "0"]).starts_with(b"-ERR invalid expire"));
    }

    #[test]
    fn incr_family() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["INCR", "n"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["INCRBY", "n", "9"])[..], b":10\r\n");
        assert_eq!(&run(&mut store, &["DECR", "n"])[..], b":9\r\n");
        assert_eq!(&run(&mut store, &["DECRBY", "n", "4"])[..], b":5\r\n");
        run(&mut store, &["SET", "s", "abc"]);
        assert!(run(&mut store, &["INCR", "s"]).starts_with(b"-ERR value is not an integer"));
        run(&mut store, &["SET", "big", "9223372036854775807"]);
        assert!(run(&mut store, &["INCR", "big"]).starts_with(b"-ERR increment or decrement"));
    }

    #[test]
    fn incrbyfloat() {
        let mut store = store();
        run(&mut store, &["SET", "f", "10.5"]);
        assert_eq!(&run(&mut store, &["INCRBYFLOAT", "f", "0.1"])[..], b"$4\r\n10.6\r\n");
        assert!(run(&mut store, &["INCRBYFLOAT", "f", "nan"]).starts_with(b"-ERR"));
    }

    #[test]
    fn append_and_strlen() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["APPEND", "k", "Hello"])[..], b":5\r\n");
        assert_eq!(&run(&mut store, &["APPEND", "k", " World"])[..], b":11\r\n");
        assert_eq!(&run(&mut store, &["STRLEN", "k"])[..], b":11\r\n");
        assert_eq!(&run(&mut store, &["STRLEN", "none"])[..], b":0\r\n");
    }

    #[test]
    fn ranges() {
        let mut store = store();
        run(&mut store, &["SET", "k", "Hello World"]);
        assert_eq!(&run(&mut store, &["GETRANGE", "k", "0", "4"])[..], b"$5\r\nHello\r\n");
        assert_eq!(&run(&mut store, &["GETRANGE", "k", "-5", "-1"])[..], b"$5\r\nWorld\r\n");
        assert_eq!(&run(&mut store, &["SETRANGE", "k", "6", "Redis"])[..], b":11\r\n");
        assert_eq!(&run(&mut store, &["GET", "k"])[..], b"$11\r\nHello Redis\r\n");
        // Zero-filled gap.
        assert_eq!(&run(&mut store, &["SETRANGE", "pad", "3", "x"])[..], b":4\r\n");
        assert_eq!(&run(&mut store, &["GET", "pad"])[..], b"$4\r\n\x00\x00\x00x\r\n");
    }

    #[test]
    fn bits() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["SETBIT", "b", "7", "1"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["GETBIT", "b", "7"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["GETBIT", "b", "100"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["SETBIT", "b", "7", "0"])[..], b":1\r\n");
        assert!(run(&mut store, &["SETBIT", "b", "7", "2"]).starts_with(b"-ERR bit is not"));
        run(&mut store, &["SET", "c", "foobar"]);
        assert_eq!(&run(&mut store, &["BITCOUNT", "c"])[..], b":26\r\n");
        assert_eq!(&run(&mut store, &["BITCOUNT", "c", "1", "1"])[..], b":6\r\n");
    }

    #[test]
    fn bitop() {
        let mut store = store();
        run(&mut store, &["SET", "a", "abc"]);
        run(&mut store, &["SET", "b", "ab"]);
        assert_eq!(&run(&mut store, &["BITOP", "AND", "dest", "a", "b"])[..], b":3\r\n");
        assert_eq!(&run(&mut store, &["GET", "dest"])[..], b"$3\r\nab\x00\r\n");
        assert_eq!(&run(&mut store, &["BITOP", "XOR", "x", "a", "a"])[..], b":3\r\n");
        assert_eq!(&run(&mut store, &["GET", "x"])[..], b"$3\r\n\x00\x00\x00\r\n");
        assert!(run(&mut store, &["BITOP", "NOT", "n", "a", "b"]).starts_with(b"-ERR BITOP NOT"));
        assert_eq!(&run(&mut store, &["BITOP", "NOT", "n", "missing"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["EXISTS", "n"])[..], b":0\r\n");
    }

    #[test]
    fn mset_mget() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["MSET", "a", "1", "b", "2"])[..], b"+OK\r\n");
        assert_eq!(
            &run(&mut store, &["MGET", "a", "b", "missing"])[..],
            b"*3\r\n$1\r\n1\r\n$1\r\n2\r\n$-1\r\n"
        );
        assert!(run(&mut store, &["MSET", "a", "1", "dangling"]).starts_with(b"-ERR wrong number"));
    }

    #[test]
    fn getdel_getset_setnx() {
        let mut store = store();
        run(&mut store, &["SET", "k", "v"]);
        assert_eq!(&run(&mut store, &["GETDEL", "k"])[..], b"$1\r\nv\r\n");
        assert_eq!(&run(&mut store, &["EXISTS", "k"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["GETSET", "k", "new"])[..], b"$-1\r\n");
        assert_eq!(&run(&mut store, &["GETSET", "k", "newer"])[..], b"$3\r\nnew\r\n");
        assert_eq!(&run(&mut store, &["SETNX", "k", "x"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["SETNX", "fresh", "x"])[..], b":1\r\n");
    }

    #[test]
    fn getex_controls_ttl() {
        let mut store = store();
        run(&mut store, &["SET", "k", "v"]);
        assert_eq!(&run(&mut store, &["GETEX", "k", "EX", "100"])[..], b"$1\r\nv\r\n");
        assert_eq!(&run(&mut store, &["TTL", "k"])[..], b":100\r\n");
        assert_eq!(&run(&mut store, &["GETEX", "k", "PERSIST"])[..], b"$1\r\nv\r\n");
        assert_eq!(&run(&mut store, &["TTL", "k"])[..], b":-1\r\n");
    }

    #[test]
    fn wrongtype_does_not_mutate() {
        let mut store = store();
        run(&mut store, &["RPUSH", "l", "a"]);
        assert!(run(&mut store, &["APPEND", "l", "x"]).starts_with(b"-WRONGTYPE"));
        assert!(run(&mut store, &["INCR", "l"]).starts_with(b"-WRONGTYPE"));
        assert_eq!(&run(&mut store, &["LRANGE", "l", "0", "-1"])[..], b"*1\r\n$1\r\na\r\n");
    }
}
