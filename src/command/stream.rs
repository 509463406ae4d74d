use crate::{
    bytes::parse,
    client::Client,
    command::{Arity, Command, CommandKind},
    db::{IdSpec, StreamError, StreamId, StreamValue},
    reply::{Reply, ReplyError},
    store::Store,
    time::now_ms,
    CommandResult,
};
use bytes::Bytes;

pub static XADD: Command = Command {
    kind: CommandKind::Xadd,
    name: "xadd",
    arity: Arity::Minimum(5),
    run: xadd,
    readonly: false,
    write: true,
};

fn xadd(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let id_argument = client.request.pop()?;
    let spec = IdSpec::parse(&id_argument).ok_or(ReplyError::StreamIdInvalid)?;

    client.request.assert_pairs()?;
    if client.request.is_empty() {
        return Err(client.request.wrong_arguments().into());
    }
    let mut fields = Vec::new();
    while let Some(field) = client.request.try_pop() {
        let value = client.request.pop()?;
        fields.push((field, value));
    }

    let now = u64::try_from(now_ms()).unwrap_or(u64::MAX);
    let stream = store.db.stream_or_default(&key)?;
    let id = match stream.add(spec, fields, now) {
        Ok(id) => id,
        Err(StreamError::IdSmaller) => return Err(ReplyError::StreamIdSmaller.into()),
        Err(StreamError::IdZero) => return Err(ReplyError::StreamIdZero.into()),
    };
    store.mark_dirty();
    store.touch(&key);

    // Auto ids resolve here; replicas must see the assigned form.
    let mut resolved: Vec<Bytes> = vec![Bytes::from_static(b"XADD"), key, id.to_string().into_bytes().into()];
    for argument in client.request.all().iter().skip(3) {
        resolved.push(argument.clone());
    }
    store.propagate_as(resolved);

    client.reply(id.to_string().into_bytes());
    Ok(None)
}

pub static XLEN: Command = Command {
    kind: CommandKind::Xlen,
    name: "xlen",
    arity: Arity::Exact(2),
    run: xlen,
    readonly: true,
    write: false,
};

fn xlen(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let len = store.db.get_stream(&key)?.map_or(0, StreamValue::len);
    client.reply(len);
    Ok(None)
}

pub static XRANGE: Command = Command {
    kind: CommandKind::Xrange,
    name: "xrange",
    arity: Arity::Minimum(4),
    run: |client, store| range(client, store, false),
    readonly: true,
    write: false,
};

pub static XREVRANGE: Command = Command {
    kind: CommandKind::Xrevrange,
    name: "xrevrange",
    arity: Arity::Minimum(4),
    run: |client, store| range(client, store, true),
    readonly: true,
    write: false,
};

fn range(client: &mut Client, store: &mut Store, rev: bool) -> CommandResult {
    let key = client.request.pop()?;
    let (start_argument, end_argument) = {
        let first = client.request.pop()?;
        let second = client.request.pop()?;
        if rev {
            (second, first)
        } else {
            (first, second)
        }
    };
    let start = StreamId::parse_start(&start_argument).ok_or(ReplyError::StreamIdInvalid)?;
    let end = StreamId::parse_end(&end_argument).ok_or(ReplyError::StreamIdInvalid)?;

    let count = match client.request.try_pop() {
        Some(argument) => {
            if !argument.eq_ignore_ascii_case(b"count") {
                return Err(ReplyError::Syntax.into());
            }
            let count: i64 = parse(&client.request.pop()?).ok_or(ReplyError::Integer)?;
            usize::try_from(count.max(0)).unwrap_or(0)
        }
        None => 0,
    };

    let entries: Vec<(StreamId, Vec<(Bytes, Bytes)>)> = match store.db.get_stream(&key)? {
        Some(stream) => stream
            .range(start, end, count, rev)
            .into_iter()
            .map(|entry| (entry.id, entry.fields.clone()))
            .collect(),
        None => Vec::new(),
    };

    client.reply(Reply::Array(entries.len()));
    for (id, fields) in entries {
        client.reply(Reply::Array(2));
        client.reply(id.to_string().into_bytes());
        client.reply(Reply::Array(fields.len() * 2));
        for (field, value) in fields {
            client.reply(field);
            client.reply(value);
        }
    }
    Ok(None)
}

pub static XDEL: Command = Command {
    kind: CommandKind::Xdel,
    name: "xdel",
    arity: Arity::Minimum(3),
    run: xdel,
    readonly: false,
    write: true,
};

fn xdel(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut ids = Vec::new();
    while let Some(argument) = client.request.try_pop() {
        ids.push(StreamId::parse_exact(&argument).ok_or(ReplyError::StreamIdInvalid)?);
    }
    let removed = match store.db.mut_stream(&key)? {
        Some(stream) => stream.delete(&ids),
        None => 0,
    };
    if removed > 0 {
        store.mark_dirty();
        store.touch(&key);
    }
    client.reply(removed);
    Ok(None)
}

pub static XTRIM: Command = Command {
    kind: CommandKind::Xtrim,
    name: "xtrim",
    arity: Arity::Minimum(4),
    run: xtrim,
    readonly: false,
    write: true,
};

fn xtrim(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let strategy = client.request.pop()?;
    if !strategy.eq_ignore_ascii_case(b"maxlen") {
        return Err(ReplyError::Syntax.into());
    }
    // Tolerate the `=` / `~` exactness hint.
    let mut argument = client.request.pop()?;
    if argument == &b"="[..] || argument == &b"~"[..] {
        argument = client.request.pop()?;
    }
    let maxlen: i64 = parse(&argument).ok_or(ReplyError::Integer)?;
    if maxlen < 0 {
        return Err(ReplyError::Integer.into());
    }
    let maxlen = usize::try_from(maxlen).map_err(|_| ReplyError::Integer)?;

    let removed = match store.db.mut_stream(&key)? {
        Some(stream) => stream.trim_maxlen(maxlen),
        None => 0,
    };
    if removed > 0 {
        store.mark_dirty();
        store.touch(&key);
    }
    client.reply(removed);
    Ok(None)
}
