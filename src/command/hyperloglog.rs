use crate::{
    bytes::parse,
    client::Client,
    command::{Arity, Command, CommandKind},
    db::{HyperLogLog, ValueError},
    rdb,
    reply::{Reply, ReplyError},
    store::Store,
    CommandResult,
};

/// PF commands report their own WRONGTYPE flavour.
fn guard<T>(result: Result<T, ValueError>) -> Result<T, Reply> {
    result.map_err(|_| ReplyError::HyperLogLog.into())
}

pub static PFADD: Command = Command {
    kind: CommandKind::Pfadd,
    name: "pfadd",
    arity: Arity::Minimum(2),
    run: pfadd,
    readonly: false,
    write: true,
};

fn pfadd(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let created = guard(store.db.get_hll(&key))?.is_none();

    let sketch = guard(store.db.hll_or_default(&key))?;
    let mut changed = false;
    while let Some(element) = client.request.try_pop() {
        changed |= sketch.add(&element);
    }

    if changed || created {
        store.mark_dirty();
        store.touch(&key);
    }
    client.reply(changed || created);
    Ok(None)
}

pub static PFCOUNT: Command = Command {
    kind: CommandKind::Pfcount,
    name: "pfcount",
    arity: Arity::Minimum(2),
    run: pfcount,
    readonly: true,
    write: false,
};

fn pfcount(client: &mut Client, store: &mut Store) -> CommandResult {
    let mut merged: Option<HyperLogLog> = None;
    let mut single: Option<u64> = None;
    let mut keys = 0;

    while let Some(key) = client.request.try_pop() {
        keys += 1;
        let Some(sketch) = guard(store.db.get_hll(&key))? else {
            continue;
        };
        if keys == 1 {
            single = Some(sketch.count());
        } else {
            single = None;
        }
        match merged.as_mut() {
            Some(merged) => {
                merged.merge(sketch);
            }
            None => merged = Some(sketch.clone()),
        }
    }

    // The single-key read avoids the transient merge; a multi-key count
    // builds one and never counts as a write.
    let count = match (keys, single) {
        (1, Some(count)) => count,
        _ => merged.map_or(0, |sketch| sketch.count()),
    };
    client.reply(count);
    Ok(None)
}

pub static PFMERGE: Command = Command {
    kind: CommandKind::Pfmerge,
    name: "pfmerge",
    arity: Arity::Minimum(2),
    run: pfmerge,
    readonly: false,
    write: true,
};

fn pfmerge(client: &mut Client, store: &mut Store) -> CommandResult {
    let dest = client.request.pop()?;

    let mut sources = Vec::new();
    while let Some(key) = client.request.try_pop() {
        if let Some(sketch) = guard(store.db.get_hll(&key))? {
            sources.push(sketch.clone());
        }
    }

    let sketch = guard(store.db.hll_or_default(&dest))?;
    for source in &sources {
        sketch.merge(source);
    }
    store.mark_dirty();
    store.touch(&dest);
    client.reply("OK");
    Ok(None)
}

/// Internal: restore a value payload produced by the append-log rewrite.
/// Never sent by clients in normal operation.
pub static ZOLRESTORE: Command = Command {
    kind: CommandKind::Zolrestore,
    name: "zolrestore",
    arity: Arity::Exact(4),
    run: zolrestore,
    readonly: false,
    write: true,
};

fn zolrestore(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let tag: u8 = parse(&client.request.pop()?).ok_or(ReplyError::Syntax)?;
    let payload = client.request.pop()?;

    let value = rdb::decode_value_payload(tag, &payload)
        .map_err(|_| ReplyError::Custom("ERR bad restore payload".into()))?;
    store.db.set(key.clone(), value);
    store.mark_dirty();
    store.touch(&key);
    client.reply("OK");
    Ok(None)
}
