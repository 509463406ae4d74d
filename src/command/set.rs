use crate::{
    bytes::parse,
    client::Client,
    command::{keys::parse_scan, keys::scan_window, Arity, Command, CommandKind},
    db::SetValue,
    reply::{Reply, ReplyError},
    store::Store,
    CommandResult,
};
use bytes::Bytes;

pub static SADD: Command = Command {
    kind: CommandKind::Sadd,
    name: "sadd",
    arity: Arity::Minimum(3),
    run: sadd,
    readonly: false,
    write: true,
};

fn sadd(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let set = store.db.set_or_default(&key)?;
    let mut added = 0;
    while let Some(member) = client.request.try_pop() {
        if set.add(member) {
            added += 1;
        }
    }
    if added > 0 {
        store.mark_dirty();
        store.touch(&key);
    }
    store.db.purge_if_vacant(&key);
    client.reply(added);
    Ok(None)
}

pub static SREM: Command = Command {
    kind: CommandKind::Srem,
    name: "srem",
    arity: Arity::Minimum(3),
    run: srem,
    readonly: false,
    write: true,
};

fn srem(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut removed = 0;
    if let Some(set) = store.db.mut_set(&key)? {
        while let Some(member) = client.request.try_pop() {
            if set.remove(&member) {
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

pub static SPOP: Command = Command {
    kind: CommandKind::Spop,
    name: "spop",
    arity: Arity::Minimum(2),
    run: spop,
    readonly: false,
    write: true,
};

fn spop(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(argument) => {
            let count: i64 = parse(&argument).ok_or(ReplyError::Integer)?;
            if count < 0 {
                return Err(ReplyError::OffsetRange.into());
            }
            Some(usize::try_from(count).map_err(|_| ReplyError::Integer)?)
        }
        None => None,
    };

    let Some(set) = store.db.mut_set(&key)? else {
        match count {
            Some(_) => client.reply(Reply::Array(0)),
            None => client.reply(Reply::Nil),
        }
        return Ok(None);
    };

    let popped = set.pop_random(count.unwrap_or(1));
    if !popped.is_empty() {
        store.mark_dirty();
        store.touch(&key);
        store.db.purge_if_vacant(&key);
        // Propagate the choice, not the chance.
        let mut resolved = vec![Bytes::from_static(b"SREM"), key.clone()];
        resolved.extend(popped.iter().cloned());
        store.propagate_as(resolved);
    }

    match count {
        None => client.reply(popped.into_iter().next()),
        Some(_) => {
            client.reply(Reply::Array(popped.len()));
            for member in popped {
                client.reply(member);
            }
        }
    }
    Ok(None)
}

pub static SMOVE: Command = Command {
    kind: CommandKind::Smove,
    name: "smove",
    arity: Arity::Exact(4),
    run: smove,
    readonly: false,
    write: true,
};

fn smove(client: &mut Client, store: &mut Store) -> CommandResult {
    let src = client.request.pop()?;
    let dst = client.request.pop()?;
    let member = client.request.pop()?;

    // Type-check the destination before mutating the source.
    store.db.get_set(&dst)?;
    let Some(set) = store.db.mut_set(&src)? else {
        client.reply(0);
        return Ok(None);
    };
    if !set.remove(&member) {
        client.reply(0);
        return Ok(None);
    }
    store.db.set_or_default(&dst)?.add(member);
    store.db.purge_if_vacant(&src);
    store.mark_dirty();
    store.touch(&src);
    store.touch(&dst);
    client.reply(1);
    Ok(None)
}

pub static SCARD: Command = Command {
    kind: CommandKind::Scard,
    name: "scard",
    arity: Arity::Exact(2),
    run: scard,
    readonly: true,
    write: false,
};

fn scard(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let len = store.db.get_set(&key)?.map_or(0, SetValue::len);
    client.reply(len);
    Ok(None)
}

pub static SISMEMBER: Command = Command {
    kind: CommandKind::Sismember,
    name: "sismember",
    arity: Arity::Exact(3),
    run: sismember,
    readonly: true,
    write: false,
};

fn sismember(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let member = client.request.pop()?;
    let found = store
        .db
        .get_set(&key)?
        .map_or(false, |set| set.contains(&member));
    client.reply(found);
    Ok(None)
}

pub static SMISMEMBER: Command = Command {
    kind: CommandKind::Smismember,
    name: "smismember",
    arity: Arity::Minimum(3),
    run: smismember,
    readonly: true,
    write: false,
};

fn smismember(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let members: Vec<Bytes> = client.request.iter().collect();
    client.reply(Reply::Array(members.len()));
    for member in members {
        let found = store
            .db
            .get_set(&key)?
            .map_or(false, |set| set.contains(&member));
        client.reply(found);
    }
    Ok(None)
}

pub static SMEMBERS: Command = Command {
    kind: CommandKind::Smembers,
    name: "smembers",
    arity: Arity::Exact(2),
    run: smembers,
    readonly: true,
    write: false,
};

fn smembers(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let members: Vec<Bytes> = match store.db.get_set(&key)? {
        Some(set) => set.iter().cloned().collect(),
        None => Vec::new(),
    };
    client.reply(Reply::Array(members.len()));
    for member in members {
        client.reply(member);
    }
    Ok(None)
}

pub static SRANDMEMBER: Command = Command {
    kind: CommandKind::Srandmember,
    name: "srandmember",
    arity: Arity::Minimum(2),
    run: srandmember,
    readonly: true,
    write: false,
};

fn srandmember(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(argument) => Some(parse::<i64>(&argument).ok_or(ReplyError::Integer)?),
        None => None,
    };

    let Some(set) = store.db.get_set(&key)? else {
        match count {
            Some(_) => client.reply(Reply::Array(0)),
            None => client.reply(Reply::Nil),
        }
        return Ok(None);
    };

    match count {
        None => client.reply(set.random_members(1).into_iter().next()),
        Some(count) if count >= 0 => {
            let members = set.random_members(usize::try_from(count).unwrap_or(0));
            client.reply(Reply::Array(members.len()));
            for member in members {
                client.reply(member);
            }
        }
        Some(count) => {
            // Negative count: repetition allowed.
            let members = set.random_members_with_repetition(count.unsigned_abs() as usize);
            client.reply(Reply::Array(members.len()));
            for member in members {
                client.reply(member);
            }
        }
    }
    Ok(None)
}

/// Which set algebra a command performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Algebra {
    Union,
    Intersection,
    Difference,
}

fn combine(store: &Store, keys: &[Bytes], algebra: Algebra) -> Result<Vec<Bytes>, Reply> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(store.db.get_set(key).map_err(Reply::from)?);
    }

    let result: Vec<Bytes> = match algebra {
        Algebra::Union => {
            let mut all: Vec<Bytes> = Vec::new();
            let mut seen = hashbrown::HashSet::new();
            for set in sets.into_iter().flatten() {
                for member in set.iter() {
                    if seen.insert(member.clone()) {
                        all.push(member.clone());
                    }
                }
            }
            all
        }
        Algebra::Intersection => {
            let Some(first) = sets.first().copied().flatten() else {
                return Ok(Vec::new());
            };
            first
                .iter()
                .filter(|member| {
                    sets[1..].iter().all(|set| {
                        set.map_or(false, |set| set.contains(member))
                    })
                })
                .cloned()
                .collect()
        }
        Algebra::Difference => {
            let Some(first) = sets.first().copied().flatten() else {
                return Ok(Vec::new());
            };
            first
                .iter()
                .filter(|member| {
                    sets[1..]
                        .iter()
                        .all(|set| set.map_or(true, |set| !set.contains(member)))
                })
                .cloned()
                .collect()
        }
    };
    Ok(result)
}

fn algebra_read(client: &mut Client, store: &mut Store, algebra: Algebra) -> CommandResult {
    let keys: Vec<Bytes> = client.request.iter().collect();
    let members = combine(store, &keys, algebra)?;
    client.reply(Reply::Array(members.len()));
    for member in members {
        client.reply(member);
    }
    Ok(None)
}

fn algebra_store(client: &mut Client, store: &mut Store, algebra: Algebra) -> CommandResult {
    let dest = client.request.pop()?;
    let keys: Vec<Bytes> = client.request.iter().collect();
    let members = combine(store, &keys, algebra)?;
    let len = members.len();

    if members.is_empty() {
        if store.db.remove(&dest).is_some() {
            store.mark_dirty();
            store.touch(&dest);
        }
    } else {
        let set: SetValue = members.into_iter().collect();
        store.db.set(dest.clone(), set);
        store.mark_dirty();
        store.touch(&dest);
    }
    client.reply(len);
    Ok(None)
}

pub static SUNION: Command = Command {
    kind: CommandKind::Sunion,
    name: "sunion",
    arity: Arity::Minimum(2),
    run: |client, store| algebra_read(client, store, Algebra::Union),
    readonly: true,
    write: false,
};

pub static SINTER: Command = Command {
    kind: CommandKind::Sinter,
    name: "sinter",
    arity: Arity::Minimum(2),
    run: |client, store| algebra_read(client, store, Algebra::Intersection),
    readonly: true,
    write: false,
};

pub static SDIFF: Command = Command {
    kind: CommandKind::Sdiff,
    name: "sdiff",
    arity: Arity::Minimum(2),
    run: |client, store| algebra_read(client, store, Algebra::Difference),
    readonly: true,
    write: false,
};

pub static SUNIONSTORE: Command = Command {
    kind: CommandKind::Sunionstore,
    name: "sunionstore",
    arity: Arity::Minimum(3),
    run: |client, store| algebra_store(client, store, Algebra::Union),
    readonly: false,
    write: true,
};

pub static SINTERSTORE: Command = Command {
    kind: CommandKind::Sinterstore,
    name: "sinterstore",
    arity: Arity::Minimum(3),
    run: |client, store| algebra_store(client, store, Algebra::Intersection),
    readonly: false,
    write: true,
};

pub static SDIFFSTORE: Command = Command {
    kind: CommandKind::Sdiffstore,
    name: "sdiffstore",
    arity: Arity::Minimum(3),
    run: |client, store| algebra_store(client, store, Algebra::Difference),
    readonly: false,
    write: true,
};

pub static SSCAN: Command = Command {
    kind: CommandKind::Sscan,
    name: "sscan",
    arity: Arity::Minimum(3),
    run: sscan,
    readonly: true,
    write: false,
};

fn sscan(client: &mut Client, store: &mut Store) -> CommandResult {
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

    let mut sorted: Vec<Bytes> = match store.db.get_set(&key)? {
        Some(set) => set.iter().cloned().collect(),
        None => Vec::new(),
    };
    sorted.sort();
    let (window, next) = scan_window(&sorted, resume.as_deref(), args.count);

    let selected: Vec<Bytes> = window
        .iter()
        .filter(|member| {
            args.pattern
                .as_ref()
                .map_or(true, |pattern| crate::glob::matches(member, pattern))
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
    for member in selected {
        client.reply(member);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{run, store};

    #[test]
    fn add_remove_membership() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["SADD", "s", "a", "b", "a"])[..], b":2\r\n");
        assert_eq!(&run(&mut store, &["SCARD", "s"])[..], b":2\r\n");
        assert_eq!(&run(&mut store, &["SISMEMBER", "s", "a"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["SISMEMBER", "s", "z"])[..], b":0\r\n");
        assert_eq!(
            &run(&mut store, &["SMISMEMBER", "s", "a", "z"])[..],
            b"*2\r\n:1\r\n:0\r\n"
        );
        assert_eq!(&run(&mut store, &["SREM", "s", "a", "z"])[..], b":1\r\n");
        // Removing the last member removes the key.
        run(&mut store, &["SREM", "s", "b"]);
        assert_eq!(&run(&mut store, &["EXISTS", "s"])[..], b":0\r\n");
    }

    #[test]
    fn spop_removes_members() {
        let mut store = store();
        run(&mut store, &["SADD", "s", "a", "b", "c"]);
        let reply = run(&mut store, &["SPOP", "s"]);
        assert!(reply.starts_with(b"$1\r\n"));
        assert_eq!(&run(&mut store, &["SCARD", "s"])[..], b":2\r\n");
        let reply = run(&mut store, &["SPOP", "s", "5"]);
        assert!(reply.starts_with(b"*2\r\n"));
        assert_eq!(&run(&mut store, &["EXISTS", "s"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["SPOP", "s"])[..], b"$-1\r\n");
    }

    #[test]
    fn smove() {
        let mut store = store();
        run(&mut store, &["SADD", "src", "a", "b"]);
        assert_eq!(&run(&mut store, &["SMOVE", "src", "dst", "a"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["SMOVE", "src", "dst", "zz"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["SISMEMBER", "dst", "a"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["SISMEMBER", "src", "a"])[..], b":0\r\n");
    }

    #[test]
    fn algebra() {
        let mut store = store();
        run(&mut store, &["SADD", "a", "1", "2", "3"]);
        run(&mut store, &["SADD", "b", "2", "3", "4"]);
        let reply = run(&mut store, &["SUNION", "a", "b"]);
        assert!(reply.starts_with(b"*4\r\n"));
        let reply = run(&mut store, &["SINTER", "a", "b"]);
        assert!(reply.starts_with(b"*2\r\n"));
        let reply = run(&mut store, &["SDIFF", "a", "b"]);
        assert!(reply.starts_with(b"*1\r\n"));
        assert!(reply.ends_with(b"$1\r\n1\r\n"));
        // Missing first key yields empty results.
        assert_eq!(&run(&mut store, &["SDIFF", "zz", "a"])[..], b"*0\r\n");
    }

    #[test]
    fn algebra_store_variants() {
        let mut store = store();
        run(&mut store, &["SADD", "a", "1", "2"]);
        run(&mut store, &["SADD", "b", "2", "3"]);
        assert_eq!(&run(&mut store, &["SINTERSTORE", "dest", "a", "b"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["SMEMBERS", "dest"])[..], b"*1\r\n$1\r\n2\r\n");
        // An empty result deletes the destination.
        assert_eq!(&run(&mut store, &["SINTERSTORE", "dest", "a", "zz"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["EXISTS", "dest"])[..], b":0\r\n");
    }

    #[test]
    fn srandmember_counts() {
        let mut store = store();
        run(&mut store, &["SADD", "s", "a", "b", "c"]);
        let reply = run(&mut store, &["SRANDMEMBER", "s", "10"]);
        assert!(reply.starts_with(b"*3\r\n"));
        let reply = run(&mut store, &["SRANDMEMBER", "s", "-10"]);
        assert!(reply.starts_with(b"*10\r\n"));
        assert_eq!(&run(&mut store, &["SRANDMEMBER", "zz"])[..], b"$-1\r\n");
        // The set is untouched.
        assert_eq!(&run(&mut store, &["SCARD", "s"])[..], b":3\r\n");
    }

    #[test]
    fn sscan_visits_all_members() {
        let mut store = store();
        for i in 0..30 {
            run(&mut store, &["SADD", "s", &format!("m{i:02}")]);
        }
        let mut cursor = String::from("0");
        let mut seen = 0;
        loop {
            let reply = run(&mut store, &["SSCAN", "s", &cursor, "COUNT", "8"]);
            let text = String::from_utf8_lossy(&reply).into_owned();
            let mut lines = text.split("\r\n");
            lines.next();
            lines.next();
            cursor = lines.next().unwrap().to_string();
            seen += lines.filter(|l| l.starts_with('m')).count();
            if cursor == "0" {
                break;
            }
        }
        assert_eq!(seen, 30);
    }
}
