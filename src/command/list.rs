use crate::{
    bytes::{lex, parse},
    client::Client,
    command::{Arity, Command, CommandKind},
    db::Edge,
    reply::{Reply, ReplyError},
    store::Store,
    CommandResult,
};
use bytes::Bytes;
use logos::Logos;

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum EdgeOption {
    #[regex(b"(?i:left)")]
    Left,

    #[regex(b"(?i:right)")]
    Right,
}

impl From<EdgeOption> for Edge {
    fn from(option: EdgeOption) -> Edge {
        match option {
            EdgeOption::Left => Edge::Left,
            EdgeOption::Right => Edge::Right,
        }
    }
}

fn edge_argument(client: &mut Client) -> Result<Edge, ReplyError> {
    let argument = client.request.pop()?;
    let option: EdgeOption = lex(&argument[..]).ok_or(ReplyError::Syntax)?;
    Ok(option.into())
}

pub static LPUSH: Command = Command {
    kind: CommandKind::Lpush,
    name: "lpush",
    arity: Arity::Minimum(3),
    run: lpush,
    readonly: false,
    write: true,
};

fn lpush(client: &mut Client, store: &mut Store) -> CommandResult {
    push(client, store, Edge::Left, false)
}

pub static RPUSH: Command = Command {
    kind: CommandKind::Rpush,
    name: "rpush",
    arity: Arity::Minimum(3),
    run: rpush,
    readonly: false,
    write: true,
};

fn rpush(client: &mut Client, store: &mut Store) -> CommandResult {
    push(client, store, Edge::Right, false)
}

pub static LPUSHX: Command = Command {
    kind: CommandKind::Lpushx,
    name: "lpushx",
    arity: Arity::Minimum(3),
    run: lpushx,
    readonly: false,
    write: true,
};

fn lpushx(client: &mut Client, store: &mut Store) -> CommandResult {
    push(client, store, Edge::Left, true)
}

pub static RPUSHX: Command = Command {
    kind: CommandKind::Rpushx,
    name: "rpushx",
    arity: Arity::Minimum(3),
    run: rpushx,
    readonly: false,
    write: true,
};

fn rpushx(client: &mut Client, store: &mut Store) -> CommandResult {
    push(client, store, Edge::Right, true)
}

fn push(client: &mut Client, store: &mut Store, edge: Edge, require_existing: bool) -> CommandResult {
    let key = client.request.pop()?;
    if require_existing && store.db.get_list(&key)?.is_none() {
        client.reply(0);
        return Ok(None);
    }
    let list = store.db.list_or_default(&key)?;
    while let Some(value) = client.request.try_pop() {
        list.push(edge, value);
    }
    let len = list.len();
    store.mark_dirty();
    store.touch(&key);
    client.reply(len);
    Ok(None)
}

pub static LPOP: Command = Command {
    kind: CommandKind::Lpop,
    name: "lpop",
    arity: Arity::Minimum(2),
    run: lpop,
    readonly: false,
    write: true,
};

fn lpop(client: &mut Client, store: &mut Store) -> CommandResult {
    pop(client, store, Edge::Left)
}

pub static RPOP: Command = Command {
    kind: CommandKind::Rpop,
    name: "rpop",
    arity: Arity::Minimum(2),
    run: rpop,
    readonly: false,
    write: true,
};

fn rpop(client: &mut Client, store: &mut Store) -> CommandResult {
    pop(client, store, Edge::Right)
}

fn pop(client: &mut Client, store: &mut Store, edge: Edge) -> CommandResult {
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

    let Some(list) = store.db.mut_list(&key)? else {
        match count {
            Some(_) => client.reply(Reply::NilArray),
            None => client.reply(Reply::Nil),
        }
        return Ok(None);
    };

    match count {
        None => {
            let value = list.pop(edge);
            if value.is_some() {
                store.mark_dirty();
                store.touch(&key);
                store.db.purge_if_vacant(&key);
            }
            client.reply(value);
        }
        Some(count) => {
            let mut popped = Vec::new();
            while popped.len() < count {
                match list.pop(edge) {
                    Some(value) => popped.push(value),
                    None => break,
                }
            }
            if !popped.is_empty() {
                store.mark_dirty();
                store.touch(&key);
                store.db.purge_if_vacant(&key);
            }
            client.reply(Reply::Array(popped.len()));
            for value in popped {
                client.reply(value);
            }
        }
    }
    Ok(None)
}

pub static LLEN: Command = Command {
    kind: CommandKind::Llen,
    name: "llen",
    arity: Arity::Exact(2),
    run: llen,
    readonly: true,
    write: false,
};

fn llen(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let len = store.db.get_list(&key)?.map_or(0, |list| list.len());
    client.reply(len);
    Ok(None)
}

pub static LRANGE: Command = Command {
    kind: CommandKind::Lrange,
    name: "lrange",
    arity: Arity::Exact(4),
    run: lrange,
    readonly: true,
    write: false,
};

fn lrange(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;
    let items: Vec<Bytes> = match store.db.get_list(&key)? {
        Some(list) => list.range(start, stop).cloned().collect(),
        None => Vec::new(),
    };
    client.reply(Reply::Array(items.len()));
    for item in items {
        client.reply(item);
    }
    Ok(None)
}

pub static LINDEX: Command = Command {
    kind: CommandKind::Lindex,
    name: "lindex",
    arity: Arity::Exact(3),
    run: lindex,
    readonly: true,
    write: false,
};

fn lindex(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let index = client.request.i64()?;
    let item = store
        .db
        .get_list(&key)?
        .and_then(|list| list.index(index).cloned());
    client.reply(item);
    Ok(None)
}

pub static LSET: Command = Command {
    kind: CommandKind::Lset,
    name: "lset",
    arity: Arity::Exact(4),
    run: lset,
    readonly: false,
    write: true,
};

fn lset(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let index = client.request.i64()?;
    let value = client.request.pop()?;
    let Some(list) = store.db.mut_list(&key)? else {
        return Err(ReplyError::NoSuchKey.into());
    };
    if !list.set(index, value) {
        return Err(ReplyError::IndexOutOfRange.into());
    }
    store.mark_dirty();
    store.touch(&key);
    client.reply("OK");
    Ok(None)
}

pub static LTRIM: Command = Command {
    kind: CommandKind::Ltrim,
    name: "ltrim",
    arity: Arity::Exact(4),
    run: ltrim,
    readonly: false,
    write: true,
};

fn ltrim(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;
    if let Some(list) = store.db.mut_list(&key)? {
        list.trim(start, stop);
        store.mark_dirty();
        store.touch(&key);
        store.db.purge_if_vacant(&key);
    }
    client.reply("OK");
    Ok(None)
}

pub static LREM: Command = Command {
    kind: CommandKind::Lrem,
    name: "lrem",
    arity: Arity::Exact(4),
    run: lrem,
    readonly: false,
    write: true,
};

fn lrem(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = client.request.i64()?;
    let value = client.request.pop()?;
    let removed = match store.db.mut_list(&key)? {
        Some(list) => list.rem(count, &value),
        None => 0,
    };
    if removed > 0 {
        store.mark_dirty();
        store.touch(&key);
        store.db.purge_if_vacant(&key);
    }
    client.reply(removed);
    Ok(None)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum InsertWhere {
    #[regex(b"(?i:before)")]
    Before,

    #[regex(b"(?i:after)")]
    After,
}

pub static LINSERT: Command = Command {
    kind: CommandKind::Linsert,
    name: "linsert",
    arity: Arity::Exact(5),
    run: linsert,
    readonly: false,
    write: true,
};

fn linsert(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let where_argument = client.request.pop()?;
    let location: InsertWhere = lex(&where_argument[..]).ok_or(ReplyError::Syntax)?;
    let pivot = client.request.pop()?;
    let value = client.request.pop()?;

    let Some(list) = store.db.mut_list(&key)? else {
        client.reply(0);
        return Ok(None);
    };
    match list.insert(location == InsertWhere::Before, &pivot, value) {
        Some(len) => {
            store.mark_dirty();
            store.touch(&key);
            client.reply(len);
        }
        None => client.reply(-1),
    }
    Ok(None)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum LposOption {
    #[regex(b"(?i:rank)")]
    Rank,

    #[regex(b"(?i:count)")]
    Count,

    #[regex(b"(?i:maxlen)")]
    Maxlen,
}

pub static LPOS: Command = Command {
    kind: CommandKind::Lpos,
    name: "lpos",
    arity: Arity::Minimum(3),
    run: lpos,
    readonly: true,
    write: false,
};

fn lpos(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let element = client.request.pop()?;

    let mut rank = 1i64;
    let mut count = None;
    let mut maxlen = 0usize;

    while let Some(argument) = client.request.try_pop() {
        let option: LposOption = lex(&argument[..]).ok_or(ReplyError::Syntax)?;
        match option {
            LposOption::Rank => {
                rank = client.request.i64()?;
                if rank == 0 {
                    return Err(ReplyError::RankZero.into());
                }
            }
            LposOption::Count => {
                let value = client.request.i64()?;
                if value < 0 {
                    return Err(ReplyError::CountZero.into());
                }
                count = Some(usize::try_from(value).map_err(|_| ReplyError::Integer)?);
            }
            LposOption::Maxlen => {
                let value = client.request.i64()?;
                if value < 0 {
                    return Err(ReplyError::CountZero.into());
                }
                maxlen = usize::try_from(value).map_err(|_| ReplyError::Integer)?;
            }
        }
    }

    let positions = match store.db.get_list(&key)? {
        Some(list) => list.positions(&element, rank, count.unwrap_or(1), maxlen),
        None => Vec::new(),
    };

    match count {
        None => client.reply(positions.first().copied().map(|p| p as i64)),
        Some(_) => {
            client.reply(Reply::Array(positions.len()));
            for position in positions {
                client.reply(position);
            }
        }
    }
    Ok(None)
}

pub static LMOVE: Command = Command {
    kind: CommandKind::Lmove,
    name: "lmove",
    arity: Arity::Exact(5),
    run: lmove,
    readonly: false,
    write: true,
};

fn lmove(client: &mut Client, store: &mut Store) -> CommandResult {
    let src = client.request.pop()?;
    let dst = client.request.pop()?;
    let from = edge_argument(client)?;
    let to = edge_argument(client)?;
    move_one(client, store, src, dst, from, to)
}

/// The shared LMOVE/BLMOVE body: one element moves atomically.
fn move_one(
    client: &mut Client,
    store: &mut Store,
    src: Bytes,
    dst: Bytes,
    from: Edge,
    to: Edge,
) -> CommandResult {
    // Type-check the destination before mutating the source.
    store.db.get_list(&dst)?;
    let Some(list) = store.db.mut_list(&src)? else {
        client.reply(Reply::Nil);
        return Ok(None);
    };
    let Some(value) = list.pop(from) else {
        client.reply(Reply::Nil);
        return Ok(None);
    };
    store.db.list_or_default(&dst)?.push(to, value.clone());
    store.db.purge_if_vacant(&src);
    store.mark_dirty();
    store.touch(&src);
    store.touch(&dst);
    client.reply(value);
    Ok(None)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum CountOption {
    #[regex(b"(?i:count)")]
    Count,
}

pub static LMPOP: Command = Command {
    kind: CommandKind::Lmpop,
    name: "lmpop",
    arity: Arity::Minimum(4),
    run: lmpop,
    readonly: false,
    write: true,
};

fn lmpop(client: &mut Client, store: &mut Store) -> CommandResult {
    let numkeys = client.request.numkeys()?;
    let keys: Vec<Bytes> = (0..numkeys)
        .map(|_| client.request.pop())
        .collect::<Result<_, _>>()?;
    let edge = edge_argument(client)?;
    let count = mpop_count(client)?;
    mpop(client, store, &keys, edge, count)
}

fn mpop_count(client: &mut Client) -> Result<usize, ReplyError> {
    match client.request.try_pop() {
        Some(argument) => {
            let _: CountOption = lex(&argument[..]).ok_or(ReplyError::Syntax)?;
            let count = client.request.i64()?;
            if count <= 0 {
                return Err(ReplyError::CountZero);
            }
            usize::try_from(count).map_err(|_| ReplyError::Integer)
        }
        None => Ok(1),
    }
}

/// Pop up to `count` elements from the first non-empty key.
fn mpop(
    client: &mut Client,
    store: &mut Store,
    keys: &[Bytes],
    edge: Edge,
    count: usize,
) -> CommandResult {
    for key in keys {
        let Some(list) = store.db.mut_list(key)? else {
            continue;
        };
        if list.is_empty() {
            continue;
        }
        let mut popped = Vec::new();
        while popped.len() < count {
            match list.pop(edge) {
                Some(value) => popped.push(value),
                None => break,
            }
        }
        store.mark_dirty();
        store.touch(key);
        store.db.purge_if_vacant(key);

        client.reply(Reply::Array(2));
        client.reply(key.clone());
        client.reply(Reply::Array(popped.len()));
        for value in popped {
            client.reply(value);
        }
        return Ok(None);
    }
    client.reply(Reply::NilArray);
    Ok(None)
}

pub static BLPOP: Command = Command {
    kind: CommandKind::Blpop,
    name: "blpop",
    arity: Arity::Minimum(3),
    run: blpop,
    readonly: false,
    write: true,
};

fn blpop(client: &mut Client, store: &mut Store) -> CommandResult {
    blocking_pop(client, store, Edge::Left)
}

pub static BRPOP: Command = Command {
    kind: CommandKind::Brpop,
    name: "brpop",
    arity: Arity::Minimum(3),
    run: brpop,
    readonly: false,
    write: true,
};

fn brpop(client: &mut Client, store: &mut Store) -> CommandResult {
    blocking_pop(client, store, Edge::Right)
}

/// The immediate-check rendition of BLPOP/BRPOP: the timeout is validated
/// but never slept on; an unsatisfiable request answers null at once.
fn blocking_pop(client: &mut Client, store: &mut Store, edge: Edge) -> CommandResult {
    let total = client.request.remaining();
    let keys: Vec<Bytes> = (0..total - 1)
        .map(|_| client.request.pop())
        .collect::<Result<_, _>>()?;
    let _ = client.request.timeout()?;

    for key in keys {
        let Some(list) = store.db.mut_list(&key)? else {
            continue;
        };
        let Some(value) = list.pop(edge) else {
            continue;
        };
        store.mark_dirty();
        store.touch(&key);
        store.db.purge_if_vacant(&key);
        client.reply(Reply::Array(2));
        client.reply(key);
        client.reply(value);
        return Ok(None);
    }

    client.reply(Reply::NilArray);
    Ok(None)
}

pub static BLMOVE: Command = Command {
    kind: CommandKind::Blmove,
    name: "blmove",
    arity: Arity::Exact(6),
    run: blmove,
    readonly: false,
    write: true,
};

fn blmove(client: &mut Client, store: &mut Store) -> CommandResult {
    let src = client.request.pop()?;
    let dst = client.request.pop()?;
    let from = edge_argument(client)?;
    let to = edge_argument(client)?;
    let _ = client.request.timeout()?;
    move_one(client, store, src, dst, from, to)
}

pub static BLMPOP: Command = Command {
    kind: CommandKind::Blmpop,
    name: "blmpop",
    arity: Arity::Minimum(5),
    run: blmpop,
    readonly: false,
    write: true,
};

fn blmpop(client: &mut Client, store: &mut Store) -> CommandResult {
    let _ = client.request.timeout()?;
    let numkeys = client.request.numkeys()?;
    let keys: Vec<Bytes> = (0..numkeys)
        .map(|_| client.request.pop())
        .collect::<Result<_, _>>()?;
    let edge = edge_argument(client)?;
    let count = mpop_count(client)?;
    mpop(client, store, &keys, edge, count)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{run, store};

    #[test]
    fn push_range() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["RPUSH", "l", "a", "b", "c"])[..], b":3\r\n");
        assert_eq!(
            &run(&mut store, &["LRANGE", "l", "0", "-1"])[..],
            b"*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n"
        );
        assert_eq!(&run(&mut store, &["LPUSH", "l", "z"])[..], b":4\r\n");
        assert_eq!(&run(&mut store, &["LINDEX", "l", "0"])[..], b"$1\r\nz\r\n");
        assert_eq!(&run(&mut store, &["LINDEX", "l", "-1"])[..], b"$1\r\nc\r\n");
        assert_eq!(&run(&mut store, &["LINDEX", "l", "99"])[..], b"$-1\r\n");
    }

    #[test]
    fn pushx_requires_the_key() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["LPUSHX", "l", "a"])[..], b":0\r\n");
        run(&mut store, &["RPUSH", "l", "a"]);
        assert_eq!(&run(&mut store, &["RPUSHX", "l", "b"])[..], b":2\r\n");
    }

    #[test]
    fn pops() {
        let mut store = store();
        run(&mut store, &["RPUSH", "l", "a", "b", "c"]);
        assert_eq!(&run(&mut store, &["LPOP", "l"])[..], b"$1\r\na\r\n");
        assert_eq!(&run(&mut store, &["RPOP", "l"])[..], b"$1\r\nc\r\n");
        assert_eq!(&run(&mut store, &["LPOP", "l", "5"])[..], b"*1\r\n$1\r\nb\r\n");
        // The emptied key is gone.
        assert_eq!(&run(&mut store, &["EXISTS", "l"])[..], b":0\r\n");
        assert_eq!(&run(&mut store, &["LPOP", "l"])[..], b"$-1\r\n");
        assert_eq!(&run(&mut store, &["LPOP", "l", "2"])[..], b"*-1\r\n");
    }

    #[test]
    fn lset_and_trim() {
        let mut store = store();
        run(&mut store, &["RPUSH", "l", "a", "b", "c", "d"]);
        assert_eq!(&run(&mut store, &["LSET", "l", "1", "B"])[..], b"+OK\r\n");
        assert!(run(&mut store, &["LSET", "l", "9", "X"]).starts_with(b"-ERR index out of range"));
        assert!(run(&mut store, &["LSET", "none", "0", "X"]).starts_with(b"-ERR no such key"));
        assert_eq!(&run(&mut store, &["LTRIM", "l", "1", "2"])[..], b"+OK\r\n");
        assert_eq!(
            &run(&mut store, &["LRANGE", "l", "0", "-1"])[..],
            b"*2\r\n$1\r\nB\r\n$1\r\nc\r\n"
        );
        run(&mut store, &["LTRIM", "l", "5", "9"]);
        assert_eq!(&run(&mut store, &["EXISTS", "l"])[..], b":0\r\n");
    }

    #[test]
    fn lrem_directions() {
        let mut store = store();
        run(&mut store, &["RPUSH", "l", "x", "a", "x", "b", "x"]);
        assert_eq!(&run(&mut store, &["LREM", "l", "-2", "x"])[..], b":2\r\n");
        assert_eq!(
            &run(&mut store, &["LRANGE", "l", "0", "-1"])[..],
            b"*3\r\n$1\r\nx\r\n$1\r\na\r\n$1\r\nb\r\n"
        );
        assert_eq!(&run(&mut store, &["LREM", "l", "0", "x"])[..], b":1\r\n");
    }

    #[test]
    fn linsert() {
        let mut store = store();
        run(&mut store, &["RPUSH", "l", "a", "c"]);
        assert_eq!(&run(&mut store, &["LINSERT", "l", "BEFORE", "c", "b"])[..], b":3\r\n");
        assert_eq!(&run(&mut store, &["LINSERT", "l", "AFTER", "zz", "x"])[..], b":-1\r\n");
        assert_eq!(&run(&mut store, &["LINSERT", "missing", "BEFORE", "a", "x"])[..], b":0\r\n");
    }

    #[test]
    fn lpos() {
        let mut store = store();
        run(&mut store, &["RPUSH", "l", "a", "b", "c", "b"]);
        assert_eq!(&run(&mut store, &["LPOS", "l", "b"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["LPOS", "l", "b", "RANK", "-1"])[..], b":3\r\n");
        assert_eq!(
            &run(&mut store, &["LPOS", "l", "b", "COUNT", "0"])[..],
            b"*2\r\n:1\r\n:3\r\n"
        );
        assert_eq!(&run(&mut store, &["LPOS", "l", "zz"])[..], b"$-1\r\n");
        assert!(run(&mut store, &["LPOS", "l", "b", "RANK", "0"]).starts_with(b"-ERR RANK"));
    }

    #[test]
    fn lmove_rotates() {
        let mut store = store();
        run(&mut store, &["RPUSH", "src", "a", "b"]);
        assert_eq!(
            &run(&mut store, &["LMOVE", "src", "dst", "LEFT", "RIGHT"])[..],
            b"$1\r\na\r\n"
        );
        assert_eq!(&run(&mut store, &["LRANGE", "dst", "0", "-1"])[..], b"*1\r\n$1\r\na\r\n");
        assert_eq!(&run(&mut store, &["LMOVE", "missing", "dst", "LEFT", "LEFT"])[..], b"$-1\r\n");
        // Emptied source disappears.
        run(&mut store, &["LMOVE", "src", "dst", "LEFT", "RIGHT"]);
        assert_eq!(&run(&mut store, &["EXISTS", "src"])[..], b":0\r\n");
    }

    #[test]
    fn lmpop_first_non_empty() {
        let mut store = store();
        run(&mut store, &["RPUSH", "b", "1", "2", "3"]);
        assert_eq!(
            &run(&mut store, &["LMPOP", "2", "a", "b", "LEFT", "COUNT", "2"])[..],
            b"*2\r\n$1\r\nb\r\n*2\r\n$1\r\n1\r\n$1\r\n2\r\n"
        );
        assert_eq!(&run(&mut store, &["LMPOP", "1", "zz", "LEFT"])[..], b"*-1\r\n");
    }

    #[test]
    fn blocking_forms_answer_immediately() {
        let mut store = store();
        run(&mut store, &["RPUSH", "l", "a"]);
        assert_eq!(
            &run(&mut store, &["BLPOP", "missing", "l", "0"])[..],
            b"*2\r\n$1\r\nl\r\n$1\r\na\r\n"
        );
        assert_eq!(&run(&mut store, &["BLPOP", "l", "0.5"])[..], b"*-1\r\n");
        assert!(run(&mut store, &["BLPOP", "l", "-1"]).starts_with(b"-ERR timeout is negative"));
        assert_eq!(&run(&mut store, &["BLMOVE", "x", "y", "LEFT", "LEFT", "0"])[..], b"$-1\r\n");
        assert_eq!(
            &run(&mut store, &["BLMPOP", "0", "1", "missing", "LEFT"])[..],
            b"*-1\r\n"
        );
    }
}
