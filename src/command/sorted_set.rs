use crate::{
    bytes::lex,
    client::Client,
    command::{keys::parse_scan, keys::scan_window, Arity, Command, CommandKind},
    db::{Extreme, Insertion, SortedSet},
    reply::{Reply, ReplyError},
    slice,
    store::Store,
    CommandResult,
};
use bytes::Bytes;
use logos::Logos;
use ordered_float::NotNan;

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum ZaddOption {
    #[regex(b"(?i:nx)")]
    Nx,

    #[regex(b"(?i:xx)")]
    Xx,

    #[regex(b"(?i:gt)")]
    Gt,

    #[regex(b"(?i:lt)")]
    Lt,

    #[regex(b"(?i:ch)")]
    Ch,

    #[regex(b"(?i:incr)")]
    Incr,
}

pub static ZADD: Command = Command {
    kind: CommandKind::Zadd,
    name: "zadd",
    arity: Arity::Minimum(4),
    run: zadd,
    readonly: false,
    write: true,
};

fn zadd(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;

    let mut nx = false;
    let mut xx = false;
    let mut gt = false;
    let mut lt = false;
    let mut ch = false;
    let mut incr = false;

    while let Some(argument) = client.request.peek() {
        let Some(option) = lex::<ZaddOption>(&argument[..]) else {
            break;
        };
        let _ = client.request.try_pop();
        match option {
            ZaddOption::Nx => nx = true,
            ZaddOption::Xx => xx = true,
            ZaddOption::Gt => gt = true,
            ZaddOption::Lt => lt = true,
            ZaddOption::Ch => ch = true,
            ZaddOption::Incr => incr = true,
        }
    }

    if nx && xx {
        return Err(ReplyError::XxAndNx.into());
    }
    if (gt && lt) || (nx && (gt || lt)) {
        return Err(ReplyError::GtLtNx.into());
    }
    client.request.assert_pairs()?;
    if client.request.is_empty() {
        return Err(client.request.wrong_arguments().into());
    }

    let mut pairs = Vec::new();
    while !client.request.is_empty() {
        let score = client.request.not_nan()?;
        let member = client.request.pop()?;
        pairs.push((score, member));
    }
    if incr && pairs.len() != 1 {
        return Err(ReplyError::Syntax.into());
    }

    let zset = store.db.zset_or_default(&key)?;
    let mut added = 0;
    let mut changed = 0;
    let mut incr_result = None;
    let mut nan = false;

    for (score, member) in pairs {
        let existing = zset.score(&member);
        let score = if incr {
            match existing {
                Some(current) => {
                    match NotNan::new(current.into_inner() + score.into_inner()) {
                        Ok(next) => next,
                        Err(_) => {
                            nan = true;
                            break;
                        }
                    }
                }
                None => score,
            }
        } else {
            score
        };

        let skip = match existing {
            Some(current) => nx || (gt && score <= current) || (lt && score >= current),
            None => xx,
        };
        if skip {
            continue;
        }

        match zset.upsert(member, score) {
            Insertion::Added => {
                added += 1;
                changed += 1;
            }
            Insertion::Updated => changed += 1,
            Insertion::Unchanged => {}
        }
        if incr {
            incr_result = Some(score.into_inner());
        }
    }

    if changed > 0 {
        store.mark_dirty();
        store.touch(&key);
    }
    store.db.purge_if_vacant(&key);
    if nan {
        return Err(ReplyError::NanOrInfinity.into());
    }

    if incr {
        client.reply(incr_result);
    } else if ch {
        client.reply(changed);
    } else {
        client.reply(added);
    }
    Ok(None)
}

pub static ZREM: Command = Command {
    kind: CommandKind::Zrem,
    name: "zrem",
    arity: Arity::Minimum(3),
    run: zrem,
    readonly: false,
    write: true,
};

fn zrem(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut removed = 0;
    if let Some(zset) = store.db.mut_zset(&key)? {
        while let Some(member) = client.request.try_pop() {
            if zset.remove(&member) {
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

pub static ZINCRBY: Command = Command {
    kind: CommandKind::Zincrby,
    name: "zincrby",
    arity: Arity::Exact(4),
    run: zincrby,
    readonly: false,
    write: true,
};

fn zincrby(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let by = client.request.not_nan()?;
    let member = client.request.pop()?;

    let next = match store.db.zset_or_default(&key)?.score(&member) {
        Some(current) => NotNan::new(current.into_inner() + by.into_inner()).ok(),
        None => Some(by),
    };
    let Some(next) = next else {
        store.db.purge_if_vacant(&key);
        return Err(ReplyError::NanOrInfinity.into());
    };
    store.db.zset_or_default(&key)?.upsert(member, next);
    store.mark_dirty();
    store.touch(&key);
    client.reply(next.into_inner());
    Ok(None)
}

pub static ZSCORE: Command = Command {
    kind: CommandKind::Zscore,
    name: "zscore",
    arity: Arity::Exact(3),
    run: zscore,
    readonly: true,
    write: false,
};

fn zscore(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let member = client.request.pop()?;
    let score = store
        .db
        .get_zset(&key)?
        .and_then(|zset| zset.score(&member));
    client.reply(score.map(NotNan::into_inner));
    Ok(None)
}

pub static ZMSCORE: Command = Command {
    kind: CommandKind::Zmscore,
    name: "zmscore",
    arity: Arity::Minimum(3),
    run: zmscore,
    readonly: true,
    write: false,
};

fn zmscore(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let members: Vec<Bytes> = client.request.iter().collect();
    client.reply(Reply::Array(members.len()));
    for member in members {
        let score = store
            .db
            .get_zset(&key)?
            .and_then(|zset| zset.score(&member));
        client.reply(score.map(NotNan::into_inner));
    }
    Ok(None)
}

pub static ZCARD: Command = Command {
    kind: CommandKind::Zcard,
    name: "zcard",
    arity: Arity::Exact(2),
    run: zcard,
    readonly: true,
    write: false,
};

fn zcard(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let len = store.db.get_zset(&key)?.map_or(0, SortedSet::len);
    client.reply(len);
    Ok(None)
}

pub static ZCOUNT: Command = Command {
    kind: CommandKind::Zcount,
    name: "zcount",
    arity: Arity::Exact(4),
    run: zcount,
    readonly: true,
    write: false,
};

fn zcount(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let min = client.request.score_bound()?;
    let max = client.request.score_bound()?;
    let count = store.db.get_zset(&key)?.map_or(0, |zset| zset.count(min, max));
    client.reply(count);
    Ok(None)
}

fn withscores(client: &mut Client) -> Result<bool, ReplyError> {
    match client.request.try_pop() {
        None => Ok(false),
        Some(argument) if argument.eq_ignore_ascii_case(b"withscores") => Ok(true),
        Some(_) => Err(ReplyError::Syntax),
    }
}

fn reply_entries(client: &mut Client, entries: Vec<(NotNan<f64>, Bytes)>, scores: bool) {
    if scores {
        client.reply(Reply::Array(entries.len() * 2));
        for (score, member) in entries {
            client.reply(member);
            client.reply(score.into_inner());
        }
    } else {
        client.reply(Reply::Array(entries.len()));
        for (_, member) in entries {
            client.reply(member);
        }
    }
}

pub static ZRANGE: Command = Command {
    kind: CommandKind::Zrange,
    name: "zrange",
    arity: Arity::Minimum(4),
    run: zrange,
    readonly: true,
    write: false,
};

fn zrange(client: &mut Client, store: &mut Store) -> CommandResult {
    rank_range(client, store, false)
}

pub static ZREVRANGE: Command = Command {
    kind: CommandKind::Zrevrange,
    name: "zrevrange",
    arity: Arity::Minimum(4),
    run: zrevrange,
    readonly: true,
    write: false,
};

fn zrevrange(client: &mut Client, store: &mut Store) -> CommandResult {
    rank_range(client, store, true)
}

fn rank_range(client: &mut Client, store: &mut Store, rev: bool) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;
    let scores = withscores(client)?;

    let entries: Vec<(NotNan<f64>, Bytes)> = match store.db.get_zset(&key)? {
        Some(zset) => {
            let items = zset.items();
            match slice::resolve(items.len(), start, stop) {
                Some((lo, hi)) => {
                    if rev {
                        // Ranks count from the far end.
                        let len = items.len();
                        items[len - hi..len - lo].iter().rev().cloned().collect()
                    } else {
                        items[lo..hi].to_vec()
                    }
                }
                None => Vec::new(),
            }
        }
        None => Vec::new(),
    };
    reply_entries(client, entries, scores);
    Ok(None)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum RangeOption {
    #[regex(b"(?i:withscores)")]
    Withscores,

    #[regex(b"(?i:limit)")]
    Limit,
}

fn score_range(client: &mut Client, store: &mut Store, rev: bool) -> CommandResult {
    let key = client.request.pop()?;
    let (min, max) = if rev {
        let max = client.request.score_bound()?;
        let min = client.request.score_bound()?;
        (min, max)
    } else {
        let min = client.request.score_bound()?;
        let max = client.request.score_bound()?;
        (min, max)
    };

    let mut scores = false;
    let mut offset = 0usize;
    let mut count = -1i64;
    while let Some(argument) = client.request.try_pop() {
        match lex(&argument[..]) {
            Some(RangeOption::Withscores) => scores = true,
            Some(RangeOption::Limit) => {
                offset = client.request.usize()?;
                count = client.request.i64()?;
            }
            None => return Err(ReplyError::Syntax.into()),
        }
    }

    let entries: Vec<(NotNan<f64>, Bytes)> = match store.db.get_zset(&key)? {
        Some(zset) => {
            let (lo, hi) = zset.score_range(min, max);
            let selected = &zset.items()[lo..hi];
            let limit = if count < 0 {
                usize::MAX
            } else {
                usize::try_from(count).unwrap_or(usize::MAX)
            };
            if rev {
                selected.iter().rev().skip(offset).take(limit).cloned().collect()
            } else {
                selected.iter().skip(offset).take(limit).cloned().collect()
            }
        }
        None => Vec::new(),
    };
    reply_entries(client, entries, scores);
    Ok(None)
}

pub static ZRANGEBYSCORE: Command = Command {
    kind: CommandKind::Zrangebyscore,
    name: "zrangebyscore",
    arity: Arity::Minimum(4),
    run: |client, store| score_range(client, store, false),
    readonly: true,
    write: false,
};

pub static ZREVRANGEBYSCORE: Command = Command {
    kind: CommandKind::Zrevrangebyscore,
    name: "zrevrangebyscore",
    arity: Arity::Minimum(4),
    run: |client, store| score_range(client, store, true),
    readonly: true,
    write: false,
};

pub static ZRANK: Command = Command {
    kind: CommandKind::Zrank,
    name: "zrank",
    arity: Arity::Exact(3),
    run: zrank,
    readonly: true,
    write: false,
};

fn zrank(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let member = client.request.pop()?;
    let rank = store.db.get_zset(&key)?.and_then(|zset| zset.rank(&member));
    client.reply(rank);
    Ok(None)
}

pub static ZREVRANK: Command = Command {
    kind: CommandKind::Zrevrank,
    name: "zrevrank",
    arity: Arity::Exact(3),
    run: zrevrank,
    readonly: true,
    write: false,
};

fn zrevrank(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let member = client.request.pop()?;
    let rank = store.db.get_zset(&key)?.and_then(|zset| {
        zset.rank(&member).map(|rank| zset.len() - 1 - rank)
    });
    client.reply(rank);
    Ok(None)
}

pub static ZPOPMIN: Command = Command {
    kind: CommandKind::Zpopmin,
    name: "zpopmin",
    arity: Arity::Minimum(2),
    run: |client, store| pop_extreme(client, store, Extreme::Min),
    readonly: false,
    write: true,
};

pub static ZPOPMAX: Command = Command {
    kind: CommandKind::Zpopmax,
    name: "zpopmax",
    arity: Arity::Minimum(2),
    run: |client, store| pop_extreme(client, store, Extreme::Max),
    readonly: false,
    write: true,
};

fn pop_extreme(client: &mut Client, store: &mut Store, extreme: Extreme) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(argument) => {
            let count: i64 = crate::bytes::parse(&argument).ok_or(ReplyError::Integer)?;
            if count < 0 {
                return Err(ReplyError::OffsetRange.into());
            }
            usize::try_from(count).map_err(|_| ReplyError::Integer)?
        }
        None => 1,
    };

    let mut popped = Vec::new();
    if let Some(zset) = store.db.mut_zset(&key)? {
        while popped.len() < count {
            match zset.pop(extreme) {
                Some(entry) => popped.push(entry),
                None => break,
            }
        }
    }
    if !popped.is_empty() {
        store.mark_dirty();
        store.touch(&key);
        store.db.purge_if_vacant(&key);
    }

    client.reply(Reply::Array(popped.len() * 2));
    for (score, member) in popped {
        client.reply(member);
        client.reply(score.into_inner());
    }
    Ok(None)
}

pub static BZPOPMIN: Command = Command {
    kind: CommandKind::Bzpopmin,
    name: "bzpopmin",
    arity: Arity::Minimum(3),
    run: |client, store| blocking_pop_extreme(client, store, Extreme::Min),
    readonly: false,
    write: true,
};

pub static BZPOPMAX: Command = Command {
    kind: CommandKind::Bzpopmax,
    name: "bzpopmax",
    arity: Arity::Minimum(3),
    run: |client, store| blocking_pop_extreme(client, store, Extreme::Max),
    readonly: false,
    write: true,
};

/// The immediate-check rendition: answer from current state or reply null.
fn blocking_pop_extreme(client: &mut Client, store: &mut Store, extreme: Extreme) -> CommandResult {
    let total = client.request.remaining();
    let keys: Vec<Bytes> = (0..total - 1)
        .map(|_| client.request.pop())
        .collect::<Result<_, _>>()?;
    let _ = client.request.timeout()?;

    for key in keys {
        let Some(zset) = store.db.mut_zset(&key)? else {
            continue;
        };
        let Some((score, member)) = zset.pop(extreme) else {
            continue;
        };
        store.mark_dirty();
        store.touch(&key);
        store.db.purge_if_vacant(&key);
        client.reply(Reply::Array(3));
        client.reply(key);
        client.reply(member);
        client.reply(score.into_inner());
        return Ok(None);
    }
    client.reply(Reply::NilArray);
    Ok(None)
}

pub static ZRANDMEMBER: Command = Command {
    kind: CommandKind::Zrandmember,
    name: "zrandmember",
    arity: Arity::Minimum(2),
    run: zrandmember,
    readonly: true,
    write: false,
};

fn zrandmember(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(argument) => Some(crate::bytes::parse::<i64>(&argument).ok_or(ReplyError::Integer)?),
        None => None,
    };
    let scores = match client.request.try_pop() {
        None => false,
        Some(argument) if argument.eq_ignore_ascii_case(b"withscores") => true,
        Some(_) => return Err(ReplyError::Syntax.into()),
    };
    if scores && count.is_none() {
        return Err(ReplyError::Syntax.into());
    }

    let Some(zset) = store.db.get_zset(&key)? else {
        match count {
            Some(_) => client.reply(Reply::Array(0)),
            None => client.reply(Reply::Nil),
        }
        return Ok(None);
    };

    let members = match count {
        None => {
            client.reply(zset.random_members(1).into_iter().next());
            return Ok(None);
        }
        Some(count) if count >= 0 => zset.random_members(usize::try_from(count).unwrap_or(0)),
        Some(count) => zset.random_members_with_repetition(count.unsigned_abs() as usize),
    };

    if scores {
        client.reply(Reply::Array(members.len() * 2));
        for member in members {
            let score = zset.score(&member).map(NotNan::into_inner).unwrap_or(0.0);
            client.reply(member);
            client.reply(score);
        }
    } else {
        client.reply(Reply::Array(members.len()));
        for member in members {
            client.reply(member);
        }
    }
    Ok(None)
}

pub static ZSCAN: Command = Command {
    kind: CommandKind::Zscan,
    name: "zscan",
    arity: Arity::Minimum(3),
    run: zscan,
    readonly: true,
    write: false,
};

fn zscan(client: &mut Client, store: &mut Store) -> CommandResult {
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

    let mut sorted: Vec<Bytes> = match store.db.get_zset(&key)? {
        Some(zset) => zset.items().iter().map(|(_, m)| m.clone()).collect(),
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
    client.reply(Reply::Array(selected.len() * 2));
    for member in selected {
        let score = store
            .db
            .get_zset(&key)?
            .and_then(|zset| zset.score(&member))
            .map_or(0.0, NotNan::into_inner);
        client.reply(member);
        client.reply(score);
    }
    Ok(None)
}
