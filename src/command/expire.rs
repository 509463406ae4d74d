use crate::{
    bytes::lex,
    client::Client,
    command::{Arity, Command, CommandKind},
    reply::ReplyError,
    store::Store,
    CommandResult,
};
use bytes::Bytes;
use logos::Logos;

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum ExpireOption {
    #[regex(b"(?i:nx)")]
    Nx,

    #[regex(b"(?i:xx)")]
    Xx,

    #[regex(b"(?i:gt)")]
    Gt,

    #[regex(b"(?i:lt)")]
    Lt,
}

pub static EXPIRE: Command = Command {
    kind: CommandKind::Expire,
    name: "expire",
    arity: Arity::Minimum(3),
    run: expire,
    readonly: false,
    write: true,
};

fn expire(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let at = client.request.ttl()?;
    set_expiration(client, store, key, at)
}

pub static PEXPIRE: Command = Command {
    kind: CommandKind::Pexpire,
    name: "pexpire",
    arity: Arity::Minimum(3),
    run: pexpire,
    readonly: false,
    write: true,
};

fn pexpire(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let at = client.request.pttl()?;
    set_expiration(client, store, key, at)
}

pub static EXPIREAT: Command = Command {
    kind: CommandKind::Expireat,
    name: "expireat",
    arity: Arity::Minimum(3),
    run: expireat,
    readonly: false,
    write: true,
};

fn expireat(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let at = client.request.expiretime()?;
    set_expiration(client, store, key, at)
}

pub static PEXPIREAT: Command = Command {
    kind: CommandKind::Pexpireat,
    name: "pexpireat",
    arity: Arity::Minimum(3),
    run: pexpireat,
    readonly: false,
    write: true,
};

fn pexpireat(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    let at = client.request.pexpiretime()?;
    set_expiration(client, store, key, at)
}

/// Apply the NX/XX/GT/LT rules and set the deadline. A key with no expiry
/// counts as infinitely far away.
fn set_expiration(client: &mut Client, store: &mut Store, key: Bytes, at: u128) -> CommandResult {
    let mut option = None;
    while let Some(argument) = client.request.try_pop() {
        let parsed: ExpireOption = lex(&argument[..]).ok_or(ReplyError::Syntax)?;
        if option.is_some() && option != Some(parsed) {
            return Err(ReplyError::GtLtNx.into());
        }
        option = Some(parsed);
    }

    if !store.db.exists(&key) {
        client.reply(0);
        return Ok(None);
    }

    let current = store.db.expires_at(&key);
    let allowed = match option {
        None => true,
        Some(ExpireOption::Nx) => current.is_none(),
        Some(ExpireOption::Xx) => current.is_some(),
        Some(ExpireOption::Gt) => current.is_some_and(|now| at > now),
        Some(ExpireOption::Lt) => current.map_or(true, |now| at < now),
    };

    if !allowed {
        client.reply(0);
        return Ok(None);
    }

    store.db.expire(&key, at);
    store.mark_dirty();
    store.touch(&key);
    store.propagate_as(vec![
        Bytes::from_static(b"PEXPIREAT"),
        key,
        at.to_string().into_bytes().into(),
    ]);
    client.reply(1);
    Ok(None)
}

pub static PERSIST: Command = Command {
    kind: CommandKind::Persist,
    name: "persist",
    arity: Arity::Exact(2),
    run: persist,
    readonly: false,
    write: true,
};

fn persist(client: &mut Client, store: &mut Store) -> CommandResult {
    let key = client.request.pop()?;
    if store.db.persist(&key) {
        store.mark_dirty();
        store.touch(&key);
        client.reply(1);
    } else {
        client.reply(0);
    }
    Ok(None)
}

pub static TTL: Command = Command {
    kind: CommandKind::Ttl,
    name: "ttl",
    arity: Arity::Exact(2),
    run: ttl,
    readonly: true,
    write: false,
};

fn ttl(client: &mut Client, store: &mut Store) -> CommandResult {
    let remaining = remaining_ms(client, store)?;
    client.reply(match remaining {
        n if n >= 0 => (n + 500) / 1000,
        n => n,
    });
    Ok(None)
}

pub static PTTL: Command = Command {
    kind: CommandKind::Pttl,
    name: "pttl",
    arity: Arity::Exact(2),
    run: pttl,
    readonly: true,
    write: false,
};

fn pttl(client: &mut Client, store: &mut Store) -> CommandResult {
    let remaining = remaining_ms(client, store)?;
    client.reply(remaining);
    Ok(None)
}

/// -2 for a missing key, -1 for no expiry, otherwise remaining ms.
fn remaining_ms(client: &mut Client, store: &mut Store) -> Result<i64, ReplyError> {
    let key = client.request.pop()?;
    if !store.db.exists(&key) {
        return Ok(-2);
    }
    match store.db.ttl(&key) {
        Some(ms) => Ok(i64::try_from(ms).unwrap_or(i64::MAX)),
        None => Ok(-1),
    }
}

pub static EXPIRETIME: Command = Command {
    kind: CommandKind::Expiretime,
    name: "expiretime",
    arity: Arity::Exact(2),
    run: expiretime,
    readonly: true,
    write: false,
};

fn expiretime(client: &mut Client, store: &mut Store) -> CommandResult {
    let at = deadline_ms(client, store)?;
    client.reply(if at >= 0 { at / 1000 } else { at });
    Ok(None)
}

pub static PEXPIRETIME: Command = Command {
    kind: CommandKind::Pexpiretime,
    name: "pexpiretime",
    arity: Arity::Exact(2),
    run: pexpiretime,
    readonly: true,
    write: false,
};

fn pexpiretime(client: &mut Client, store: &mut Store) -> CommandResult {
    let at = deadline_ms(client, store)?;
    client.reply(at);
    Ok(None)
}

fn deadline_ms(client: &mut Client, store: &mut Store) -> Result<i64, ReplyError> {
    let key = client.request.pop()?;
    if !store.db.exists(&key) {
        return Ok(-2);
    }
    match store.db.expires_at(&key) {
        Some(at) => Ok(i64::try_from(at).unwrap_or(i64::MAX)),
        None => Ok(-1),
    }
}
