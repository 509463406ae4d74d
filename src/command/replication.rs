use crate::{
    bytes::parse,
    client::Client,
    command::{Action, Arity, Command, CommandKind},
    repl::{self, Role},
    reply::{Reply, ReplyError},
    resp,
    store::Store,
    CommandResult,
};
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;

pub static REPLICAOF: Command = Command {
    kind: CommandKind::Replicaof,
    name: "replicaof",
    arity: Arity::Exact(3),
    run: replicaof,
    readonly: true,
    write: false,
};

pub static SLAVEOF: Command = Command {
    kind: CommandKind::Slaveof,
    name: "slaveof",
    arity: Arity::Exact(3),
    run: replicaof,
    readonly: true,
    write: false,
};

fn replicaof(client: &mut Client, store: &mut Store) -> CommandResult {
    let host = client.request.pop()?;
    let port = client.request.pop()?;

    // REPLICAOF NO ONE: drop the link and take writes again, keeping the
    // replication id and offset.
    if host.eq_ignore_ascii_case(b"no") && port.eq_ignore_ascii_case(b"one") {
        if let Some(primary) = store.repl.primary.take() {
            primary.abort();
        }
        store.repl.role = Role::Primary;
        client.reply("OK");
        return Ok(None);
    }

    let host = std::str::from_utf8(&host)
        .map_err(|_| ReplyError::Syntax)?
        .to_string();
    let port: u16 = parse(&port).ok_or(ReplyError::Integer)?;

    if let Some(primary) = store.repl.primary.take() {
        primary.abort();
    }
    store.repl.role = Role::Replica;

    if let Some(shared) = store.shared.upgrade() {
        store.repl.primary = Some(repl::spawn_link(shared, host, port));
    }
    client.reply("OK");
    Ok(None)
}

pub static REPLCONF: Command = Command {
    kind: CommandKind::Replconf,
    name: "replconf",
    arity: Arity::Minimum(2),
    run: replconf,
    readonly: true,
    write: false,
};

fn replconf(client: &mut Client, store: &mut Store) -> CommandResult {
    let subcommand = client.request.pop()?;

    if subcommand.eq_ignore_ascii_case(b"listening-port") {
        let port: u16 = parse(&client.request.pop()?).ok_or(ReplyError::Integer)?;
        store.repl.pending_ports.insert(client.id, port);
        client.reply("OK");
    } else if subcommand.eq_ignore_ascii_case(b"capa") {
        // Capabilities are advisory; acknowledge whatever is offered.
        client.reply("OK");
    } else if subcommand.eq_ignore_ascii_case(b"getack") {
        let offset = store.repl.offset;
        client.reply(Reply::Array(3));
        client.reply(Bytes::from_static(b"REPLCONF"));
        client.reply(Bytes::from_static(b"ACK"));
        client.reply(offset.to_string().into_bytes());
    } else if subcommand.eq_ignore_ascii_case(b"ack") {
        // No reply; the ack only moves this replica's mark.
        let offset: u64 = parse(&client.request.pop()?).ok_or(ReplyError::Integer)?;
        store.repl.set_ack(client.id, offset);
    } else {
        client.reply("OK");
    }
    Ok(None)
}

pub static PSYNC: Command = Command {
    kind: CommandKind::Psync,
    name: "psync",
    arity: Arity::Exact(3),
    run: psync,
    readonly: true,
    write: false,
};

fn psync(client: &mut Client, _: &mut Store) -> CommandResult {
    // Only full resynchronisation is offered; the driver takes the
    // connection over, streams the snapshot, and keeps feeding from there.
    let _ = client.request.pop()?;
    let _ = client.request.pop()?;
    Ok(Some(Action::FullResync))
}

pub static WAIT: Command = Command {
    kind: CommandKind::Wait,
    name: "wait",
    arity: Arity::Exact(3),
    run: wait,
    readonly: true,
    write: false,
};

fn wait(client: &mut Client, store: &mut Store) -> CommandResult {
    let numreplicas = client.request.usize()?;
    let timeout_ms = client.request.u64()?;

    // Ask every replica where it is; the GETACK itself travels the stream
    // and advances the offset, so the target includes it.
    if !store.repl.replicas.is_empty() {
        let getack = resp::command_bytes(&[
            Bytes::from_static(b"REPLCONF"),
            Bytes::from_static(b"GETACK"),
            Bytes::from_static(b"*"),
        ]);
        store.repl.feed(&getack);
    }
    let target = store.repl.offset;

    let timeout = if timeout_ms == 0 {
        Duration::from_secs(3600)
    } else {
        Duration::from_millis(timeout_ms)
    };
    Ok(Some(Action::Wait {
        numreplicas,
        target,
        deadline: Instant::now() + timeout,
    }))
}
