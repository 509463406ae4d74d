use crate::{
    client::Client,
    command::{Action, Arity, Command, CommandKind},
    reply::{Reply, ReplyError},
    store::Store,
    time::now_ms,
    CommandResult, VERSION,
};
use tracing::info;

pub static PING: Command = Command {
    kind: CommandKind::Ping,
    name: "ping",
    arity: Arity::Minimum(1),
    run: ping,
    readonly: true,
    write: false,
};

fn ping(client: &mut Client, _: &mut Store) -> CommandResult {
    match client.request.try_pop() {
        Some(message) => client.reply(message),
        None => client.reply("PONG"),
    }
    Ok(None)
}

pub static ECHO: Command = Command {
    kind: CommandKind::Echo,
    name: "echo",
    arity: Arity::Exact(2),
    run: echo,
    readonly: true,
    write: false,
};

fn echo(client: &mut Client, _: &mut Store) -> CommandResult {
    let message = client.request.pop()?;
    client.reply(message);
    Ok(None)
}

pub static QUIT: Command = Command {
    kind: CommandKind::Quit,
    name: "quit",
    arity: Arity::Minimum(1),
    run: quit,
    readonly: true,
    write: false,
};

fn quit(client: &mut Client, _: &mut Store) -> CommandResult {
    client.reply("OK");
    Ok(Some(Action::Quit))
}

pub static SHUTDOWN: Command = Command {
    kind: CommandKind::Shutdown,
    name: "shutdown",
    arity: Arity::Minimum(1),
    run: shutdown,
    readonly: false,
    write: false,
};

fn shutdown(client: &mut Client, store: &mut Store) -> CommandResult {
    let mut save = !store.settings.save.trim().is_empty();
    if let Some(option) = client.request.try_pop() {
        if option.eq_ignore_ascii_case(b"nosave") {
            save = false;
        } else if option.eq_ignore_ascii_case(b"save") {
            save = true;
        } else {
            return Err(ReplyError::Syntax.into());
        }
    }

    if save {
        if let Err(error) = store.save_snapshot() {
            return Err(ReplyError::Io(error.to_string()).into());
        }
    }

    info!("shutting down");
    std::process::exit(0);
}

pub static INFO: Command = Command {
    kind: CommandKind::Info,
    name: "info",
    arity: Arity::Minimum(1),
    run: info_command,
    readonly: true,
    write: false,
};

fn info_command(client: &mut Client, store: &mut Store) -> CommandResult {
    use std::fmt::Write;

    let role = match store.repl.role {
        crate::repl::Role::Primary => "master",
        crate::repl::Role::Replica => "slave",
    };
    let uptime = (now_ms().saturating_sub(store.start_time)) / 1000;

    let mut text = String::new();
    let _ = write!(
        text,
        "# Server\r\nredis_version:7.0.0\r\nzoltraak_version:{}\r\nuptime_in_seconds:{}\r\ntcp_port:{}\r\n\r\n",
        VERSION, uptime, store.settings.port,
    );
    let _ = write!(
        text,
        "# Replication\r\nrole:{}\r\nconnected_slaves:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}\r\n\r\n",
        role,
        store.repl.replicas.len(),
        store.repl.replid,
        store.repl.offset,
    );
    let _ = write!(
        text,
        "# Stats\r\ntotal_connections_received:{}\r\ntotal_commands_processed:{}\r\n\r\n",
        store.numconnections, store.numcommands,
    );
    let _ = write!(text, "# Keyspace\r\ndb0:keys={}\r\n", store.db.len());

    client.reply(Reply::Bulk(text.into_bytes().into()));
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{run, store};

    #[test]
    fn ping() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["PING"])[..], b"+PONG\r\n");
        assert_eq!(&run(&mut store, &["PING", "hi"])[..], b"$2\r\nhi\r\n");
    }

    #[test]
    fn echo() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["ECHO", "hello"])[..], b"$5\r\nhello\r\n");
        assert!(run(&mut store, &["ECHO"]).starts_with(b"-ERR wrong number"));
    }

    #[test]
    fn info_mentions_the_role() {
        let mut store = store();
        let reply = run(&mut store, &["INFO"]);
        let text = String::from_utf8_lossy(&reply);
        assert!(text.contains("role:master"));
        assert!(text.contains("master_repl_offset:0"));
    }
}
