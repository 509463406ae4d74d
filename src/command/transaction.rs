use crate::{
    client::Client,
    command::{Action, Arity, Command, CommandKind},
    reply::{Reply, ReplyError},
    resp,
    store::Store,
    CommandResult,
};

pub static MULTI: Command = Command {
    kind: CommandKind::Multi,
    name: "multi",
    arity: Arity::Exact(1),
    run: multi,
    readonly: true,
    write: false,
};

fn multi(client: &mut Client, _: &mut Store) -> CommandResult {
    if client.multi.active {
        return Err(ReplyError::MultiNested.into());
    }
    client.multi.active = true;
    client.multi.queue.clear();
    client.reply("OK");
    Ok(None)
}

pub static DISCARD: Command = Command {
    kind: CommandKind::Discard,
    name: "discard",
    arity: Arity::Exact(1),
    run: discard,
    readonly: true,
    write: false,
};

fn discard(client: &mut Client, store: &mut Store) -> CommandResult {
    if !client.multi.active {
        return Err(ReplyError::DiscardWithoutMulti.into());
    }
    client.multi.clear();
    store.watching.remove(client.id);
    client.reply("OK");
    Ok(None)
}

pub static WATCH: Command = Command {
    kind: CommandKind::Watch,
    name: "watch",
    arity: Arity::Minimum(2),
    run: watch,
    readonly: true,
    write: false,
};

fn watch(client: &mut Client, store: &mut Store) -> CommandResult {
    if client.multi.active {
        return Err(ReplyError::WatchInMulti.into());
    }
    while let Some(key) = client.request.try_pop() {
        store.watching.add(client.id, key);
    }
    client.reply("OK");
    Ok(None)
}

pub static UNWATCH: Command = Command {
    kind: CommandKind::Unwatch,
    name: "unwatch",
    arity: Arity::Exact(1),
    run: unwatch,
    readonly: true,
    write: false,
};

fn unwatch(client: &mut Client, store: &mut Store) -> CommandResult {
    store.watching.remove(client.id);
    client.reply("OK");
    Ok(None)
}

pub static EXEC: Command = Command {
    kind: CommandKind::Exec,
    name: "exec",
    arity: Arity::Exact(1),
    run: exec,
    readonly: true,
    write: false,
};

fn exec(client: &mut Client, store: &mut Store) -> CommandResult {
    if !client.multi.active {
        return Err(ReplyError::ExecWithoutMulti.into());
    }

    let dirty = store.watching.is_dirty(client.id);
    store.watching.remove(client.id);
    let queue = std::mem::take(&mut client.multi.queue);
    client.multi.active = false;

    if dirty {
        client.reply(Reply::NilArray);
        return Ok(None);
    }

    client.reply(Reply::Array(queue.len()));
    for frame in queue {
        // The queue holds frames this server encoded; a decode failure here
        // would be a bug, not user input.
        let args = match resp::decode(&frame) {
            Ok(Some((frame, _))) => resp::request_args(frame).unwrap_or_default(),
            _ => Vec::new(),
        };
        if args.is_empty() {
            client.reply(ReplyError::Custom("ERR transaction queue corrupt".into()));
            continue;
        }
        client.request = crate::request::Request::new(args);
        if let Some(action) = store.execute(client) {
            // Inside a transaction deferred actions degrade to their
            // immediate form.
            if let Action::Wait { target, .. } = action {
                let count = store.repl.caught_up(target);
                client.reply(count);
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{client, run, run_with, store};

    #[test]
    fn queued_commands_run_on_exec() {
        let mut store = store();
        let mut tx = client();
        assert_eq!(&run_with(&mut store, &mut tx, &["MULTI"])[..], b"+OK\r\n");
        assert_eq!(&run_with(&mut store, &mut tx, &["INCR", "n"])[..], b"+QUEUED\r\n");
        assert_eq!(&run_with(&mut store, &mut tx, &["INCR", "n"])[..], b"+QUEUED\r\n");
        // Nothing ran yet.
        assert_eq!(&run(&mut store, &["EXISTS", "n"])[..], b":0\r\n");
        assert_eq!(&run_with(&mut store, &mut tx, &["EXEC"])[..], b"*2\r\n:1\r\n:2\r\n");
        assert_eq!(&run(&mut store, &["GET", "n"])[..], b"$1\r\n2\r\n");
    }

    #[test]
    fn multi_cannot_nest() {
        let mut store = store();
        let mut tx = client();
        run_with(&mut store, &mut tx, &["MULTI"]);
        assert!(run_with(&mut store, &mut tx, &["MULTI"]).starts_with(b"-ERR MULTI calls"));
    }

    #[test]
    fn exec_and_discard_require_multi() {
        let mut store = store();
        let mut tx = client();
        assert!(run_with(&mut store, &mut tx, &["EXEC"]).starts_with(b"-ERR EXEC without MULTI"));
        assert!(run_with(&mut store, &mut tx, &["DISCARD"]).starts_with(b"-ERR DISCARD without"));
    }

    #[test]
    fn discard_drops_the_queue() {
        let mut store = store();
        let mut tx = client();
        run_with(&mut store, &mut tx, &["MULTI"]);
        run_with(&mut store, &mut tx, &["SET", "k", "v"]);
        assert_eq!(&run_with(&mut store, &mut tx, &["DISCARD"])[..], b"+OK\r\n");
        assert_eq!(&run(&mut store, &["EXISTS", "k"])[..], b":0\r\n");
        assert!(run_with(&mut store, &mut tx, &["EXEC"]).starts_with(b"-ERR EXEC"));
    }

    #[test]
    fn queued_errors_surface_at_exec() {
        let mut store = store();
        let mut tx = client();
        run_with(&mut store, &mut tx, &["MULTI"]);
        // Wrong arity queues fine and fails inside EXEC.
        assert_eq!(&run_with(&mut store, &mut tx, &["GET"])[..], b"+QUEUED\r\n");
        assert_eq!(&run_with(&mut store, &mut tx, &["SET", "k", "v"])[..], b"+QUEUED\r\n");
        let reply = run_with(&mut store, &mut tx, &["EXEC"]);
        let text = String::from_utf8_lossy(&reply);
        assert!(text.starts_with("*2\r\n-ERR wrong number"));
        assert!(text.ends_with("+OK\r\n"));
        assert_eq!(&run(&mut store, &["GET", "k"])[..], b"$1\r\nv\r\n");
    }

    #[test]
    fn watch_aborts_after_external_write() {
        let mut store = store();
        let mut tx = client();
        run(&mut store, &["SET", "k", "v1"]);
        assert_eq!(&run_with(&mut store, &mut tx, &["WATCH", "k"])[..], b"+OK\r\n");
        run_with(&mut store, &mut tx, &["MULTI"]);
        run_with(&mut store, &mut tx, &["SET", "k", "v2"]);
        // Another connection wins the race.
        run(&mut store, &["SET", "k", "v3"]);
        assert_eq!(&run_with(&mut store, &mut tx, &["EXEC"])[..], b"*-1\r\n");
        assert_eq!(&run(&mut store, &["GET", "k"])[..], b"$2\r\nv3\r\n");
    }

    #[test]
    fn watch_allows_clean_exec() {
        let mut store = store();
        let mut tx = client();
        run(&mut store, &["SET", "k", "v1"]);
        run_with(&mut store, &mut tx, &["WATCH", "k"]);
        run_with(&mut store, &mut tx, &["MULTI"]);
        run_with(&mut store, &mut tx, &["SET", "k", "v2"]);
        assert_eq!(&run_with(&mut store, &mut tx, &["EXEC"])[..], b"*1\r\n+OK\r\n");
        assert_eq!(&run(&mut store, &["GET", "k"])[..], b"$2\r\nv2\r\n");
    }

    #[test]
    fn own_write_before_multi_also_dirties() {
        let mut store = store();
        let mut tx = client();
        run_with(&mut store, &mut tx, &["WATCH", "k"]);
        run_with(&mut store, &mut tx, &["SET", "k", "mine"]);
        run_with(&mut store, &mut tx, &["MULTI"]);
        run_with(&mut store, &mut tx, &["GET", "k"]);
        assert_eq!(&run_with(&mut store, &mut tx, &["EXEC"])[..], b"*-1\r\n");
    }

    #[test]
    fn unwatch_clears_dirt() {
        let mut store = store();
        let mut tx = client();
        run_with(&mut store, &mut tx, &["WATCH", "k"]);
        run(&mut store, &["SET", "k", "x"]);
        assert_eq!(&run_with(&mut store, &mut tx, &["UNWATCH"])[..], b"+OK\r\n");
        run_with(&mut store, &mut tx, &["MULTI"]);
        run_with(&mut store, &mut tx, &["GET", "k"]);
        assert_eq!(&run_with(&mut store, &mut tx, &["EXEC"])[..], b"*1\r\n$1\r\nx\r\n");
    }

    #[test]
    fn watch_inside_multi_is_refused() {
        let mut store = store();
        let mut tx = client();
        run_with(&mut store, &mut tx, &["MULTI"]);
        assert!(run_with(&mut store, &mut tx, &["WATCH", "k"]).starts_with(b"-ERR WATCH inside"));
    }
}
