use crate::{
    aof::Aof,
    client::Client,
    command::{Arity, Command, CommandKind},
    reply::ReplyError,
    store::Store,
    CommandResult,
};
use tracing::warn;

pub static SAVE: Command = Command {
    kind: CommandKind::Save,
    name: "save",
    arity: Arity::Exact(1),
    run: save,
    readonly: true,
    write: false,
};

fn save(client: &mut Client, store: &mut Store) -> CommandResult {
    match store.save_snapshot() {
        Ok(()) => client.reply("OK"),
        Err(error) => return Err(ReplyError::Io(error.to_string()).into()),
    }
    Ok(None)
}

pub static BGSAVE: Command = Command {
    kind: CommandKind::Bgsave,
    name: "bgsave",
    arity: Arity::Minimum(1),
    run: bgsave,
    readonly: true,
    write: false,
};

fn bgsave(client: &mut Client, store: &mut Store) -> CommandResult {
    // Clone the keyspace under the lock; encode and write elsewhere.
    let db = store.db.clone();
    let path = store.settings.rdb_path();
    store.last_save = crate::time::now_ms();
    store.dirty_since_save = 0;

    let write = move || {
        if let Err(error) = crate::rdb::save(&db, &path) {
            warn!(%error, "background save failed");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(write);
        }
        Err(_) => write(),
    }

    client.reply("Background saving started");
    Ok(None)
}

pub static BGREWRITEAOF: Command = Command {
    kind: CommandKind::Bgrewriteaof,
    name: "bgrewriteaof",
    arity: Arity::Exact(1),
    run: bgrewriteaof,
    readonly: true,
    write: false,
};

fn bgrewriteaof(client: &mut Client, store: &mut Store) -> CommandResult {
    if store.aof.is_none() {
        match Aof::open(store.settings.aof_path()) {
            Ok(aof) => store.aof = Some(aof),
            Err(error) => return Err(ReplyError::Io(error.to_string()).into()),
        }
    }

    let result = {
        let db = &store.db;
        store
            .aof
            .as_mut()
            .map(|aof| aof.rewrite(db))
            .unwrap_or(Ok(()))
    };
    if let Err(error) = result {
        return Err(ReplyError::Io(error.to_string()).into());
    }
    if !store.settings.appendonly {
        store.aof = None;
    }

    client.reply("Background append only file rewriting started");
    Ok(None)
}

pub static LASTSAVE: Command = Command {
    kind: CommandKind::Lastsave,
    name: "lastsave",
    arity: Arity::Exact(1),
    run: lastsave,
    readonly: true,
    write: false,
};

fn lastsave(client: &mut Client, store: &mut Store) -> CommandResult {
    let seconds = i64::try_from(store.last_save / 1000).unwrap_or(i64::MAX);
    client.reply(seconds);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{run, store};

    #[test]
    fn lastsave_reports_seconds() {
        let mut store = store();
        let reply = run(&mut store, &["LASTSAVE"]);
        let text = String::from_utf8_lossy(&reply);
        let at: i64 = text[1..text.len() - 2].parse().unwrap();
        assert!(at > 1_600_000_000);
    }
}
