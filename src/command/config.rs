use crate::{
    client::Client,
    command::{Arity, Command, CommandKind},
    config,
    glob,
    reply::{Reply, ReplyError},
    store::Store,
    CommandResult,
};
use bytes::Bytes;
use std::io::Write;

pub static CONFIG: Command = Command {
    kind: CommandKind::Config,
    name: "config",
    arity: Arity::Minimum(2),
    run: config_command,
    readonly: true,
    write: false,
};

fn config_command(client: &mut Client, store: &mut Store) -> CommandResult {
    let subcommand = client.request.pop()?;

    if subcommand.eq_ignore_ascii_case(b"get") {
        config_get(client, store)
    } else if subcommand.eq_ignore_ascii_case(b"set") {
        config_set(client, store)
    } else if subcommand.eq_ignore_ascii_case(b"rewrite") {
        config_rewrite(client, store)
    } else if subcommand.eq_ignore_ascii_case(b"resetstat") {
        store.numcommands = 0;
        store.numconnections = 0;
        client.reply("OK");
        Ok(None)
    } else {
        Err(client.request.unknown_subcommand().into())
    }
}

/// CONFIG GET takes glob patterns, matched case-insensitively against the
/// parameter names, and replies with a flat name/value list.
fn config_get(client: &mut Client, store: &mut Store) -> CommandResult {
    if client.request.is_empty() {
        return Err(client.request.wrong_arguments().into());
    }
    let patterns: Vec<Bytes> = client.request.iter().collect();

    let mut pairs = Vec::new();
    for param in config::PARAMS {
        let matched = patterns
            .iter()
            .any(|pattern| glob::matches_nocase(param.name.as_bytes(), pattern));
        if matched {
            pairs.push((param.name, (param.get)(store)));
        }
    }

    client.reply(Reply::Array(pairs.len() * 2));
    for (name, value) in pairs {
        client.reply(Bytes::from_static(name.as_bytes()));
        client.reply(value.into_bytes());
    }
    Ok(None)
}

fn config_set(client: &mut Client, store: &mut Store) -> CommandResult {
    client.request.assert_pairs()?;
    if client.request.is_empty() {
        return Err(client.request.wrong_arguments().into());
    }

    // Validate every name first; a CONFIG SET either applies fully or not
    // at all.
    let mut updates = Vec::new();
    while let Some(name) = client.request.try_pop() {
        let value = client.request.pop()?;
        let Some(param) = config::lookup(&name) else {
            return Err(ReplyError::UnsupportedParameter(name).into());
        };
        if param.readonly {
            return Err(ReplyError::ConfigReadonly(param.name).into());
        }
        updates.push((param, value));
    }

    for (param, value) in updates {
        if let Err(error) = (param.set)(store, &value) {
            return Err(ReplyError::ConfigSet(value, param.name, error).into());
        }
    }
    client.reply("OK");
    Ok(None)
}

/// Persist the current parameter values to the config file the server was
/// started with.
fn config_rewrite(client: &mut Client, store: &mut Store) -> CommandResult {
    let Some(path) = store.settings.config_file.clone() else {
        return Err(ReplyError::NoConfigFile.into());
    };

    let mut contents = String::new();
    for param in config::PARAMS {
        let value = (param.get)(store);
        contents.push_str(param.name);
        contents.push(' ');
        contents.push_str(&value);
        contents.push('\n');
    }

    let write = || -> std::io::Result<()> {
        let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)
    };
    if let Err(error) = write() {
        return Err(ReplyError::Io(error.to_string()).into());
    }

    client.reply("OK");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{run, store};

    #[test]
    fn get_with_globs() {
        let mut store = store();
        let reply = run(&mut store, &["CONFIG", "GET", "maxmemory"]);
        assert_eq!(&reply[..], b"*2\r\n$9\r\nmaxmemory\r\n$1\r\n0\r\n");
        let reply = run(&mut store, &["CONFIG", "GET", "MAXMEMORY*"]);
        assert!(reply.starts_with(b"*4\r\n"));
        let reply = run(&mut store, &["CONFIG", "GET", "no-such-*"]);
        assert_eq!(&reply[..], b"*0\r\n");
    }

    #[test]
    fn set_round_trips() {
        let mut store = store();
        assert_eq!(&run(&mut store, &["CONFIG", "SET", "maxmemory", "100mb"])[..], b"+OK\r\n");
        let reply = run(&mut store, &["CONFIG", "GET", "maxmemory"]);
        assert_eq!(&reply[..], b"*2\r\n$9\r\nmaxmemory\r\n$9\r\n104857600\r\n");
        assert_eq!(
            &run(&mut store, &["CONFIG", "SET", "maxmemory-policy", "allkeys-lru"])[..],
            b"+OK\r\n"
        );
    }

    #[test]
    fn readonly_parameters_are_refused() {
        let mut store = store();
        let reply = run(&mut store, &["CONFIG", "SET", "port", "1234"]);
        assert!(reply.starts_with(b"-ERR CONFIG SET failed - can't set immutable"));
    }

    #[test]
    fn unknown_parameters_are_refused() {
        let mut store = store();
        let reply = run(&mut store, &["CONFIG", "SET", "bogus", "1"]);
        assert!(reply.starts_with(b"-ERR Unknown option"));
        let reply = run(&mut store, &["CONFIG", "SET", "maxmemory", "nonsense"]);
        assert!(reply.starts_with(b"-ERR Invalid argument"));
    }

    #[test]
    fn rewrite_needs_a_config_file() {
        let mut store = store();
        let reply = run(&mut store, &["CONFIG", "REWRITE"]);
        assert!(reply.starts_with(b"-ERR The server is running without a config file"));
    }

    #[test]
    fn resetstat_zeroes_counters() {
        let mut store = store();
        run(&mut store, &["PING"]);
        assert!(store.numcommands > 0);
        run(&mut store, &["CONFIG", "RESETSTAT"]);
        // The RESETSTAT itself was counted after the reset cleared.
        assert_eq!(store.numcommands, 0);
    }
}
