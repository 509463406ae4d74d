use crate::{
    client::Client,
    command::{Arity, Command, CommandKind},
    reply::Reply,
    store::Store,
    CommandResult,
};
use bytes::Bytes;

pub static SUBSCRIBE: Command = Command {
    kind: CommandKind::Subscribe,
    name: "subscribe",
    arity: Arity::Minimum(2),
    run: subscribe,
    readonly: true,
    write: false,
};

fn subscribe(client: &mut Client, store: &mut Store) -> CommandResult {
    while let Some(channel) = client.request.try_pop() {
        let count = store.pubsub.subscribe(client.id, channel.clone());
        client.reply(Reply::Array(3));
        client.reply("subscribe");
        client.reply(channel);
        client.reply(count);
    }
    Ok(None)
}

pub static UNSUBSCRIBE: Command = Command {
    kind: CommandKind::Unsubscribe,
    name: "unsubscribe",
    arity: Arity::Minimum(1),
    run: unsubscribe,
    readonly: true,
    write: false,
};

fn unsubscribe(client: &mut Client, store: &mut Store) -> CommandResult {
    if client.request.is_empty() {
        // No channels: drop every subscription, one confirmation each.
        let channels = store.pubsub.subscriptions(client.id);
        if channels.is_empty() {
            client.reply(Reply::Array(3));
            client.reply("unsubscribe");
            client.reply(Reply::Nil);
            client.reply(0);
            return Ok(None);
        }
        for channel in channels {
            let count = store.pubsub.unsubscribe(client.id, &channel);
            client.reply(Reply::Array(3));
            client.reply("unsubscribe");
            client.reply(channel);
            client.reply(count);
        }
        return Ok(None);
    }

    while let Some(channel) = client.request.try_pop() {
        let count = store.pubsub.unsubscribe(client.id, &channel);
        client.reply(Reply::Array(3));
        client.reply("unsubscribe");
        client.reply(channel);
        client.reply(count);
    }
    Ok(None)
}

pub static PUBLISH: Command = Command {
    kind: CommandKind::Publish,
    name: "publish",
    arity: Arity::Exact(3),
    run: publish,
    readonly: true,
    write: false,
};

fn publish(client: &mut Client, store: &mut Store) -> CommandResult {
    let channel = client.request.pop()?;
    let message = client.request.pop()?;
    let delivered = store.pubsub.publish(&channel, &message);
    client.reply(delivered);
    Ok(None)
}

pub static PUBSUB: Command = Command {
    kind: CommandKind::Pubsub,
    name: "pubsub",
    arity: Arity::Minimum(2),
    run: pubsub,
    readonly: true,
    write: false,
};

fn pubsub(client: &mut Client, store: &mut Store) -> CommandResult {
    let subcommand = client.request.pop()?;

    if subcommand.eq_ignore_ascii_case(b"channels") {
        let pattern = client.request.try_pop();
        let channels = store.pubsub.channels(pattern.as_deref());
        client.reply(Reply::Array(channels.len()));
        for channel in channels {
            client.reply(channel);
        }
    } else if subcommand.eq_ignore_ascii_case(b"numsub") {
        let channels: Vec<Bytes> = client.request.iter().collect();
        client.reply(Reply::Array(channels.len() * 2));
        for channel in channels {
            let count = store.pubsub.numsub(&channel);
            client.reply(channel);
            client.reply(count);
        }
    } else if subcommand.eq_ignore_ascii_case(b"numpat") {
        // Pattern subscriptions are not part of the hub.
        client.reply(0);
    } else {
        return Err(client.request.unknown_subcommand().into());
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::command::test::{client, run, run_with, store};
    use crate::reply::ReplyError;

    #[test]
    fn subscribe_confirmations_count_up() {
        let mut store = store();
        let mut subscriber = client();
        let reply = run_with(&mut store, &mut subscriber, &["SUBSCRIBE", "a", "b"]);
        assert_eq!(
            &reply[..],
            b"*3\r\n$9\r\nsubscribe\r\n$1\r\na\r\n:1\r\n*3\r\n$9\r\nsubscribe\r\n$1\r\nb\r\n:2\r\n"
        );
    }

    #[test]
    fn publish_reaches_subscribers() {
        let mut store = store();
        let mut subscriber = client();
        run_with(&mut store, &mut subscriber, &["SUBSCRIBE", "news"]);
        assert_eq!(&run(&mut store, &["PUBLISH", "news", "hi"])[..], b":1\r\n");
        assert_eq!(&run(&mut store, &["PUBLISH", "none", "hi"])[..], b":0\r\n");

        let mut out = bytes::BytesMut::new();
        store.pubsub.drain(subscriber.id, &mut out);
        assert_eq!(&out[..], b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n");
    }

    #[test]
    fn unsubscribe_all() {
        let mut store = store();
        let mut subscriber = client();
        run_with(&mut store, &mut subscriber, &["SUBSCRIBE", "a"]);
        let reply = run_with(&mut store, &mut subscriber, &["UNSUBSCRIBE"]);
        assert_eq!(&reply[..], b"*3\r\n$11\r\nunsubscribe\r\n$1\r\na\r\n:0\r\n");
        assert_eq!(&run(&mut store, &["PUBLISH", "a", "x"])[..], b":0\r\n");
        // With nothing subscribed the confirmation carries a nil channel.
        let reply = run_with(&mut store, &mut subscriber, &["UNSUBSCRIBE"]);
        assert_eq!(&reply[..], b"*3\r\n$11\r\nunsubscribe\r\n$-1\r\n:0\r\n");
    }

    #[test]
    fn introspection() {
        let mut store = store();
        let mut subscriber = client();
        run_with(&mut store, &mut subscriber, &["SUBSCRIBE", "news.a", "news.b"]);
        let reply = run(&mut store, &["PUBSUB", "CHANNELS"]);
        assert!(reply.starts_with(b"*2\r\n"));
        let reply = run(&mut store, &["PUBSUB", "CHANNELS", "news.a"]);
        assert!(reply.starts_with(b"*1\r\n"));
        assert_eq!(
            &run(&mut store, &["PUBSUB", "NUMSUB", "news.a", "zz"])[..],
            b"*4\r\n$6\r\nnews.a\r\n:1\r\n$2\r\nzz\r\n:0\r\n"
        );
        assert_eq!(&run(&mut store, &["PUBSUB", "NUMPAT"])[..], b":0\r\n");
        let reply = run(&mut store, &["PUBSUB", "BOGUS"]);
        let expected = format!("-{}\r\n", ReplyError::UnknownSubcommand("BOGUS".into(), "pubsub"));
        assert_eq!(&reply[..], expected.as_bytes());
    }
}
