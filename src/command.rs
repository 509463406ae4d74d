mod config;
mod expire;
mod hash;
mod hyperloglog;
mod keys;
mod list;
mod persist;
mod pubsub;
mod replication;
mod server;
mod set;
mod sorted_set;
mod stream;
mod string;
mod transaction;

pub use config::*;
pub use expire::*;
pub use hash::*;
pub use hyperloglog::*;
pub use keys::*;
pub use list::*;
pub use persist::*;
pub use pubsub::*;
pub use replication::*;
pub use server::*;
pub use set::*;
pub use sorted_set::*;
pub use stream::*;
pub use string::*;
pub use transaction::*;

use crate::{bytes::lex, client::Client, reply::Reply, store::Store};
use logos::Logos;
use tokio::time::Instant;

/// The number of arguments a command accepts, name included.
#[derive(Debug)]
pub enum Arity {
    Exact(u8),
    Minimum(u8),
}

/// A request the executor cannot finish on its own: the connection driver
/// completes it outside the store lock.
#[derive(Debug)]
pub enum Action {
    /// Poll until enough replicas acknowledge `target`, or the deadline.
    Wait {
        numreplicas: usize,
        target: u64,
        deadline: Instant,
    },

    /// Take the connection over as a replica feed (PSYNC).
    FullResync,

    /// Close the connection after flushing.
    Quit,
}

/// The result of a command being run.
pub type CommandResult = Result<Option<Action>, Reply>;

/// Information about a particular command that can be run.
pub struct Command {
    /// What kind of command is this?
    pub kind: CommandKind,

    /// The name of the command.
    pub name: &'static str,

    /// What are the arguments to this command?
    pub arity: Arity,

    /// What function runs this command?
    pub run: fn(&mut Client, &mut Store) -> CommandResult,

    /// Is this command read only?
    pub readonly: bool,

    /// Does this command write data?
    pub write: bool,
}

impl Command {
    /// Is this command queueable inside MULTI?
    pub fn queueable(&self) -> bool {
        use CommandKind::*;
        !matches!(
            self.kind,
            Multi
                | Exec
                | Discard
                | Watch
                | Quit
                | Shutdown
                | Subscribe
                | Unsubscribe
                | Psync
                | Replicaof
                | Slaveof
        )
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("arity", &self.arity)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("readonly", &self.readonly)
            .field("write", &self.write)
            .finish()
    }
}

impl From<&[u8]> for &'static Command {
    fn from(value: &[u8]) -> &'static Command {
        lex::<CommandKind>(value).map_or(&UNKNOWN, |kind| kind.command())
    }
}

fn unknown(client: &mut Client, _: &mut Store) -> CommandResult {
    Err(crate::reply::ReplyError::UnknownCommand(client.request.name()).into())
}

pub static UNKNOWN: Command = Command {
    kind: CommandKind::Unknown,
    name: "unknown",
    arity: Arity::Minimum(1),
    run: unknown,
    readonly: false,
    write: false,
};

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum CommandKind {
    #[regex(b"(?i:append)")]
    Append,

    #[regex(b"(?i:bgrewriteaof)")]
    Bgrewriteaof,

    #[regex(b"(?i:bgsave)")]
    Bgsave,

    #[regex(b"(?i:bitcount)")]
    Bitcount,

    #[regex(b"(?i:bitop)")]
    Bitop,

    #[regex(b"(?i:blmove)")]
    Blmove,

    #[regex(b"(?i:blmpop)")]
    Blmpop,

    #[regex(b"(?i:blpop)")]
    Blpop,

    #[regex(b"(?i:brpop)")]
    Brpop,

    #[regex(b"(?i:bzpopmax)")]
    Bzpopmax,

    #[regex(b"(?i:bzpopmin)")]
    Bzpopmin,

    #[regex(b"(?i:config)")]
    Config,

    #[regex(b"(?i:dbsize)")]
    Dbsize,

    #[regex(b"(?i:decr)")]
    Decr,

    #[regex(b"(?i:decrby)")]
    Decrby,

    #[regex(b"(?i:del)")]
    Del,

    #[regex(b"(?i:discard)")]
    Discard,

    #[regex(b"(?i:echo)")]
    Echo,

    #[regex(b"(?i:exec)")]
    Exec,

    #[regex(b"(?i:exists)")]
    Exists,

    #[regex(b"(?i:expire)")]
    Expire,

    #[regex(b"(?i:expireat)")]
    Expireat,

    #[regex(b"(?i:expiretime)")]
    Expiretime,

    #[regex(b"(?i:flushall)")]
    Flushall,

    #[regex(b"(?i:flushdb)")]
    Flushdb,

    #[regex(b"(?i:get)")]
    Get,

    #[regex(b"(?i:getbit)")]
    Getbit,

    #[regex(b"(?i:getdel)")]
    Getdel,

    #[regex(b"(?i:getex)")]
    Getex,

    #[regex(b"(?i:getrange)")]
    Getrange,

    #[regex(b"(?i:getset)")]
    Getset,

    #[regex(b"(?i:hdel)")]
    Hdel,

    #[regex(b"(?i:hexists)")]
    Hexists,

    #[regex(b"(?i:hget)")]
    Hget,

    #[regex(b"(?i:hgetall)")]
    Hgetall,

    #[regex(b"(?i:hincrby)")]
    Hincrby,

    #[regex(b"(?i:hincrbyfloat)")]
    Hincrbyfloat,

    #[regex(b"(?i:hkeys)")]
    Hkeys,

    #[regex(b"(?i:hlen)")]
    Hlen,

    #[regex(b"(?i:hmget)")]
    Hmget,

    #[regex(b"(?i:hmset)")]
    Hmset,

    #[regex(b"(?i:hscan)")]
    Hscan,

    #[regex(b"(?i:hset)")]
    Hset,

    #[regex(b"(?i:hsetnx)")]
    Hsetnx,

    #[regex(b"(?i:hstrlen)")]
    Hstrlen,

    #[regex(b"(?i:hvals)")]
    Hvals,

    #[regex(b"(?i:incr)")]
    Incr,

    #[regex(b"(?i:incrby)")]
    Incrby,

    #[regex(b"(?i:incrbyfloat)")]
    Incrbyfloat,

    #[regex(b"(?i:info)")]
    Info,

    #[regex(b"(?i:keys)")]
    Keys,

    #[regex(b"(?i:lastsave)")]
    Lastsave,

    #[regex(b"(?i:lindex)")]
    Lindex,

    #[regex(b"(?i:linsert)")]
    Linsert,

    #[regex(b"(?i:llen)")]
    Llen,

    #[regex(b"(?i:lmove)")]
    Lmove,

    #[regex(b"(?i:lmpop)")]
    Lmpop,

    #[regex(b"(?i:lpop)")]
    Lpop,

    #[regex(b"(?i:lpos)")]
    Lpos,

    #[regex(b"(?i:lpush)")]
    Lpush,

    #[regex(b"(?i:lpushx)")]
    Lpushx,

    #[regex(b"(?i:lrange)")]
    Lrange,

    #[regex(b"(?i:lrem)")]
    Lrem,

    #[regex(b"(?i:lset)")]
    Lset,

    #[regex(b"(?i:ltrim)")]
    Ltrim,

    #[regex(b"(?i:mget)")]
    Mget,

    #[regex(b"(?i:mset)")]
    Mset,

    #[regex(b"(?i:multi)")]
    Multi,

    #[regex(b"(?i:persist)")]
    Persist,

    #[regex(b"(?i:pexpire)")]
    Pexpire,

    #[regex(b"(?i:pexpireat)")]
    Pexpireat,

    #[regex(b"(?i:pexpiretime)")]
    Pexpiretime,

    #[regex(b"(?i:pfadd)")]
    Pfadd,

    #[regex(b"(?i:pfcount)")]
    Pfcount,

    #[regex(b"(?i:pfmerge)")]
    Pfmerge,

    #[regex(b"(?i:ping)")]
    Ping,

    #[regex(b"(?i:psync)")]
    Psync,

    #[regex(b"(?i:pttl)")]
    Pttl,

    #[regex(b"(?i:publish)")]
    Publish,

    #[regex(b"(?i:pubsub)")]
    Pubsub,

    #[regex(b"(?i:quit)")]
    Quit,

    #[regex(b"(?i:randomkey)")]
    Randomkey,

    #[regex(b"(?i:rename)")]
    Rename,

    #[regex(b"(?i:renamenx)")]
    Renamenx,

    #[regex(b"(?i:replconf)")]
    Replconf,

    #[regex(b"(?i:replicaof)")]
    Replicaof,

    #[regex(b"(?i:rpop)")]
    Rpop,

    #[regex(b"(?i:rpush)")]
    Rpush,

    #[regex(b"(?i:rpushx)")]
    Rpushx,

    #[regex(b"(?i:sadd)")]
    Sadd,

    #[regex(b"(?i:save)")]
    Save,

    #[regex(b"(?i:scan)")]
    Scan,

    #[regex(b"(?i:scard)")]
    Scard,

    #[regex(b"(?i:sdiff)")]
    Sdiff,

    #[regex(b"(?i:sdiffstore)")]
    Sdiffstore,

    #[regex(b"(?i:set)")]
    Set,

    #[regex(b"(?i:setbit)")]
    Setbit,

    #[regex(b"(?i:setnx)")]
    Setnx,

    #[regex(b"(?i:setrange)")]
    Setrange,

    #[regex(b"(?i:shutdown)")]
    Shutdown,

    #[regex(b"(?i:sinter)")]
    Sinter,

    #[regex(b"(?i:sinterstore)")]
    Sinterstore,

    #[regex(b"(?i:sismember)")]
    Sismember,

    #[regex(b"(?i:slaveof)")]
    Slaveof,

    #[regex(b"(?i:smembers)")]
    Smembers,

    #[regex(b"(?i:smismember)")]
    Smismember,

    #[regex(b"(?i:smove)")]
    Smove,

    #[regex(b"(?i:spop)")]
    Spop,

    #[regex(b"(?i:srandmember)")]
    Srandmember,

    #[regex(b"(?i:srem)")]
    Srem,

    #[regex(b"(?i:sscan)")]
    Sscan,

    #[regex(b"(?i:strlen)")]
    Strlen,

    #[regex(b"(?i:subscribe)")]
    Subscribe,

    #[regex(b"(?i:sunion)")]
    Sunion,

    #[regex(b"(?i:sunionstore)")]
    Sunionstore,

    #[regex(b"(?i:ttl)")]
    Ttl,

    #[regex(b"(?i:type)")]
    Type,

    #[regex(b"(?i:unlink)")]
    Unlink,

    #[regex(b"(?i:unsubscribe)")]
    Unsubscribe,

    #[regex(b"(?i:unwatch)")]
    Unwatch,

    #[regex(b"(?i:wait)")]
    Wait,

    #[regex(b"(?i:watch)")]
    Watch,

    #[regex(b"(?i:xadd)")]
    Xadd,

    #[regex(b"(?i:xdel)")]
    Xdel,

    #[regex(b"(?i:xlen)")]
    Xlen,

    #[regex(b"(?i:xrange)")]
    Xrange,

    #[regex(b"(?i:xrevrange)")]
    Xrevrange,

    #[regex(b"(?i:xtrim)")]
    Xtrim,

    #[regex(b"(?i:zadd)")]
    Zadd,

    #[regex(b"(?i:zcard)")]
    Zcard,

    #[regex(b"(?i:zcount)")]
    Zcount,

    #[regex(b"(?i:zincrby)")]
    Zincrby,

    #[regex(b"(?i:zmscore)")]
    Zmscore,

    #[regex(b"(?i:zolrestore)")]
    Zolrestore,

    #[regex(b"(?i:zpopmax)")]
    Zpopmax,

    #[regex(b"(?i:zpopmin)")]
    Zpopmin,

    #[regex(b"(?i:zrandmember)")]
    Zrandmember,

    #[regex(b"(?i:zrange)")]
    Zrange,

    #[regex(b"(?i:zrangebyscore)")]
    Zrangebyscore,

    #[regex(b"(?i:zrank)")]
    Zrank,

    #[regex(b"(?i:zrem)")]
    Zrem,

    #[regex(b"(?i:zrevrange)")]
    Zrevrange,

    #[regex(b"(?i:zrevrangebyscore)")]
    Zrevrangebyscore,

    #[regex(b"(?i:zrevrank)")]
    Zrevrank,

    #[regex(b"(?i:zscan)")]
    Zscan,

    #[regex(b"(?i:zscore)")]
    Zscore,

    Unknown,
}

impl CommandKind {
    pub fn command(self) -> &'static Command {
        use CommandKind::*;

        match self {
            Append => &APPEND,
            Bgrewriteaof => &BGREWRITEAOF,
            Bgsave => &BGSAVE,
            Bitcount => &BITCOUNT,
            Bitop => &BITOP,
            Blmove => &BLMOVE,
            Blmpop => &BLMPOP,
            Blpop => &BLPOP,
            Brpop => &BRPOP,
            Bzpopmax => &BZPOPMAX,
            Bzpopmin => &BZPOPMIN,
            Config => &CONFIG,
            Dbsize => &DBSIZE,
            Decr => &DECR,
            Decrby => &DECRBY,
            Del => &DEL,
            Discard => &DISCARD,
            Echo => &ECHO,
            Exec => &EXEC,
            Exists => &EXISTS,
            Expire => &EXPIRE,
            Expireat => &EXPIREAT,
            Expiretime => &EXPIRETIME,
            Flushall => &FLUSHALL,
            Flushdb => &FLUSHDB,
            Get => &GET,
            Getbit => &GETBIT,
            Getdel => &GETDEL,
            Getex => &GETEX,
            Getrange => &GETRANGE,
            Getset => &GETSET,
            Hdel => &HDEL,
            Hexists => &HEXISTS,
            Hget => &HGET,
            Hgetall => &HGETALL,
            Hincrby => &HINCRBY,
            Hincrbyfloat => &HINCRBYFLOAT,
            Hkeys => &HKEYS,
            Hlen => &HLEN,
            Hmget => &HMGET,
            Hmset => &HMSET,
            Hscan => &HSCAN,
            Hset => &HSET,
            Hsetnx => &HSETNX,
            Hstrlen => &HSTRLEN,
            Hvals => &HVALS,
            Incr => &INCR,
            Incrby => &INCRBY,
            Incrbyfloat => &INCRBYFLOAT,
            Info => &INFO,
            Keys => &KEYS,
            Lastsave => &LASTSAVE,
            Lindex => &LINDEX,
            Linsert => &LINSERT,
            Llen => &LLEN,
            Lmove => &LMOVE,
            Lmpop => &LMPOP,
            Lpop => &LPOP,
            Lpos => &LPOS,
            Lpush => &LPUSH,
            Lpushx => &LPUSHX,
            Lrange => &LRANGE,
            Lrem => &LREM,
            Lset => &LSET,
            Ltrim => &LTRIM,
            Mget => &MGET,
            Mset => &MSET,
            Multi => &MULTI,
            Persist => &PERSIST,
            Pexpire => &PEXPIRE,
            Pexpireat => &PEXPIREAT,
            Pexpiretime => &PEXPIRETIME,
            Pfadd => &PFADD,
            Pfcount => &PFCOUNT,
            Pfmerge => &PFMERGE,
            Ping => &PING,
            Psync => &PSYNC,
            Pttl => &PTTL,
            Publish => &PUBLISH,
            Pubsub => &PUBSUB,
            Quit => &QUIT,
            Randomkey => &RANDOMKEY,
            Rename => &RENAME,
            Renamenx => &RENAMENX,
            Replconf => &REPLCONF,
            Replicaof => &REPLICAOF,
            Rpop => &RPOP,
            Rpush => &RPUSH,
            Rpushx => &RPUSHX,
            Sadd => &SADD,
            Save => &SAVE,
            Scan => &SCAN,
            Scard => &SCARD,
            Sdiff => &SDIFF,
            Sdiffstore => &SDIFFSTORE,
            Set => &SET,
            Setbit => &SETBIT,
            Setnx => &SETNX,
            Setrange => &SETRANGE,
            Shutdown => &SHUTDOWN,
            Sinter => &SINTER,
            Sinterstore => &SINTERSTORE,
            Sismember => &SISMEMBER,
            Slaveof => &SLAVEOF,
            Smembers => &SMEMBERS,
            Smismember => &SMISMEMBER,
            Smove => &SMOVE,
            Spop => &SPOP,
            Srandmember => &SRANDMEMBER,
            Srem => &SREM,
            Sscan => &SSCAN,
            Strlen => &STRLEN,
            Subscribe => &SUBSCRIBE,
            Sunion => &SUNION,
            Sunionstore => &SUNIONSTORE,
            Ttl => &TTL,
            Type => &TYPE,
            Unlink => &UNLINK,
            Unsubscribe => &UNSUBSCRIBE,
            Unwatch => &UNWATCH,
            Wait => &WAIT,
            Watch => &WATCH,
            Xadd => &XADD,
            Xdel => &XDEL,
            Xlen => &XLEN,
            Xrange => &XRANGE,
            Xrevrange => &XREVRANGE,
            Xtrim => &XTRIM,
            Zadd => &ZADD,
            Zcard => &ZCARD,
            Zcount => &ZCOUNT,
            Zincrby => &ZINCRBY,
            Zmscore => &ZMSCORE,
            Zolrestore => &ZOLRESTORE,
            Zpopmax => &ZPOPMAX,
            Zpopmin => &ZPOPMIN,
            Zrandmember => &ZRANDMEMBER,
            Zrange => &ZRANGE,
            Zrangebyscore => &ZRANGEBYSCORE,
            Zrank => &ZRANK,
            Zrem => &ZREM,
            Zrevrange => &ZREVRANGE,
            Zrevrangebyscore => &ZREVRANGEBYSCORE,
            Zrevrank => &ZREVRANK,
            Zscan => &ZSCAN,
            Zscore => &ZSCORE,
            Unknown => &UNKNOWN,
        }
    }
}
