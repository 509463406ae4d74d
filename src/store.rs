mod watching;

pub use watching::Watching;

use crate::{
    aof::Aof,
    client::{Client, ClientId},
    command::{Action, CommandKind},
    config::Settings,
    db::Db,
    pubsub::Pubsub,
    repl::{ReplState, Role},
    reply::ReplyError,
    request::Request,
    resp,
    time::now_ms,
};
use bytes::Bytes;
use hashbrown::HashMap;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, Weak},
};
use tracing::warn;

/// The most scan cursors kept alive at once; the oldest is retired first.
const CURSOR_LIMIT: usize = 1024;

/// Server-side scan cursor table. A cursor token maps to the last element
/// handed out, so a continuation resumes strictly after it; abandoned
/// cursors age out.
#[derive(Debug, Default)]
pub struct Cursors {
    next: u64,
    table: HashMap<u64, Bytes>,
    order: VecDeque<u64>,
}

impl Cursors {
    /// Mint a token resuming after `position`.
    pub fn save(&mut self, position: Bytes) -> u64 {
        while self.table.len() >= CURSOR_LIMIT {
            match self.order.pop_front() {
                Some(old) => {
                    self.table.remove(&old);
                }
                None => break,
            }
        }
        self.next += 1;
        let token = self.next;
        self.table.insert(token, position);
        self.order.push_back(token);
        token
    }

    /// Redeem a token. Tokens are single-use; an unknown or expired token
    /// yields `None` and the scan reports completion.
    pub fn take(&mut self, token: u64) -> Option<Bytes> {
        self.order.retain(|t| *t != token);
        self.table.remove(&token)
    }
}

/// The process-wide state: keyspace, hub, watchers, replication, config and
/// persistence handles. One instance lives behind a single coarse lock; a
/// command body runs to completion under it, which is what serialises the
/// executor.
#[derive(Debug)]
pub struct Store {
    pub db: Db,
    pub pubsub: Pubsub,
    pub watching: Watching,
    pub repl: ReplState,
    pub aof: Option<Aof>,
    pub settings: Settings,
    pub cursors: Cursors,

    /// Changes since startup; the delta across one command decides whether
    /// it propagates.
    pub dirty: u64,

    /// Changes not yet captured by a snapshot.
    pub dirty_since_save: u64,

    pub numcommands: u64,
    pub numconnections: u64,
    pub last_save: u128,
    pub start_time: u128,

    /// When set by a handler, these frames propagate instead of the
    /// command as received (resolved non-deterministic writes).
    pub propagate_override: Option<Vec<Vec<Bytes>>>,

    /// Back-reference for handlers that spawn tasks (REPLICAOF, BGSAVE).
    pub shared: Weak<Mutex<Store>>,
}

impl Store {
    pub fn new(settings: Settings) -> Self {
        Store {
            db: Db::default(),
            pubsub: Pubsub::default(),
            watching: Watching::default(),
            repl: ReplState::default(),
            aof: None,
            settings,
            cursors: Cursors::default(),
            dirty: 0,
            dirty_since_save: 0,
            numcommands: 0,
            numconnections: 0,
            last_save: now_ms(),
            start_time: now_ms(),
            propagate_override: None,
            shared: Weak::new(),
        }
    }

    /// Wrap the store for the server, wiring up the self-reference.
    pub fn into_shared(self) -> Arc<Mutex<Store>> {
        let shared = Arc::new(Mutex::new(self));
        shared.lock().unwrap().shared = Arc::downgrade(&shared);
        shared
    }

    /// Record a write to `key` for WATCH bookkeeping.
    pub fn touch(&mut self, key: &[u8]) {
        self.watching.touch(key);
    }

    /// Note an effective change; drives propagation and snapshot bookkeeping.
    pub fn mark_dirty(&mut self) {
        self.dirty += 1;
        self.dirty_since_save += 1;
    }

    /// Run the client's current request: the full executor path including
    /// transaction queueing.
    pub fn dispatch(&mut self, client: &mut Client) -> Option<Action> {
        self.numcommands += 1;
        let command = client.request.command;

        // Queueing comes first: inside MULTI even a bad command is queued
        // and reports its error when it actually runs.
        if client.multi.active && command.queueable() {
            let frame = resp::command_bytes(client.request.all());
            client.multi.queue.push(frame);
            client.reply("QUEUED");
            return None;
        }

        if command.kind == CommandKind::Unknown {
            let name = client.request.name();
            client.reply(ReplyError::UnknownCommand(name));
            return None;
        }

        self.execute(client)
    }

    /// Run the current request without transaction queueing: the shared
    /// path for direct dispatch, EXEC bodies, log replay and the
    /// replication stream.
    pub fn execute(&mut self, client: &mut Client) -> Option<Action> {
        let command = client.request.command;

        if !client.request.is_valid() {
            let error = client.request.wrong_arguments();
            client.reply(error);
            return None;
        }

        if command.write && self.repl.role == Role::Replica && !client.primary_link {
            client.reply(ReplyError::Readonly);
            return None;
        }

        let args: Vec<Bytes> = client.request.all().to_vec();
        let before = self.dirty;
        self.propagate_override = None;

        match (command.run)(client, self) {
            Ok(action) => {
                if command.write && self.dirty > before && !client.replay {
                    match self.propagate_override.take() {
                        Some(frames) => {
                            for frame in frames {
                                self.log_and_propagate(&frame);
                            }
                        }
                        None => self.log_and_propagate(&args),
                    }
                }
                action
            }
            Err(reply) => {
                client.reply(reply);
                None
            }
        }
    }

    /// Propagate the resolved form of the running command instead of its
    /// original arguments.
    pub fn propagate_as(&mut self, args: Vec<Bytes>) {
        self.propagate_override
            .get_or_insert_with(Vec::new)
            .push(args);
    }

    fn log_and_propagate(&mut self, args: &[Bytes]) {
        let frame = resp::command_bytes(args);

        if self.settings.appendonly {
            if let Some(aof) = self.aof.as_mut() {
                let fsync = self.settings.appendfsync;
                if let Err(error) = aof.append(&frame, fsync) {
                    warn!(%error, "append-only log write failed");
                }
            }
        }

        if self.repl.role == Role::Primary {
            self.repl.feed(&frame);
        }
    }

    /// Re-apply a command from the append log. Nothing is logged or
    /// propagated again and the reply is discarded.
    pub fn execute_replay(&mut self, args: Vec<Bytes>) {
        let mut client = Client::replayer(ClientId::next());
        client.request = Request::new(args);
        let _ = self.execute(&mut client);
    }

    /// Toggle the append log at runtime.
    pub fn set_appendonly(&mut self, enabled: bool) {
        self.settings.appendonly = enabled;
        if enabled {
            if self.aof.is_none() {
                match Aof::open(self.settings.aof_path()) {
                    Ok(aof) => self.aof = Some(aof),
                    Err(error) => warn!(%error, "could not open append log"),
                }
            }
        } else {
            self.aof = None;
        }
    }

    /// Write a snapshot now and reset the save bookkeeping.
    pub fn save_snapshot(&mut self) -> Result<(), crate::rdb::RdbError> {
        crate::rdb::save(&self.db, &self.settings.rdb_path())?;
        self.last_save = now_ms();
        self.dirty_since_save = 0;
        Ok(())
    }

    /// Forget the per-connection state of a closed connection.
    pub fn disconnect(&mut self, id: ClientId) {
        self.pubsub.disconnect(id);
        self.watching.remove(id);
        self.repl.remove(id);
    }
}
