use crate::{reply, reply::Reply, request::Request};
use bytes::{Bytes, BytesMut};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A connection identifier, unique for the lifetime of the process.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ClientId(pub u64);

impl ClientId {
    pub fn next() -> Self {
        ClientId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-connection transaction state: MULTI queues the raw frame bytes of
/// each command until EXEC or DISCARD.
#[derive(Debug, Default)]
pub struct Multi {
    pub active: bool,
    pub queue: Vec<Bytes>,
}

impl Multi {
    pub fn clear(&mut self) {
        self.active = false;
        self.queue.clear();
    }
}

/// The state owned by one connection: the request being executed, the reply
/// buffer awaiting flush, and the transaction state.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub addr: Option<SocketAddr>,
    pub request: Request,
    pub out: BytesMut,
    pub multi: Multi,

    /// Commands arriving over the primary link bypass the replica
    /// read-only guard.
    pub primary_link: bool,

    /// Replay mode: the command is re-applied from the append log or the
    /// replication stream and must not propagate again.
    pub replay: bool,
}

impl Client {
    pub fn new(id: ClientId, addr: Option<SocketAddr>) -> Self {
        Client {
            id,
            addr,
            request: Request::default(),
            out: BytesMut::new(),
            multi: Multi::default(),
            primary_link: false,
            replay: false,
        }
    }

    /// A synthetic client used to re-apply commands from the append log.
    /// Nothing it does is logged or propagated again.
    pub fn replayer(id: ClientId) -> Self {
        let mut client = Client::new(id, None);
        client.primary_link = true;
        client.replay = true;
        client
    }

    /// The client representing the stream from our primary. Its writes are
    /// appended to the local log but never fan out again.
    pub fn primary(id: ClientId) -> Self {
        let mut client = Client::new(id, None);
        client.primary_link = true;
        client
    }

    /// Write one reply element onto the output buffer.
    pub fn reply(&mut self, reply: impl Into<Reply>) {
        reply::write(&mut self.out, reply.into());
    }

    /// Take the buffered output for flushing.
    pub fn drain_out(&mut self) -> Bytes {
        self.out.split().freeze()
    }
}
