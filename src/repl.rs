//! Replication: role and offset bookkeeping, the primary-side replica
//! registry, and the replica-side link task that performs the handshake,
//! loads the full-resync snapshot, and applies the command stream.

use crate::{
    client::{Client, ClientId},
    rdb, resp,
    request::Request,
    store::Store,
};
use bytes::{Bytes, BytesMut};
use hashbrown::HashMap;
use rand::Rng;
use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{info, warn};

/// Whether this instance accepts writes or follows a primary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Primary,
    Replica,
}

/// Primary-side connection state for one replica.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplicaState {
    /// PSYNC received, snapshot being transferred.
    RdbTransfer,

    /// Streaming; counted by WAIT.
    Online,
}

/// A connected replica, as tracked by the primary.
#[derive(Debug)]
pub struct Replica {
    pub state: ReplicaState,
    pub sender: mpsc::UnboundedSender<Bytes>,

    /// The last offset this replica acknowledged, relative to its resync.
    pub ack_offset: u64,

    /// Our offset at the moment of this replica's full resync.
    pub sync_offset: u64,

    pub listening_port: Option<u16>,
}

/// The link to our primary while running as a replica.
#[derive(Debug)]
pub struct PrimaryHandle {
    pub host: String,
    pub port: u16,
    task: JoinHandle<()>,
}

impl PrimaryHandle {
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Process-wide replication state.
#[derive(Debug)]
pub struct ReplState {
    pub role: Role,
    pub replid: String,

    /// Primary: bytes propagated. Replica: bytes applied since resync.
    pub offset: u64,

    pub replicas: HashMap<ClientId, Replica>,

    /// Listening ports announced by REPLCONF before PSYNC arrives.
    pub pending_ports: HashMap<ClientId, u16>,

    pub primary: Option<PrimaryHandle>,
}

impl Default for ReplState {
    fn default() -> Self {
        ReplState {
            role: Role::Primary,
            replid: gen_replid(),
            offset: 0,
            replicas: HashMap::new(),
            pending_ports: HashMap::new(),
            primary: None,
        }
    }
}

impl ReplState {
    /// Queue a command frame to every replica and advance the offset.
    /// Replicas whose connection is gone are dropped.
    pub fn feed(&mut self, frame: &Bytes) {
        self.offset += frame.len() as u64;
        self.replicas
            .retain(|_, replica| replica.sender.send(frame.clone()).is_ok());
    }

    /// Register a replica at full-resync time. Frames fed from this moment
    /// on queue behind the snapshot transfer.
    pub fn register(&mut self, id: ClientId) -> mpsc::UnboundedReceiver<Bytes> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listening_port = self.pending_ports.remove(&id);
        self.replicas.insert(
            id,
            Replica {
                state: ReplicaState::RdbTransfer,
                sender,
                ack_offset: 0,
                sync_offset: self.offset,
                listening_port,
            },
        );
        receiver
    }

    pub fn set_online(&mut self, id: ClientId) {
        if let Some(replica) = self.replicas.get_mut(&id) {
            replica.state = ReplicaState::Online;
        }
    }

    pub fn set_ack(&mut self, id: ClientId, offset: u64) {
        if let Some(replica) = self.replicas.get_mut(&id) {
            replica.ack_offset = replica.ack_offset.max(offset);
        }
    }

    pub fn remove(&mut self, id: ClientId) {
        self.replicas.remove(&id);
        self.pending_ports.remove(&id);
    }

    /// How many replicas have acknowledged everything up to `target`.
    pub fn caught_up(&self, target: u64) -> usize {
        self.replicas
            .values()
            .filter(|replica| replica.sync_offset + replica.ack_offset >= target)
            .count()
    }
}

/// A fresh 40-hex-character replication id.
pub fn gen_replid() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{:016x}{:016x}{:08x}",
        rng.gen::<u64>(),
        rng.gen::<u64>(),
        rng.gen::<u32>()
    )
}

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("replication io: {0}")]
    Io(#[from] io::Error),

    #[error("replication protocol: {0}")]
    Frame(#[from] resp::FrameError),

    #[error("replication snapshot: {0}")]
    Rdb(#[from] rdb::RdbError),

    #[error("connection closed by primary")]
    Closed,

    #[error("unexpected handshake reply")]
    Handshake,
}

/// Spawn the background task that keeps this instance synchronised with a
/// primary.
pub fn spawn_link(store: Arc<Mutex<Store>>, host: String, port: u16) -> PrimaryHandle {
    let task = tokio::spawn(run(store, host.clone(), port));
    PrimaryHandle { host, port, task }
}

async fn run(store: Arc<Mutex<Store>>, host: String, port: u16) {
    loop {
        info!(%host, port, "connecting to primary");
        match sync_and_stream(&store, &host, port).await {
            Ok(()) => info!("primary closed the replication link"),
            Err(error) => warn!(%error, "replication link failed"),
        }
        if store.lock().unwrap().repl.role != Role::Replica {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn send_command(stream: &mut TcpStream, args: &[&[u8]]) -> io::Result<()> {
    let args: Vec<Bytes> = args.iter().map(|a| Bytes::copy_from_slice(a)).collect();
    stream.write_all(&resp::command_bytes(&args)).await
}

async fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<resp::Frame, ReplError> {
    loop {
        if let Some((frame, used)) = resp::decode(&buf[..])? {
            let _ = buf.split_to(used);
            return Ok(frame);
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(ReplError::Closed);
        }
    }
}

async fn expect_status(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> Result<Bytes, ReplError> {
    match read_frame(stream, buf).await? {
        resp::Frame::Simple(line) => Ok(line),
        _ => Err(ReplError::Handshake),
    }
}

/// The replica side of the handshake: PING, REPLCONF, PSYNC, snapshot
/// load, then the streaming loop. Returns when the primary closes the link.
async fn sync_and_stream(store: &Arc<Mutex<Store>>, host: &str, port: u16) -> Result<(), ReplError> {
    let mut stream = TcpStream::connect((host, port)).await?;
    let mut buf = BytesMut::with_capacity(64 * 1024);

    send_command(&mut stream, &[b"PING"]).await?;
    if expect_status(&mut stream, &mut buf).await?[..] != b"PONG"[..] {
        return Err(ReplError::Handshake);
    }

    let my_port = store.lock().unwrap().settings.port.to_string();
    send_command(
        &mut stream,
        &[b"REPLCONF", b"listening-port", my_port.as_bytes()],
    )
    .await?;
    if expect_status(&mut stream, &mut buf).await?[..] != b"OK"[..] {
        return Err(ReplError::Handshake);
    }

    send_command(
        &mut stream,
        &[b"REPLCONF", b"capa", b"eof", b"capa", b"psync2"],
    )
    .await?;
    if expect_status(&mut stream, &mut buf).await?[..] != b"OK"[..] {
        return Err(ReplError::Handshake);
    }

    send_command(&mut stream, &[b"PSYNC", b"?", b"-1"]).await?;
    let line = expect_status(&mut stream, &mut buf).await?;
    let text = std::str::from_utf8(&line).map_err(|_| ReplError::Handshake)?;
    let mut parts = text.split_whitespace();
    if parts.next() != Some("FULLRESYNC") {
        return Err(ReplError::Handshake);
    }
    let replid = parts.next().ok_or(ReplError::Handshake)?.to_string();

    // The snapshot payload: `$<n>\r\n` then exactly n raw bytes, no
    // trailing CRLF.
    let (len, used) = loop {
        if let Some(header) = resp::decode_payload_header(&buf[..])? {
            break header;
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(ReplError::Closed);
        }
    };
    let _ = buf.split_to(used);
    while buf.len() < len {
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(ReplError::Closed);
        }
    }
    let payload = buf.split_to(len);
    let db = rdb::decode(&payload)?;

    {
        let mut store = store.lock().unwrap();
        store.db = db;
        store.repl.replid = replid;
        store.repl.offset = 0;
    }
    info!(keys = store.lock().unwrap().db.len(), "full resync complete");

    // Streaming mode: every frame is a command; apply it and advance the
    // offset by its wire length.
    let mut client = Client::primary(ClientId::next());
    loop {
        while let Some((frame, used)) = resp::decode(&buf[..])? {
            let _ = buf.split_to(used);
            let args = resp::request_args(frame)?;
            if args.is_empty() {
                continue;
            }

            if is_getack(&args) {
                let offset = {
                    let mut store = store.lock().unwrap();
                    store.repl.offset += used as u64;
                    store.repl.offset
                };
                let ack = resp::command_bytes(&[
                    Bytes::from_static(b"REPLCONF"),
                    Bytes::from_static(b"ACK"),
                    Bytes::copy_from_slice(offset.to_string().as_bytes()),
                ]);
                stream.write_all(&ack).await?;
                continue;
            }

            let mut store = store.lock().unwrap();
            client.request = Request::new(args);
            let _ = store.dispatch(&mut client);
            client.out.clear();
            store.repl.offset += used as u64;
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
    }
}

fn is_getack(args: &[Bytes]) -> bool {
    args.len() >= 2
        && args[0].eq_ignore_ascii_case(b"REPLCONF")
        && args[1].eq_ignore_ascii_case(b"GETACK")
}
