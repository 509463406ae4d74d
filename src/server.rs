use crate::{
    aof,
    client::{Client, ClientId},
    command::Action,
    config::{Appendfsync, Settings},
    rdb, repl, resp,
    request::Request,
    store::Store,
};
use bytes::BytesMut;
use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::Notify,
    time::{sleep, Duration, Instant},
};
use tracing::{debug, info};

/// The main interface for starting a server: owns the shared store and
/// drives one task per client connection.
pub struct Server {
    store: Arc<Mutex<Store>>,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        Server {
            store: Store::new(settings).into_shared(),
        }
    }

    /// Build a server from persisted state: load the snapshot (corruption
    /// is fatal), replay the append log, and optionally attach to a
    /// primary. Must run inside the runtime.
    pub fn bootstrap(settings: Settings, replicaof: Option<(String, u16)>) -> io::Result<Server> {
        let mut store = Store::new(settings);

        match rdb::load(&store.settings.rdb_path()) {
            Ok(Some(db)) => store.db = db,
            Ok(None) => {}
            Err(error) => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, error.to_string()));
            }
        }

        if store.settings.appendonly {
            let path = store.settings.aof_path();
            aof::replay(&path, &mut store)?;
            store.set_appendonly(true);
        }

        let server = Server {
            store: store.into_shared(),
        };

        if let Some((host, port)) = replicaof {
            let mut store = server.store.lock().unwrap();
            store.repl.role = repl::Role::Replica;
            store.repl.primary = Some(repl::spawn_link(server.store.clone(), host, port));
        }

        Ok(server)
    }

    /// Accept connections forever.
    pub async fn run(&self, listener: TcpListener) -> io::Result<()> {
        self.spawn_fsync_timer();
        info!(addr = %listener.local_addr()?, "listening");

        loop {
            let (stream, addr) = listener.accept().await?;
            let store = self.store.clone();
            tokio::spawn(async move {
                let id = ClientId::next();
                if let Err(error) = connection(&store, stream, addr, id).await {
                    debug!(%error, "connection ended");
                }
                store.lock().unwrap().disconnect(id);
            });
        }
    }

    /// The everysec fsync policy flushes the append log from a timer.
    fn spawn_fsync_timer(&self) {
        let store = Arc::downgrade(&self.store);
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(1)).await;
                let Some(store) = store.upgrade() else { return };
                let mut store = store.lock().unwrap();
                if store.settings.appendfsync == Appendfsync::Everysec {
                    if let Some(aof) = store.aof.as_mut() {
                        let _ = aof.sync();
                    }
                }
            }
        });
    }
}

async fn connection(
    store: &Arc<Mutex<Store>>,
    stream: TcpStream,
    addr: SocketAddr,
    id: ClientId,
) -> io::Result<()> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let notify = Arc::new(Notify::new());
    {
        let mut store = store.lock().unwrap();
        store.numconnections += 1;
        store.pubsub.register(id, notify.clone());
    }

    let mut client = Client::new(id, Some(addr));
    let mut buf = BytesMut::with_capacity(16 * 1024);

    loop {
        if !client.out.is_empty() {
            let out = client.drain_out();
            writer.write_all(&out).await?;
        }

        tokio::select! {
            read = reader.read_buf(&mut buf) => {
                if read? == 0 {
                    return Ok(());
                }
                loop {
                    match resp::decode(&buf[..]) {
                        Ok(Some((frame, used))) => {
                            let _ = buf.split_to(used);
                            let args = match resp::request_args(frame) {
                                Ok(args) => args,
                                Err(error) => return protocol_error(&mut writer, error).await,
                            };
                            if args.is_empty() {
                                continue;
                            }
                            client.request = Request::new(args);
                            let action = store.lock().unwrap().dispatch(&mut client);
                            match action {
                                None => {}
                                Some(Action::Quit) => {
                                    let out = client.drain_out();
                                    writer.write_all(&out).await?;
                                    return Ok(());
                                }
                                Some(Action::Wait { numreplicas, target, deadline }) => {
                                    let count =
                                        wait_for_acks(store, numreplicas, target, deadline).await;
                                    client.reply(count);
                                }
                                Some(Action::FullResync) => {
                                    return replica_feed(store, reader, writer, buf, id).await;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(error) => return protocol_error(&mut writer, error).await,
                    }
                }
            }
            _ = notify.notified() => {
                store.lock().unwrap().pubsub.drain(id, &mut client.out);
            }
        }
    }
}

/// A framing violation closes the connection after one final error line.
async fn protocol_error(writer: &mut OwnedWriteHalf, error: resp::FrameError) -> io::Result<()> {
    let line = format!("-ERR Protocol error: {error}\r\n");
    let _ = writer.write_all(line.as_bytes()).await;
    Ok(())
}

/// Poll the replica acks until enough catch up or the deadline lapses.
async fn wait_for_acks(
    store: &Arc<Mutex<Store>>,
    numreplicas: usize,
    target: u64,
    deadline: Instant,
) -> usize {
    loop {
        let count = store.lock().unwrap().repl.caught_up(target);
        if count >= numreplicas || Instant::now() >= deadline {
            return count;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// PSYNC turns the connection into a replica feed: FULLRESYNC header, the
/// bulk-framed snapshot (no trailing CRLF), then the command stream, with
/// REPLCONF ACK lines read back.
async fn replica_feed(
    store: &Arc<Mutex<Store>>,
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut buf: BytesMut,
    id: ClientId,
) -> io::Result<()> {
    let (header, image, mut receiver) = {
        let mut store = store.lock().unwrap();
        let receiver = store.repl.register(id);
        let image = rdb::encode(&store.db);
        let header = format!(
            "+FULLRESYNC {} {}\r\n${}\r\n",
            store.repl.replid,
            store.repl.offset,
            image.len(),
        );
        (header, image, receiver)
    };

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&image).await?;
    store.lock().unwrap().repl.set_online(id);
    info!(id = id.0, "replica online");

    loop {
        tokio::select! {
            frame = receiver.recv() => {
                match frame {
                    Some(frame) => writer.write_all(&frame).await?,
                    None => return Ok(()),
                }
            }
            read = reader.read_buf(&mut buf) => {
                if read? == 0 {
                    return Ok(());
                }
                loop {
                    match resp::decode(&buf[..]) {
                        Ok(Some((frame, used))) => {
                            let _ = buf.split_to(used);
                            let Ok(args) = resp::request_args(frame) else {
                                return Ok(());
                            };
                            if args.len() == 3
                                && args[0].eq_ignore_ascii_case(b"REPLCONF")
                                && args[1].eq_ignore_ascii_case(b"ACK")
                            {
                                if let Some(offset) = crate::bytes::parse(&args[2]) {
                                    store.lock().unwrap().repl.set_ack(id, offset);
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(_) => return Ok(()),
                    }
                }
            }
        }
    }
}
