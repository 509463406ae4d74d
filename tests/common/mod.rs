//! Shared harness for the end-to-end suites: a server on an ephemeral port
//! and a minimal RESP client speaking over a real TCP connection.

// Each test binary uses a different subset of this module.
#![allow(dead_code)]

use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::{sleep, timeout, Duration},
};
use zoltraak::{Server, Settings};

/// Start a default server on an ephemeral port.
pub async fn start() -> SocketAddr {
    start_with(Settings::default(), None).await
}

/// Start a server with custom settings, optionally replicating a primary.
/// The settings' port is fixed up to the actual bound port.
pub async fn start_with(mut settings: Settings, replicaof: Option<(String, u16)>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    settings.port = addr.port();
    let server = Server::bootstrap(settings, replicaof).unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });
    addr
}

/// One client connection with its own read buffer.
pub struct Conn {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Conn {
    pub async fn open(addr: SocketAddr) -> Conn {
        let stream = TcpStream::connect(addr).await.unwrap();
        Conn {
            stream,
            buf: Vec::new(),
        }
    }

    /// Send one command and read one reply, returned as raw protocol bytes.
    pub async fn cmd(&mut self, args: &[&str]) -> Vec<u8> {
        self.send(args).await;
        self.read_frame().await
    }

    pub async fn send(&mut self, args: &[&str]) {
        let mut frame = format!("*{}\r\n", args.len()).into_bytes();
        for arg in args {
            frame.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            frame.extend_from_slice(arg.as_bytes());
            frame.extend_from_slice(b"\r\n");
        }
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Read exactly one RESP frame.
    pub async fn read_frame(&mut self) -> Vec<u8> {
        timeout(Duration::from_secs(5), async {
            loop {
                if let Some(len) = frame_len(&self.buf) {
                    let frame = self.buf[..len].to_vec();
                    self.buf.drain(..len);
                    return frame;
                }
                let mut chunk = [0u8; 4096];
                let n = self.stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed mid-frame");
                self.buf.extend_from_slice(&chunk[..n]);
            }
        })
        .await
        .expect("timed out waiting for a reply")
    }

    /// The raw stream, for tests that need to write invalid bytes.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Run a command and assert the exact reply bytes.
    pub async fn expect(&mut self, args: &[&str], reply: &[u8]) {
        let got = self.cmd(args).await;
        assert_eq!(
            got,
            reply,
            "command {:?}: got {:?}, want {:?}",
            args,
            String::from_utf8_lossy(&got),
            String::from_utf8_lossy(reply),
        );
    }
}

/// The byte length of the first complete frame in `buf`, if any.
fn frame_len(buf: &[u8]) -> Option<usize> {
    fn line_end(buf: &[u8], from: usize) -> Option<usize> {
        let at = buf[from..].windows(2).position(|w| w == b"\r\n")?;
        Some(from + at + 2)
    }

    fn value(buf: &[u8], at: usize) -> Option<usize> {
        let prefix = *buf.get(at)?;
        let end = line_end(buf, at + 1)?;
        match prefix {
            b'+' | b'-' | b':' => Some(end),
            b'$' => {
                let n: i64 = std::str::from_utf8(&buf[at + 1..end - 2]).ok()?.parse().ok()?;
                if n < 0 {
                    return Some(end);
                }
                let total = end + usize::try_from(n).ok()? + 2;
                (buf.len() >= total).then_some(total)
            }
            b'*' => {
                let n: i64 = std::str::from_utf8(&buf[at + 1..end - 2]).ok()?.parse().ok()?;
                if n < 0 {
                    return Some(end);
                }
                let mut at = end;
                for _ in 0..n {
                    at = value(buf, at)?;
                }
                Some(at)
            }
            _ => None,
        }
    }

    value(buf, 0)
}

/// Poll until `check` passes or a few seconds elapse.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("condition did not become true in time");
}

/// A scratch directory unique to this test.
pub fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("zoltraak-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
