//! The append-only log: every effective write command, serialised as a RESP
//! array, concatenated with no framing between records. Replay feeds the
//! records back through the executor; rewrite replaces the log with a
//! minimal command sequence reproducing the current keyspace.

use crate::{
    bytes::format_f64,
    config::Appendfsync,
    db::{Db, Value},
    resp,
    store::Store,
};
use bytes::Bytes;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub struct Aof {
    path: PathBuf,
    file: File,
}

impl std::fmt::Debug for Aof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aof").field("path", &self.path).finish()
    }
}

impl Aof {
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Aof { path, file })
    }

    /// Append one already-encoded command frame.
    pub fn append(&mut self, frame: &[u8], fsync: Appendfsync) -> io::Result<()> {
        self.file.write_all(frame)?;
        if fsync == Appendfsync::Always {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Flush to disk; the everysec policy calls this from a timer.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Replace the log with the compact form of `db`, atomically.
    pub fn rewrite(&mut self, db: &Db) -> io::Result<()> {
        let mut image = Vec::new();
        for args in rewrite_commands(db) {
            image.extend_from_slice(&resp::command_bytes(&args));
        }

        let tmp = self.path.with_extension(format!("tmp-{}", std::process::id()));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&image)?;
            file.sync_all()?;
        }
        if let Err(error) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(error);
        }
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        info!(path = %self.path.display(), bytes = image.len(), "append log rewritten");
        Ok(())
    }
}

fn arg(text: &str) -> Bytes {
    Bytes::copy_from_slice(text.as_bytes())
}

/// The minimal command sequence reproducing `db`: one constructor per key
/// (per entry for streams), plus PEXPIREAT for volatile keys.
pub fn rewrite_commands(db: &Db) -> Vec<Vec<Bytes>> {
    let mut commands = Vec::new();

    for (key, value, expires_at) in db.entries() {
        match value {
            Value::Str(s) => {
                commands.push(vec![arg("SET"), key.clone(), Bytes::copy_from_slice(s.as_bytes())]);
            }
            Value::List(l) => {
                let mut args = vec![arg("RPUSH"), key.clone()];
                args.extend(l.iter().cloned());
                commands.push(args);
            }
            Value::Set(s) => {
                let mut args = vec![arg("SADD"), key.clone()];
                args.extend(s.iter().cloned());
                commands.push(args);
            }
            Value::Hash(h) => {
                let mut args = vec![arg("HSET"), key.clone()];
                for (field, value) in h.iter() {
                    args.push(field.clone());
                    args.push(value.clone());
                }
                commands.push(args);
            }
            Value::Zset(z) => {
                let mut args = vec![arg("ZADD"), key.clone()];
                for (score, member) in z.items() {
                    args.push(arg(&format_f64(score.into_inner())));
                    args.push(member.clone());
                }
                commands.push(args);
            }
            Value::Stream(s) => {
                for entry in s.entries() {
                    let mut args = vec![arg("XADD"), key.clone(), arg(&entry.id.to_string())];
                    for (field, value) in &entry.fields {
                        args.push(field.clone());
                        args.push(value.clone());
                    }
                    commands.push(args);
                }
                // Restore the id fence when it outruns the remaining
                // entries (or the stream is empty).
                let tail = s.entries().last().map(|e| e.id);
                if tail != Some(s.last_id) {
                    let id = arg(&s.last_id.to_string());
                    commands.push(vec![arg("XADD"), key.clone(), id.clone(), arg("x"), arg("x")]);
                    commands.push(vec![arg("XDEL"), key.clone(), id]);
                }
            }
            Value::Hll(h) => {
                commands.push(vec![
                    arg("ZOLRESTORE"),
                    key.clone(),
                    arg("6"),
                    Bytes::copy_from_slice(h.as_bytes()),
                ]);
            }
        }

        if let Some(at) = expires_at {
            commands.push(vec![arg("PEXPIREAT"), key.clone(), arg(&at.to_string())]);
        }
    }

    commands
}

/// Replay a log file through the executor in replay mode. Returns the number
/// of commands applied; a truncated or malformed tail terminates the replay
/// cleanly.
pub fn replay(path: &Path, store: &mut Store) -> io::Result<usize> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(error),
    };

    let mut applied = 0;
    let mut pos = 0;
    let mut clean = true;
    while pos < buf.len() {
        match resp::decode(&buf[pos..]) {
            Ok(Some((frame, used))) => {
                pos += used;
                match resp::request_args(frame) {
                    Ok(args) if !args.is_empty() => {
                        store.execute_replay(args);
                        applied += 1;
                    }
                    _ => {
                        warn!(offset = pos, "append log record is not a command; stopping replay");
                        clean = false;
                        break;
                    }
                }
            }
            Ok(None) => {
                warn!(offset = pos, "append log ends mid-record; stopping replay");
                clean = false;
                break;
            }
            Err(error) => {
                warn!(%error, offset = pos, "append log corrupt; stopping replay");
                clean = false;
                break;
            }
        }
    }

    // Drop the unparseable tail so later appends land on a record boundary.
    if !clean {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(pos as u64)?;
        file.sync_all()?;
    }

    info!(path = %path.display(), applied, "append log replayed");
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Edge, IdSpec, StreamId, StrValue};
    use crate::time::now_ms;
    use ordered_float::NotNan;

    fn bytes(text: &str) -> Bytes {
        Bytes::copy_from_slice(text.as_bytes())
    }

    #[test]
    fn rewrite_is_minimal() {
        let mut db = Db::default();
        db.set(bytes("s"), StrValue::from(&b"v"[..]));
        let list = db.list_or_default(&bytes("l")).unwrap();
        list.push(Edge::Right, bytes("a"));
        list.push(Edge::Right, bytes("b"));
        db.expire(b"s", now_ms() + 60_000);

        let commands = rewrite_commands(&db);
        // One constructor per key plus one PEXPIREAT.
        assert_eq!(commands.len(), 3);
        let names: Vec<_> = commands.iter().map(|c| c[0].clone()).collect();
        assert!(names.contains(&bytes("SET")));
        assert!(names.contains(&bytes("RPUSH")));
        assert!(names.contains(&bytes("PEXPIREAT")));
    }

    #[test]
    fn rewrite_preserves_stream_fence() {
        let mut db = Db::default();
        let stream = db.stream_or_default(&bytes("st")).unwrap();
        stream
            .add(IdSpec::Exact(StreamId::new(5, 0)), vec![(bytes("f"), bytes("v"))], 0)
            .unwrap();
        stream
            .add(IdSpec::Exact(StreamId::new(9, 0)), vec![(bytes("f"), bytes("v"))], 0)
            .unwrap();
        stream.delete(&[StreamId::new(9, 0)]);

        let commands = rewrite_commands(&db);
        let names: Vec<_> = commands.iter().map(|c| c[0].clone()).collect();
        assert_eq!(
            names,
            vec![bytes("XADD"), bytes("XADD"), bytes("XDEL")],
        );
        // The synthetic entry carries the fencing id.
        assert_eq!(commands[1][2], bytes("9-0"));
    }

    #[test]
    fn zadd_scores_round_trip() {
        let mut db = Db::default();
        let zset = db.zset_or_default(&bytes("z")).unwrap();
        zset.upsert(bytes("m"), NotNan::new(1.25).unwrap());
        let commands = rewrite_commands(&db);
        assert_eq!(commands[0][2], bytes("1.25"));
    }
}
