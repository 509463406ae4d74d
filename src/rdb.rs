//! Snapshot persistence: a length-prefixed little-endian binary image of the
//! keyspace with a CRC-32 trailer, written atomically via a sibling temp
//! file and rename.

use crate::{
    db::{Db, HashValue, HyperLogLog, ListValue, SetValue, SortedSet, StreamId, StrValue, Value,
        REGISTERS},
    db::{Edge, IdSpec, StreamValue},
    time::now_ms,
};
use bytes::Bytes;
use crc::{Crc, CRC_32_ISO_HDLC};
use ordered_float::NotNan;
use std::{
    fs,
    io::{self, Write},
    path::Path,
};
use thiserror::Error;
use tracing::info;

pub const MAGIC: &[u8; 8] = b"ZOLTRDB1";
pub const VERSION: u8 = 1;

const EOF_TAG: u8 = 0xFF;
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const TAG_STRING: u8 = 0;
const TAG_LIST: u8 = 1;
const TAG_SET: u8 = 2;
const TAG_HASH: u8 = 3;
const TAG_ZSET: u8 = 4;
const TAG_STREAM: u8 = 5;
const TAG_HLL: u8 = 6;

#[derive(Debug, Error)]
pub enum RdbError {
    #[error("snapshot io: {0}")]
    Io(#[from] io::Error),

    #[error("not a snapshot file")]
    Magic,

    #[error("unsupported snapshot version {0}")]
    Version(u8),

    #[error("snapshot checksum mismatch")]
    Checksum,

    #[error("snapshot truncated")]
    Truncated,

    #[error("unknown value tag {0:#04x}")]
    Tag(u8),

    #[error("corrupt value payload")]
    Payload,
}

fn put_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&u32::try_from(data.len()).unwrap_or(u32::MAX).to_le_bytes());
    out.extend_from_slice(data);
}

fn put_count(out: &mut Vec<u8>, count: usize) {
    out.extend_from_slice(&u32::try_from(count).unwrap_or(u32::MAX).to_le_bytes());
}

fn value_tag(value: &Value) -> u8 {
    match value {
        Value::Str(_) => TAG_STRING,
        Value::List(_) => TAG_LIST,
        Value::Set(_) => TAG_SET,
        Value::Hash(_) => TAG_HASH,
        Value::Zset(_) => TAG_ZSET,
        Value::Stream(_) => TAG_STREAM,
        Value::Hll(_) => TAG_HLL,
    }
}

/// Encode one value payload, without the tag byte.
pub fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Str(s) => put_bytes(out, s.as_bytes()),
        Value::List(l) => {
            put_count(out, l.len());
            for item in l.iter() {
                put_bytes(out, item);
            }
        }
        Value::Set(s) => {
            put_count(out, s.len());
            for member in s.iter() {
                put_bytes(out, member);
            }
        }
        Value::Hash(h) => {
            put_count(out, h.len());
            for (field, value) in h.iter() {
                put_bytes(out, field);
                put_bytes(out, value);
            }
        }
        Value::Zset(z) => {
            put_count(out, z.len());
            for (score, member) in z.items() {
                out.extend_from_slice(&score.into_inner().to_bits().to_le_bytes());
                put_bytes(out, member);
            }
        }
        Value::Stream(s) => {
            put_count(out, s.len());
            for entry in s.entries() {
                out.extend_from_slice(&entry.id.ms.to_le_bytes());
                out.extend_from_slice(&entry.id.seq.to_le_bytes());
                put_count(out, entry.fields.len());
                for (field, value) in &entry.fields {
                    put_bytes(out, field);
                    put_bytes(out, value);
                }
            }
            out.extend_from_slice(&s.last_id.ms.to_le_bytes());
            out.extend_from_slice(&s.last_id.seq.to_le_bytes());
        }
        Value::Hll(h) => out.extend_from_slice(h.as_bytes()),
    }
}

/// Encode the whole keyspace.
pub fn encode(db: &Db) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);

    for (key, value, expires_at) in db.entries() {
        out.push(value_tag(value));
        match expires_at {
            Some(at) => {
                out.push(1);
                out.extend_from_slice(&i64::try_from(at).unwrap_or(i64::MAX).to_le_bytes());
            }
            None => out.push(0),
        }
        put_bytes(&mut out, key);
        encode_value(value, &mut out);
    }

    out.push(EOF_TAG);
    let checksum = CRC32.checksum(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    out
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8, RdbError> {
        let byte = *self.buf.get(self.pos).ok_or(RdbError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn slice(&mut self, len: usize) -> Result<&'a [u8], RdbError> {
        if self.buf.len() - self.pos < len {
            return Err(RdbError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, RdbError> {
        let bytes = self.slice(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("four bytes")))
    }

    fn u64(&mut self) -> Result<u64, RdbError> {
        let bytes = self.slice(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("eight bytes")))
    }

    fn i64(&mut self) -> Result<i64, RdbError> {
        let bytes = self.slice(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("eight bytes")))
    }

    fn bytes(&mut self) -> Result<Bytes, RdbError> {
        let len = self.u32()? as usize;
        Ok(Bytes::copy_from_slice(self.slice(len)?))
    }
}

/// Decode one value payload for `tag` from a standalone buffer, as the
/// append-log restore command does.
pub fn decode_value_payload(tag: u8, payload: &[u8]) -> Result<Value, RdbError> {
    let mut reader = Reader {
        buf: payload,
        pos: 0,
    };
    decode_value(tag, &mut reader)
}

/// Decode one value payload for `tag`.
fn decode_value(tag: u8, reader: &mut Reader) -> Result<Value, RdbError> {
    match tag {
        TAG_STRING => {
            let data = reader.bytes()?;
            Ok(Value::Str(StrValue::from(data)))
        }
        TAG_LIST => {
            let count = reader.u32()?;
            let mut list = ListValue::default();
            for _ in 0..count {
                list.push(Edge::Right, reader.bytes()?);
            }
            Ok(list.into())
        }
        TAG_SET => {
            let count = reader.u32()?;
            let mut set = SetValue::default();
            for _ in 0..count {
                set.add(reader.bytes()?);
            }
            Ok(set.into())
        }
        TAG_HASH => {
            let count = reader.u32()?;
            let mut hash = HashValue::default();
            for _ in 0..count {
                let field = reader.bytes()?;
                let value = reader.bytes()?;
                hash.set(field, value);
            }
            Ok(hash.into())
        }
        TAG_ZSET => {
            let count = reader.u32()?;
            let mut zset = SortedSet::default();
            for _ in 0..count {
                let score = f64::from_bits(reader.u64()?);
                let member = reader.bytes()?;
                let score = NotNan::new(score).map_err(|_| RdbError::Payload)?;
                zset.upsert(member, score);
            }
            Ok(zset.into())
        }
        TAG_STREAM => {
            let count = reader.u32()?;
            let mut stream = StreamValue::default();
            for _ in 0..count {
                let ms = reader.u64()?;
                let seq = reader.u64()?;
                let fields = reader.u32()?;
                let mut pairs = Vec::with_capacity(fields as usize);
                for _ in 0..fields {
                    let field = reader.bytes()?;
                    let value = reader.bytes()?;
                    pairs.push((field, value));
                }
                stream
                    .add(IdSpec::Exact(StreamId::new(ms, seq)), pairs, 0)
                    .map_err(|_| RdbError::Payload)?;
            }
            stream.last_id = StreamId::new(reader.u64()?, reader.u64()?);
            Ok(stream.into())
        }
        TAG_HLL => {
            let registers = reader.slice(REGISTERS)?;
            let sketch = HyperLogLog::from_bytes(registers).ok_or(RdbError::Payload)?;
            Ok(sketch.into())
        }
        other => Err(RdbError::Tag(other)),
    }
}

/// Decode a snapshot image into a keyspace. The magic, version and checksum
/// are verified before any entry is admitted; entries whose recorded expiry
/// has already passed are skipped.
pub fn decode(buf: &[u8]) -> Result<Db, RdbError> {
    if buf.len() < MAGIC.len() + 1 + 1 + 4 {
        return Err(RdbError::Truncated);
    }
    if &buf[..MAGIC.len()] != MAGIC {
        return Err(RdbError::Magic);
    }
    let version = buf[MAGIC.len()];
    if version != VERSION {
        return Err(RdbError::Version(version));
    }

    let body_len = buf.len() - 4;
    let recorded = u32::from_le_bytes(buf[body_len..].try_into().expect("four bytes"));
    if CRC32.checksum(&buf[..body_len]) != recorded {
        return Err(RdbError::Checksum);
    }

    let mut reader = Reader {
        buf: &buf[..body_len],
        pos: MAGIC.len() + 1,
    };
    let mut db = Db::default();
    let now = now_ms();

    loop {
        let tag = reader.u8()?;
        if tag == EOF_TAG {
            break;
        }
        let expires_at = match reader.u8()? {
            0 => None,
            _ => Some(u128::try_from(reader.i64()?.max(0)).unwrap_or(0)),
        };
        let key = reader.bytes()?;
        let value = decode_value(tag, &mut reader)?;
        if expires_at.is_some_and(|at| at <= now) {
            continue;
        }
        db.restore(key, value, expires_at);
    }

    Ok(db)
}

/// Write the snapshot atomically: sibling temp file, fsync, rename.
pub fn save(db: &Db, path: &Path) -> Result<(), RdbError> {
    let image = encode(db);
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&image)?;
        file.sync_all()?;
    }
    if let Err(error) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(error.into());
    }
    info!(path = %path.display(), bytes = image.len(), "snapshot saved");
    Ok(())
}

/// Load a snapshot, `Ok(None)` when no file exists.
pub fn load(path: &Path) -> Result<Option<Db>, RdbError> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let db = decode(&buf)?;
    info!(path = %path.display(), keys = db.len(), "snapshot loaded");
    Ok(Some(db))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScoreBound;

    fn bytes(text: &str) -> Bytes {
        Bytes::copy_from_slice(text.as_bytes())
    }

    fn sample_db() -> Db {
        let mut db = Db::default();
        db.set(bytes("s"), StrValue::from(&b"hello\r\nworld"[..]));

        let list = db.list_or_default(&bytes("l")).unwrap();
        list.push(Edge::Right, bytes("a"));
        list.push(Edge::Right, bytes("b"));

        let set = db.set_or_default(&bytes("set")).unwrap();
        set.add(bytes("x"));
        set.add(bytes("y"));

        let hash = db.hash_or_default(&bytes("h")).unwrap();
        hash.set(bytes("f"), bytes("v"));

        let zset = db.zset_or_default(&bytes("z")).unwrap();
        zset.upsert(bytes("one"), NotNan::new(1.5).unwrap());
        zset.upsert(bytes("two"), NotNan::new(-2.0).unwrap());

        let stream = db.stream_or_default(&bytes("st")).unwrap();
        stream
            .add(
                IdSpec::Exact(StreamId::new(5, 1)),
                vec![(bytes("f"), bytes("v"))],
                0,
            )
            .unwrap();

        let hll = db.hll_or_default(&bytes("hll")).unwrap();
        hll.add(b"alpha");
        hll.add(b"beta");

        db.expire(b"s", now_ms() + 60_000);
        db
    }

    #[test]
    fn round_trip() {
        let db = sample_db();
        let image = encode(&db);
        let loaded = decode(&image).unwrap();

        assert_eq!(loaded.get(b"s"), db.get(b"s"));
        assert_eq!(loaded.get(b"l"), db.get(b"l"));
        assert_eq!(loaded.get(b"set"), db.get(b"set"));
        assert_eq!(loaded.get(b"h"), db.get(b"h"));
        assert_eq!(loaded.get(b"z"), db.get(b"z"));
        assert_eq!(loaded.get(b"st"), db.get(b"st"));
        assert_eq!(loaded.get(b"hll"), db.get(b"hll"));
        let ttl = loaded.ttl(b"s").unwrap();
        assert!(ttl <= 60_000);

        // The restored order agrees with the original.
        let zset = loaded.get_zset(b"z").unwrap().unwrap();
        assert_eq!(zset.rank(b"two"), Some(0));
        assert_eq!(zset.count(ScoreBound::NegInf, ScoreBound::PosInf), 2);
    }

    #[test]
    fn expired_entries_are_skipped() {
        let mut db = Db::default();
        db.set(bytes("dead"), StrValue::from(&b"x"[..]));
        db.expire(b"dead", now_ms() + 40);
        db.set(bytes("live"), StrValue::from(&b"y"[..]));
        let image = encode(&db);

        std::thread::sleep(std::time::Duration::from_millis(60));
        let loaded = decode(&image).unwrap();
        assert!(loaded.get(b"dead").is_none());
        assert!(loaded.get(b"live").is_some());
    }

    #[test]
    fn corruption_is_fatal() {
        let db = sample_db();
        let mut image = encode(&db);
        assert!(matches!(decode(b"NOTADUMP"), Err(RdbError::Truncated)));
        assert!(matches!(
            decode(b"NOTADUMP0\xff\x00\x00\x00\x00"),
            Err(RdbError::Magic)
        ));

        // Flip one body byte: the checksum catches it.
        image[10] ^= 0xA5;
        assert!(matches!(decode(&image), Err(RdbError::Checksum)));
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let db = Db::default();
        let mut image = encode(&db);
        image[8] = 99;
        // Checksum no longer matches either; fix it to isolate the version check.
        let body_len = image.len() - 4;
        let sum = CRC32.checksum(&image[..body_len]).to_le_bytes();
        image[body_len..].copy_from_slice(&sum);
        assert!(matches!(decode(&image), Err(RdbError::Version(99))));
    }

    #[test]
    fn save_and_load_files() {
        let dir = std::env::temp_dir().join(format!("zoltraak-rdb-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dump.zdb");
        let db = sample_db();
        save(&db, &path).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.get(b"l"), db.get(b"l"));
        assert!(load(&dir.join("missing.zdb")).unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }
}
