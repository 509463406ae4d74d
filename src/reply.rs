mod error;

pub use error::ReplyError;

use crate::{bytes::format_f64, db::ValueError, resp::FrameError};
use bytes::{BufMut, Bytes, BytesMut};

/// One reply element. Aggregate replies are written header-first: a command
/// emits `Reply::Array(n)` and then `n` further replies for the elements.
#[derive(Debug)]
pub enum Reply {
    /// An array header: `*n`.
    Array(usize),

    /// A bulk string.
    Bulk(Bytes),

    /// A double, transmitted as a bulk string.
    Double(f64),

    /// An error line.
    Error(ReplyError),

    /// An integer.
    Integer(i64),

    /// The null bulk string.
    Nil,

    /// The null array.
    NilArray,

    /// A status (simple string) line.
    Status(StatusReply),
}

/// A status line, usually a static literal.
#[derive(Debug)]
pub enum StatusReply {
    Static(&'static str),
    Owned(String),
}

impl StatusReply {
    fn as_bytes(&self) -> &[u8] {
        match self {
            StatusReply::Static(s) => s.as_bytes(),
            StatusReply::Owned(s) => s.as_bytes(),
        }
    }
}

/// Encode one reply element onto a client's output buffer.
pub fn write(out: &mut BytesMut, reply: Reply) {
    match reply {
        Reply::Array(len) => {
            out.put_u8(b'*');
            out.extend_from_slice(len.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Bulk(bytes) => write_bulk(out, &bytes),
        Reply::Double(value) => write_bulk(out, format_f64(value).as_bytes()),
        Reply::Error(error) => {
            out.put_u8(b'-');
            out.extend_from_slice(error.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Integer(n) => {
            out.put_u8(b':');
            out.extend_from_slice(n.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
        Reply::NilArray => out.extend_from_slice(b"*-1\r\n"),
        Reply::Status(status) => {
            out.put_u8(b'+');
            out.extend_from_slice(status.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}

fn write_bulk(out: &mut BytesMut, bytes: &[u8]) {
    out.put_u8(b'$');
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
}

impl From<&'static str> for Reply {
    fn from(value: &'static str) -> Self {
        Reply::Status(StatusReply::Static(value))
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Status(StatusReply::Owned(value))
    }
}

impl From<Bytes> for Reply {
    fn from(value: Bytes) -> Self {
        Reply::Bulk(value)
    }
}

impl From<&Bytes> for Reply {
    fn from(value: &Bytes) -> Self {
        Reply::Bulk(value.clone())
    }
}

impl From<Vec<u8>> for Reply {
    fn from(value: Vec<u8>) -> Self {
        Reply::Bulk(value.into())
    }
}

impl From<i64> for Reply {
    fn from(value: i64) -> Self {
        Reply::Integer(value)
    }
}

impl From<i32> for Reply {
    fn from(value: i32) -> Self {
        Reply::Integer(value.into())
    }
}

impl From<u64> for Reply {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(value) => Reply::Integer(value),
            Err(_) => ReplyError::InvalidUsize.into(),
        }
    }
}

impl From<usize> for Reply {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(value) => Reply::Integer(value),
            Err(_) => ReplyError::InvalidUsize.into(),
        }
    }
}

impl From<bool> for Reply {
    fn from(value: bool) -> Self {
        Reply::Integer(value.into())
    }
}

impl From<f64> for Reply {
    fn from(value: f64) -> Self {
        Reply::Double(value)
    }
}

impl From<ReplyError> for Reply {
    fn from(error: ReplyError) -> Self {
        Reply::Error(error)
    }
}

impl From<FrameError> for Reply {
    fn from(error: FrameError) -> Self {
        Reply::Error(error.into())
    }
}

impl From<ValueError> for Reply {
    fn from(error: ValueError) -> Self {
        match error {
            ValueError::WrongType => ReplyError::WrongType.into(),
        }
    }
}

impl<T: Into<Reply>> From<Option<T>> for Reply {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Reply::Nil,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(reply: Reply) -> BytesMut {
        let mut out = BytesMut::new();
        write(&mut out, reply);
        out
    }

    #[test]
    fn scalars() {
        assert_eq!(&encoded("OK".into())[..], b"+OK\r\n");
        assert_eq!(&encoded(7i64.into())[..], b":7\r\n");
        assert_eq!(&encoded(Reply::Nil)[..], b"$-1\r\n");
        assert_eq!(&encoded(Reply::NilArray)[..], b"*-1\r\n");
        assert_eq!(&encoded(Bytes::from_static(b"bar").into())[..], b"$3\r\nbar\r\n");
    }

    #[test]
    fn doubles_use_bulk_form() {
        assert_eq!(&encoded(Reply::Double(10.5))[..], b"$4\r\n10.5\r\n");
        assert_eq!(&encoded(Reply::Double(3.0))[..], b"$1\r\n3\r\n");
    }

    #[test]
    fn array_header() {
        let mut out = BytesMut::new();
        write(&mut out, Reply::Array(2));
        write(&mut out, Bytes::from_static(b"a").into());
        write(&mut out, Bytes::from_static(b"b").into());
        assert_eq!(&out[..], b"*2\r\n$1\r\na\r\n$1\r\nb\r\n");
    }

    #[test]
    fn errors_carry_their_tag() {
        let out = encoded(ReplyError::WrongType.into());
        assert!(out.starts_with(b"-WRONGTYPE "));
        let out = encoded(ReplyError::ExecWithoutMulti.into());
        assert_eq!(&out[..], b"-ERR EXEC without MULTI\r\n");
    }
}
