use logos::Logos;

/// Lex a Logos token from a byte slice.
pub fn lex<'a, T>(bytes: &'a [u8]) -> Option<T>
where
    T: Logos<'a, Source = [u8]>,
    <T as Logos<'a>>::Extras: Default,
{
    let mut lexer = T::lexer(bytes);
    let token = lexer.next()?.ok()?;

    // Make sure there is only one token
    if lexer.remainder().is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Parse a byte slice into an arbitrary type via utf8.
pub fn parse<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse an i64 if the string representation can be exactly reproduced. This means no leading or
/// trailing space and no leading zeros.
pub fn parse_i64_exact(item: &[u8]) -> Option<i64> {
    let mut n: i64 = 0;
    let mut negative = false;
    let mut rest = match item {
        [b'0'] => return Some(0),
        [b'1'..=b'9', ..] => item,
        [b'-', b'1'..=b'9', ..] => {
            negative = true;
            &item[1..]
        }
        _ => return None,
    };

    loop {
        rest = match rest {
            [] => return Some(n),
            [b @ b'0'..=b'9', rest @ ..] => {
                let value = (*b - b'0').into();
                n = n.checked_mul(10)?;
                n = if negative {
                    n.checked_sub(value)?
                } else {
                    n.checked_add(value)?
                };
                rest
            }
            _ => return None,
        }
    }
}

/// Format an f64 the way replies expect: integral values print without a
/// fractional part, everything else uses the shortest round-trip form.
pub fn format_f64(value: f64) -> String {
    if value == f64::INFINITY {
        return "inf".into();
    }
    if value == f64::NEG_INFINITY {
        return "-inf".into();
    }
    format!("{value}")
}

/// An output wrapper for an arbitrary byte sequence. Printable ASCII characters are output
/// directly and all others are escaped.
pub struct Output<'a>(pub &'a [u8]);

impl std::fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::fmt::Display for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(self.0) {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "{}", self.0.escape_ascii()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_i64_exact_success() {
        assert_eq!(parse_i64_exact(b"0"), Some(0));
        assert_eq!(parse_i64_exact(b"7"), Some(7));
        assert_eq!(parse_i64_exact(b"-7"), Some(-7));
        assert_eq!(parse_i64_exact(b"1048576"), Some(1_048_576));
        let mut buf = Vec::new();
        write!(buf, "{}", i64::MIN).unwrap();
        assert_eq!(parse_i64_exact(&buf), Some(i64::MIN));
    }

    #[test]
    fn parse_i64_exact_failure() {
        assert_eq!(parse_i64_exact(b""), None);
        assert_eq!(parse_i64_exact(b"007"), None);
        assert_eq!(parse_i64_exact(b"-0"), None);
        assert_eq!(parse_i64_exact(b"12 "), None);
        assert_eq!(parse_i64_exact(b" 12"), None);
        assert_eq!(parse_i64_exact(b"12a"), None);
        let mut buf = Vec::new();
        write!(buf, "{}", i128::from(i64::MAX) + 1).unwrap();
        assert_eq!(parse_i64_exact(&buf), None);
    }

    #[test]
    fn format_floats() {
        assert_eq!(format_f64(3.0), "3");
        assert_eq!(format_f64(10.5), "10.5");
        assert_eq!(format_f64(-0.25), "-0.25");
        assert_eq!(format_f64(f64::INFINITY), "inf");
        assert_eq!(format_f64(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn lex_exact_bytes() {
        #[derive(Logos)]
        pub enum Test {
            #[regex(b"(?i:test)")]
            Test,
        }

        assert!(matches!(lex(b"TeSt"), Some(Test::Test)));
        assert!(lex::<Test>(b"x").is_none());
        assert!(lex::<Test>(b"test  ").is_none());
    }
}
