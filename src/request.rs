use crate::{
    bytes::parse,
    command::{self, Arity, Command, CommandKind},
    db::ScoreBound,
    reply::ReplyError,
    time::now_ms,
};
use bytes::Bytes;
use ordered_float::NotNan;
use std::time::Duration;

/// One parsed command frame: the argument vector plus a cursor over the
/// arguments not yet consumed by the handler. Argument zero is the command
/// name.
#[derive(Clone, Debug)]
pub struct Request {
    arguments: Vec<Bytes>,
    pub command: &'static Command,
    next: usize,
}

impl Default for Request {
    fn default() -> Self {
        Request {
            arguments: Vec::new(),
            command: &command::UNKNOWN,
            next: 1,
        }
    }
}

impl Request {
    pub fn new(arguments: Vec<Bytes>) -> Self {
        let command = arguments
            .first()
            .map_or(&command::UNKNOWN, |name| name[..].into());
        Request {
            arguments,
            command,
            next: 1,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.command.kind
    }

    /// The raw command name, for unknown-command errors.
    pub fn name(&self) -> Bytes {
        self.arguments.first().cloned().unwrap_or_default()
    }

    /// Every argument, command name included: the propagated form.
    pub fn all(&self) -> &[Bytes] {
        &self.arguments
    }

    pub fn get(&self, index: usize) -> Option<Bytes> {
        self.arguments.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn remaining(&self) -> usize {
        self.arguments.len() - self.next
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Iterate over the arguments not yet consumed.
    pub fn iter(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.arguments.iter().skip(self.next).cloned()
    }

    /// Does the argument count satisfy the command's arity?
    pub fn is_valid(&self) -> bool {
        match self.command.arity {
            Arity::Exact(arity) => self.arguments.len() == usize::from(arity),
            Arity::Minimum(arity) => self.arguments.len() >= usize::from(arity),
        }
    }

    pub fn wrong_arguments(&self) -> ReplyError {
        ReplyError::WrongArguments(self.command.name)
    }

    pub fn unknown_subcommand(&self) -> ReplyError {
        let subcommand = self.get(1).unwrap_or_default();
        ReplyError::UnknownSubcommand(subcommand, self.command.name)
    }

    /// Assert that the remaining arguments come in pairs.
    pub fn assert_pairs(&self) -> Result<(), ReplyError> {
        if self.remaining() % 2 == 0 {
            Ok(())
        } else {
            Err(self.wrong_arguments())
        }
    }

    pub fn peek(&self) -> Option<Bytes> {
        self.get(self.next)
    }

    pub fn try_pop(&mut self) -> Option<Bytes> {
        let argument = self.peek()?;
        self.next += 1;
        Some(argument)
    }

    pub fn pop(&mut self) -> Result<Bytes, ReplyError> {
        self.try_pop().ok_or_else(|| self.wrong_arguments())
    }

    pub fn i64(&mut self) -> Result<i64, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::Integer)
    }

    pub fn u64(&mut self) -> Result<u64, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::Integer)
    }

    pub fn usize(&mut self) -> Result<usize, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::Integer)
    }

    pub fn f64(&mut self) -> Result<f64, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::Float)
    }

    pub fn finite_f64(&mut self) -> Result<f64, ReplyError> {
        let value = self.f64()?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ReplyError::NanOrInfinity)
        }
    }

    pub fn not_nan(&mut self) -> Result<NotNan<f64>, ReplyError> {
        NotNan::new(self.f64()?).map_err(|_| ReplyError::Float)
    }

    pub fn score_bound(&mut self) -> Result<ScoreBound, ReplyError> {
        ScoreBound::parse(&self.pop()?).ok_or(ReplyError::MinMaxFloat)
    }

    /// A blocking timeout in seconds; validated but only ever used for its
    /// bounds.
    pub fn timeout(&mut self) -> Result<Duration, ReplyError> {
        let timeout: f64 = parse(&self.pop()?).ok_or(ReplyError::InvalidTimeout)?;
        if timeout < 0.0 {
            return Err(ReplyError::NegativeTimeout);
        }
        if !timeout.is_finite() {
            return Err(ReplyError::InvalidTimeout);
        }
        Ok(Duration::from_secs_f64(timeout))
    }

    fn relative_ms<const UNIT: i128>(&mut self) -> Result<u128, ReplyError> {
        let name = self.command.name;
        parse::<i128>(&self.pop()?)
            .and_then(|x| x.checked_mul(UNIT))
            .and_then(|x| {
                let now = i128::try_from(now_ms()).ok()?;
                let at = now.checked_add(x)?;
                u128::try_from(at.max(0)).ok()
            })
            .ok_or(ReplyError::ExpireTime(name))
    }

    /// A TTL in seconds, converted to an absolute millisecond deadline.
    pub fn ttl(&mut self) -> Result<u128, ReplyError> {
        self.relative_ms::<1000>()
    }

    /// A TTL in milliseconds, converted to an absolute deadline.
    pub fn pttl(&mut self) -> Result<u128, ReplyError> {
        self.relative_ms::<1>()
    }

    fn absolute_ms<const UNIT: u128>(&mut self) -> Result<u128, ReplyError> {
        let name = self.command.name;
        parse::<u128>(&self.pop()?)
            .and_then(|x| x.checked_mul(UNIT))
            .ok_or(ReplyError::ExpireTime(name))
    }

    /// An absolute expiry in seconds since the epoch.
    pub fn expiretime(&mut self) -> Result<u128, ReplyError> {
        self.absolute_ms::<1000>()
    }

    /// An absolute expiry in milliseconds since the epoch.
    pub fn pexpiretime(&mut self) -> Result<u128, ReplyError> {
        self.absolute_ms::<1>()
    }

    /// A `numkeys` argument: positive and within the remaining arguments.
    pub fn numkeys(&mut self) -> Result<usize, ReplyError> {
        let n = self.i64()?;
        if n <= 0 {
            return Err(ReplyError::NumkeysZero);
        }
        let n = usize::try_from(n).map_err(|_| ReplyError::Integer)?;
        if n > self.remaining() {
            return Err(ReplyError::NumberOfKeys);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(args: &[&str]) -> Request {
        Request::new(
            args.iter()
                .map(|a| Bytes::copy_from_slice(a.as_bytes()))
                .collect(),
        )
    }

    #[test]
    fn pops_past_the_name() {
        let mut req = request(&["GET", "foo"]);
        assert_eq!(req.remaining(), 1);
        assert_eq!(req.pop().unwrap(), "foo");
        assert!(req.is_empty());
        assert!(req.pop().is_err());
    }

    #[test]
    fn numeric_arguments() {
        let mut req = request(&["SET", "42", "x", "1.5"]);
        assert_eq!(req.i64().unwrap(), 42);
        assert!(matches!(req.i64(), Err(ReplyError::Integer)));
        assert_eq!(req.f64().unwrap(), 1.5);
    }

    #[test]
    fn ttl_deadlines_are_absolute() {
        let mut req = request(&["EXPIRE", "10"]);
        let at = req.ttl().unwrap();
        let now = now_ms();
        assert!(at > now + 9_000 && at <= now + 10_500);
    }

    #[test]
    fn numkeys_validation() {
        let mut req = request(&["ZDIFF", "0", "a"]);
        assert!(matches!(req.numkeys(), Err(ReplyError::NumkeysZero)));
        let mut req = request(&["ZDIFF", "5", "a"]);
        assert!(matches!(req.numkeys(), Err(ReplyError::NumberOfKeys)));
        let mut req = request(&["ZDIFF", "1", "a"]);
        assert_eq!(req.numkeys().unwrap(), 1);
    }
}
