use std::time::{Duration, UNIX_EPOCH};

pub fn epoch() -> Duration {
    UNIX_EPOCH
        .elapsed()
        .expect("current time is before unix epoch")
}

/// The current unix time in milliseconds.
pub fn now_ms() -> u128 {
    epoch().as_millis()
}
