mod common;

use common::{scratch_dir, start_with, Conn};
use zoltraak::Settings;

#[tokio::test]
async fn snapshot_survives_a_restart() {
    let dir = scratch_dir("rdb");
    let settings = Settings {
        dir: dir.clone(),
        ..Settings::default()
    };

    let addr = start_with(settings.clone(), None).await;
    let mut conn = Conn::open(addr).await;
    conn.expect(&["SET", "s", "v"], b"+OK\r\n").await;
    conn.expect(&["RPUSH", "l", "a", "b"], b":2\r\n").await;
    conn.expect(&["HSET", "h", "f", "1"], b":1\r\n").await;
    conn.expect(&["PFADD", "hll", "x", "y"], b":1\r\n").await;
    conn.expect(&["EXPIRE", "s", "1000"], b":1\r\n").await;
    conn.expect(&["SAVE"], b"+OK\r\n").await;

    // A second server over the same directory sees the same data.
    let addr = start_with(settings, None).await;
    let mut conn = Conn::open(addr).await;
    conn.expect(&["GET", "s"], b"$1\r\nv\r\n").await;
    conn.expect(&["LRANGE", "l", "0", "-1"], b"*2\r\n$1\r\na\r\n$1\r\nb\r\n")
        .await;
    conn.expect(&["HGET", "h", "f"], b"$1\r\n1\r\n").await;
    conn.expect(&["PFCOUNT", "hll"], b":2\r\n").await;
    let ttl = conn.cmd(&["TTL", "s"]).await;
    let text = String::from_utf8_lossy(&ttl);
    let seconds: i64 = text[1..text.len() - 2].parse().unwrap();
    assert!((1..=1000).contains(&seconds));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn append_log_replays_on_startup() {
    let dir = scratch_dir("aof");
    let settings = Settings {
        dir: dir.clone(),
        appendonly: true,
        ..Settings::default()
    };

    let addr = start_with(settings.clone(), None).await;
    let mut conn = Conn::open(addr).await;
    conn.expect(&["SET", "k", "1"], b"+OK\r\n").await;
    conn.expect(&["INCR", "k"], b":2\r\n").await;
    conn.expect(&["RPUSH", "l", "a"], b":1\r\n").await;
    conn.expect(&["DEL", "l"], b":1\r\n").await;
    conn.expect(&["ZADD", "z", "1.5", "m"], b":1\r\n").await;
    // SPOP propagates its resolved SREM form; after this the set is gone.
    conn.expect(&["SADD", "set", "only"], b":1\r\n").await;
    conn.expect(&["SPOP", "set"], b"$4\r\nonly\r\n").await;

    let addr = start_with(settings, None).await;
    let mut conn = Conn::open(addr).await;
    conn.expect(&["GET", "k"], b"$1\r\n2\r\n").await;
    conn.expect(&["EXISTS", "l"], b":0\r\n").await;
    conn.expect(&["ZSCORE", "z", "m"], b"$3\r\n1.5\r\n").await;
    conn.expect(&["EXISTS", "set"], b":0\r\n").await;

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn rewrite_compacts_the_log() {
    let dir = scratch_dir("aof-rewrite");
    let settings = Settings {
        dir: dir.clone(),
        appendonly: true,
        ..Settings::default()
    };

    let addr = start_with(settings.clone(), None).await;
    let mut conn = Conn::open(addr).await;
    for i in 0..50 {
        conn.expect(&["INCR", "n"], format!(":{}\r\n", i + 1).as_bytes())
            .await;
    }
    let before = std::fs::metadata(dir.join("appendonly.zol")).unwrap().len();
    conn.expect(
        &["BGREWRITEAOF"],
        b"+Background append only file rewriting started\r\n",
    )
    .await;
    let after = std::fs::metadata(dir.join("appendonly.zol")).unwrap().len();
    assert!(after < before, "rewrite did not shrink the log");
    conn.expect(&["PFADD", "hll", "a", "b", "c"], b":1\r\n").await;

    // The compact log still reproduces the state, sketch included.
    let addr = start_with(settings, None).await;
    let mut conn = Conn::open(addr).await;
    conn.expect(&["GET", "n"], b"$2\r\n50\r\n").await;
    conn.expect(&["PFCOUNT", "hll"], b":3\r\n").await;

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn corrupt_snapshot_fails_startup() {
    let dir = scratch_dir("corrupt");
    std::fs::write(dir.join("dump.zdb"), b"ZOLTRDB1garbagegarbagegarbage").unwrap();
    let settings = Settings {
        dir: dir.clone(),
        ..Settings::default()
    };
    assert!(zoltraak::Server::bootstrap(settings, None).is_err());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn truncated_append_log_replays_the_prefix() {
    let dir = scratch_dir("aof-truncated");
    let settings = Settings {
        dir: dir.clone(),
        appendonly: true,
        ..Settings::default()
    };

    let addr = start_with(settings.clone(), None).await;
    let mut conn = Conn::open(addr).await;
    conn.expect(&["SET", "a", "1"], b"+OK\r\n").await;
    conn.expect(&["SET", "b", "2"], b"+OK\r\n").await;

    // Chop the final record in half.
    let path = dir.join("appendonly.zol");
    let log = std::fs::read(&path).unwrap();
    std::fs::write(&path, &log[..log.len() - 5]).unwrap();

    let addr = start_with(settings, None).await;
    let mut conn = Conn::open(addr).await;
    conn.expect(&["GET", "a"], b"$1\r\n1\r\n").await;
    conn.expect(&["GET", "b"], b"$-1\r\n").await;

    let _ = std::fs::remove_dir_all(&dir);
}
