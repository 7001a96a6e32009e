//! End-to-end snapshot persistence: SAVE/BGSAVE/LASTSAVE over the wire,
//! reload on restart, auto-save scheduling, and corrupt-file startup
//! failure.

use cc_resp::Frame;
use cc_test_utils::TestClient;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

async fn start_server_in(dir: &Path) -> server::Handle {
    let config = server::ServerConfig {
        port: 0,
        dir: dir.to_path_buf(),
        ..Default::default()
    };
    server::start(config).await.expect("server start")
}

async fn connect(handle: &server::Handle) -> TestClient {
    let addr = SocketAddr::from(([127, 0, 0, 1], handle.addr.port()));
    TestClient::connect(addr).await.expect("connect")
}

fn bulk(s: &str) -> Frame {
    Frame::Bulk(s.as_bytes().to_vec())
}

#[tokio::test]
async fn save_then_restart_restores_the_keyspace() {
    let dir = tempfile::tempdir().unwrap();
    let first = start_server_in(dir.path()).await;
    let mut client = connect(&first).await;

    client.request_expect(&["SET", "plain", "v"], Frame::ok()).await;
    client
        .request_expect(&["SET", "volatile", "w", "EX", "600"], Frame::ok())
        .await;
    client
        .request_expect(&["RPUSH", "L", "a", "b"], Frame::Integer(2))
        .await;
    client
        .request_expect(&["HSET", "H", "f", "v"], Frame::Integer(1))
        .await;
    client
        .request_expect(&["ZADD", "Z", "1.5", "m"], Frame::Integer(1))
        .await;
    client.request_expect(&["SADD", "S", "x"], Frame::Integer(1)).await;
    client.request_expect(&["SAVE"], Frame::ok()).await;
    first.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = start_server_in(dir.path()).await;
    let mut client = connect(&second).await;
    client.request_expect(&["GET", "plain"], bulk("v")).await;
    client.request_expect(&["GET", "volatile"], bulk("w")).await;
    let Frame::Integer(ttl) = client.request(&["TTL", "volatile"]).await.unwrap() else {
        panic!("TTL must be an integer");
    };
    assert!(ttl > 0, "expiry must survive the reload");
    client
        .request_expect(&["LRANGE", "L", "0", "-1"], Frame::command(&[b"a", b"b"]))
        .await;
    client.request_expect(&["HGET", "H", "f"], bulk("v")).await;
    client.request_expect(&["ZSCORE", "Z", "m"], bulk("1.5")).await;
    client.request_expect(&["SISMEMBER", "S", "x"], Frame::Integer(1)).await;
    second.shutdown();
}

#[tokio::test]
async fn bgsave_reports_started_and_advances_lastsave() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server_in(dir.path()).await;
    let mut client = connect(&handle).await;

    let Frame::Integer(before) = client.request(&["LASTSAVE"]).await.unwrap() else {
        panic!("LASTSAVE must be an integer");
    };
    client.request_expect(&["SET", "k", "v"], Frame::ok()).await;
    // Ensure the lastsave second can visibly advance.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    client
        .request_expect(&["BGSAVE"], Frame::simple("Background saving started"))
        .await;

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let Frame::Integer(after) = client.request(&["LASTSAVE"]).await.unwrap() else {
            panic!("LASTSAVE must be an integer");
        };
        if after > before {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "BGSAVE never completed");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(dir.path().join("dump.rdb").exists());
    handle.shutdown();
}

#[tokio::test]
async fn autosave_schedule_triggers_a_background_save() {
    let dir = tempfile::tempdir().unwrap();
    let config = server::ServerConfig {
        port: 0,
        dir: dir.path().to_path_buf(),
        save_schedule: vec![(1, 1)],
        ..Default::default()
    };
    let handle = server::start(config).await.expect("server start");
    let mut client = connect(&handle).await;

    let Frame::Integer(before) = client.request(&["LASTSAVE"]).await.unwrap() else {
        panic!("LASTSAVE must be an integer");
    };
    client.request_expect(&["SET", "k", "v"], Frame::ok()).await;

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let Frame::Integer(after) = client.request(&["LASTSAVE"]).await.unwrap() else {
            panic!("LASTSAVE must be an integer");
        };
        if after > before && dir.path().join("dump.rdb").exists() {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "auto-save never fired");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // The file reloads into an equal keyspace on a fresh process.
    let second = start_server_in(dir.path()).await;
    let mut client2 = connect(&second).await;
    client2.request_expect(&["GET", "k"], bulk("v")).await;
    second.shutdown();
    handle.shutdown();
}

#[tokio::test]
async fn resave_of_unchanged_keyspace_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server_in(dir.path()).await;
    let mut client = connect(&handle).await;

    client.request_expect(&["SET", "a", "1"], Frame::ok()).await;
    client.request_expect(&["SADD", "s", "m1", "m2"], Frame::Integer(2)).await;
    client.request_expect(&["SAVE"], Frame::ok()).await;
    let first = std::fs::read(dir.path().join("dump.rdb")).unwrap();
    client.request_expect(&["SAVE"], Frame::ok()).await;
    let second = std::fs::read(dir.path().join("dump.rdb")).unwrap();
    assert_eq!(first, second);
    handle.shutdown();
}

#[tokio::test]
async fn corrupt_snapshot_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("dump.rdb"), b"REDIS0011garbage-without-eof").unwrap();
    let config = server::ServerConfig {
        port: 0,
        dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let result = server::start(config).await;
    assert!(
        matches!(result, Err(server::StartError::SnapshotLoad { .. })),
        "corrupt RDB must be fatal"
    );
}

#[tokio::test]
async fn config_get_and_set_cover_persistence_settings() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server_in(dir.path()).await;
    let mut client = connect(&handle).await;

    let expected_dir = dir.path().to_string_lossy().into_owned();
    client
        .request_expect(
            &["CONFIG", "GET", "dir"],
            Frame::Array(vec![bulk("dir"), bulk(&expected_dir)]),
        )
        .await;
    client
        .request_expect(
            &["CONFIG", "GET", "dbfilename"],
            Frame::Array(vec![bulk("dbfilename"), bulk("dump.rdb")]),
        )
        .await;
    client
        .request_expect(&["CONFIG", "SET", "save", "60 5"], Frame::ok())
        .await;
    client
        .request_expect(
            &["CONFIG", "GET", "save"],
            Frame::Array(vec![bulk("save"), bulk("60 5")]),
        )
        .await;
    client
        .request_expect(&["CONFIG", "SET", "dbfilename", "other.rdb"], Frame::ok())
        .await;
    client.request_expect(&["SET", "k", "v"], Frame::ok()).await;
    client.request_expect(&["SAVE"], Frame::ok()).await;
    assert!(dir.path().join("other.rdb").exists());
    handle.shutdown();
}
