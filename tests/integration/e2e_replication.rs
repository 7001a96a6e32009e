//! End-to-end leader→follower replication.
//!
//! A leader and a follower run in-process; the follower performs the full
//! PSYNC handshake against the leader's real socket.  Convergence is
//! asserted by polling the follower with a bounded deadline.

use cc_resp::Frame;
use cc_test_utils::TestClient;
use std::net::SocketAddr;
use std::time::Duration;

async fn start_leader() -> (server::Handle, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = server::ServerConfig {
        port: 0,
        dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let handle = server::start(config).await.expect("leader start");
    (handle, dir)
}

async fn start_follower(leader: &server::Handle) -> (server::Handle, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = server::ServerConfig {
        port: 0,
        dir: dir.path().to_path_buf(),
        replicaof: Some(("127.0.0.1".to_owned(), leader.addr.port())),
        ..Default::default()
    };
    let handle = server::start(config).await.expect("follower start");
    (handle, dir)
}

async fn connect(handle: &server::Handle) -> TestClient {
    let addr = SocketAddr::from(([127, 0, 0, 1], handle.addr.port()));
    TestClient::connect(addr).await.expect("connect")
}

/// Poll `args` on `client` until the reply equals `expected` or the deadline
/// passes.
async fn await_reply(client: &mut TestClient, args: &[&str], expected: Frame) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let got = client.request(args).await.expect("request failed");
        if got == expected {
            return;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for {:?} == {:?}, last was {:?}",
            args,
            expected,
            got
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn bulk(s: &str) -> Frame {
    Frame::Bulk(s.as_bytes().to_vec())
}

#[tokio::test]
async fn follower_receives_snapshot_then_streamed_writes() {
    let (leader, _ldir) = start_leader().await;
    let mut lc = connect(&leader).await;

    // Writes before the follower attaches arrive via the snapshot.
    lc.request_expect(&["SET", "x", "1"], Frame::ok()).await;
    lc.request_expect(&["INCR", "x"], Frame::Integer(2)).await;
    lc.request_expect(&["INCR", "x"], Frame::Integer(3)).await;

    let (follower, _fdir) = start_follower(&leader).await;
    let mut fc = connect(&follower).await;
    await_reply(&mut fc, &["GET", "x"], bulk("3")).await;

    // Writes after attach arrive via the replication stream.
    lc.request_expect(&["SET", "y", "foo"], Frame::ok()).await;
    await_reply(&mut fc, &["GET", "y"], bulk("foo")).await;

    follower.shutdown();
    leader.shutdown();
}

#[tokio::test]
async fn follower_converges_over_every_type_family() {
    let (leader, _ldir) = start_leader().await;
    let mut lc = connect(&leader).await;
    let (follower, _fdir) = start_follower(&leader).await;
    let mut fc = connect(&follower).await;

    lc.request_expect(&["RPUSH", "L", "a", "b"], Frame::Integer(2)).await;
    lc.request_expect(&["SADD", "S", "m"], Frame::Integer(1)).await;
    lc.request_expect(&["HSET", "H", "f", "v"], Frame::Integer(1)).await;
    lc.request_expect(&["ZADD", "Z", "1", "m"], Frame::Integer(1)).await;
    lc.request_expect(&["XADD", "st", "1-1", "f", "v"], bulk("1-1")).await;
    lc.request_expect(&["DEL", "S"], Frame::Integer(1)).await;

    await_reply(&mut fc, &["LRANGE", "L", "0", "-1"], Frame::command(&[b"a", b"b"])).await;
    await_reply(&mut fc, &["EXISTS", "S"], Frame::Integer(0)).await;
    await_reply(&mut fc, &["HGET", "H", "f"], bulk("v")).await;
    await_reply(&mut fc, &["ZSCORE", "Z", "m"], bulk("1")).await;
    await_reply(
        &mut fc,
        &["XRANGE", "st", "-", "+"],
        Frame::Array(vec![Frame::Array(vec![
            bulk("1-1"),
            Frame::command(&[b"f", b"v"]),
        ])]),
    )
    .await;

    follower.shutdown();
    leader.shutdown();
}

#[tokio::test]
async fn roles_are_reported_and_follower_counts_as_slave() {
    let (leader, _ldir) = start_leader().await;
    let (follower, _fdir) = start_follower(&leader).await;
    let mut lc = connect(&leader).await;
    let mut fc = connect(&follower).await;

    // Wait until the follower has finished its handshake.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let Frame::Bulk(info) = lc.request(&["INFO"]).await.unwrap() else {
            panic!("INFO must reply bulk");
        };
        let info = String::from_utf8(info).unwrap();
        if info.contains("connected_slaves:1") {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "follower never attached");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let Frame::Bulk(info) = fc.request(&["INFO"]).await.unwrap() else {
        panic!("INFO must reply bulk");
    };
    assert!(String::from_utf8(info).unwrap().contains("role:slave"));

    follower.shutdown();
    leader.shutdown();
}

#[tokio::test]
async fn follower_rejects_client_writes_but_serves_reads() {
    let (leader, _ldir) = start_leader().await;
    let mut lc = connect(&leader).await;
    let (follower, _fdir) = start_follower(&leader).await;
    let mut fc = connect(&follower).await;

    lc.request_expect(&["SET", "k", "v"], Frame::ok()).await;
    await_reply(&mut fc, &["GET", "k"], bulk("v")).await;

    let reply = fc.request(&["SET", "k", "mine"]).await.unwrap();
    assert!(
        matches!(&reply, Frame::Error(msg) if msg.starts_with("READONLY")),
        "got {:?}",
        reply
    );
    // The rejected write changed nothing.
    fc.request_expect(&["GET", "k"], bulk("v")).await;

    follower.shutdown();
    leader.shutdown();
}

#[tokio::test]
async fn expiring_write_replicates_with_its_ttl() {
    let (leader, _ldir) = start_leader().await;
    let mut lc = connect(&leader).await;
    let (follower, _fdir) = start_follower(&leader).await;
    let mut fc = connect(&follower).await;

    lc.request_expect(&["SET", "t", "v", "PX", "300"], Frame::ok()).await;
    await_reply(&mut fc, &["GET", "t"], bulk("v")).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    fc.request_expect(&["GET", "t"], Frame::NullBulk).await;

    follower.shutdown();
    leader.shutdown();
}
