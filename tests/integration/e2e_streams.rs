//! End-to-end stream semantics: XADD monotonicity, XRANGE shapes, and
//! blocking XREAD woken by a concurrent XADD.

use cc_resp::Frame;
use cc_test_utils::TestClient;
use std::net::SocketAddr;
use std::time::Duration;

async fn start_server() -> (server::Handle, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = server::ServerConfig {
        port: 0,
        dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let handle = server::start(config).await.expect("server start");
    (handle, dir)
}

async fn connect(handle: &server::Handle) -> TestClient {
    let addr = SocketAddr::from(([127, 0, 0, 1], handle.addr.port()));
    TestClient::connect(addr).await.expect("connect")
}

fn bulk(s: &str) -> Frame {
    Frame::Bulk(s.as_bytes().to_vec())
}

fn entry(id: &str, fields: &[&str]) -> Frame {
    Frame::Array(vec![
        bulk(id),
        Frame::Array(fields.iter().map(|f| bulk(f)).collect()),
    ])
}

#[tokio::test]
async fn xadd_rejects_non_increasing_ids() {
    let (handle, _dir) = start_server().await;
    let mut client = connect(&handle).await;
    client.request_expect(&["XADD", "s", "1-1", "f", "v"], bulk("1-1")).await;
    client.request_expect(&["XADD", "s", "1-2", "f", "v"], bulk("1-2")).await;
    let reply = client.request(&["XADD", "s", "1-1", "f", "v"]).await.unwrap();
    assert!(
        matches!(&reply, Frame::Error(msg) if msg.contains("equal or smaller")),
        "got {:?}",
        reply
    );
    // The failed append left the stream untouched.
    let Frame::Array(entries) = client.request(&["XRANGE", "s", "-", "+"]).await.unwrap()
    else {
        panic!("expected array");
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], entry("1-1", &["f", "v"]));
    assert_eq!(entries[1], entry("1-2", &["f", "v"]));
    handle.shutdown();
}

#[tokio::test]
async fn xadd_auto_ids_are_strictly_increasing() {
    let (handle, _dir) = start_server().await;
    let mut client = connect(&handle).await;
    let mut last = String::new();
    for _ in 0..5 {
        let Frame::Bulk(id) = client.request(&["XADD", "s", "*", "f", "v"]).await.unwrap()
        else {
            panic!("XADD must reply bulk id");
        };
        let id = String::from_utf8(id).unwrap();
        let parse = |s: &str| -> (u64, u64) {
            let (ms, seq) = s.split_once('-').unwrap();
            (ms.parse().unwrap(), seq.parse().unwrap())
        };
        if !last.is_empty() {
            assert!(parse(&id) > parse(&last), "{} !> {}", id, last);
        }
        last = id;
    }
    handle.shutdown();
}

#[tokio::test]
async fn xrange_bounds_and_sequence_defaults() {
    let (handle, _dir) = start_server().await;
    let mut client = connect(&handle).await;
    for (id, value) in [("1-1", "a"), ("1-2", "b"), ("2-0", "c"), ("3-5", "d")] {
        client.request_expect(&["XADD", "s", id, "f", value], bulk(id)).await;
    }
    let Frame::Array(entries) = client.request(&["XRANGE", "s", "1", "2"]).await.unwrap()
    else {
        panic!("expected array");
    };
    // "1".."2" covers all of ms 1 and ms 2.
    assert_eq!(entries.len(), 3);

    let Frame::Array(entries) = client
        .request(&["XRANGE", "s", "1-2", "3-5"])
        .await
        .unwrap()
    else {
        panic!("expected array");
    };
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], entry("1-2", &["f", "b"]));
    assert_eq!(entries[2], entry("3-5", &["f", "d"]));
    handle.shutdown();
}

#[tokio::test]
async fn xread_returns_entries_after_id() {
    let (handle, _dir) = start_server().await;
    let mut client = connect(&handle).await;
    client.request_expect(&["XADD", "s", "1-1", "f", "a"], bulk("1-1")).await;
    client.request_expect(&["XADD", "s", "2-2", "f", "b"], bulk("2-2")).await;

    let reply = client
        .request(&["XREAD", "STREAMS", "s", "1-1"])
        .await
        .unwrap();
    assert_eq!(
        reply,
        Frame::Array(vec![Frame::Array(vec![
            bulk("s"),
            Frame::Array(vec![entry("2-2", &["f", "b"])]),
        ])])
    );
    // Nothing after the tip: null array.
    let reply = client
        .request(&["XREAD", "STREAMS", "s", "2-2"])
        .await
        .unwrap();
    assert_eq!(reply, Frame::NullArray);
    handle.shutdown();
}

#[tokio::test]
async fn blocking_xread_is_woken_by_xadd() {
    let (handle, _dir) = start_server().await;
    let mut reader = connect(&handle).await;
    let mut writer = connect(&handle).await;

    reader
        .send(&["XREAD", "BLOCK", "5000", "STREAMS", "s", "$"])
        .await
        .unwrap();
    // Let the reader park before appending.
    tokio::time::sleep(Duration::from_millis(50)).await;
    writer
        .request_expect(&["XADD", "s", "7-1", "f", "v"], bulk("7-1"))
        .await;

    let reply = tokio::time::timeout(Duration::from_secs(2), reader.recv())
        .await
        .expect("reader should wake")
        .unwrap();
    assert_eq!(
        reply,
        Frame::Array(vec![Frame::Array(vec![
            bulk("s"),
            Frame::Array(vec![entry("7-1", &["f", "v"])]),
        ])])
    );
    handle.shutdown();
}

#[tokio::test]
async fn blocking_xread_times_out_with_nil() {
    let (handle, _dir) = start_server().await;
    let mut reader = connect(&handle).await;
    let started = std::time::Instant::now();
    let reply = reader
        .request(&["XREAD", "BLOCK", "150", "STREAMS", "s", "$"])
        .await
        .unwrap();
    assert_eq!(reply, Frame::NullArray);
    assert!(started.elapsed() >= Duration::from_millis(140));
    handle.shutdown();
}

#[tokio::test]
async fn blocking_xread_covers_multiple_streams() {
    let (handle, _dir) = start_server().await;
    let mut reader = connect(&handle).await;
    let mut writer = connect(&handle).await;

    reader
        .send(&["XREAD", "BLOCK", "5000", "STREAMS", "a", "b", "$", "$"])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    writer
        .request_expect(&["XADD", "b", "1-1", "f", "v"], bulk("1-1"))
        .await;

    let reply = tokio::time::timeout(Duration::from_secs(2), reader.recv())
        .await
        .expect("reader should wake")
        .unwrap();
    // Only the stream with data appears in the reply.
    assert_eq!(
        reply,
        Frame::Array(vec![Frame::Array(vec![
            bulk("b"),
            Frame::Array(vec![entry("1-1", &["f", "v"])]),
        ])])
    );
    handle.shutdown();
}
