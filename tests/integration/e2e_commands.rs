//! End-to-end command semantics over a real socket.
//!
//! One in-process server per test, bound to port 0; a plain RESP test
//! client drives it.  Covers the string/list/set/hash/zset families, reply
//! shapes, wrong-type errors, arity errors, and the compatibility stubs.

use cc_resp::Frame;
use cc_test_utils::TestClient;
use std::net::SocketAddr;

// ---------------------------------------------------------------------------
// Harness helpers (duplicated across the e2e suites so each file stays
// self-contained and independently runnable).
// ---------------------------------------------------------------------------

async fn start_server() -> (server::Handle, TestClient, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = server::ServerConfig {
        port: 0,
        dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let handle = server::start(config).await.expect("server start");
    let client = connect(&handle).await;
    (handle, client, dir)
}

async fn connect(handle: &server::Handle) -> TestClient {
    let addr = SocketAddr::from(([127, 0, 0, 1], handle.addr.port()));
    TestClient::connect(addr).await.expect("connect")
}

fn bulk(s: &str) -> Frame {
    Frame::Bulk(s.as_bytes().to_vec())
}

#[tokio::test]
async fn ping_echo_and_quit() {
    let (handle, mut client, _dir) = start_server().await;
    client
        .request_expect(&["PING"], Frame::simple("PONG"))
        .await;
    client.request_expect(&["PING", "hey"], bulk("hey")).await;
    client
        .request_expect(&["ECHO", "hello"], bulk("hello"))
        .await;
    client.request_expect(&["QUIT"], Frame::ok()).await;
    assert!(client.request(&["PING"]).await.is_err(), "closed after QUIT");
    handle.shutdown();
}

#[tokio::test]
async fn set_get_del_exists_type() {
    let (handle, mut client, _dir) = start_server().await;
    client.request_expect(&["SET", "foo", "bar"], Frame::ok()).await;
    client.request_expect(&["GET", "foo"], bulk("bar")).await;
    client.request_expect(&["TYPE", "foo"], Frame::simple("string")).await;
    client.request_expect(&["EXISTS", "foo", "nope"], Frame::Integer(1)).await;
    client.request_expect(&["DEL", "foo", "nope"], Frame::Integer(1)).await;
    client.request_expect(&["GET", "foo"], Frame::NullBulk).await;
    client.request_expect(&["TYPE", "foo"], Frame::simple("none")).await;
    handle.shutdown();
}

#[tokio::test]
async fn set_nx_xx_and_counters() {
    let (handle, mut client, _dir) = start_server().await;
    client.request_expect(&["SET", "n", "41", "NX"], Frame::ok()).await;
    client.request_expect(&["SET", "n", "0", "NX"], Frame::NullBulk).await;
    client.request_expect(&["INCR", "n"], Frame::Integer(42)).await;
    client.request_expect(&["DECR", "n"], Frame::Integer(41)).await;
    client.request_expect(&["APPEND", "n", "x"], Frame::Integer(3)).await;
    client.request_expect(&["STRLEN", "n"], Frame::Integer(3)).await;
    let reply = client.request(&["INCR", "n"]).await.unwrap();
    assert!(
        matches!(&reply, Frame::Error(msg) if msg.contains("not an integer")),
        "got {:?}",
        reply
    );
    handle.shutdown();
}

#[tokio::test]
async fn list_flow_matches_wire_shapes() {
    let (handle, mut client, _dir) = start_server().await;
    client
        .request_expect(&["RPUSH", "L", "a", "b", "c"], Frame::Integer(3))
        .await;
    client
        .request_expect(
            &["LRANGE", "L", "0", "-1"],
            Frame::command(&[b"a", b"b", b"c"]),
        )
        .await;
    client.request_expect(&["LPOP", "L"], bulk("a")).await;
    client.request_expect(&["LLEN", "L"], Frame::Integer(2)).await;
    client.request_expect(&["LINDEX", "L", "-1"], bulk("c")).await;
    client.request_expect(&["LSET", "L", "0", "z"], Frame::ok()).await;
    client.request_expect(&["LINDEX", "L", "0"], bulk("z")).await;
    client.request_expect(&["RPOP", "L"], bulk("c")).await;
    handle.shutdown();
}

#[tokio::test]
async fn set_and_hash_families() {
    let (handle, mut client, _dir) = start_server().await;
    client
        .request_expect(&["SADD", "s", "a", "b", "a"], Frame::Integer(2))
        .await;
    client.request_expect(&["SCARD", "s"], Frame::Integer(2)).await;
    client
        .request_expect(&["SISMEMBER", "s", "a"], Frame::Integer(1))
        .await;
    client.request_expect(&["SREM", "s", "a"], Frame::Integer(1)).await;

    client
        .request_expect(
            &["HSET", "h", "f1", "v1", "f2", "v2"],
            Frame::Integer(2),
        )
        .await;
    client.request_expect(&["HGET", "h", "f1"], bulk("v1")).await;
    client
        .request_expect(
            &["HGETALL", "h"],
            Frame::command(&[b"f1", b"v1", b"f2", b"v2"]),
        )
        .await;
    client.request_expect(&["HLEN", "h"], Frame::Integer(2)).await;
    client
        .request_expect(&["HKEYS", "h"], Frame::command(&[b"f1", b"f2"]))
        .await;
    client
        .request_expect(&["HVALS", "h"], Frame::command(&[b"v1", b"v2"]))
        .await;
    client
        .request_expect(&["HEXISTS", "h", "f1"], Frame::Integer(1))
        .await;
    client.request_expect(&["HDEL", "h", "f1"], Frame::Integer(1)).await;
    handle.shutdown();
}

#[tokio::test]
async fn zset_family_over_the_wire() {
    let (handle, mut client, _dir) = start_server().await;
    client
        .request_expect(
            &["ZADD", "z", "2", "two", "1", "one", "3", "three"],
            Frame::Integer(3),
        )
        .await;
    client
        .request_expect(
            &["ZRANGE", "z", "0", "-1"],
            Frame::command(&[b"one", b"two", b"three"]),
        )
        .await;
    client
        .request_expect(
            &["ZRANGE", "z", "0", "1", "WITHSCORES"],
            Frame::command(&[b"one", b"1", b"two", b"2"]),
        )
        .await;
    client
        .request_expect(
            &["ZRANGEBYSCORE", "z", "(1", "3"],
            Frame::command(&[b"two", b"three"]),
        )
        .await;
    client.request_expect(&["ZRANK", "z", "three"], Frame::Integer(2)).await;
    client.request_expect(&["ZSCORE", "z", "two"], bulk("2")).await;
    client.request_expect(&["ZCARD", "z"], Frame::Integer(3)).await;
    client.request_expect(&["ZREM", "z", "two"], Frame::Integer(1)).await;
    client.request_expect(&["ZCARD", "z"], Frame::Integer(2)).await;
    handle.shutdown();
}

#[tokio::test]
async fn keys_glob_and_dbsize_and_flushall() {
    let (handle, mut client, _dir) = start_server().await;
    for key in ["user:1", "user:2", "session:1"] {
        client.request_expect(&["SET", key, "v"], Frame::ok()).await;
    }
    client.request_expect(&["DBSIZE"], Frame::Integer(3)).await;
    let reply = client.request(&["KEYS", "user:*"]).await.unwrap();
    let Frame::Array(mut items) = reply else {
        panic!("expected array");
    };
    items.sort_by_key(|f| match f {
        Frame::Bulk(b) => b.clone(),
        _ => Vec::new(),
    });
    assert_eq!(items, vec![bulk("user:1"), bulk("user:2")]);
    client.request_expect(&["FLUSHALL"], Frame::ok()).await;
    client.request_expect(&["DBSIZE"], Frame::Integer(0)).await;
    handle.shutdown();
}

#[tokio::test]
async fn wrong_type_keeps_the_connection_usable() {
    let (handle, mut client, _dir) = start_server().await;
    client.request_expect(&["SET", "s", "v"], Frame::ok()).await;
    let reply = client.request(&["LPUSH", "s", "x"]).await.unwrap();
    assert!(
        matches!(&reply, Frame::Error(msg) if msg.starts_with("WRONGTYPE")),
        "got {:?}",
        reply
    );
    // The connection survives a type error.
    client.request_expect(&["GET", "s"], bulk("v")).await;
    handle.shutdown();
}

#[tokio::test]
async fn unknown_command_and_arity_errors() {
    let (handle, mut client, _dir) = start_server().await;
    let reply = client.request(&["BOGUS", "x"]).await.unwrap();
    assert!(
        matches!(&reply, Frame::Error(msg) if msg.contains("unknown command")),
        "got {:?}",
        reply
    );
    let reply = client.request(&["GET"]).await.unwrap();
    assert!(
        matches!(&reply, Frame::Error(msg) if msg.contains("wrong number of arguments")),
        "got {:?}",
        reply
    );
    handle.shutdown();
}

#[tokio::test]
async fn compatibility_stubs_reply_sensibly() {
    let (handle, mut client, _dir) = start_server().await;
    client.request_expect(&["SELECT", "0"], Frame::ok()).await;
    let reply = client.request(&["SELECT", "3"]).await.unwrap();
    assert!(matches!(reply, Frame::Error(_)));
    client.request_expect(&["COMMAND"], Frame::Array(vec![])).await;
    client
        .request_expect(&["CLIENT", "SETNAME", "t"], Frame::ok())
        .await;
    client
        .request_expect(&["WAIT", "0", "100"], Frame::Integer(0))
        .await;
    let Frame::Bulk(info) = client.request(&["INFO"]).await.unwrap() else {
        panic!("INFO must reply bulk");
    };
    let info = String::from_utf8(info).unwrap();
    assert!(info.contains("role:master"));
    assert!(info.contains("connected_slaves:0"));
    assert!(info.contains("master_replid:"));
    assert!(info.contains("master_repl_offset:"));
    handle.shutdown();
}

#[tokio::test]
async fn inline_commands_are_accepted() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let (handle, _client, _dir) = start_server().await;
    let addr = SocketAddr::from(([127, 0, 0, 1], handle.addr.port()));
    let mut raw = tokio::net::TcpStream::connect(addr).await.unwrap();
    raw.write_all(b"PING\r\n").await.unwrap();
    let mut buf = [0u8; 64];
    let n = raw.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"+PONG\r\n");
    handle.shutdown();
}

#[tokio::test]
async fn pipelined_commands_get_ordered_replies() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let (handle, _client, _dir) = start_server().await;
    let addr = SocketAddr::from(([127, 0, 0, 1], handle.addr.port()));
    let mut raw = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut batch = Vec::new();
    Frame::command(&[b"SET", b"k", b"1"]).encode_into(&mut batch);
    Frame::command(&[b"INCR", b"k"]).encode_into(&mut batch);
    Frame::command(&[b"GET", b"k"]).encode_into(&mut batch);
    raw.write_all(&batch).await.unwrap();

    let mut got = Vec::new();
    let expected = b"+OK\r\n:2\r\n$1\r\n2\r\n";
    while got.len() < expected.len() {
        let mut buf = [0u8; 64];
        let n = raw.read(&mut buf).await.unwrap();
        assert!(n > 0, "server closed early");
        got.extend_from_slice(&buf[..n]);
    }
    assert_eq!(got, expected);
    handle.shutdown();
}
