//! End-to-end publish/subscribe.
//!
//! Connection A subscribes, connection B publishes; delivery is pushed to A
//! as a `message` array.  Also covers the subscribed-state command gate,
//! unsubscribe counting, and idempotent re-subscription.

use cc_resp::Frame;
use cc_test_utils::TestClient;
use std::net::SocketAddr;

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

fn confirmation(kind: &str, channel: &str, count: i64) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(kind.as_bytes().to_vec()),
        Frame::Bulk(channel.as_bytes().to_vec()),
        Frame::Integer(count),
    ])
}

fn message(channel: &str, payload: &str) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(b"message".to_vec()),
        Frame::Bulk(channel.as_bytes().to_vec()),
        Frame::Bulk(payload.as_bytes().to_vec()),
    ])
}

#[tokio::test]
async fn publish_reaches_subscriber() {
    let (handle, _dir) = start_server().await;
    let mut sub = connect(&handle).await;
    let mut publisher = connect(&handle).await;

    sub.request_expect(&["SUBSCRIBE", "ch"], confirmation("subscribe", "ch", 1))
        .await;
    publisher
        .request_expect(&["PUBLISH", "ch", "hi"], Frame::Integer(1))
        .await;
    assert_eq!(sub.recv().await.unwrap(), message("ch", "hi"));
    handle.shutdown();
}

#[tokio::test]
async fn publish_without_subscribers_returns_zero() {
    let (handle, _dir) = start_server().await;
    let mut publisher = connect(&handle).await;
    publisher
        .request_expect(&["PUBLISH", "nobody", "x"], Frame::Integer(0))
        .await;
    handle.shutdown();
}

#[tokio::test]
async fn messages_arrive_in_publish_order() {
    let (handle, _dir) = start_server().await;
    let mut sub = connect(&handle).await;
    let mut publisher = connect(&handle).await;

    sub.request_expect(&["SUBSCRIBE", "ch"], confirmation("subscribe", "ch", 1))
        .await;
    for i in 0..10 {
        publisher
            .request_expect(&["PUBLISH", "ch", &format!("m{}", i)], Frame::Integer(1))
            .await;
    }
    for i in 0..10 {
        assert_eq!(sub.recv().await.unwrap(), message("ch", &format!("m{}", i)));
    }
    handle.shutdown();
}

#[tokio::test]
async fn subscribed_connection_rejects_other_commands() {
    let (handle, _dir) = start_server().await;
    let mut sub = connect(&handle).await;
    sub.request_expect(&["SUBSCRIBE", "ch"], confirmation("subscribe", "ch", 1))
        .await;

    let reply = sub.request(&["GET", "k"]).await.unwrap();
    assert!(
        matches!(&reply, Frame::Error(msg) if msg.contains("only (P)SUBSCRIBE")),
        "got {:?}",
        reply
    );
    // PING stays allowed while subscribed.
    sub.request_expect(&["PING"], Frame::simple("PONG")).await;

    // Leaving subscribed mode restores normal dispatch.
    sub.request_expect(&["UNSUBSCRIBE", "ch"], confirmation("unsubscribe", "ch", 0))
        .await;
    sub.request_expect(&["GET", "k"], Frame::NullBulk).await;
    handle.shutdown();
}

#[tokio::test]
async fn resubscribe_does_not_change_counts_or_double_deliver() {
    let (handle, _dir) = start_server().await;
    let mut sub = connect(&handle).await;
    let mut publisher = connect(&handle).await;

    sub.request_expect(&["SUBSCRIBE", "ch"], confirmation("subscribe", "ch", 1))
        .await;
    sub.request_expect(&["SUBSCRIBE", "ch"], confirmation("subscribe", "ch", 1))
        .await;

    publisher
        .request_expect(&["PUBLISH", "ch", "once"], Frame::Integer(1))
        .await;
    assert_eq!(sub.recv().await.unwrap(), message("ch", "once"));
    // Nothing further queued: the next reply must be the PING's.
    sub.request_expect(&["PING"], Frame::simple("PONG")).await;
    handle.shutdown();
}

#[tokio::test]
async fn multi_channel_subscribe_and_bare_unsubscribe() {
    let (handle, _dir) = start_server().await;
    let mut sub = connect(&handle).await;
    let mut publisher = connect(&handle).await;

    sub.send(&["SUBSCRIBE", "a", "b"]).await.unwrap();
    assert_eq!(sub.recv().await.unwrap(), confirmation("subscribe", "a", 1));
    assert_eq!(sub.recv().await.unwrap(), confirmation("subscribe", "b", 2));

    publisher
        .request_expect(&["PUBLISH", "b", "hi"], Frame::Integer(1))
        .await;
    assert_eq!(sub.recv().await.unwrap(), message("b", "hi"));

    sub.send(&["UNSUBSCRIBE"]).await.unwrap();
    let first = sub.recv().await.unwrap();
    let second = sub.recv().await.unwrap();
    // Channel order is the subscription set's; counts must drain 1 then 0.
    assert!(
        (first == confirmation("unsubscribe", "a", 1)
            && second == confirmation("unsubscribe", "b", 0))
            || (first == confirmation("unsubscribe", "b", 1)
                && second == confirmation("unsubscribe", "a", 0)),
        "got {:?} then {:?}",
        first,
        second
    );
    publisher
        .request_expect(&["PUBLISH", "a", "gone"], Frame::Integer(0))
        .await;
    handle.shutdown();
}

#[tokio::test]
async fn two_subscribers_both_receive() {
    let (handle, _dir) = start_server().await;
    let mut sub1 = connect(&handle).await;
    let mut sub2 = connect(&handle).await;
    let mut publisher = connect(&handle).await;

    sub1.request_expect(&["SUBSCRIBE", "ch"], confirmation("subscribe", "ch", 1))
        .await;
    sub2.request_expect(&["SUBSCRIBE", "ch"], confirmation("subscribe", "ch", 1))
        .await;
    publisher
        .request_expect(&["PUBLISH", "ch", "fanout"], Frame::Integer(2))
        .await;
    assert_eq!(sub1.recv().await.unwrap(), message("ch", "fanout"));
    assert_eq!(sub2.recv().await.unwrap(), message("ch", "fanout"));
    handle.shutdown();
}

#[tokio::test]
async fn disconnecting_subscriber_is_forgotten() {
    let (handle, _dir) = start_server().await;
    let sub = connect(&handle).await;
    let mut sub_keeper = connect(&handle).await;
    let mut publisher = connect(&handle).await;

    sub_keeper
        .request_expect(&["SUBSCRIBE", "ch"], confirmation("subscribe", "ch", 1))
        .await;
    drop(sub);
    // Give the server a beat to reap the dropped (never-subscribed) socket.
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    publisher
        .request_expect(&["PUBLISH", "ch", "still"], Frame::Integer(1))
        .await;
    assert_eq!(sub_keeper.recv().await.unwrap(), message("ch", "still"));
    handle.shutdown();
}
