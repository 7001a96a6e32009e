//! Publish/subscribe hub.
//!
//! The hub owns the channel → subscriber index; each subscriber is a clone
//! of its connection's bounded outbox sender plus a kill handle.  Fan-out is
//! fire-and-forget in registration order.  A subscriber whose outbox is full
//! is evicted and its connection killed; a slow consumer never stalls the
//! publisher or the other subscribers.

use cc_resp::Frame;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tracing::debug;

/// One subscribed connection as the hub sees it.
struct Subscriber {
    conn_id: u64,
    outbox: mpsc::Sender<Vec<u8>>,
    kill: Arc<Notify>,
}

#[derive(Default)]
pub struct PubSubHub {
    /// Registration order per channel is delivery order.
    channels: HashMap<Vec<u8>, Vec<Subscriber>>,
}

impl PubSubHub {
    pub fn new() -> PubSubHub {
        PubSubHub::default()
    }

    /// Add `conn_id` to a channel.  Re-subscribing is a no-op (the original
    /// registration slot is kept).
    pub fn subscribe(
        &mut self,
        conn_id: u64,
        channel: &[u8],
        outbox: mpsc::Sender<Vec<u8>>,
        kill: Arc<Notify>,
    ) {
        let subs = self.channels.entry(channel.to_vec()).or_default();
        if subs.iter().any(|s| s.conn_id == conn_id) {
            return;
        }
        subs.push(Subscriber {
            conn_id,
            outbox,
            kill,
        });
    }

    pub fn unsubscribe(&mut self, conn_id: u64, channel: &[u8]) {
        if let Some(subs) = self.channels.get_mut(channel) {
            subs.retain(|s| s.conn_id != conn_id);
            if subs.is_empty() {
                self.channels.remove(channel);
            }
        }
    }

    /// Drop every registration for a closing connection.
    pub fn unsubscribe_all(&mut self, conn_id: u64) {
        self.channels.retain(|_, subs| {
            subs.retain(|s| s.conn_id != conn_id);
            !subs.is_empty()
        });
    }

    /// Deliver `payload` to every subscriber of `channel`, in registration
    /// order.  Returns the number of subscribers the message was handed to.
    pub fn publish(&mut self, channel: &[u8], payload: &[u8]) -> usize {
        let Some(subs) = self.channels.get_mut(channel) else {
            return 0;
        };
        let message = Frame::Array(vec![
            Frame::Bulk(b"message".to_vec()),
            Frame::Bulk(channel.to_vec()),
            Frame::Bulk(payload.to_vec()),
        ])
        .encode();

        let mut delivered = 0;
        let mut evicted: Vec<u64> = Vec::new();
        for sub in subs.iter() {
            match sub.outbox.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    // Outbox full or connection gone: cut the subscriber
                    // loose rather than block the publisher.
                    debug!(conn_id = sub.conn_id, "evicting slow subscriber");
                    sub.kill.notify_one();
                    evicted.push(sub.conn_id);
                }
            }
        }
        for conn_id in evicted {
            self.unsubscribe_all(conn_id);
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &[u8]) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }
}
