//! SUBSCRIBE, UNSUBSCRIBE, PUBLISH.
//!
//! Subscribe/unsubscribe update both the hub's channel index and the
//! connection's own subscription set (the set drives the subscribed-state
//! gate and the counts echoed in confirmation frames).

use crate::connection::ConnCtx;
use crate::state::Shared;
use cc_resp::Frame;
use std::sync::Arc;

pub async fn subscribe(shared: &Arc<Shared>, ctx: &mut ConnCtx, args: &[Vec<u8>]) -> Vec<Frame> {
    let mut hub = shared.hub.lock().await;
    let mut replies = Vec::with_capacity(args.len() - 1);
    for channel in &args[1..] {
        hub.subscribe(ctx.id, channel, ctx.outbox_tx.clone(), ctx.kill.clone());
        ctx.subscriptions.insert(channel.clone());
        replies.push(confirmation(
            b"subscribe",
            Some(channel),
            ctx.subscriptions.len(),
        ));
    }
    replies
}

pub async fn unsubscribe(shared: &Arc<Shared>, ctx: &mut ConnCtx, args: &[Vec<u8>]) -> Vec<Frame> {
    // Bare UNSUBSCRIBE drops every current subscription.
    let channels: Vec<Vec<u8>> = if args.len() > 1 {
        args[1..].to_vec()
    } else {
        let mut all: Vec<Vec<u8>> = ctx.subscriptions.iter().cloned().collect();
        all.sort();
        all
    };
    if channels.is_empty() {
        return vec![confirmation(b"unsubscribe", None, 0)];
    }
    let mut hub = shared.hub.lock().await;
    let mut replies = Vec::with_capacity(channels.len());
    for channel in channels {
        hub.unsubscribe(ctx.id, &channel);
        ctx.subscriptions.remove(&channel);
        replies.push(confirmation(
            b"unsubscribe",
            Some(&channel),
            ctx.subscriptions.len(),
        ));
    }
    replies
}

pub async fn publish(shared: &Arc<Shared>, args: &[Vec<u8>]) -> Frame {
    let delivered = shared.hub.lock().await.publish(&args[1], &args[2]);
    Frame::Integer(delivered as i64)
}

fn confirmation(kind: &[u8], channel: Option<&[u8]>, count: usize) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(kind.to_vec()),
        channel.map_or(Frame::NullBulk, |c| Frame::Bulk(c.to_vec())),
        Frame::Integer(count as i64),
    ])
}
