// Delivery disciplines: blocking-with-cancellation and fire-and-forget
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bus::Bus;
use crate::message::Responder;
use crate::{Result, WeftError};

/// Publishes `body` on `topic` and waits for the single reply, or for
/// the caller's token to fire, whichever comes first.
///
/// Cancellation never undoes the publish: subscribed handlers still see
/// the event, and a reply produced after cancellation is dropped without
/// blocking its handler. With zero subscribers (or a handler that never
/// answers) the call waits until the token fires - the publisher has no
/// way to detect that nobody is listening.
pub async fn deliver<M: Clone + Send + 'static>(
    bus: &Bus<M>,
    topic: &str,
    body: M,
    cancel: &CancellationToken,
) -> Result<M> {
    let (responder, mut reply_rx) = Responder::new();
    bus.publish(topic, body, Some(responder)).await;

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Delivery on {} canceled by caller", topic);
            Err(WeftError::Cancelled)
        }
        received = &mut reply_rx => match received {
            Ok(reply) => reply,
            // Every reply handle was dropped without an answer (no
            // subscriber, or an invocation that died). Only the caller's
            // cancellation ends an unanswered wait.
            Err(_) => {
                cancel.cancelled().await;
                Err(WeftError::Cancelled)
            }
        },
    }
}

/// [`deliver`] with a deadline instead of a caller-managed token.
pub async fn deliver_timeout<M: Clone + Send + 'static>(
    bus: &Bus<M>,
    topic: &str,
    body: M,
    limit: Duration,
) -> Result<M> {
    let cancel = CancellationToken::new();
    match tokio::time::timeout(limit, deliver(bus, topic, body, &cancel)).await {
        Ok(result) => result,
        Err(_) => {
            debug!("Delivery on {} timed out after {:?}", topic, limit);
            Err(WeftError::Cancelled)
        }
    }
}

/// Publishes with no reply channel and returns as soon as every inbox
/// accepted the event.
///
/// The caller learns nothing: not whether a subscriber exists, runs, or
/// fails. Handler errors on this path surface only in the logs.
pub async fn deliver_async<M: Clone + Send + 'static>(bus: &Bus<M>, topic: &str, body: M) {
    bus.publish(topic, body, None).await;
}
