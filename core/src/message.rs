// Request/response event types carried by the bus
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::Result;

/// A response to a single request: the handler's payload or error.
pub type Reply<M> = Result<M>;

/// A request traveling through the bus.
///
/// `reply: None` signals fire-and-forget; nobody is waiting for an answer.
#[derive(Debug)]
pub struct RequestEvent<M> {
    /// Opaque payload; the core imposes no schema.
    pub body: M,
    /// Write-once reply handle, shared by every inbox the request fans
    /// out to.
    pub reply: Option<Responder<M>>,
}

impl<M> RequestEvent<M> {
    pub fn is_fire_and_forget(&self) -> bool {
        self.reply.is_none()
    }
}

/// Write-once reply handle for a single request.
///
/// Fan-out hands a clone to every subscribed inbox; the first `respond`
/// wins and later calls are no-ops, so at most one reply is ever produced
/// per request. Responding never blocks, even when the waiting caller has
/// already given up and dropped its receiver.
#[derive(Debug)]
pub struct Responder<M> {
    slot: Arc<Mutex<Option<oneshot::Sender<Reply<M>>>>>,
}

impl<M> Clone for Responder<M> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<M> Responder<M> {
    /// Creates a responder and the receiver the delivering side waits on.
    pub fn new() -> (Self, oneshot::Receiver<Reply<M>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Writes the reply unless some other clone already did.
    ///
    /// Returns whether this call was the one that replied. A reply sent
    /// after the caller stopped waiting is silently dropped.
    pub fn respond(&self, reply: Reply<M>) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_respond_wins() {
        let (responder, rx) = Responder::new();
        let second = responder.clone();

        assert!(responder.respond(Ok(1)));
        assert!(!second.respond(Ok(2)));

        assert_eq!(rx.await.expect("reply sent").expect("ok reply"), 1);
    }

    #[tokio::test]
    async fn respond_without_reader_does_not_block() {
        let (responder, rx) = Responder::new();
        drop(rx);

        // The slot is consumed even though nobody will read the reply.
        assert!(responder.respond(Ok(7)));
        assert!(!responder.respond(Ok(8)));
    }
}
