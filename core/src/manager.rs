// Handler registration and dispatch-loop lifecycle
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::config::ManagerConfig;
use crate::message::RequestEvent;
use crate::{Result, WeftError};

/// Request handler capability.
///
/// Anything that can turn a request body into a reply body or an error
/// can be registered; no concrete handler type is imposed.
#[async_trait]
pub trait Handler<M>: Send + Sync {
    async fn handle(&self, body: M) -> Result<M>;
}

/// A handler bound to its inbox, waiting for `listen` to start it.
struct Registration<M> {
    topic: String,
    handler: Arc<dyn Handler<M>>,
    inbox: mpsc::Receiver<RequestEvent<M>>,
}

/// One running dispatch loop.
struct DispatchLoop<M> {
    topic: String,
    stop_tx: oneshot::Sender<()>,
    // The loop hands its inbox back on exit so the channel stays open
    handle: JoinHandle<mpsc::Receiver<RequestEvent<M>>>,
}

/// Binds handler functions to topics and orchestrates their dispatch
/// loops.
///
/// Lifecycle per registration: `Registered` -> `Running` (after
/// [`listen`](Manager::listen)) -> `Stopped` (after
/// [`stop`](Manager::stop)), terminal. Registration is only supported
/// before `listen`; late registrations are rejected rather than silently
/// absorbed.
pub struct Manager<M> {
    bus: Arc<Bus<M>>,
    buffer_size: usize,
    registrations: Vec<Registration<M>>,
    loops: Vec<DispatchLoop<M>>,
    // Inboxes of stopped loops, kept alive so later publishes observe the
    // configured publish policy instead of a closed channel
    parked_inboxes: Vec<mpsc::Receiver<RequestEvent<M>>>,
    listening: bool,
}

impl<M: Send + 'static> Manager<M> {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            bus: Arc::new(Bus::new(config.publish_policy())),
            buffer_size: config.buffer_size.max(1),
            registrations: Vec::new(),
            loops: Vec::new(),
            parked_inboxes: Vec::new(),
            listening: false,
        }
    }

    /// The bus this manager registers its inboxes on. Delivery functions
    /// take this handle.
    pub fn bus(&self) -> Arc<Bus<M>> {
        Arc::clone(&self.bus)
    }

    /// Binds `handler` to `topic` with a dedicated bounded inbox of the
    /// configured capacity.
    ///
    /// Must be called before [`listen`](Manager::listen); registering
    /// once the dispatch loops have started returns
    /// [`WeftError::AlreadyListening`].
    pub fn register(&mut self, topic: &str, handler: Arc<dyn Handler<M>>) -> Result<()> {
        if self.listening {
            return Err(WeftError::AlreadyListening(format!(
                "cannot register topic {topic}"
            )));
        }

        let (tx, rx) = mpsc::channel(self.buffer_size);
        self.bus.subscribe(topic, tx);
        self.registrations.push(Registration {
            topic: topic.to_string(),
            handler,
            inbox: rx,
        });
        Ok(())
    }

    /// Starts one dispatch loop per registration, each as an independent
    /// task with a private stop signal.
    ///
    /// A loop hands every received event to the handler on a freshly
    /// spawned task and immediately goes back to waiting, so a slow or
    /// stuck invocation never delays the next event on the same topic.
    /// The flip side: invocation concurrency is unbounded per topic;
    /// only the inbox capacity limits how much work queues up.
    pub fn listen(&mut self) -> Result<()> {
        if self.listening {
            return Err(WeftError::AlreadyListening("listen called twice".into()));
        }
        self.listening = true;

        for reg in self.registrations.drain(..) {
            let (stop_tx, stop_rx) = oneshot::channel();
            let topic = reg.topic.clone();
            let handle = tokio::spawn(dispatch_loop(reg.topic, reg.handler, reg.inbox, stop_rx));
            self.loops.push(DispatchLoop {
                topic,
                stop_tx,
                handle,
            });
        }

        info!("Manager listening with {} dispatch loops", self.loops.len());
        Ok(())
    }

    /// Signals every dispatch loop to stop and waits for all of them to
    /// exit.
    ///
    /// Handler invocations already in flight keep running; they are
    /// neither canceled nor awaited. Callers needing full drain semantics
    /// must build it on top. Publishing at a stopped registration keeps
    /// filling its inbox and then follows the bus's publish policy (a
    /// documented liveness hazard under [`PublishPolicy::Block`]).
    ///
    /// [`PublishPolicy::Block`]: crate::bus::PublishPolicy::Block
    pub async fn stop(&mut self) {
        // Fire all stop signals first so the loops wind down concurrently
        let mut joining = Vec::with_capacity(self.loops.len());
        for dl in self.loops.drain(..) {
            // A loop that already exited has dropped its receiver
            let _ = dl.stop_tx.send(());
            joining.push((dl.topic, dl.handle));
        }

        for (topic, handle) in joining {
            match handle.await {
                Ok(inbox) => self.parked_inboxes.push(inbox),
                Err(e) => warn!("Dispatch loop for {} ended abnormally: {}", topic, e),
            }
        }
        info!("Manager stopped");
    }
}

/// Drains one inbox until the stop signal arrives, spawning one task per
/// event. Returns the inbox to keep the channel open for late publishers.
async fn dispatch_loop<M: Send + 'static>(
    topic: String,
    handler: Arc<dyn Handler<M>>,
    mut inbox: mpsc::Receiver<RequestEvent<M>>,
    mut stop_rx: oneshot::Receiver<()>,
) -> mpsc::Receiver<RequestEvent<M>> {
    debug!("Dispatch loop for {} running", topic);
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            maybe = inbox.recv() => {
                let Some(event) = maybe else { break };
                let handler = Arc::clone(&handler);
                let topic = topic.clone();
                tokio::spawn(async move {
                    invoke(handler, &topic, event).await;
                });
            }
        }
    }
    debug!("Dispatch loop for {} stopped", topic);
    inbox
}

/// Runs one handler invocation and routes its outcome.
async fn invoke<M: Send>(handler: Arc<dyn Handler<M>>, topic: &str, event: RequestEvent<M>) {
    let reply = event.reply;
    let result = handler.handle(event.body).await;
    match reply {
        Some(responder) => {
            // First responder wins; a duplicate reply from another
            // subscriber of the same request is dropped on the floor
            responder.respond(result);
        }
        None => {
            // Fire-and-forget: errors are unobservable by design, so the
            // log line is all the caller will ever get
            if let Err(e) = result {
                warn!("Fire-and-forget handler on {} failed: {}", topic, e);
            }
        }
    }
}
