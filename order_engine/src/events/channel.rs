//! Simple stateless pub-sub event handler
//!
//! Components subscribe to order engine events and react to them. Handlers are stateless: all they receive is the
//! event itself. Handlers can be async, and each event is handled in its own task so that a slow handler (e.g. one
//! that calls out to a mail queue) does not hold up the ones behind it.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight handlers to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Drop our own sender so that the channel closes when the last producer goes away.
        drop(self.sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.spawn(async move { (handler)(ev).await });
            // Reap finished jobs as we go so the set doesn't grow without bound
            while let Some(res) = jobs.try_join_next() {
                if let Err(e) = res {
                    warn!("📬️ Event handler task failed: {e}");
                }
            }
        }
        debug!("📬️ All producers have gone away. Waiting for {} jobs to complete", jobs.len());
        while let Some(res) = jobs.join_next().await {
            if let Err(e) = res {
                warn!("📬️ Event handler task failed: {e}");
            }
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Queues the event for the handler. A closed channel is logged and otherwise ignored; publishing never fails the
    /// operation that raised the event. Returns whether the event was queued.
    pub async fn publish_event(&self, event: E) -> bool {
        match self.sender.send(event).await {
            Ok(()) => true,
            Err(e) => {
                error!("📬️ Failed to send event: {e}");
                false
            },
        }
    }
}
