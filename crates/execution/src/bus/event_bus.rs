//! In-process publish/subscribe.
//!
//! Every subscriber owns an unbounded queue drained by a dedicated task, so
//! `publish` never waits on a handler. Each topic has one lock guarding its
//! subscriber list; publishing holds it only while stamping the sequence
//! number and enqueueing, which gives every subscriber of a topic the same
//! delivery order and makes subscribe/unsubscribe atomic with respect to a
//! dispatch.

use super::{EngineEvent, Envelope, Topic};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Receives events for one subscription. Returning `Err` or panicking is
/// logged and counted; delivery to other subscribers is unaffected.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Arc<Envelope>) -> anyhow::Result<()>;
}

/// Adapter turning a closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Envelope) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn handle(&self, event: Arc<Envelope>) -> anyhow::Result<()> {
        (self.0)(&event)
    }
}

/// Wraps a synchronous closure as a handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Envelope) -> anyhow::Result<()> + Send + Sync + 'static,
{
    FnHandler(f)
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events published.
    pub published: u64,
    /// Successful handler invocations.
    pub delivered: u64,
    /// Handler errors and panics.
    pub faults: u64,
}

struct Slot {
    id: u64,
    tx: mpsc::UnboundedSender<Arc<Envelope>>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct TopicState {
    seq: u64,
    slots: Vec<Slot>,
}

struct BusInner {
    topics: HashMap<Topic, Mutex<TopicState>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    faults: AtomicU64,
}

impl BusInner {
    fn topic(&self, topic: Topic) -> MutexGuard<'_, TopicState> {
        // Every topic is inserted at construction.
        let lock = &self.topics[&topic];
        lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, topic: Topic, id: u64) {
        let mut state = self.topic(topic);
        if let Some(pos) = state.slots.iter().position(|s| s.id == id) {
            let slot = state.slots.remove(pos);
            slot.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

/// Cloneable handle to the event bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a new event bus.
    #[must_use]
    pub fn new() -> Self {
        let topics = Topic::ALL
            .into_iter()
            .map(|t| (t, Mutex::new(TopicState::default())))
            .collect();
        Self {
            inner: Arc::new(BusInner {
                topics,
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                faults: AtomicU64::new(0),
            }),
        }
    }

    /// Publishes an event on its topic. Never blocks on subscribers.
    pub fn publish(&self, event: EngineEvent) {
        let topic = event.topic();
        let mut state = self.inner.topic(topic);
        state.seq += 1;
        let envelope = Arc::new(Envelope {
            id: Uuid::new_v4(),
            seq: state.seq,
            topic,
            timestamp: Utc::now(),
            event,
        });

        // A closed queue means its subscriber task is gone; prune it.
        state.slots.retain(|slot| slot.tx.send(envelope.clone()).is_ok());
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        debug!(topic = ?topic, seq = envelope.seq, subscribers = state.slots.len(), "Event published");
    }

    /// Registers `handler` for `topic`. Must be called from within a Tokio
    /// runtime; the handler runs on its own task.
    pub fn subscribe<H: EventHandler>(&self, topic: Topic, handler: H) -> Subscription {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<Envelope>>();
        let subscription = self.register(topic, tx);
        let cancelled = subscription.cancelled.clone();
        let handler = Arc::new(handler);
        let inner = Arc::downgrade(&self.inner);
        let subscriber = subscription.id;

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                let h = handler.clone();
                let seq = envelope.seq;
                // Run each invocation on its own task so a panic stays contained.
                let outcome = tokio::spawn(async move { h.handle(envelope).await }).await;

                let Some(inner) = inner.upgrade() else { break };
                match outcome {
                    Ok(Ok(())) => {
                        inner.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(e)) => {
                        inner.faults.fetch_add(1, Ordering::Relaxed);
                        warn!(topic = ?topic, subscriber, seq, error = %e, "Event handler failed");
                    }
                    Err(join) => {
                        inner.faults.fetch_add(1, Ordering::Relaxed);
                        error!(
                            topic = ?topic,
                            subscriber,
                            seq,
                            panicked = join.is_panic(),
                            "Event handler aborted"
                        );
                    }
                }
            }
        });

        subscription
    }

    /// Subscribes with a plain channel instead of a handler, for
    /// presentation layers that poll.
    pub fn subscribe_channel(
        &self,
        topic: Topic,
    ) -> (Subscription, mpsc::UnboundedReceiver<Arc<Envelope>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(topic, tx), rx)
    }

    fn register(&self, topic: Topic, tx: mpsc::UnboundedSender<Arc<Envelope>>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.inner.topic(topic).slots.push(Slot {
            id,
            tx,
            cancelled: cancelled.clone(),
        });
        debug!(topic = ?topic, subscriber = id, "Subscribed");
        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
            cancelled,
            detached: false,
        }
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.topic(topic).slots.len()
    }

    /// Delivery counters.
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            faults: self.inner.faults.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel token returned by `subscribe`. Dropping it unsubscribes; events
/// still queued for the subscriber are discarded.
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: u64,
    cancelled: Arc<AtomicBool>,
    detached: bool,
}

impl Subscription {
    /// Topic subscribed to.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Unsubscribes now.
    pub fn cancel(self) {
        drop(self);
    }

    /// Keeps the subscription alive for the lifetime of the bus.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.topic, self.id);
            debug!(topic = ?self.topic, subscriber = self.id, "Unsubscribed");
        }
    }
}
