//! Named point-to-point message channels with explicit handler registration.

use crate::error::{ChannelError, HandlerError};
use crate::message::Message;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Processes messages delivered on a channel.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        self(message)
    }
}

struct Subscriber {
    id: u64,
    handler: Arc<dyn MessageHandler>,
}

struct ChannelInner {
    name: String,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    cursor: AtomicUsize,
}

/// A direct channel: each message goes to exactly one subscriber.
///
/// Subscribers take turns (round-robin). When a subscriber fails, the
/// message fails over to the next one; the send fails only when every
/// subscriber has failed. `send` runs the handler on the caller's thread.
#[derive(Clone)]
pub struct MessageChannel {
    inner: Arc<ChannelInner>,
}

impl MessageChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.into(),
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registers `handler`; it receives messages until the subscription is cancelled.
    pub fn subscribe(&self, handler: impl MessageHandler + 'static) -> Subscription {
        self.subscribe_arc(Arc::new(handler))
    }

    /// Like [`subscribe`](MessageChannel::subscribe) for an already shared handler.
    pub fn subscribe_arc(&self, handler: Arc<dyn MessageHandler>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { id, handler });
        debug!(channel = %self.inner.name, subscription = id, "handler subscribed");
        Subscription {
            channel: self.clone(),
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `message` to one subscriber.
    pub fn send(&self, message: &Message) -> Result<(), ChannelError> {
        // Snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| Arc::clone(&s.handler))
            .collect();

        if handlers.is_empty() {
            return Err(ChannelError::NoSubscribers(self.inner.name.clone()));
        }

        let start = self.inner.cursor.fetch_add(1, Ordering::Relaxed);
        let mut last_error = None;
        for i in 0..handlers.len() {
            let handler = &handlers[(start + i) % handlers.len()];
            match handler.handle(message) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(channel = %self.inner.name, error = %e, "handler failed, failing over");
                    last_error = Some(e);
                }
            }
        }

        Err(ChannelError::Delivery {
            channel: self.inner.name.clone(),
            attempts: handlers.len(),
            source: last_error.unwrap_or_else(|| HandlerError::Rejected("no handler ran".into())),
        })
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("name", &self.inner.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle to a registered handler.
#[derive(Debug, Clone)]
pub struct Subscription {
    channel: MessageChannel,
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire)
    }

    /// Removes the handler from the channel. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) && self.channel.unsubscribe(self.id) {
            debug!(channel = %self.channel.name(), subscription = self.id, "handler unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl MessageHandler + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |m: &Message| -> Result<(), HandlerError> {
            sink.lock()
                .unwrap()
                .push(String::from_utf8_lossy(m.payload()).into_owned());
            Ok(())
        };
        (seen, handler)
    }

    #[test]
    fn test_no_subscribers() {
        let channel = MessageChannel::new("sleuth");
        let err = channel.send(&Message::new("x")).unwrap_err();
        assert!(matches!(err, ChannelError::NoSubscribers(name) if name == "sleuth"));
    }

    #[test]
    fn test_round_robin_between_subscribers() {
        let channel = MessageChannel::new("sleuth");
        let (a, handler_a) = recorder();
        let (b, handler_b) = recorder();
        channel.subscribe(handler_a);
        channel.subscribe(handler_b);

        for i in 0..4 {
            channel.send(&Message::new(format!("m{i}"))).unwrap();
        }
        assert_eq!(a.lock().unwrap().len(), 2);
        assert_eq!(b.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_failover_to_next_subscriber() {
        let channel = MessageChannel::new("sleuth");
        channel.subscribe(|_: &Message| -> Result<(), HandlerError> {
            Err(HandlerError::Rejected("down".into()))
        });
        let (seen, handler) = recorder();
        channel.subscribe(handler);

        for _ in 0..3 {
            channel.send(&Message::new("x")).unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_all_subscribers_fail() {
        let channel = MessageChannel::new("sleuth");
        channel.subscribe(|_: &Message| -> Result<(), HandlerError> {
            Err(HandlerError::Rejected("down".into()))
        });

        let err = channel.send(&Message::new("x")).unwrap_err();
        assert!(matches!(err, ChannelError::Delivery { attempts: 1, .. }));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let channel = MessageChannel::new("sleuth");
        let (_, handler) = recorder();
        let subscription = channel.subscribe(handler);
        assert_eq!(channel.subscriber_count(), 1);

        subscription.cancel();
        subscription.cancel();
        assert!(!subscription.is_active());
        assert_eq!(channel.subscriber_count(), 0);
    }
}
