//! Receiving end of the span stream.
//!
//! The collector keeps every inbound batch that contains at least one span
//! accepted by its matcher. Batches are kept whole, in arrival order.

use crate::channel::{MessageChannel, Subscription};
use crate::codec;
use crate::error::{CollectorError, HandlerError};
use crate::message::Message;
use crate::span::{Span, SpanBatch};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

type Matcher = dyn Fn(&Span) -> bool + Send + Sync;

struct CollectorInner {
    matcher: Box<Matcher>,
    queue: Mutex<VecDeque<SpanBatch>>,
    arrived: Notify,
}

/// Thread-safe, unbounded queue of matching span batches.
///
/// Cloning is cheap; clones share the queue.
#[derive(Clone)]
pub struct SpanCollector {
    inner: Arc<CollectorInner>,
}

impl SpanCollector {
    /// Keeps batches with at least one span for which `matcher` returns `true`.
    pub fn new(matcher: impl Fn(&Span) -> bool + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                matcher: Box::new(matcher),
                queue: Mutex::new(VecDeque::new()),
                arrived: Notify::new(),
            }),
        }
    }

    /// Keeps batches containing a span called `name`.
    pub fn matching_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |span| span.name() == name)
    }

    /// Offers a batch; returns `true` if it was stored.
    pub fn on_batch(&self, batch: SpanBatch) -> bool {
        if !batch.spans.iter().any(|s| (self.inner.matcher)(s)) {
            trace!(spans = batch.len(), "ignoring batch without matching spans");
            return false;
        }
        debug!(spans = batch.len(), service = %batch.host.service_name, "collected span batch");
        self.queue().push_back(batch);
        self.inner.arrived.notify_waiters();
        true
    }

    /// Collects batches delivered on `channel`.
    ///
    /// Batches without a matching span are still acknowledged.
    pub fn subscribe(&self, channel: &MessageChannel) -> Subscription {
        let collector = self.clone();
        channel.subscribe(move |message: &Message| -> Result<(), HandlerError> {
            collector.on_batch(codec::decode(message)?);
            Ok(())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    /// Snapshot of the stored batches, oldest first.
    pub fn batches(&self) -> Vec<SpanBatch> {
        self.queue().iter().cloned().collect()
    }

    /// Removes and returns every stored batch.
    pub fn drain(&self) -> Vec<SpanBatch> {
        self.queue().drain(..).collect()
    }

    /// Waits until at least one batch is stored, or fails after `timeout`.
    pub async fn wait_for_match(&self, timeout: Duration) -> Result<(), CollectorError> {
        let wait = async {
            loop {
                let arrived = self.inner.arrived.notified();
                tokio::pin!(arrived);
                arrived.as_mut().enable();
                if !self.is_empty() {
                    return;
                }
                arrived.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| CollectorError::Timeout(timeout))
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<SpanBatch>> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SpanCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanCollector").field("batches", &self.len()).finish()
    }
}
