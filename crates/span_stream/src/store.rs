//! In-memory span storage, as kept by a span collection server.

use crate::channel::{MessageChannel, Subscription};
use crate::codec;
use crate::error::HandlerError;
use crate::message::Message;
use crate::span::{Span, SpanBatch};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// A stored span together with the service that reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSpan {
    pub service_name: String,
    pub span: Span,
}

#[derive(Debug, Default)]
struct StoreState {
    /// Spans per trace, keyed by span id
    traces: HashMap<u128, BTreeMap<u64, StoredSpan>>,
    /// Span names per service
    names: BTreeMap<String, BTreeSet<String>>,
}

/// Stores spans by trace. Accepting the same span twice has no effect, so
/// redelivered batches are harmless.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpanStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemorySpanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores every span of `batch`; returns how many were new.
    pub fn accept(&self, batch: &SpanBatch) -> usize {
        let service = &batch.host.service_name;
        let mut state = self.write();
        let mut added = 0;
        for span in &batch.spans {
            let trace = state.traces.entry(span.trace_id()).or_default();
            if trace.contains_key(&span.span_id()) {
                continue;
            }
            trace.insert(
                span.span_id(),
                StoredSpan {
                    service_name: service.clone(),
                    span: span.clone(),
                },
            );
            state
                .names
                .entry(service.clone())
                .or_default()
                .insert(span.name().to_string());
            added += 1;
        }
        debug!(service = %service, received = batch.len(), added, "stored spans");
        added
    }

    /// Stores batches delivered on `channel`.
    pub fn subscribe(&self, channel: &MessageChannel) -> Subscription {
        let store = self.clone();
        channel.subscribe(move |message: &Message| -> Result<(), HandlerError> {
            store.accept(&codec::decode(message)?);
            Ok(())
        })
    }

    /// Ids of all stored traces, sorted.
    pub fn traces(&self) -> Vec<u128> {
        let mut ids: Vec<u128> = self.read().traces.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Spans of one trace ordered by start time; empty for an unknown trace.
    pub fn trace(&self, trace_id: u128) -> Vec<StoredSpan> {
        let mut spans: Vec<StoredSpan> = self
            .read()
            .traces
            .get(&trace_id)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        spans.sort_by_key(|s| (s.span.start_time(), s.span.span_id()));
        spans
    }

    pub fn span_count(&self) -> usize {
        self.read().traces.values().map(BTreeMap::len).sum()
    }

    /// Services that reported at least one span, sorted.
    pub fn service_names(&self) -> Vec<String> {
        self.read().names.keys().cloned().collect()
    }

    /// Span names reported by `service`, sorted.
    pub fn span_names(&self, service: &str) -> Vec<String> {
        self.read()
            .names
            .get(service)
            .map(|n| n.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
