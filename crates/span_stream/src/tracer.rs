//! Span creation and closing.
//!
//! Each thread keeps a stack of open span contexts. [`Tracer::create_span`]
//! opens a child of the thread's current span (or a new trace root) and makes
//! it current; [`Tracer::close`] freezes it, restores the parent and hands the
//! span to the [`SpanReporter`] on the calling thread.
//!
//! The stack belongs to the thread, not to a [`Tracer`]: every tracer used on
//! a thread sees the same current span, so a span opened by one tracer becomes
//! the parent of the next span any tracer opens there. Dropping an
//! [`ActiveSpan`] without closing it takes it off the stack again.

use crate::sampler::Sampler;
use crate::span::{now_nanos, Log, Span, SpanContext};
use rand::Rng;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use tracing::{debug, trace, warn};

thread_local! {
    static CURRENT: RefCell<Vec<SpanContext>> = const { RefCell::new(Vec::new()) };
}

/// Receives spans as they are closed.
///
/// Called on the thread that closed the span, so implementations should only
/// hand the span off (e.g. enqueue it) rather than do I/O.
pub trait SpanReporter: Send + Sync {
    fn report(&self, span: Span);
}

/// A span that is still being recorded.
///
/// Must be passed back to [`Tracer::close`]; a dropped `ActiveSpan` is never
/// reported, and dropping it restores the current span it replaced.
#[derive(Debug)]
#[must_use = "an active span must be closed to be reported"]
pub struct ActiveSpan {
    context: SpanContext,
    name: String,
    start_time: u64,
    tags: BTreeMap<String, String>,
    logs: Vec<Log>,
    closed: bool,
}

impl ActiveSpan {
    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds (or replaces) a tag.
    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Records a timestamped event.
    pub fn log(&mut self, event: impl Into<String>) {
        self.logs.push(Log {
            timestamp: now_nanos(),
            event: event.into(),
        });
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let span_id = self.context.span_id;
        // The thread-local may already be gone during thread teardown
        let _ = CURRENT.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|c| c.span_id == span_id) {
                stack.remove(pos);
                debug!(
                    span = %self.name,
                    span_id = format_args!("{span_id:016x}"),
                    "span dropped without being closed"
                );
            }
        });
    }
}

/// Creates and closes spans.
///
/// Cheap to clone; clones share the sampler and reporter.
#[derive(Clone)]
pub struct Tracer {
    sampler: Arc<dyn Sampler>,
    reporter: Arc<dyn SpanReporter>,
}

impl Tracer {
    pub fn new(sampler: Arc<dyn Sampler>, reporter: Arc<dyn SpanReporter>) -> Self {
        Self { sampler, reporter }
    }

    /// Opens a span named `name` as a child of the current span, or as the
    /// root of a new trace when this thread has no current span.
    pub fn create_span(&self, name: impl Into<String>) -> ActiveSpan {
        let span = match self.current_span() {
            Some(parent) => self.open(name.into(), child_context(&parent)),
            None => {
                let mut rng = rand::thread_rng();
                let span_id = rng.gen();
                let context = SpanContext {
                    trace_id: rng.gen(),
                    span_id,
                    parent_id: None,
                    sampled: self.sampler.is_sampled(),
                };
                self.open(name.into(), context)
            }
        };
        CURRENT.with(|stack| stack.borrow_mut().push(span.context));
        span
    }

    /// Opens a child of `parent`, which may come from another thread or process.
    pub fn create_child_span(&self, name: impl Into<String>, parent: &SpanContext) -> ActiveSpan {
        let span = self.open(name.into(), child_context(parent));
        CURRENT.with(|stack| stack.borrow_mut().push(span.context));
        span
    }

    /// The innermost open span on this thread.
    pub fn current_span(&self) -> Option<SpanContext> {
        CURRENT.with(|stack| stack.borrow().last().copied())
    }

    /// Returns `true` while this thread has an open span.
    pub fn is_tracing(&self) -> bool {
        self.current_span().is_some()
    }

    /// Closes `span`, reports it when sampled and returns the frozen span.
    pub fn close(&self, mut span: ActiveSpan) -> Span {
        span.closed = true;
        let context = span.context;
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.iter().rposition(|c| c.span_id == context.span_id) {
                Some(pos) if pos + 1 == stack.len() => {
                    stack.pop();
                }
                Some(pos) => {
                    warn!(
                        span = %span.name,
                        span_id = format_args!("{:016x}", context.span_id),
                        "closing a span that is not the current one; dropping the spans opened after it"
                    );
                    stack.truncate(pos);
                }
                None => {
                    warn!(
                        span = %span.name,
                        span_id = format_args!("{:016x}", context.span_id),
                        "closing a span that is not open on this thread"
                    );
                }
            }
        });

        let closed = Span::closed(
            context,
            mem::take(&mut span.name),
            span.start_time,
            mem::take(&mut span.tags),
            mem::take(&mut span.logs),
        );
        if closed.is_exportable() {
            self.reporter.report(closed.clone());
        } else {
            trace!(span = closed.name(), "span not sampled");
        }
        closed
    }

    fn open(&self, name: String, context: SpanContext) -> ActiveSpan {
        trace!(
            span = %name,
            trace_id = format_args!("{:032x}", context.trace_id),
            span_id = format_args!("{:016x}", context.span_id),
            "span opened"
        );
        ActiveSpan {
            context,
            name,
            start_time: now_nanos(),
            tags: BTreeMap::new(),
            logs: Vec::new(),
            closed: false,
        }
    }
}

fn child_context(parent: &SpanContext) -> SpanContext {
    SpanContext {
        trace_id: parent.trace_id,
        span_id: rand::thread_rng().gen(),
        parent_id: Some(parent.span_id),
        sampled: parent.sampled,
    }
}
