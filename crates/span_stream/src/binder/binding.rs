use crate::channel::Subscription;
use span_broker::Consumer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

/// Direction of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Channel → destination
    Producer,
    /// Destination → channel
    Consumer,
}

/// What a binding holds on to while it is active.
pub(crate) enum BindingResource {
    Producer(Subscription),
    Consumer {
        consumer: Arc<Consumer>,
        stop_tx: Mutex<Option<oneshot::Sender<()>>>,
        listener: Mutex<Option<JoinHandle<()>>>,
    },
}

/// A live connection between a channel and a broker destination.
///
/// [`unbind`](Binding::unbind) is idempotent; dropping the binding unbinds it.
pub struct Binding {
    name: String,
    group: Option<String>,
    kind: BindingKind,
    active: AtomicBool,
    resource: BindingResource,
}

impl Binding {
    pub(crate) fn producer(name: &str, subscription: Subscription) -> Self {
        Self {
            name: name.to_string(),
            group: None,
            kind: BindingKind::Producer,
            active: AtomicBool::new(true),
            resource: BindingResource::Producer(subscription),
        }
    }

    pub(crate) fn consumer(
        name: &str,
        group: String,
        consumer: Arc<Consumer>,
        stop_tx: oneshot::Sender<()>,
        listener: JoinHandle<()>,
    ) -> Self {
        Self {
            name: name.to_string(),
            group: Some(group),
            kind: BindingKind::Consumer,
            active: AtomicBool::new(true),
            resource: BindingResource::Consumer {
                consumer,
                stop_tx: Mutex::new(Some(stop_tx)),
                listener: Mutex::new(Some(listener)),
            },
        }
    }

    /// Destination name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consumer group; `None` for producer bindings.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Releases the binding. Calling it again is a no-op.
    ///
    /// A producer binding stops taking messages from its channel. A consumer
    /// binding leaves its group and signals its listener to stop; a record
    /// being dispatched at that moment is not committed and will be
    /// redelivered to the group.
    pub fn unbind(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        match &self.resource {
            BindingResource::Producer(subscription) => subscription.cancel(),
            BindingResource::Consumer {
                consumer, stop_tx, ..
            } => {
                consumer.close();
                if let Some(tx) = stop_tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    let _ = tx.send(());
                }
            }
        }
        info!(
            destination = %self.name,
            group = self.group.as_deref().unwrap_or_default(),
            kind = ?self.kind,
            "unbound"
        );
    }

    /// Unbinds and waits for the listener task to finish.
    pub async fn unbind_and_wait(&self) {
        self.unbind();
        if let BindingResource::Consumer { listener, .. } = &self.resource {
            let handle = listener.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.unbind();
    }
}
