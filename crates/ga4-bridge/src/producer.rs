//! Device-side event producer.

use crate::codec;
use crate::platform::{LifecycleSignals, Outbox};
use crate::types::{Envelope, EventBatch, MessageKind};
use crate::Error;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of one outbox submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub file_name: String,
    pub kind: MessageKind,
    /// `None` on success.
    pub error: Option<String>,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Callback receiving every transfer outcome.
pub type TransferObserver = Arc<dyn Fn(&TransferReport) + Send + Sync>;

/// Device-side producer that writes envelopes to the outbox.
///
/// Every call is fire-and-forget: it spawns one task performing exactly one
/// enqueue and returns immediately. Failures are logged and passed to the
/// observer, never to the caller. The returned handle may be awaited or
/// dropped; `None` means nothing was submitted.
///
/// # Example
///
/// ```rust,no_run
/// use ga4_bridge::{Event, MemoryQueue, Producer};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), ga4_bridge::Error> {
/// let producer = Producer::new(Arc::new(MemoryQueue::new()))?;
///
/// producer.send(Event::new("level_up").param("level", 3));
/// producer.set_user_properties(serde_json::json!({"plan": "pro"}));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Producer {
    outbox: Arc<dyn Outbox>,
    runtime: Handle,
    debug: Arc<AtomicBool>,
    observer: Arc<Mutex<Option<TransferObserver>>>,
}

impl Producer {
    /// Create a producer. Must be called from within a tokio runtime.
    pub fn new(outbox: Arc<dyn Outbox>) -> Result<Self, Error> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("producer needs a tokio runtime: {}", e)))?;

        Ok(Self {
            outbox,
            runtime,
            debug: Arc::new(AtomicBool::new(false)),
            observer: Arc::new(Mutex::new(None)),
        })
    }

    /// Log successful transfers at info level instead of debug.
    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::SeqCst);
    }

    /// Register a callback for transfer outcomes, replacing any previous one.
    pub fn on_transfer(&self, observer: impl Fn(&TransferReport) + Send + Sync + 'static) {
        *self.observer.lock() = Some(Arc::new(observer));
    }

    /// Send one event or a sequence of events.
    pub fn send(&self, events: impl Into<EventBatch>) -> Option<JoinHandle<()>> {
        let envelope = Envelope::new(events);
        self.enqueue_encoded(MessageKind::Event, &envelope)
    }

    /// Set user properties on the relay.
    ///
    /// `properties` must be a JSON object; anything else is logged and
    /// ignored.
    pub fn set_user_properties(&self, properties: Value) -> Option<JoinHandle<()>> {
        if !properties.is_object() {
            warn!(
                properties = %properties,
                "user properties must be a key-value object, ignoring"
            );
            return None;
        }
        self.enqueue_encoded(MessageKind::SetUserProperties, &properties)
    }

    /// Clear all user properties on the relay.
    pub fn clear_user_properties(&self) -> Option<JoinHandle<()>> {
        Some(self.enqueue(MessageKind::ClearUserProperties, Vec::new()))
    }

    /// Send `load` now, `display_on` on every display wake and `unload` at
    /// session end.
    ///
    /// Call once, right after creating the producer. Returns the handle of
    /// the `load` transfer.
    pub fn send_load_and_display_on_events(
        &self,
        lifecycle: &dyn LifecycleSignals,
    ) -> Option<JoinHandle<()>> {
        let producer = self.clone();
        lifecycle.on_display_on(Box::new(move || {
            producer.send("display_on");
        }));

        let producer = self.clone();
        lifecycle.on_unload(Box::new(move || {
            producer.send("unload");
        }));

        self.send("load")
    }

    fn enqueue_encoded<T: Serialize>(&self, kind: MessageKind, value: &T) -> Option<JoinHandle<()>> {
        match codec::encode(value) {
            Ok(bytes) => Some(self.enqueue(kind, bytes)),
            Err(e) => {
                error!(error = %e, kind = ?kind, "failed to encode payload");
                None
            }
        }
    }

    fn enqueue(&self, kind: MessageKind, payload: Vec<u8>) -> JoinHandle<()> {
        let file_name = kind.file_name();
        let outbox = self.outbox.clone();
        let debug = self.debug.load(Ordering::SeqCst);
        let observer = self.observer.clone();

        self.runtime.spawn(async move {
            let result = outbox.enqueue(&file_name, payload).await;

            match &result {
                Ok(()) if debug => info!(file = %file_name, "file transferred successfully"),
                Ok(()) => debug!(file = %file_name, "file transferred successfully"),
                Err(e) => warn!(file = %file_name, error = %e, "file failed to transfer"),
            }

            let observer = observer.lock().clone();
            if let Some(observer) = observer {
                observer(&TransferReport {
                    file_name,
                    kind,
                    error: result.err().map(|e| e.to_string()),
                });
            }
        })
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("debug", &self.debug.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
