//! Host-side relay from the file queue to the Measurement Protocol.

use crate::codec;
use crate::config::RelayConfigBuilder;
use crate::platform::{Inbox, KeyValueStore, ReceivedFile};
use crate::store::IdentityStore;
use crate::transport::HttpTransport;
use crate::types::{
    now_ms, property_to_string, Envelope, EventBatch, MeasurementPayload, MessageKind,
};
use crate::Error;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of one collect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub event_count: usize,
    /// HTTP status, when a response arrived.
    pub status: Option<u16>,
    /// `None` on success.
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Callback receiving every delivery outcome.
pub type DeliveryObserver = Arc<dyn Fn(&DeliveryReport) + Send + Sync>;

#[derive(Debug, Clone)]
struct Active {
    transport: HttpTransport,
    max_event_age: Option<Duration>,
}

struct Inner {
    inbox: Arc<dyn Inbox>,
    store: IdentityStore,
    runtime: Handle,
    active: Mutex<Option<Active>>,
    listener_registered: AtomicBool,
    drain_lock: tokio::sync::Mutex<()>,
    observer: Mutex<Option<DeliveryObserver>>,
}

/// Host-side relay.
///
/// Drains the inbound file queue, keeps user properties and the client id in
/// the identity store, and posts event envelopes to GA4. Nothing is sent
/// until [`Relay::configure`] succeeds.
///
/// # Example
///
/// ```rust,no_run
/// use ga4_bridge::{MemoryQueue, MemoryStore, Relay, RelayConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), ga4_bridge::Error> {
/// let relay = Relay::new(Arc::new(MemoryQueue::new()), Arc::new(MemoryStore::new()))?;
///
/// relay.configure(RelayConfig::builder("G-XXXXXXX", "api_secret"));
/// relay.send("companion_started");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

impl Relay {
    /// Create a relay. Must be called from within a tokio runtime.
    pub fn new(inbox: Arc<dyn Inbox>, storage: Arc<dyn KeyValueStore>) -> Result<Self, Error> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("relay needs a tokio runtime: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                inbox,
                store: IdentityStore::new(storage),
                runtime,
                active: Mutex::new(None),
                listener_registered: AtomicBool::new(false),
                drain_lock: tokio::sync::Mutex::new(()),
                observer: Mutex::new(None),
            }),
        })
    }

    /// Identity and configuration store.
    pub fn store(&self) -> &IdentityStore {
        &self.inner.store
    }

    /// Whether a `configure` call has succeeded.
    pub fn is_configured(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    /// Register a callback for delivery outcomes, replacing any previous one.
    pub fn on_delivery(&self, observer: impl Fn(&DeliveryReport) + Send + Sync + 'static) {
        *self.inner.observer.lock() = Some(Arc::new(observer));
    }

    // ============================================
    // CONFIGURE
    // ============================================

    /// Configure credentials and start processing.
    ///
    /// Returns false, leaving the relay as it was, when the measurement id or
    /// API secret is missing. On success the values are persisted and,
    /// unless automatic processing is disabled, a new-file listener is
    /// registered (once per relay) and the inbox is drained immediately.
    #[instrument(skip_all)]
    pub fn configure(&self, builder: RelayConfigBuilder) -> bool {
        let config = match builder.build() {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "GA4 measurement id or API secret missing, not configured");
                return false;
            }
        };

        let transport = match HttpTransport::new(config.api_host(), config.timeout()) {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "failed to create HTTP transport, not configured");
                return false;
            }
        };

        let store = &self.inner.store;
        let persisted = store
            .set_measurement_id(config.measurement_id())
            .and_then(|_| store.set_api_secret(config.api_secret()))
            .and_then(|_| store.set_debug(config.debug()));
        if let Err(e) = persisted {
            warn!(error = %e, "failed to persist configuration");
        }

        *self.inner.active.lock() = Some(Active {
            transport,
            max_event_age: config.max_event_age(),
        });

        info!(
            measurement_id = %config.measurement_id(),
            auto_processing = config.auto_file_transfer_processing(),
            "relay configured"
        );

        if config.auto_file_transfer_processing() {
            self.register_listener();
            self.spawn_drain();
        }

        true
    }

    fn register_listener(&self) {
        if self.inner.listener_registered.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.inbox.add_new_file_listener(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Relay { inner }.spawn_drain();
            }
        }));
    }

    fn spawn_drain(&self) -> JoinHandle<usize> {
        let relay = self.clone();
        self.inner.runtime.spawn(async move { relay.drain().await })
    }

    // ============================================
    // FILE PROCESSING
    // ============================================

    /// Pop and process files until the inbox is empty.
    ///
    /// Files are handled one at a time; concurrent calls wait for each
    /// other. Returns the number of files handled.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> usize {
        let _guard = self.inner.drain_lock.lock().await;
        let mut handled = 0;

        loop {
            match self.inner.inbox.pop().await {
                Ok(Some(file)) => {
                    if self.process_file_transfer(&file) {
                        handled += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to pop from inbox");
                    break;
                }
            }
        }

        if handled > 0 {
            debug!(handled, "inbox drained");
        }
        handled
    }

    /// Process one file from the inbox.
    ///
    /// Returns true when the file belonged to this bridge and was applied.
    /// Files with foreign names are ignored without side effects.
    pub fn process_file_transfer(&self, file: &ReceivedFile) -> bool {
        let Some(kind) = MessageKind::classify(&file.name) else {
            return false;
        };

        if self.inner.store.debug() {
            info!(file = %file.name, "file is being processed");
        }

        match kind {
            MessageKind::Event => match codec::decode::<Envelope>(&file.payload) {
                Ok(envelope) => {
                    self.forward(envelope);
                    true
                }
                Err(e) => {
                    warn!(file = %file.name, error = %e, "unreadable event envelope");
                    false
                }
            },
            MessageKind::SetUserProperties => {
                match codec::decode::<Map<String, Value>>(&file.payload) {
                    Ok(properties) => self.apply_user_properties(properties),
                    Err(e) => {
                        warn!(file = %file.name, error = %e, "unreadable user properties");
                        false
                    }
                }
            }
            MessageKind::ClearUserProperties => match self.inner.store.clear_user_properties() {
                Ok(()) => {
                    debug!("user properties cleared");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "failed to clear user properties");
                    false
                }
            },
        }
    }

    fn apply_user_properties(&self, properties: Map<String, Value>) -> bool {
        let updates = properties
            .iter()
            .map(|(k, v)| (k.clone(), property_to_string(v)));

        match self.inner.store.merge_user_properties(updates) {
            Ok(merged) => {
                debug!(count = merged.len(), "user properties updated");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to store user properties");
                false
            }
        }
    }

    // ============================================
    // SEND
    // ============================================

    /// Send one event or a sequence of events from the host itself.
    ///
    /// Dropped with a log line when the relay is not configured. Returns the
    /// handle of the spawned request, if one was issued.
    pub fn send(&self, events: impl Into<EventBatch>) -> Option<JoinHandle<()>> {
        self.forward(Envelope::new(events))
    }

    fn forward(&self, envelope: Envelope) -> Option<JoinHandle<()>> {
        let Some(active) = self.inner.active.lock().clone() else {
            info!("relay not configured, dropping events");
            return None;
        };

        let store = &self.inner.store;
        let (Some(measurement_id), Some(api_secret)) = (store.measurement_id(), store.api_secret())
        else {
            warn!("no measurement id or API secret, dropping events");
            return None;
        };

        let captured_at = envelope.timestamp;
        let mut payload = MeasurementPayload::from_envelope(
            store.get_or_generate_client_id(),
            envelope,
            &store.user_properties(),
        );

        if let Some(max_age) = active.max_event_age {
            if is_stale(captured_at, now_ms(), max_age) {
                debug!(captured_at, "event too old for timestamp_micros");
                payload.timestamp_micros = None;
            }
        }

        if store.debug() {
            match serde_json::to_string(&payload) {
                Ok(body) => info!(
                    measurement_id = %measurement_id,
                    client_id = %payload.client_id,
                    body = %body,
                    "sending to GA4"
                ),
                Err(e) => warn!(
                    measurement_id = %measurement_id,
                    client_id = %payload.client_id,
                    error = %e,
                    "sending to GA4, body not printable"
                ),
            }
        }

        let observer = self.inner.observer.lock().clone();
        let event_count = payload.events.len();

        Some(self.inner.runtime.spawn(async move {
            let result = active
                .transport
                .send(&measurement_id, &api_secret, &payload)
                .await;

            let report = match result {
                Ok(status) => DeliveryReport {
                    event_count,
                    status: Some(status.as_u16()),
                    error: None,
                },
                Err(e) => {
                    debug!(error = %e, "collect request failed");
                    DeliveryReport {
                        event_count,
                        status: match &e {
                            Error::Status { status, .. } => Some(*status),
                            Error::Http(http) => http.status().map(|s| s.as_u16()),
                            _ => None,
                        },
                        error: Some(e.to_string()),
                    }
                }
            };

            if let Some(observer) = observer {
                observer(&report);
            }
        }))
    }
}

/// Whether an envelope captured at `captured_at` (ms) is older than `max_age`.
fn is_stale(captured_at: i64, now: i64, max_age: Duration) -> bool {
    let limit = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    now.saturating_sub(captured_at) > limit
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("configured", &self.is_configured())
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}
