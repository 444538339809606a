//! Google Analytics 4 bridge for wearable apps.
//!
//! Events are captured on the device by a [`Producer`], written as CBOR
//! files to the platform's outbound file queue, and picked up on the paired
//! host by a [`Relay`], which enriches them with a persistent client id and
//! user properties and posts them to the GA4 Measurement Protocol.
//!
//! ```text
//! app code -> Producer::send -> outbox ~~ platform transfer ~~> inbox -> Relay -> POST /mp/collect
//! ```
//!
//! Analytics is best-effort: every failure is logged and the event is lost.
//! No call ever surfaces a transfer or network error to its caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use ga4_bridge::{Event, MemoryQueue, MemoryStore, Producer, Relay, RelayConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ga4_bridge::Error> {
//!     // Loopback: producer and relay share one in-memory mailbox.
//!     let mailbox = Arc::new(MemoryQueue::new());
//!
//!     let relay = Relay::new(mailbox.clone(), Arc::new(MemoryStore::new()))?;
//!     relay.configure(RelayConfig::builder("G-XXXXXXX", "api_secret").debug(true));
//!
//!     let producer = Producer::new(mailbox)?;
//!     producer.send(Event::new("level_up").param("level", 3));
//!     producer.set_user_properties(serde_json::json!({"plan": "pro"}));
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
mod config;
mod error;
mod file_store;
mod memory;
pub mod platform;
mod producer;
mod relay;
mod store;
mod transport;
pub mod types;

pub use config::{RelayConfig, RelayConfigBuilder, DEFAULT_API_HOST, DEFAULT_TIMEOUT};
pub use error::Error;
pub use file_store::FileStore;
pub use memory::{ManualLifecycle, MemoryQueue, MemoryStore};
pub use platform::{Inbox, KeyValueStore, LifecycleSignals, Outbox, ReceivedFile};
pub use producer::{Producer, TransferObserver, TransferReport};
pub use relay::{DeliveryObserver, DeliveryReport, Relay};
pub use store::IdentityStore;
pub use transport::HttpTransport;
pub use types::{
    Envelope, Event, EventBatch, MeasurementPayload, MessageKind, UserProperties,
    CLEAR_USER_PROPERTIES_PREFIX, EVENT_PREFIX, SET_USER_PROPERTIES_PREFIX,
};
