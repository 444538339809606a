//! Interfaces to the platform services the bridge runs on.
//!
//! The device and host SDKs provide a file mailbox, persistent key-value
//! storage and lifecycle notifications. These traits are the only contact
//! points; see [`crate::memory`] for in-process implementations.

use crate::Error;
use async_trait::async_trait;

/// Callback fired when a new file arrives in an inbox.
pub type NewFileListener = Box<dyn Fn() + Send + Sync>;

/// Callback fired on a lifecycle signal.
pub type SignalListener = Box<dyn Fn() + Send + Sync>;

/// A file popped from the inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub payload: Vec<u8>,
}

impl ReceivedFile {
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound side of the file queue (device).
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Submit a named file for transfer.
    async fn enqueue(&self, name: &str, payload: Vec<u8>) -> Result<(), Error>;
}

/// Inbound side of the file queue (host).
#[async_trait]
pub trait Inbox: Send + Sync {
    /// Take the oldest file. `Ok(None)` when the queue is empty.
    async fn pop(&self) -> Result<Option<ReceivedFile>, Error>;

    /// Register a callback fired whenever a file arrives.
    fn add_new_file_listener(&self, listener: NewFileListener);
}

/// Persistent string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;
    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// Display and application lifecycle notifications (device).
pub trait LifecycleSignals: Send + Sync {
    /// Fired each time the display turns on.
    fn on_display_on(&self, listener: SignalListener);

    /// Fired when the application is about to unload.
    fn on_unload(&self, listener: SignalListener);
}
