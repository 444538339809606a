//! In-process implementations of the platform interfaces.
//!
//! Useful for hosts without a native file mailbox, for loopback setups where
//! producer and relay share a process, and for tests.

use crate::platform::{
    Inbox, KeyValueStore, LifecycleSignals, NewFileListener, Outbox, ReceivedFile, SignalListener,
};
use crate::Error;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// FIFO file mailbox acting as both outbox and inbox.
#[derive(Default)]
pub struct MemoryQueue {
    files: Mutex<VecDeque<ReceivedFile>>,
    listeners: Mutex<Vec<Listener>>,
    fail_enqueue: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file and notify listeners.
    pub fn push(&self, file: ReceivedFile) {
        self.files.lock().push_back(file);

        // Listeners run outside the lock so they may pop.
        let listeners: Vec<Listener> = self.listeners.lock().clone();
        for listener in listeners {
            listener();
        }
    }

    /// Make subsequent enqueues fail.
    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    /// Number of files waiting.
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the waiting files, oldest first.
    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().iter().map(|f| f.name.clone()).collect()
    }

    /// Number of registered new-file listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl std::fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryQueue")
            .field("files", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[async_trait]
impl Outbox for MemoryQueue {
    async fn enqueue(&self, name: &str, payload: Vec<u8>) -> Result<(), Error> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(Error::Transfer(format!("outbox rejected {}", name)));
        }
        self.push(ReceivedFile::new(name, payload));
        Ok(())
    }
}

#[async_trait]
impl Inbox for MemoryQueue {
    async fn pop(&self) -> Result<Option<ReceivedFile>, Error> {
        Ok(self.files.lock().pop_front())
    }

    fn add_new_file_listener(&self, listener: NewFileListener) {
        self.listeners.lock().push(Arc::from(listener));
    }
}

/// Key-value store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `set` and `remove` calls fail without changing anything.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self, key: &str) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("store rejected write to {}", key),
            )));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.check_writable(key)?;
        self.values.lock().insert(key.into(), value.into());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.check_writable(key)?;
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Lifecycle signals fired by hand.
#[derive(Default)]
pub struct ManualLifecycle {
    display_on: Mutex<Vec<Listener>>,
    unload: Mutex<Vec<Listener>>,
}

impl ManualLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that the display turned on.
    pub fn fire_display_on(&self) {
        let listeners: Vec<Listener> = self.display_on.lock().clone();
        for listener in listeners {
            listener();
        }
    }

    /// Signal that the application is unloading.
    pub fn fire_unload(&self) {
        let listeners: Vec<Listener> = self.unload.lock().clone();
        for listener in listeners {
            listener();
        }
    }
}

impl LifecycleSignals for ManualLifecycle {
    fn on_display_on(&self, listener: SignalListener) {
        self.display_on.lock().push(Arc::from(listener));
    }

    fn on_unload(&self, listener: SignalListener) {
        self.unload.lock().push(Arc::from(listener));
    }
}
