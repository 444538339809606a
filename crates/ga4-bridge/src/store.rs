//! Identity and configuration store.

use crate::platform::KeyValueStore;
use crate::types::{now_ms, random_suffix, UserProperties};
use crate::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

pub const CLIENT_ID_KEY: &str = "ga4_client_id";
pub const MEASUREMENT_ID_KEY: &str = "ga4_measurement_id";
pub const API_SECRET_KEY: &str = "ga4_api_secret";
pub const DEBUG_KEY: &str = "debug_key";
pub const USER_PROPERTIES_KEY: &str = "ga4_user_properties";

#[derive(Debug, Default)]
struct Cache {
    client_id: Option<String>,
    measurement_id: Option<String>,
    api_secret: Option<String>,
    debug: Option<bool>,
    user_properties: Option<UserProperties>,
}

/// Read-through cache over persistent storage.
///
/// Getters consult the cache first and populate it from storage on a miss.
/// Setters write to storage first and update the cache only once that succeeds.
pub struct IdentityStore {
    storage: Arc<dyn KeyValueStore>,
    cache: Mutex<Cache>,
}

impl IdentityStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Get the client id, generating and persisting one on first use.
    ///
    /// Format is `{random}.{creation ms}`. Once generated the value never
    /// changes for the lifetime of the store.
    pub fn get_or_generate_client_id(&self) -> String {
        let mut cache = self.cache.lock();

        if let Some(id) = &cache.client_id {
            return id.clone();
        }

        let id = match self.storage.get(CLIENT_ID_KEY).filter(|v| !v.is_empty()) {
            Some(id) => id,
            None => {
                let id = format!("{}.{}", random_suffix(), now_ms());
                debug!(client_id = %id, "generated client id");
                if let Err(e) = self.storage.set(CLIENT_ID_KEY, &id) {
                    warn!(error = %e, "failed to persist client id");
                }
                id
            }
        };

        cache.client_id = Some(id.clone());
        id
    }

    /// Get the GA4 measurement id.
    pub fn measurement_id(&self) -> Option<String> {
        let mut cache = self.cache.lock();
        if cache.measurement_id.is_none() {
            cache.measurement_id = self
                .storage
                .get(MEASUREMENT_ID_KEY)
                .filter(|v| !v.is_empty());
        }
        cache.measurement_id.clone()
    }

    pub fn set_measurement_id(&self, value: &str) -> Result<(), Error> {
        let mut cache = self.cache.lock();
        self.storage.set(MEASUREMENT_ID_KEY, value)?;
        cache.measurement_id = Some(value.into());
        Ok(())
    }

    /// Get the Measurement Protocol API secret.
    pub fn api_secret(&self) -> Option<String> {
        let mut cache = self.cache.lock();
        if cache.api_secret.is_none() {
            cache.api_secret = self.storage.get(API_SECRET_KEY).filter(|v| !v.is_empty());
        }
        cache.api_secret.clone()
    }

    pub fn set_api_secret(&self, value: &str) -> Result<(), Error> {
        let mut cache = self.cache.lock();
        self.storage.set(API_SECRET_KEY, value)?;
        cache.api_secret = Some(value.into());
        Ok(())
    }

    /// Get the debug flag. False if never set.
    pub fn debug(&self) -> bool {
        let mut cache = self.cache.lock();
        *cache
            .debug
            .get_or_insert_with(|| self.storage.get(DEBUG_KEY).as_deref() == Some("true"))
    }

    pub fn set_debug(&self, value: bool) -> Result<(), Error> {
        let mut cache = self.cache.lock();
        self.storage
            .set(DEBUG_KEY, if value { "true" } else { "false" })?;
        cache.debug = Some(value);
        Ok(())
    }

    /// Get stored user properties. Empty if never set.
    pub fn user_properties(&self) -> UserProperties {
        let mut cache = self.cache.lock();
        self.cached_user_properties(&mut cache).clone()
    }

    fn cached_user_properties<'a>(&self, cache: &'a mut Cache) -> &'a UserProperties {
        cache.user_properties.get_or_insert_with(|| {
            match self.storage.get(USER_PROPERTIES_KEY) {
                Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                    warn!(error = %e, "discarding unreadable user properties");
                    UserProperties::new()
                }),
                None => UserProperties::new(),
            }
        })
    }

    /// Merge updates into stored user properties.
    ///
    /// Keys in `updates` overwrite stored keys; other stored keys are kept.
    /// Returns the merged map. The whole read-merge-write runs under the
    /// cache lock, and the cache only changes once storage accepted the write.
    pub fn merge_user_properties(
        &self,
        updates: impl IntoIterator<Item = (String, String)>,
    ) -> Result<UserProperties, Error> {
        let mut cache = self.cache.lock();
        let mut merged = self.cached_user_properties(&mut cache).clone();
        merged.extend(updates);

        let raw = serde_json::to_string(&merged)?;
        self.storage.set(USER_PROPERTIES_KEY, &raw)?;
        cache.user_properties = Some(merged.clone());

        Ok(merged)
    }

    /// Erase stored user properties.
    pub fn clear_user_properties(&self) -> Result<(), Error> {
        let mut cache = self.cache.lock();
        self.storage.remove(USER_PROPERTIES_KEY)?;
        cache.user_properties = Some(UserProperties::new());
        Ok(())
    }
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore")
            .field("cache", &*self.cache.lock())
            .finish_non_exhaustive()
    }
}
