//! Builder for assembling a harness

use std::sync::Arc;
use std::time::Duration;

use super::{config::HarnessConfig, Harness};
use crate::error::{HarnessError, HarnessResult};
use crate::profile::{KeyValueStorage, MemoryStorage, ProfileStore};
use crate::sdk::ClientFactory;
use crate::transitions::CallStatePolicy;

/// Builder for creating a [`Harness`]
///
/// The client factory is required; storage defaults to process memory.
pub struct HarnessBuilder {
    config: HarnessConfig,
    storage: Option<Arc<dyn KeyValueStorage>>,
    store: Option<ProfileStore>,
    factory: Option<Arc<dyn ClientFactory>>,
}

impl HarnessBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: HarnessConfig::default(),
            storage: None,
            store: None,
            factory: None,
        }
    }

    /// Use a complete configuration
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the delay before a finished call resets to idle
    pub fn reset_delay(mut self, delay: Duration) -> Self {
        self.config.reset_delay = delay;
        self
    }

    /// Pin the SDK call-state policy instead of following the client options
    pub fn call_state_policy(mut self, policy: CallStatePolicy) -> Self {
        self.config.call_state_policy = Some(policy);
        self
    }

    /// Persist settings in `storage`
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a prepared profile store, for custom default templates
    ///
    /// Takes precedence over [`HarnessBuilder::storage`].
    pub fn profile_store(mut self, store: ProfileStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the factory that builds SDK clients (required)
    pub fn factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the harness
    ///
    /// Nothing connects until [`Harness::start`] is called.
    pub fn build(self) -> HarnessResult<Harness> {
        self.config.validate()?;
        let factory = self
            .factory
            .ok_or_else(|| HarnessError::config("client factory is required"))?;
        let store = match (self.store, self.storage) {
            (Some(store), _) => store,
            (None, Some(storage)) => ProfileStore::new(storage),
            (None, None) => ProfileStore::new(Arc::new(MemoryStorage::new())),
        };
        Ok(Harness::from_parts(self.config, store, factory))
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
