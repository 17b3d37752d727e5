//! Trust registry.
//!
//! Maps a counterpart's entity ID to the metadata it registered. Documents
//! consult the registry to decide whether an issuer is known and which
//! certificates it may sign with.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::document::Metadata;
use crate::error::{SamlError, SamlResult};

/// Resolves entity IDs to registered metadata.
pub trait TrustRegistry: Send + Sync + Debug {
    /// Registers `metadata` under `entity_id`, replacing any earlier entry.
    fn register(&self, entity_id: &str, metadata: Arc<Metadata>);

    /// Looks up the metadata registered for `entity_id`.
    fn lookup(&self, entity_id: &str) -> Option<Arc<Metadata>>;

    /// Registers metadata under its own `entityID`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the metadata carries no entity ID.
    fn register_metadata(&self, metadata: Metadata) -> SamlResult<Arc<Metadata>> {
        let entity_id = metadata
            .entity_id()
            .ok_or_else(|| SamlError::Configuration("metadata has no entityID".to_string()))?
            .to_string();
        let metadata = Arc::new(metadata);
        self.register(&entity_id, Arc::clone(&metadata));
        Ok(metadata)
    }
}

/// In-memory registry with exact entity ID matching.
#[derive(Debug, Default)]
pub struct DefaultRegistry {
    entries: RwLock<HashMap<String, Arc<Metadata>>>,
}

impl DefaultRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl TrustRegistry for DefaultRegistry {
    fn register(&self, entity_id: &str, metadata: Arc<Metadata>) {
        tracing::debug!("Registering metadata for {}", entity_id);
        self.entries.write().insert(entity_id.to_string(), metadata);
    }

    fn lookup(&self, entity_id: &str) -> Option<Arc<Metadata>> {
        self.entries.read().get(entity_id).cloned()
    }
}
