//! Active configuration handle.
//!
//! # Responsibilities
//! - Parse a blob once and derive its registries
//! - Initialize exactly one engine binding for it
//! - Release the binding when the last holder drops the handle
//!
//! # Design Decisions
//! - Immutable after construction; a refresh builds a new handle
//! - Shared through `Arc`; retirement is the drop of the last `Arc`

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

use crate::currency::registry::{AttributeIndex, DataSourceRegistry, RegistryError};
use crate::engine::{EngineBinding, EngineError, EngineOperation, EngineOutcome, EngineResult, ResolutionEngine};
use crate::observability::metrics;
use crate::store::{ConfigBlob, ConfigDocument, ConfigId};

/// A configuration could not be bound to an engine resource.
#[derive(Debug, Clone, Error)]
pub enum BindError {
    #[error("configuration {id} is not valid JSON: {reason}")]
    Parse { id: ConfigId, reason: String },

    #[error("configuration {id} is inconsistent: {source}")]
    Inconsistent {
        id: ConfigId,
        #[source]
        source: RegistryError,
    },

    #[error("engine rejected configuration {id}: {source}")]
    Engine {
        id: ConfigId,
        #[source]
        source: EngineError,
    },

    #[error("engine initialization for configuration {id} aborted: {reason}")]
    Aborted { id: ConfigId, reason: String },
}

/// An immutable configuration bound to an initialized engine resource.
pub struct ActiveConfigHandle {
    id: ConfigId,
    document: Arc<ConfigDocument>,
    data_sources: DataSourceRegistry,
    attributes: AttributeIndex,
    entity_types: BTreeSet<String>,
    binding: Box<dyn EngineBinding>,
    bound_at: SystemTime,
}

impl ActiveConfigHandle {
    /// Parse `blob`, derive its views and initialize a binding.
    pub fn bind(id: ConfigId, blob: &ConfigBlob, engine: &dyn ResolutionEngine) -> Result<Self, BindError> {
        let document = blob.parse().map_err(|e| BindError::Parse {
            id,
            reason: e.to_string(),
        })?;
        let data_sources = DataSourceRegistry::from_document(&document)
            .map_err(|source| BindError::Inconsistent { id, source })?;
        let attributes = AttributeIndex::from_document(&document)
            .map_err(|source| BindError::Inconsistent { id, source })?;
        let entity_types = document.entity_types.iter().map(|et| et.code.clone()).collect();

        let binding = engine
            .initialize(&document)
            .map_err(|source| BindError::Engine { id, source })?;

        metrics::handle_bound();
        tracing::info!(
            config_id = %id,
            data_sources = data_sources.len(),
            "Configuration bound to engine"
        );

        Ok(Self {
            id,
            document: Arc::new(document),
            data_sources,
            attributes,
            entity_types,
            binding,
            bound_at: SystemTime::now(),
        })
    }

    pub fn id(&self) -> ConfigId {
        self.id
    }

    /// The parsed configuration document.
    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn data_sources(&self) -> &DataSourceRegistry {
        &self.data_sources
    }

    pub fn attributes(&self) -> &AttributeIndex {
        &self.attributes
    }

    /// Entity type codes, sorted.
    pub fn entity_types(&self) -> &BTreeSet<String> {
        &self.entity_types
    }

    pub fn bound_at(&self) -> SystemTime {
        self.bound_at
    }

    /// Run an operation against this handle's binding.
    pub fn execute(&self, operation: &EngineOperation) -> EngineResult<EngineOutcome> {
        self.binding.execute(operation)
    }
}

impl Drop for ActiveConfigHandle {
    fn drop(&mut self) {
        self.binding.release();
        metrics::handle_released();
        tracing::info!(config_id = %self.id, "Retired configuration released");
    }
}

impl fmt::Debug for ActiveConfigHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveConfigHandle")
            .field("id", &self.id)
            .field("data_sources", &self.data_sources.codes())
            .field("bound_at", &self.bound_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineErrorKind, InMemoryEngine};
    use crate::store::DataSourceDef;

    fn blob(doc: &ConfigDocument) -> ConfigBlob {
        ConfigBlob::from_document(doc).unwrap()
    }

    #[test]
    fn test_bind_exposes_views() {
        let engine = InMemoryEngine::new();
        let handle = ActiveConfigHandle::bind(ConfigId(4), &blob(&ConfigDocument::initial()), &engine).unwrap();

        assert_eq!(handle.id(), ConfigId(4));
        assert!(handle.data_sources().contains("TEST"));
        assert!(handle.entity_types().contains("PERSON"));
        assert_eq!(handle.attributes().for_feature("EMAIL"), ["EMAIL_ADDRESS"]);
        assert_eq!(handle.document(), &ConfigDocument::initial());
    }

    #[test]
    fn test_drop_releases_binding() {
        let engine = InMemoryEngine::new();
        let handle = Arc::new(
            ActiveConfigHandle::bind(ConfigId(1), &blob(&ConfigDocument::initial()), &engine).unwrap(),
        );
        let in_flight = handle.clone();
        drop(handle);
        assert_eq!(engine.live_bindings(), 1, "held by an in-flight operation");

        drop(in_flight);
        assert_eq!(engine.live_bindings(), 0);
    }

    #[test]
    fn test_malformed_blob() {
        let engine = InMemoryEngine::new();
        let err = ActiveConfigHandle::bind(ConfigId(2), &ConfigBlob::new("{oops"), &engine).unwrap_err();
        assert!(matches!(err, BindError::Parse { id: ConfigId(2), .. }));
        assert_eq!(engine.initializations(), 0);
    }

    #[test]
    fn test_inconsistent_document() {
        let engine = InMemoryEngine::new();
        let mut doc = ConfigDocument::initial();
        doc.data_sources.push(DataSourceDef { code: "TEST".into(), id: 99 });

        let err = ActiveConfigHandle::bind(ConfigId(3), &blob(&doc), &engine).unwrap_err();
        assert!(matches!(err, BindError::Inconsistent { id: ConfigId(3), .. }));
        assert!(err.to_string().contains("duplicate data source code [TEST]"));
    }

    #[test]
    fn test_execute_uses_binding() {
        let engine = InMemoryEngine::new();
        let handle = ActiveConfigHandle::bind(ConfigId(1), &blob(&ConfigDocument::initial()), &engine).unwrap();
        let err = handle
            .execute(&EngineOperation::GetRecord { data_source: "NOPE".into(), record_id: "1".into() })
            .unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::UnknownDataSource);
    }
}
