//! Reference engine keeping records in memory.
//!
//! Records belong to the repository, not to a configuration: every binding
//! created by one engine shares the same record map, so records survive a
//! configuration swap. What a binding knows is which data sources and entity
//! types its configuration declares.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;

use crate::engine::{
    EngineBinding, EngineError, EngineErrorKind, EngineOperation, EngineOutcome, EngineResult,
    ResolutionEngine,
};
use crate::store::ConfigDocument;

type RecordKey = (String, String);

/// In-memory engine with initialization bookkeeping.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    records: Arc<DashMap<RecordKey, Value>>,
    initializations: AtomicUsize,
    live_bindings: Arc<AtomicUsize>,
    init_delay: Option<Duration>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every initialization take at least `delay`, like a native engine
    /// loading its configuration.
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    /// Number of successful initializations so far.
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    /// Bindings initialized and not yet released.
    pub fn live_bindings(&self) -> usize {
        self.live_bindings.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl ResolutionEngine for InMemoryEngine {
    fn initialize(&self, document: &ConfigDocument) -> EngineResult<Box<dyn EngineBinding>> {
        if let Some(delay) = self.init_delay {
            std::thread::sleep(delay);
        }

        let mut data_sources = HashSet::new();
        for ds in &document.data_sources {
            if !data_sources.insert(ds.code.clone()) {
                return Err(EngineError::new(
                    EngineErrorKind::InvalidConfiguration,
                    format!("data source [{}] declared twice", ds.code),
                ));
            }
        }
        let entity_types = document.entity_types.iter().map(|et| et.code.clone()).collect();

        self.initializations.fetch_add(1, Ordering::SeqCst);
        self.live_bindings.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemoryBinding {
            records: self.records.clone(),
            data_sources,
            entity_types,
            live_bindings: self.live_bindings.clone(),
            released: AtomicBool::new(false),
        }))
    }
}

/// A binding of the in-memory engine to one configuration.
struct InMemoryBinding {
    records: Arc<DashMap<RecordKey, Value>>,
    data_sources: HashSet<String>,
    entity_types: HashSet<String>,
    live_bindings: Arc<AtomicUsize>,
    released: AtomicBool,
}

impl InMemoryBinding {
    fn check_references(&self, operation: &EngineOperation) -> EngineResult<()> {
        if operation.record_id().trim().is_empty() {
            return Err(EngineError::new(EngineErrorKind::InvalidInput, "record id must not be empty"));
        }
        if !self.data_sources.contains(operation.data_source()) {
            return Err(EngineError::unknown_data_source(operation.data_source()));
        }
        Ok(())
    }

    fn check_record(&self, record: &Value) -> EngineResult<()> {
        let fields = record.as_object().ok_or_else(|| {
            EngineError::new(EngineErrorKind::InvalidInput, "record must be a JSON object")
        })?;
        if let Some(entity_type) = fields.get("ENTITY_TYPE") {
            let code = entity_type.as_str().ok_or_else(|| {
                EngineError::new(EngineErrorKind::InvalidInput, "ENTITY_TYPE must be a string")
            })?;
            if !self.entity_types.contains(code) {
                return Err(EngineError::unknown_entity_type(code));
            }
        }
        Ok(())
    }
}

impl EngineBinding for InMemoryBinding {
    fn execute(&self, operation: &EngineOperation) -> EngineResult<EngineOutcome> {
        if self.released.load(Ordering::SeqCst) {
            return Err(EngineError::new(EngineErrorKind::Internal, "binding already released"));
        }
        self.check_references(operation)?;

        let key = (operation.data_source().to_string(), operation.record_id().to_string());
        let record = match operation {
            EngineOperation::AddRecord { record, .. } => {
                self.check_record(record)?;
                self.records.insert(key.clone(), record.clone());
                None
            }
            EngineOperation::GetRecord { .. } => {
                let found = self.records.get(&key).map(|r| r.value().clone());
                Some(found.ok_or_else(|| not_found(&key))?)
            }
            EngineOperation::DeleteRecord { .. } => {
                self.records.remove(&key).ok_or_else(|| not_found(&key))?;
                None
            }
        };

        Ok(EngineOutcome {
            data_source: key.0,
            record_id: key.1,
            record,
        })
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.live_bindings.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

fn not_found(key: &RecordKey) -> EngineError {
    EngineError::new(
        EngineErrorKind::NotFound,
        format!("record [{}] not found in data source [{}]", key.1, key.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add(ds: &str, id: &str, record: Value) -> EngineOperation {
        EngineOperation::AddRecord {
            data_source: ds.into(),
            record_id: id.into(),
            record,
        }
    }

    fn get(ds: &str, id: &str) -> EngineOperation {
        EngineOperation::GetRecord {
            data_source: ds.into(),
            record_id: id.into(),
        }
    }

    #[test]
    fn test_record_lifecycle() {
        let engine = InMemoryEngine::new();
        let binding = engine.initialize(&ConfigDocument::initial()).unwrap();

        binding.execute(&add("TEST", "1", json!({"NAME_FULL": "Ann Smith"}))).unwrap();
        let out = binding.execute(&get("TEST", "1")).unwrap();
        assert_eq!(out.record, Some(json!({"NAME_FULL": "Ann Smith"})));

        binding
            .execute(&EngineOperation::DeleteRecord { data_source: "TEST".into(), record_id: "1".into() })
            .unwrap();
        let err = binding.execute(&get("TEST", "1")).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::NotFound);
    }

    #[test]
    fn test_unknown_references() {
        let engine = InMemoryEngine::new();
        let binding = engine.initialize(&ConfigDocument::initial()).unwrap();

        let err = binding.execute(&add("FOO", "1", json!({}))).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::UnknownDataSource);

        let err = binding.execute(&add("TEST", "1", json!({"ENTITY_TYPE": "VESSEL"}))).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::UnknownEntityType);

        binding.execute(&add("TEST", "1", json!({"ENTITY_TYPE": "PERSON"}))).unwrap();
    }

    #[test]
    fn test_invalid_input() {
        let engine = InMemoryEngine::new();
        let binding = engine.initialize(&ConfigDocument::initial()).unwrap();

        assert_eq!(binding.execute(&add("TEST", " ", json!({}))).unwrap_err().kind, EngineErrorKind::InvalidInput);
        assert_eq!(binding.execute(&add("TEST", "1", json!([1]))).unwrap_err().kind, EngineErrorKind::InvalidInput);
    }

    #[test]
    fn test_records_shared_across_bindings() {
        let engine = InMemoryEngine::new();
        let first = engine.initialize(&ConfigDocument::initial()).unwrap();
        first.execute(&add("TEST", "7", json!({}))).unwrap();

        let mut doc = ConfigDocument::initial();
        doc.add_data_source("FOO").unwrap();
        let second = engine.initialize(&doc).unwrap();
        assert!(second.execute(&get("TEST", "7")).is_ok());
        assert!(second.execute(&add("FOO", "1", json!({}))).is_ok());
        assert_eq!(engine.record_count(), 2);
        assert_eq!(engine.initializations(), 2);
    }

    #[test]
    fn test_release_bookkeeping() {
        let engine = InMemoryEngine::new();
        let binding = engine.initialize(&ConfigDocument::initial()).unwrap();
        assert_eq!(engine.live_bindings(), 1);

        binding.release();
        binding.release();
        assert_eq!(engine.live_bindings(), 0);
        assert_eq!(binding.execute(&get("TEST", "1")).unwrap_err().kind, EngineErrorKind::Internal);
    }

    #[test]
    fn test_duplicate_data_source_rejected() {
        let engine = InMemoryEngine::new();
        let mut doc = ConfigDocument::initial();
        doc.data_sources.push(doc.data_sources[0].clone());
        let err = engine.initialize(&doc).err().unwrap();
        assert_eq!(err.kind, EngineErrorKind::InvalidConfiguration);
        assert_eq!(engine.initializations(), 0);
    }
}
