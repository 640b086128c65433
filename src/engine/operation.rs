//! Operations accepted by engine bindings.

use serde::Serialize;
use serde_json::Value;

/// An engine-facing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOperation {
    /// Load (or replace) a record.
    AddRecord {
        data_source: String,
        record_id: String,
        record: Value,
    },
    /// Fetch a previously loaded record.
    GetRecord {
        data_source: String,
        record_id: String,
    },
    /// Remove a record.
    DeleteRecord {
        data_source: String,
        record_id: String,
    },
}

impl EngineOperation {
    /// The data source the operation references.
    pub fn data_source(&self) -> &str {
        match self {
            EngineOperation::AddRecord { data_source, .. }
            | EngineOperation::GetRecord { data_source, .. }
            | EngineOperation::DeleteRecord { data_source, .. } => data_source,
        }
    }

    /// The record the operation references.
    pub fn record_id(&self) -> &str {
        match self {
            EngineOperation::AddRecord { record_id, .. }
            | EngineOperation::GetRecord { record_id, .. }
            | EngineOperation::DeleteRecord { record_id, .. } => record_id,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            EngineOperation::AddRecord { .. } => "add_record",
            EngineOperation::GetRecord { .. } => "get_record",
            EngineOperation::DeleteRecord { .. } => "delete_record",
        }
    }
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOutcome {
    pub data_source: String,
    pub record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
}
