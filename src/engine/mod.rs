//! Resolution engine boundary.
//!
//! # Data Flow
//! ```text
//! ConfigDocument
//!     → ResolutionEngine::initialize (one binding per configuration)
//!     → EngineBinding::execute(EngineOperation) → EngineOutcome | EngineError
//!     → EngineBinding::release (when the owning handle is destroyed)
//! ```
//!
//! # Design Decisions
//! - Errors carry a numeric code; retry decisions match on codes, never on
//!   message text
//! - Bindings must be `Send + Sync`: one binding serves every concurrent
//!   operation holding its handle
//! - Calls are synchronous; initialization is moved to the blocking pool by
//!   the caller

pub mod memory;
pub mod operation;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::store::ConfigDocument;

pub use memory::InMemoryEngine;
pub use operation::{EngineOperation, EngineOutcome};

/// Failure classes reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// Malformed operation or record.
    InvalidInput,
    /// The referenced record does not exist.
    NotFound,
    /// The data source code is not in the bound configuration.
    UnknownDataSource,
    /// The entity type code is not in the bound configuration.
    UnknownEntityType,
    /// The caller may not perform the operation.
    PermissionDenied,
    /// The engine is out of a resource (licence, memory, connections).
    ResourceExhausted,
    /// The configuration document cannot be bound.
    InvalidConfiguration,
    /// Anything else.
    Internal,
}

impl EngineErrorKind {
    /// Numeric code reported across the engine boundary.
    pub fn code(self) -> u32 {
        match self {
            EngineErrorKind::InvalidInput => 1001,
            EngineErrorKind::NotFound => 1002,
            EngineErrorKind::UnknownDataSource => 2207,
            EngineErrorKind::UnknownEntityType => 2208,
            EngineErrorKind::PermissionDenied => 3001,
            EngineErrorKind::ResourceExhausted => 4001,
            EngineErrorKind::InvalidConfiguration => 5001,
            EngineErrorKind::Internal => 9999,
        }
    }

    /// Inverse of [`EngineErrorKind::code`].
    pub fn from_code(code: u32) -> Option<Self> {
        use EngineErrorKind::*;
        [
            InvalidInput,
            NotFound,
            UnknownDataSource,
            UnknownEntityType,
            PermissionDenied,
            ResourceExhausted,
            InvalidConfiguration,
            Internal,
        ]
        .into_iter()
        .find(|k| k.code() == code)
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineErrorKind::InvalidInput => "invalid input",
            EngineErrorKind::NotFound => "not found",
            EngineErrorKind::UnknownDataSource => "unknown data source",
            EngineErrorKind::UnknownEntityType => "unknown entity type",
            EngineErrorKind::PermissionDenied => "permission denied",
            EngineErrorKind::ResourceExhausted => "resource exhausted",
            EngineErrorKind::InvalidConfiguration => "invalid configuration",
            EngineErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// A structured engine failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ENG{code:04} {kind}: {message}", code = .kind.code())]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    pub fn unknown_data_source(code: &str) -> Self {
        Self::new(
            EngineErrorKind::UnknownDataSource,
            format!("Data source code [{}] does not exist.", code),
        )
    }

    pub fn unknown_entity_type(code: &str) -> Self {
        Self::new(
            EngineErrorKind::UnknownEntityType,
            format!("Entity type code [{}] does not exist.", code),
        )
    }
}

/// Result type for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Factory for engine bindings.
pub trait ResolutionEngine: Send + Sync + 'static {
    /// Initialize an engine resource bound to `document`.
    fn initialize(&self, document: &ConfigDocument) -> EngineResult<Box<dyn EngineBinding>>;
}

/// An engine resource initialized with one configuration.
pub trait EngineBinding: Send + Sync {
    /// Run one operation.
    fn execute(&self, operation: &EngineOperation) -> EngineResult<EngineOutcome>;

    /// Free the native resource. Called exactly once, after the last use.
    fn release(&self);
}
