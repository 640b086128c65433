//! Resolver gateway library.
//!
//! An HTTP gateway in front of an entity-resolution engine whose
//! configuration lives in a shared, versioned store and may change while the
//! gateway runs.

pub mod admin;
pub mod catalog;
pub mod config;
pub mod currency;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod store;

pub use config::schema::GatewayConfig;
pub use currency::ConfigCurrency;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
