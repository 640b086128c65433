//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Call to the configuration store:
//!     → timeouts.rs (every store call has a deadline)
//!
//! Publish conflict in the catalog:
//!     → backoff.rs (jittered exponential delay before re-reading)
//!
//! Periodic staleness check:
//!     → backoff.rs (jittered interval so a fleet does not poll in lockstep)
//! ```
//!
//! The stale-configuration retry policy itself lives in `currency::retry`;
//! it retries once and never sleeps.

pub mod backoff;
pub mod timeouts;
