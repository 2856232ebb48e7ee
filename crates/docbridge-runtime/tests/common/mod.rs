//! Common test utilities.
//!
//! Fake backend bundles, stub HTTP servers and supervisor wiring shared by
//! the integration tests.

pub mod fixtures;
pub mod stubs;
