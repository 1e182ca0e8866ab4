//! Common test utilities
//!
//! Shared by the integration tests of this crate.

pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{patterned_artifact, request, sparse_artifact, MIB};
#[allow(unused_imports)]
pub use mocks::{ChoiceScript, MemoryHistory, RecordingAlerts, RecordingGateway, Sent, StaticLinks};
