//! Remote-source sync for lorebase.
//!
//! A folder with a [`SyncSource`](lorebase_core::SyncSource) is mirrored
//! from its provider into the managed root: authenticate, plan against the
//! persisted cursor, apply with atomic writes. The filesystem observer and
//! the indexer pick the written files up like any local change.

pub mod engine;
pub mod http;
pub mod oauth;
pub mod provider;
pub mod providers;

pub use engine::{SyncConfig, SyncEngine, SyncStats};
pub use provider::{Authorization, Provider, ProviderRegistry, RemoteEntry};
