//! Fragment storage abstraction.
//!
//! The retrieval pipeline only ever reads stored fragments, and only
//! through a [`Scope`] filter. Writing (ingestion) is backend specific and
//! lives on the concrete types.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Scope, StoredFragment};

/// Read side of a vector store.
///
/// Every returned vector must come from the same embedding model that the
/// caller uses for queries; backends that keep vectors of several models
/// filter by model themselves.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// All fragments visible in `scope`, with their vectors. An empty scope
    /// is `Ok(vec![])`, not an error.
    async fn query(&self, scope: &Scope) -> Result<Vec<StoredFragment>>;
}
