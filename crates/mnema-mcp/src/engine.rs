//! Engine handle shared by every tool
//!
//! Bundles the store, the configured providers, the hybrid searcher, and
//! the agent scope bound at startup. Providers are loaded once here and
//! passed through; there are no globals.

use std::sync::Arc;

use mnema_core::{HybridSearcher, ProviderSet, Store};

pub struct Engine {
    pub store: Arc<Store>,
    pub providers: ProviderSet,
    pub searcher: HybridSearcher,
    /// Tenant every tool call is scoped to
    pub agent_id: String,
}

impl Engine {
    pub fn new(store: Arc<Store>, providers: ProviderSet, agent_id: String) -> Self {
        Self {
            store,
            providers,
            searcher: HybridSearcher::default(),
            agent_id,
        }
    }
}
