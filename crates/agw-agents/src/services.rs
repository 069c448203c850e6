// SPDX-License-Identifier: MIT OR Apache-2.0
//! The shared-services bundle injected into agents.
//!
//! One immutable value constructed at boot and handed to every agent
//! constructor — the registry owns no services and services hold no
//! back-references to agents.

use agw_events::{EventPublisher, MemoryDispatcher, MemoryPublisher, TaskDispatcher};
use agw_llm::{LlmOracle, ScriptedOracle};
use agw_services::{AuditService, SalesConfig};
use agw_store::{
    AuditStore, ChatMessageStore, DeliveryStore, MemoryAuditStore, MemoryChatMessageStore,
    MemoryDeliveryStore, MemoryProductStore, MemoryProfileStore, MemoryRecentCache,
    MemorySaleStore, ProductStore, ProfileStore, RecentCache, SaleStore,
};
use std::sync::Arc;

/// Immutable bundle of store handles and side-effect collaborators.
#[derive(Clone)]
pub struct SharedServices {
    /// Sales repository.
    pub sales: Arc<dyn SaleStore>,
    /// Products repository.
    pub products: Arc<dyn ProductStore>,
    /// Profiles repository.
    pub profiles: Arc<dyn ProfileStore>,
    /// Deliveries repository.
    pub deliveries: Arc<dyn DeliveryStore>,
    /// Chat message repository.
    pub chat_messages: Arc<dyn ChatMessageStore>,
    /// Audit log repository.
    pub audit_log: Arc<dyn AuditStore>,
    /// Recent-window cache.
    pub cache: Arc<dyn RecentCache>,
    /// Event publisher.
    pub publisher: Arc<dyn EventPublisher>,
    /// Durable task dispatcher.
    pub dispatcher: Arc<dyn TaskDispatcher>,
    /// LLM oracle.
    pub oracle: Arc<dyn LlmOracle>,
    /// Sales orchestration tunables.
    pub sales_config: SalesConfig,
    /// Retention for terminal deliveries, in days.
    pub delivery_retention_days: i64,
}

impl SharedServices {
    /// The audit sink over the bundle's audit store.
    pub fn audit(&self) -> AuditService {
        AuditService::new(Arc::clone(&self.audit_log))
    }

    /// A fully in-memory bundle for tests and local development: memory
    /// stores, a recording publisher/dispatcher, and a scripted oracle
    /// with no replies.
    pub fn in_memory() -> Self {
        Self {
            sales: Arc::new(MemorySaleStore::new()),
            products: Arc::new(MemoryProductStore::new()),
            profiles: Arc::new(MemoryProfileStore::new()),
            deliveries: Arc::new(MemoryDeliveryStore::new()),
            chat_messages: Arc::new(MemoryChatMessageStore::new()),
            audit_log: Arc::new(MemoryAuditStore::new()),
            cache: Arc::new(MemoryRecentCache::new()),
            publisher: Arc::new(MemoryPublisher::new()),
            dispatcher: Arc::new(MemoryDispatcher::new()),
            oracle: Arc::new(ScriptedOracle::new(Vec::<String>::new())),
            sales_config: SalesConfig::default(),
            delivery_retention_days: 30,
        }
    }

    /// Replace the oracle (builder-style, used when wiring the bundle).
    pub fn with_oracle(mut self, oracle: Arc<dyn LlmOracle>) -> Self {
        self.oracle = oracle;
        self
    }
}
