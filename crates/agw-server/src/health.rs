// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency liveness probes for the status endpoint.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

/// Answers whether the store and cache are reachable.
#[async_trait]
pub trait DependencyHealth: Send + Sync {
    /// Document-store liveness.
    async fn store_ok(&self) -> bool;
    /// Cache / broker liveness.
    async fn cache_ok(&self) -> bool;
}

/// Production probes: a store ping and a cache `PING`.
pub struct LiveHealth {
    store: agw_store::MongoStore,
    cache: ConnectionManager,
}

impl LiveHealth {
    /// Wrap the live connections.
    pub fn new(store: agw_store::MongoStore, cache: ConnectionManager) -> Self {
        Self { store, cache }
    }
}

#[async_trait]
impl DependencyHealth for LiveHealth {
    async fn store_ok(&self) -> bool {
        self.store.ping().await
    }

    async fn cache_ok(&self) -> bool {
        let mut conn = self.cache.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

/// Fixed answers, for tests and in-memory runs.
pub struct StaticHealth {
    /// Reported store liveness.
    pub store: bool,
    /// Reported cache liveness.
    pub cache: bool,
}

#[async_trait]
impl DependencyHealth for StaticHealth {
    async fn store_ok(&self) -> bool {
        self.store
    }

    async fn cache_ok(&self) -> bool {
        self.cache
    }
}
