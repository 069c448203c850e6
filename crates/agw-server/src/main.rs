// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway entry point: configuration, wiring, and graceful shutdown.

use agw_agents::{register_all, AgentRegistry, SharedServices};
use agw_config::GatewayConfig;
use agw_core::channels;
use agw_events::{Broadcaster, RedisDispatcher, RedisPublisher, Worker};
use agw_llm::{HttpOracle, LlmOracle, ScriptedOracle};
use agw_server::health::LiveHealth;
use agw_server::tasks::{InitiateDeliveryHandler, SyncBankingHandler};
use agw_server::{build_app, AppState};
use agw_services::sales;
use agw_store::{MongoStore, RedisRecentCache};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const BIND_ADDR: &str = "0.0.0.0:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration first: boot aborts with one diagnostic naming every
    // missing variable.
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!(version = env!("CARGO_PKG_VERSION"), "agent gateway starting");

    // Document store.
    let store = MongoStore::connect(&config.store_uri)
        .await
        .context("document store connection failed")?;
    store
        .ensure_indexes()
        .await
        .context("index bootstrap failed")?;
    let store = Arc::new(store);

    // Cache / broker.
    let redis_client =
        redis::Client::open(config.cache_uri.as_str()).context("invalid cache URI")?;
    let redis_conn = redis_client
        .get_connection_manager()
        .await
        .context("cache connection failed")?;

    // Oracle: HTTP when configured, otherwise a disabled stub so the rest
    // of the gateway keeps working without an LLM endpoint.
    let oracle: Arc<dyn LlmOracle> = match &config.llm_base_url {
        Some(base_url) => Arc::new(HttpOracle::new(base_url).map_err(|e| anyhow::anyhow!("{e}"))?),
        None => {
            warn!("LLM_BASE_URL not set; interpretation actions will fail upstream");
            Arc::new(ScriptedOracle::new(Vec::<String>::new()))
        }
    };

    // Shared services bundle.
    let services = SharedServices {
        sales: store.clone(),
        products: store.clone(),
        profiles: store.clone(),
        deliveries: store.clone(),
        chat_messages: store.clone(),
        audit_log: store.clone(),
        cache: Arc::new(RedisRecentCache::new(redis_conn.clone())),
        publisher: Arc::new(RedisPublisher::new(redis_conn.clone())),
        dispatcher: Arc::new(RedisDispatcher::new(redis_conn.clone())),
        oracle,
        sales_config: agw_services::SalesConfig {
            duplicate_window: chrono::Duration::minutes(
                config.duplicate_sale_window_minutes as i64,
            ),
            default_currency: config.default_currency.clone(),
            allocation_retries: config.stock_allocation_retries,
        },
        delivery_retention_days: config.delivery_retention_days,
    };

    // Agents, registered once; the map is read-only afterwards.
    let mut registry = AgentRegistry::new();
    register_all(&mut registry, &services).map_err(|e| anyhow::anyhow!("{e}"))?;
    let registry = Arc::new(registry);

    let health = Arc::new(LiveHealth::new((*store).clone(), redis_conn.clone()));
    let state = AppState::new(
        registry,
        services.clone(),
        config.secret_key.clone(),
        config.rate_limit,
        health,
    )
    .with_allowed_origins(config.allowed_origins.clone());

    // Background plane: broadcaster and the task worker.
    let (stop_tx, stop_rx) = watch::channel(false);
    let broadcaster = Broadcaster::new(
        redis_client,
        channels::DEFAULT_SUBSCRIBE_PATTERNS
            .iter()
            .map(|s| s.to_string())
            .collect(),
        Arc::clone(&state.subscribers),
    );
    let broadcaster_task = tokio::spawn(broadcaster.run(stop_rx.clone()));

    let worker = Worker::new(redis_conn, sales::TASK_QUEUE)
        .register(
            sales::TASK_SYNC_BANKING,
            Arc::new(SyncBankingHandler::new(&services)),
        )
        .register(
            sales::TASK_INITIATE_DELIVERY,
            Arc::new(InitiateDeliveryHandler::new(&services)),
        );
    let worker_task = tokio::spawn(worker.run(stop_rx));

    // Serve.
    let listener = tokio::net::TcpListener::bind(BIND_ADDR)
        .await
        .with_context(|| format!("failed to bind {BIND_ADDR}"))?;
    info!(addr = BIND_ADDR, "gateway listening");

    let app = build_app(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop the background plane; both loops honor the signal promptly.
    let _ = stop_tx.send(true);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = broadcaster_task.await;
        let _ = worker_task.await;
    })
    .await;
    info!("agent gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
