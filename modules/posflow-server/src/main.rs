use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use posflow_engine::{Dispatcher, DispatcherConfig, Manager, Plugin, Registry, StatsTracker};
use posflow_plugins::{CustomerLookup, EmployeeTracker, PurchaseRecommender};
use posflow_server::routes::{self, AppState};
use posflow_server::AppConfig;
use posflow_store::{PgStore, PosStore};
use posflow_transport::{channel, Consumer, ConsumerConfig};

#[derive(Parser)]
#[command(name = "posflow-server", about = "Point-of-sale event processing server")]
struct Cli {
    /// Override HTTP_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting posflow-server");

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(port) = cli.port {
        config.http_port = port;
    }

    let pg = PgStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    pg.migrate().await?;

    let store: Arc<dyn PosStore> = Arc::new(pg);

    // ─── Plugins ─────────────────────────────────────────────────────────────

    let registry = Arc::new(Registry::new());
    let stats = Arc::new(StatsTracker::new());

    let recommender = Arc::new(PurchaseRecommender::new(store.clone()));
    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(EmployeeTracker::new(store.clone())) as Arc<dyn Plugin>,
        recommender.clone() as Arc<dyn Plugin>,
        Arc::new(CustomerLookup::new(store.clone())) as Arc<dyn Plugin>,
    ];
    for plugin in plugins {
        registry.register(plugin)?;
    }

    let manager = Manager::new(registry.clone(), stats.clone());
    for name in &config.active_plugins {
        if let Err(e) = manager.set_active(name, true) {
            tracing::warn!(plugin = name.as_str(), error = %e, "Cannot activate plugin");
        }
    }
    tracing::info!(registered = registry.len(), active = registry.active().len(), "Plugins ready");

    let dispatcher = Dispatcher::new(registry, stats).with_config(DispatcherConfig {
        max_depth: config.max_dispatch_depth,
    });

    // ─── Broker + consumer ───────────────────────────────────────────────────

    let shutdown = CancellationToken::new();
    let (publisher, source) = channel(config.broker_capacity);

    let consumer = Consumer::new(
        source,
        dispatcher,
        ConsumerConfig {
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
            dispatch_timeout: config.dispatch_timeout,
        },
    );
    let consumer_handle = tokio::spawn(consumer.run(shutdown.clone()));

    if let Some(every) = config.recommendation_refresh {
        let recommender = recommender.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = recommender.refresh().await {
                            tracing::warn!(error = %e, "Recommendation refresh failed");
                        }
                    }
                }
            }
        });
    }

    // ─── HTTP ────────────────────────────────────────────────────────────────

    let app = routes::build_router(AppState { manager, publisher });
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    let stats = consumer_handle.await?;
    tracing::info!(
        received = stats.received,
        dispatched = stats.dispatched,
        failed = stats.failed,
        malformed = stats.malformed,
        "Consumer stopped"
    );

    Ok(())
}
