//! adaptive-prefetch binary: wires the in-memory providers to the engine,
//! starts the periodic loops and serves the downstream HTTP API.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use adaptive_prefetch::config::{Cli, Config};
use adaptive_prefetch::engine::{PrefetchEngine, Providers};
use adaptive_prefetch::providers::memory::{
    sim_position, MemoryCacheStore, ScriptedAnalytics, StaticDeviceProbe, StaticNetworkInfo,
};
use adaptive_prefetch::server::api::{build_router, AppState};
use adaptive_prefetch::types::NetworkClass;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "adaptive_prefetch=debug,tower_http=debug"
    } else {
        "adaptive_prefetch=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("adaptive-prefetch v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load(&cli.config)?);

    info!(
        max_cache_mb = config.eviction.max_cache_bytes / (1024 * 1024),
        prediction_cycle_secs = config.prediction.cycle_secs,
        scheduler_tick_secs = config.scheduler.tick_secs,
        "Configuration loaded"
    );

    // Simulated providers; a real deployment swaps in platform-backed
    // implementations of the provider traits.
    let providers = Providers {
        store: Arc::new(MemoryCacheStore::new()),
        network: Arc::new(StaticNetworkInfo::new(
            NetworkClass::Wifi,
            std::time::Duration::from_millis(40),
        )),
        device: Arc::new(StaticDeviceProbe::new(0, 4 << 30, 0.9)),
        analytics: Arc::new(ScriptedAnalytics::new(sim_position())),
    };

    let engine = PrefetchEngine::new(config.clone(), providers);
    engine.start();

    let state = Arc::new(AppState {
        engine: engine.clone(),
        config: config.clone(),
        start_time: Instant::now(),
    });

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listen_addr = cli.listen;
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    engine.stop();
    Ok(())
}
