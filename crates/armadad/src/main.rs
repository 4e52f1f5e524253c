//! armadad — the Armada control plane daemon.
//!
//! Single binary that assembles all subsystems:
//! - Config store (in-memory boundary implementation)
//! - Service discovery resolver with TTL cache + debounced events
//! - Snapshot generator + cache
//! - ADS gRPC server + stream registry
//! - Deployment orchestrator
//! - Drift detector
//! - REST management API
//!
//! # Usage
//!
//! ```text
//! armadad serve --grpc-port 18000 --api-port 8800
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use armada_api::ApiState;
use armada_drift::DriftDetector;
use armada_rollout::Orchestrator;
use armada_snapshot::{
    CachingResolver, ServiceDiscovery, SnapshotCache, SnapshotGenerator, StaticResolver,
    discovery::run_debouncer,
};
use armada_types::{ConfigStore, MemoryStore, ValidationContext};
use armada_xds::{AdsServer, RegistryConfig, SessionConfig, StreamRegistry};

#[derive(Parser)]
#[command(name = "armadad", about = "Armada xDS control plane daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane (gRPC ADS server + REST API).
    Serve {
        /// Port the ADS gRPC server listens on.
        #[arg(long, default_value = "18000")]
        grpc_port: u16,

        /// Port the REST management API listens on.
        #[arg(long, default_value = "8800")]
        api_port: u16,

        /// Endpoint-churn debounce window in milliseconds.
        #[arg(long, default_value = "500")]
        debounce_ms: u64,

        /// Idle seconds before a stream is considered stale.
        #[arg(long, default_value = "120")]
        stale_secs: u64,

        /// Idle seconds before a stream is torn down.
        #[arg(long, default_value = "300")]
        terminate_secs: u64,

        /// Interval in seconds for reaping terminated instances.
        #[arg(long, default_value = "30")]
        reap_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,armadad=debug,armada=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            grpc_port,
            api_port,
            debounce_ms,
            stale_secs,
            terminate_secs,
            reap_interval,
        } => {
            run_serve(
                grpc_port,
                api_port,
                Duration::from_millis(debounce_ms),
                Duration::from_secs(stale_secs),
                Duration::from_secs(terminate_secs),
                Duration::from_secs(reap_interval),
            )
            .await
        }
    }
}

async fn run_serve(
    grpc_port: u16,
    api_port: u16,
    debounce_window: Duration,
    stale_after: Duration,
    terminate_after: Duration,
    reap_interval: Duration,
) -> anyhow::Result<()> {
    info!("armada control plane starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
    info!("config store opened");

    let resolver = Arc::new(StaticResolver::new());
    let endpoint_events = resolver.subscribe();
    let cached_resolver = Arc::new(CachingResolver::new(resolver.clone()));
    info!("service discovery resolver initialized");

    let generator = Arc::new(SnapshotGenerator::new(
        cached_resolver.clone() as Arc<dyn ServiceDiscovery>
    ));
    let cache = Arc::new(SnapshotCache::new());
    info!("snapshot generator and cache initialized");

    let registry = Arc::new(StreamRegistry::new(RegistryConfig {
        terminate_after,
        ..Default::default()
    }));
    info!("stream registry initialized");

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        generator.clone(),
        cache.clone(),
        registry.clone(),
    ));
    info!("deployment orchestrator initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────

    // Debounced endpoint-churn regeneration: a batch of changed services
    // invalidates the resolve cache and regenerates snapshots for every
    // entity with a desired version.
    let (batch_tx, mut batch_rx) = mpsc::channel::<Vec<String>>(16);
    let debounce_handle = tokio::spawn(run_debouncer(
        endpoint_events,
        debounce_window,
        shutdown_rx.clone(),
        batch_tx,
    ));

    let regen = {
        let store = store.clone();
        let generator = generator.clone();
        let cache = cache.clone();
        let registry = registry.clone();
        let cached_resolver = cached_resolver.clone();
        tokio::spawn(async move {
            while let Some(services) = batch_rx.recv().await {
                info!(services = services.len(), "endpoint changes, regenerating");
                for service in &services {
                    cached_resolver.invalidate(service);
                }

                for instance in registry.instances() {
                    let desired = match store.desired(&instance.entity_id) {
                        Ok(Some(desired)) => desired,
                        _ => continue,
                    };
                    let version = match store.load_version(&instance.entity_id, desired.sequence)
                    {
                        Ok(version) => version,
                        Err(e) => {
                            warn!(entity = %instance.entity_id, error = %e, "desired version missing");
                            continue;
                        }
                    };
                    if let Err(e) = generator
                        .generate_into(&cache, &instance, &version, &HashMap::new())
                        .await
                    {
                        warn!(instance = %instance.id, error = %e, "regeneration failed");
                    }
                }
            }
        })
    };

    // Reaper: terminated instances lose their cache slots.
    let reaper = {
        let registry = registry.clone();
        let cache = cache.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reap_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for instance_id in registry.reap_terminated() {
                            cache.remove(&instance_id);
                        }
                        registry.remove_terminated();
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    // ── gRPC ADS server ────────────────────────────────────────

    let ads = AdsServer::new(registry.clone(), cache.clone()).with_session_config(SessionConfig {
        stale_after,
        terminate_after,
    });
    let grpc_addr: SocketAddr = ([0, 0, 0, 0], grpc_port).into();
    info!(%grpc_addr, "ADS server starting");

    let mut grpc_shutdown = shutdown_rx.clone();
    let grpc = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(ads.into_service())
            .serve_with_shutdown(grpc_addr, async move {
                let _ = grpc_shutdown.changed().await;
            })
            .await
    });

    // ── REST API server ────────────────────────────────────────

    let api_state = ApiState {
        store,
        orchestrator,
        registry,
        drift: DriftDetector::new(),
        validation: Arc::new(RwLock::new(ValidationContext::default())),
        plans: Arc::new(RwLock::new(HashMap::new())),
    };
    let router = armada_api::build_router(api_state);
    let api_addr: SocketAddr = ([0, 0, 0, 0], api_port).into();
    info!(%api_addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(api_addr).await?;
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = grpc.await;
    let _ = debounce_handle.await;
    let _ = regen.await;
    let _ = reaper.await;

    info!("armada control plane stopped");
    Ok(())
}
