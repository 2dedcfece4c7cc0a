use dyncreds::config::CONFIG;
use dyncreds::db::{LeaseStorage, RoleStorage};
use dyncreds::server::{DynCredsState, dyncreds_router};
use dyncreds::service::bootstrap;
use dyncreds::{ConnectionRegistry, CredentialEngine};
use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &*CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        listen_addr = %cfg.listen_addr,
        loglevel = %cfg.loglevel,
        default_ttl_secs = cfg.default_ttl_secs,
        max_ttl_secs = cfg.max_ttl_secs
    );

    let pool = dyncreds::db::connect(&cfg.database_url).await?;
    let roles = RoleStorage::new(pool.clone());
    let leases = LeaseStorage::new(pool);

    if let Some(path) = cfg.bootstrap_path.as_ref() {
        match bootstrap::load_from_dir(path) {
            Ok(found) if !found.is_empty() => {
                info!(
                    path = %path.display(),
                    connections = found.connections.len(),
                    roles = found.roles.len(),
                    "applying bootstrap definitions"
                );
                for conn in &found.connections {
                    if let Err(e) = roles.upsert_connection(conn).await {
                        warn!(db = %conn.name, error = %e, "failed to store connection");
                    }
                }
                for role in &found.roles {
                    if let Err(e) = roles.upsert_role(role).await {
                        warn!(role = %role.name, error = %e, "failed to store role");
                    }
                }
            }
            Ok(_) => info!(path = %path.display(), "no bootstrap definitions discovered"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to load bootstrap directory"),
        }
    }

    let engine = CredentialEngine::new(roles.clone(), ConnectionRegistry::new(), cfg.generator()?);
    let stored = roles.list_connections().await?;
    let total = stored.len();
    let loaded = engine.load_connections(stored).await;
    info!(loaded, total, "database connections registered");

    let state = DynCredsState::new(Arc::new(engine), leases, Arc::from(cfg.api_key.as_str()));
    let app = dyncreds_router(state);

    let listener = TcpListener::bind(cfg.listen_addr.as_str()).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
