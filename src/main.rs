use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use queryhub::crypto::CredentialCipher;
use queryhub::db::{UserStore, sqlite};
use queryhub::router::{HubState, hub_router};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &queryhub::config::CONFIG;

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
        connect_timeout_secs = cfg.connect_timeout_secs,
    );

    let pool = sqlite::open(&cfg.database_url).await?;
    let cipher = CredentialCipher::from_base64_key(&cfg.app_key)?;

    if let Some(email) = cfg.bootstrap_admin_email.as_deref() {
        let id = UserStore::new(pool.clone())
            .ensure_admin(&cfg.bootstrap_admin_name, email)
            .await?;
        info!(user_id = id, email = %email, "bootstrap administrator ensured");
    } else {
        warn!("no bootstrap administrator configured");
    }

    let state = HubState::new(
        pool,
        cipher,
        Arc::from(cfg.access_key.as_str()),
        cfg.connect_timeout(),
    );
    let app = hub_router(state);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
