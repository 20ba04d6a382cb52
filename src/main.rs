use anyhow::Result;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use upload_verifier::{
    build_router,
    config::AppConfig,
    db,
    models::staged_object::FINGERPRINT_TEMP_PREFIX,
    services::{staging_service::StagingService, workflow::VerificationWorkflow},
    state::{AppState, Collaborators},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting upload-verifier with config: {:?}", cfg);

    // --- Ensure staging directory exists ---
    if !Path::new(&cfg.staging_dir).exists() {
        fs::create_dir_all(&cfg.staging_dir)?;
        tracing::info!("Created staging directory at {}", cfg.staging_dir);
    }

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }
    db::run_migrations(&db).await?;

    // --- Initialize services ---
    let collaborators = Collaborators::from_config(&cfg)?;
    let state = AppState::new(&cfg, db, collaborators);
    spawn_sweeper(state.staging.clone(), state.workflow.clone(), &cfg);

    let app = build_router(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop staged fingerprint payloads and abandoned attempts.
fn spawn_sweeper(staging: StagingService, workflow: Arc<VerificationWorkflow>, cfg: &AppConfig) {
    let (staging_ttl, attempt_ttl, every) = (cfg.staging_ttl, cfg.attempt_ttl, cfg.sweep_interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match staging.sweep_expired(FINGERPRINT_TEMP_PREFIX, staging_ttl).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "swept expired staged payloads"),
                Err(err) => tracing::warn!("staging sweep failed: {}", err),
            }
            workflow.evict_stale(attempt_ttl);
        }
    });
}
