//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the inpatient REST API server on its own, against PostgreSQL.
//!
//! ## Intended use
//! Useful for development when you want the REST server with OpenAPI/Swagger UI but not the
//! rest of the workspace. The main `ipd-run` binary serves the same router.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use ipd_core::config::{
    admission_prefix_from_env_value, business_day_offset_from_env_value,
    lock_wait_timeout_from_env_value, pool_size_from_env_value,
};
use ipd_core::{CoreConfig, InpatientService, PostgresStore};

/// Main entry point for the REST API server
///
/// # Environment Variables
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `IPD_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `IPD_LOCK_WAIT_TIMEOUT_MS`: Row lock wait before `503` (default: 5000)
/// - `IPD_ADMISSION_PREFIX`: Admission number prefix (default: "ADM")
/// - `IPD_BUSINESS_DAY_OFFSET`: UTC offset of the business day, e.g. "+03:00" (default: UTC)
/// - `IPD_POOL_SIZE`: Database connection pool size (default: 16)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("ipd_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("IPD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let cfg = Arc::new(CoreConfig::new(
        lock_wait_timeout_from_env_value(std::env::var("IPD_LOCK_WAIT_TIMEOUT_MS").ok())?,
        admission_prefix_from_env_value(std::env::var("IPD_ADMISSION_PREFIX").ok())?,
        business_day_offset_from_env_value(std::env::var("IPD_BUSINESS_DAY_OFFSET").ok())?,
    )?);
    let pool_size = pool_size_from_env_value(std::env::var("IPD_POOL_SIZE").ok())?;

    // The postgres client is synchronous; keep its connect off the async workers.
    let store_cfg = cfg.clone();
    let store = tokio::task::spawn_blocking(move || {
        let store = PostgresStore::connect(&database_url, pool_size, &store_cfg)?;
        store.migrate()?;
        Ok::<_, ipd_core::IpdError>(store)
    })
    .await??;

    let service = InpatientService::new(cfg, Arc::new(store));
    let app = router(AppState::new(service));

    tracing::info!("-- Starting IPD REST API on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
