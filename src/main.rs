use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use ipd_core::config::{
    admission_prefix_from_env_value, business_day_offset_from_env_value,
    lock_wait_timeout_from_env_value, pool_size_from_env_value,
};
use ipd_core::{CoreConfig, InpatientService, IpdError, PostgresStore};

/// Main entry point for the IPD application
///
/// Loads `.env`, connects to PostgreSQL, brings the schema up to date and serves the REST API
/// (with Swagger UI at `/swagger-ui`).
///
/// # Environment Variables
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `IPD_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `IPD_LOCK_WAIT_TIMEOUT_MS`: How long a request waits for a row lock (default: 5000)
/// - `IPD_ADMISSION_PREFIX`: Admission number prefix (default: "ADM")
/// - `IPD_BUSINESS_DAY_OFFSET`: UTC offset used to date admission numbers (default: UTC)
/// - `IPD_POOL_SIZE`: Database connection pool size (default: 16)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, database setup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ipd=info".parse()?)
                .add_directive("ipd_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr: SocketAddr = std::env::var("IPD_REST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let cfg = Arc::new(CoreConfig::new(
        lock_wait_timeout_from_env_value(std::env::var("IPD_LOCK_WAIT_TIMEOUT_MS").ok())?,
        admission_prefix_from_env_value(std::env::var("IPD_ADMISSION_PREFIX").ok())?,
        business_day_offset_from_env_value(std::env::var("IPD_BUSINESS_DAY_OFFSET").ok())?,
    )?);
    let pool_size = pool_size_from_env_value(std::env::var("IPD_POOL_SIZE").ok())?;

    let store_cfg = cfg.clone();
    let store = tokio::task::spawn_blocking(move || {
        let store = PostgresStore::connect(&database_url, pool_size, &store_cfg)?;
        store.migrate()?;
        Ok::<_, IpdError>(store)
    })
    .await??;
    tracing::info!("++ Database schema is up to date");

    let service = InpatientService::new(cfg, Arc::new(store));
    let rest_app = router(AppState::new(service));

    tracing::info!("++ Starting IPD REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    axum::serve(listener, rest_app).await?;

    Ok(())
}
