use budget_payroll::{
    config::{self, database},
    core::start_scheduler,
    errors::Result,
};
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the application configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Critical error loading application configuration: {}", e))?;

    // 4. Connect and make sure the schema exists
    let db = database::connect_with_retry(&app_config.database)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Start the payroll scheduler, exactly once
    let token = CancellationToken::new();
    let scheduler = if app_config.payroll.enabled {
        Some(start_scheduler(
            db.clone(),
            app_config.payroll.clone(),
            token.clone(),
        ))
    } else {
        warn!("Payroll scheduler disabled by configuration");
        None
    };

    // 6. Run until interrupted, then stop the scheduler and close the pool
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    token.cancel();

    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            error!("Payroll scheduler task failed: {}", e);
        }
    }

    db.close().await?;
    info!("Shut down cleanly");
    Ok(())
}
