use dotenvy::dotenv;
use std::{env, fs};
use tabsplit::{
    config::{database, settings},
    core::{ledger::Ledger, receipt},
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Connect and make sure the schema exists
    let database_url = database::get_database_url(&app_config.database);
    if database_url == database::DEFAULT_DATABASE_URL {
        fs::create_dir_all("data")?;
    }
    let db = database::create_connection(&app_config.database)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    let ledger = Ledger::new(db, app_config.ledger);
    let expired = ledger.expire_stale_invitations().await?;
    info!("Ledger ready ({} stale invitations expired)", expired);

    // 5. Optional dry run: normalize a receipt file given on the command line
    if let Some(path) = env::args().nth(1) {
        let content = fs::read_to_string(&path)?;
        let raw = receipt::extract_receipt_json(&content)?;
        let normalized =
            receipt::normalize_value(&raw, ledger.settings().max_item_quantity)?;
        info!(
            "Receipt {} from {}: {} line items, total {:.2}",
            path,
            normalized.place_name,
            normalized.items.len(),
            normalized.total_amount
        );
    }

    Ok(())
}
