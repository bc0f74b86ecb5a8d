use dotenvy::dotenv;
use inventory_registry::{
    config::{self, database},
    core::{lifecycle::ItemManager, photos::DiskPhotoStore, prefix},
    errors::Result,
    web::{self, AppState},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also come from the real environment
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the main application configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Critical error loading application configuration: {}", e))?;
    info!(config = ?app_config, "Successfully processed application configuration.");

    // 4. Initialize database
    let db = database::create_connection(&app_config.database_url).await?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Seed default prefixes
    prefix::seed_prefixes(&db, &app_config.prefixes)
        .await
        .inspect(|added| info!(added, "Prefixes seeded."))
        .inspect_err(|e| error!("Failed to seed prefixes: {}", e))?;

    // 6. Serve the web interface
    let photos = Arc::new(DiskPhotoStore::new(app_config.upload_dir.clone()));
    let items = ItemManager::new(db, photos, app_config.placeholder_photo.clone());
    web::serve(AppState::new(app_config, items)).await
}
