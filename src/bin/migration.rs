use anyhow::Context;
use sea_orm_migration::MigratorTrait;
use storefront_inventory::{
    config::{init_tracing, load_config},
    db,
    migrator::Migrator,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);

    info!("Starting database migration");

    let pool = db::establish_connection_from_app_config(&config)
        .await
        .context("Failed to connect to database")?;

    Migrator::up(&pool, None)
        .await
        .context("Failed to apply migrations")?;

    let applied = Migrator::get_applied_migrations(&pool)
        .await
        .context("Failed to read migration status")?;
    info!(applied = applied.len(), "Migration completed successfully");

    db::close_pool(pool).await?;
    Ok(())
}
