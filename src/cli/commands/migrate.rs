use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::{DatabaseManager, PgStore};

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let store = PgStore::connect().await?;
    let applied = DatabaseManager::migrate(store.pool()).await?;
    let database = DatabaseManager::main_database_name()?;
    output_success(
        &output_format,
        &format!("Applied {} schema statements to '{}'", applied, database),
        Some(json!({ "database": database, "statements": applied })),
    )
}
