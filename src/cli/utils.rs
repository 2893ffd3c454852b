use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::database::PgStore;
use crate::services::SystemClock;
use crate::state::AppState;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data_value) = data {
                response["data"] = data_value;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(
    output_format: &OutputFormat,
    message: &str,
    error_code: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Print rows as a JSON array, or one text line per row
pub fn output_rows<T, F>(output_format: &OutputFormat, rows: &[T], line: F) -> anyhow::Result<()>
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("(none)");
            }
            for row in rows {
                println!("{}", line(row));
            }
        }
    }
    Ok(())
}

/// Services over the configured PostgreSQL database
pub async fn database_state() -> anyhow::Result<AppState> {
    let store = PgStore::connect().await?;
    Ok(AppState::new(Arc::new(store), Arc::new(SystemClock)))
}
