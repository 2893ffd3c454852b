use serde_json::Value;

use crate::cli::utils::{output_error, output_success};
use crate::cli::OutputFormat;
use crate::config::config;

pub async fn handle(url: Option<String>, output_format: OutputFormat) -> anyhow::Result<()> {
    let base = url.unwrap_or_else(|| format!("http://localhost:{}", config().api.port));
    let endpoint = format!("{}/health", base.trim_end_matches('/'));

    let response = reqwest::get(&endpoint).await?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        output_success(&output_format, &format!("{} is healthy", base), Some(body))
    } else {
        output_error(
            &output_format,
            &format!("{} answered {}", base, status),
            body.get("code").and_then(Value::as_str),
        )?;
        anyhow::bail!("server unhealthy")
    }
}
