use uuid::Uuid;

use crate::cli::utils::{database_state, output_rows};
use crate::cli::OutputFormat;
use crate::services::PostponementService;

/// Operator view of a chain; bypasses case access checks
pub async fn handle(event_id: Uuid, output_format: OutputFormat) -> anyhow::Result<()> {
    let state = database_state().await?;
    let event = state
        .store
        .get_event(event_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("event {} not found", event_id))?;

    let postponement = PostponementService::new(&state);
    let history = postponement.postponement_history(&event).await?;
    let branches = postponement.branch_points(&event).await?;

    output_rows(&output_format, &history, |e| {
        let marker = if branches.contains(&e.id) { " (branches)" } else { "" };
        format!(
            "{}  {:<10} {}  {}{}",
            e.id,
            e.status.as_str(),
            e.start_datetime.format("%Y-%m-%d %H:%M"),
            e.postponement_reason,
            marker
        )
    })
}
