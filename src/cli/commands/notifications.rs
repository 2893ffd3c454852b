use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::cli::utils::{database_state, output_rows, output_success};
use crate::cli::OutputFormat;
use crate::services::NotificationService;

#[derive(Subcommand)]
pub enum NotificationCommands {
    #[command(about = "List unsent reminders whose send time has arrived")]
    Due {
        #[arg(long, help = "Evaluate at this RFC 3339 instant instead of now")]
        at: Option<DateTime<Utc>>,
    },

    #[command(about = "Record a reminder as delivered")]
    MarkSent {
        #[arg(help = "Notification id")]
        id: Uuid,
    },
}

pub async fn handle(cmd: NotificationCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let state = database_state().await?;
    let service = NotificationService::new(&state);

    match cmd {
        NotificationCommands::Due { at } => {
            let due = service.due(at.unwrap_or_else(Utc::now)).await?;
            output_rows(&output_format, &due, |d| {
                format!(
                    "{}  {:<8} {:<10} {}  {}",
                    d.notification.id,
                    d.notification.notification_type.as_str(),
                    d.notification.notification_time.as_str(),
                    d.event.start_datetime.format("%Y-%m-%d %H:%M"),
                    d.event.title
                )
            })
        }
        NotificationCommands::MarkSent { id } => {
            let row = service.mark_sent(id, Utc::now()).await?;
            output_success(
                &output_format,
                &format!("Notification {} marked sent", row.id),
                Some(json!({ "sent_at": row.sent_at })),
            )
        }
    }
}
