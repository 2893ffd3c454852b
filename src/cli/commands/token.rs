use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims, UserRole};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;

#[derive(Args)]
pub struct TokenArgs {
    #[arg(long, help = "User id (random when omitted)")]
    pub user: Option<Uuid>,

    #[arg(long, help = "User email")]
    pub email: String,

    #[arg(long, default_value = "", help = "Display name")]
    pub name: String,

    #[arg(long, default_value = "invited", help = "System role: owner or invited")]
    pub role: UserRole,
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let user_id = args.user.unwrap_or_else(Uuid::new_v4);
    let token = generate_jwt(Claims::new(user_id, args.email, args.name, args.role))?;

    match output_format {
        OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
        OutputFormat::Json => output_success(
            &output_format,
            "Token issued",
            Some(json!({ "user_id": user_id, "token": token })),
        ),
    }
}
