use clap::Args;

use super::list::render_table;
use crate::cli::op::{Op, OpContext};
use snapshotter::ManagerError;

#[derive(Args, Debug, Clone)]
pub struct Reconnect {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[async_trait::async_trait]
impl Op for Reconnect {
    type Error = ReconnectError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let survivors = ctx.manager.reconnect().await?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&survivors)?);
        }
        if survivors.is_empty() {
            return Ok("No running daemons found".to_string());
        }
        Ok(format!(
            "Reconnected {} daemon(s)\n{}",
            survivors.len(),
            render_table(&survivors)
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    #[error("reconnect failed: {0}")]
    Manager(#[from] ManagerError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
