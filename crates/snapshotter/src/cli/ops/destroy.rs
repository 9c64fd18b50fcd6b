use clap::Args;

use crate::cli::op::{Op, OpContext};
use snapshotter::ManagerError;

#[derive(Args, Debug, Clone)]
pub struct Destroy {
    /// Snapshot whose daemon should be torn down
    pub snapshot_id: String,
}

#[async_trait::async_trait]
impl Op for Destroy {
    type Error = ManagerError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        ctx.manager.destroy_by_snapshot_id(&self.snapshot_id).await?;
        Ok(format!("Destroyed daemon for snapshot {}", self.snapshot_id))
    }
}
