use clap::Args;

use crate::cli::op::{Op, OpContext};
use snapshotter::ManagerError;

/// Destroy every registered daemon
#[derive(Args, Debug, Clone)]
pub struct Cleanup;

#[async_trait::async_trait]
impl Op for Cleanup {
    type Error = ManagerError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let destroyed = ctx.manager.destroy_all().await?;
        Ok(format!("Destroyed {} daemon(s)", destroyed))
    }
}
