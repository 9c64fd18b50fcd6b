use std::sync::Arc;

use snapshotter::store::{Database, DatabaseSetupError};
use snapshotter::{Config, Manager};

/// Shared state handed to every subcommand
#[derive(Debug)]
pub struct OpContext {
    pub config: Config,
    pub manager: Manager,
}

impl OpContext {
    /// Open the daemon database under the configured root and build a
    /// manager over it.
    pub async fn new(config: Config) -> Result<Self, DatabaseSetupError> {
        let database = Database::new(config.database_path()).await?;
        let manager = Manager::builder()
            .store(Arc::new(database))
            .nydusd_path(&config.nydusd_path)
            .shared_daemon(config.shared_daemon)
            .build();
        Ok(Self { config, manager })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: std::fmt::Display;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Generate a clap `Command` enum over a set of ops, with `OpError` and
/// `OpOutput` wrappers and an `Op` impl that dispatches to the variant.
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $op:ty)),* $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($op),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$op as $crate::cli::op::Op>::Error),
            )*
        }

        pub enum OpOutput {
            $($variant(<$op as $crate::cli::op::Op>::Output),)*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(output) => write!(f, "{}", output),)*
                }
            }
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Error = OpError;
            type Output = OpOutput;

            async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => op
                            .execute(ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
