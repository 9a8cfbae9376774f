//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod health;
pub mod probe;
pub mod system;
pub mod util;
pub mod watch;

use std::sync::Arc;

use akari_core::{Notification, Notifier, Operations, Supervisor};
use tracing::debug;

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;

/// What a one-shot handler works with.
pub struct Ctx {
    pub ops: Operations,
    pub entry: String,
    pub output: OutputFormat,
    pub quiet: bool,
}

/// Dispatch a one-shot device command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let entry = config::target_entry(global, &resolved.config)?;
    let supervisor = Supervisor::new(resolved.supervisor)?;

    let ctx = Ctx {
        ops: supervisor.operations(Some(log_notifier())),
        entry,
        output: resolved.output,
        quiet: global.quiet,
    };

    match cmd {
        Command::Health => health::handle(&ctx).await,
        Command::Config(args) => config_cmd::handle(&ctx, args).await,
        Command::Devices => devices::handle(&ctx).await,
        Command::Restart => system::restart(&ctx).await,
        Command::Reload => system::reload(&ctx).await,
        Command::Probe => probe::handle(&ctx).await,
        Command::Watch(_) | Command::Completions(_) => Err(CliError::Supervisor(
            "command is not a one-shot device operation".into(),
        )),
    }
}

/// Results are rendered from return values; notifications only feed the log.
fn log_notifier() -> Notifier {
    Arc::new(|notification: &Notification| match notification {
        Notification::Failed {
            entry_id,
            operation,
            error,
        } => debug!(%entry_id, %operation, %error, "operation failed"),
        other => debug!(notification = ?other, "operation completed"),
    })
}
