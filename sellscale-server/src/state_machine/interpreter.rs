//! Effect interpreter that executes effects against storage and Slack.
//!
//! The interpreter is the boundary between the pure planner and the impure
//! world of I/O. It takes effects (descriptions of what to do) and executes
//! them.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::repository::{ProspectRepository, RepositoryError};
use crate::slack::{render_notification, Notifier, NotifyError};
use sellscale_core::{Effect, LogLevel};

/// Context needed by the interpreter to execute effects.
#[derive(Clone)]
pub struct InterpreterContext {
    pub repository: Arc<dyn ProspectRepository>,
    pub notifier: Arc<dyn Notifier>,
    /// Base URL of the web app, for direct links in notifications.
    pub app_base_url: String,
}

#[derive(Debug, Error)]
pub enum EffectError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Execute a list of effects.
///
/// Effects are executed sequentially. If an effect fails, execution continues
/// with remaining effects, and the error is logged.
pub async fn execute_effects(ctx: &InterpreterContext, effects: &[Effect]) {
    for effect in effects {
        if let Err(e) = execute_effect(ctx, effect).await {
            error!("Effect {} failed: {}", effect.kind(), e);
        }
    }
}

/// Execute a single effect.
pub async fn execute_effect(ctx: &InterpreterContext, effect: &Effect) -> Result<(), EffectError> {
    match effect {
        Effect::BlockLinkedinMessage { prospect_id } => {
            let outcome = ctx.repository.block_linkedin_message(*prospect_id).await?;
            if !outcome.blocked.is_empty() {
                info!(
                    "Blocked LinkedIn message {:?} of prospect {}",
                    outcome.blocked, prospect_id
                );
            }
            Ok(())
        }

        Effect::BlockEmailMessages { prospect_id } => {
            let outcome = ctx.repository.block_email_messages(*prospect_id).await?;
            if !outcome.blocked.is_empty() {
                info!(
                    "Blocked email messages {:?} of prospect {}",
                    outcome.blocked, prospect_id
                );
            }
            Ok(())
        }

        Effect::Notify {
            channel,
            notification,
        } => {
            let message = render_notification(notification, &ctx.app_base_url);
            ctx.notifier.send(*channel, &message).await?;
            debug!("Sent {} notification: {}", channel.as_str(), message.text);
            Ok(())
        }

        Effect::Log { level, message } => {
            match level {
                LogLevel::Debug => debug!("{}", message),
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
            }
            Ok(())
        }
    }
}
