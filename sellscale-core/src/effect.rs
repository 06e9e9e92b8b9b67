//! Effects (side effects as data).
//!
//! The planner returns effects instead of performing them. The server writes
//! the persistable ones to the outbox in the same transaction as the status
//! change and executes them after commit.

use serde::{Deserialize, Serialize};

use crate::model::{ClientSdrId, Prospect, ProspectId};

/// All effects a status transition can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Block the prospect's approved LinkedIn message if it has not been sent,
    /// and clear the approval pointer.
    BlockLinkedinMessage { prospect_id: ProspectId },

    /// Block every unsent email slot message of the prospect and clear the
    /// slots.
    BlockEmailMessages { prospect_id: ProspectId },

    /// Post a notification to a Slack channel.
    Notify {
        channel: NotifyChannel,
        notification: Notification,
    },

    /// Log a message. Never persisted.
    Log { level: LogLevel, message: String },
}

impl Effect {
    /// Returns true if this effect goes through the outbox.
    ///
    /// Message blocking is idempotent, so replaying it is harmless. A replayed
    /// notification may post twice, which is preferable to dropping it.
    pub fn should_persist(&self) -> bool {
        !matches!(self, Effect::Log { .. })
    }

    /// Short name used in logs and outbox listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::BlockLinkedinMessage { .. } => "block_linkedin_message",
            Effect::BlockEmailMessages { .. } => "block_email_messages",
            Effect::Notify { .. } => "notify",
            Effect::Log { .. } => "log",
        }
    }
}

/// Slack channels notifications are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    /// General pipeline activity (accepts, new conversations).
    Pipeline,
    /// Demo bookings and outcomes.
    Demos,
    /// Demos detected automatically, pending confirmation.
    DemoDetection,
}

impl NotifyChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Demos => "demos",
            Self::DemoDetection => "demo_detection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachChannel {
    Linkedin,
    Email,
}

impl OutreachChannel {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Linkedin => "LinkedIn",
            Self::Email => "Email",
        }
    }
}

/// Snapshot of the prospect fields a notification needs. Captured at plan
/// time so a delayed retry still describes the prospect as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectSummary {
    pub prospect_id: ProspectId,
    pub client_sdr_id: ClientSdrId,
    pub full_name: String,
    pub title: Option<String>,
    pub company: Option<String>,
}

impl From<&Prospect> for ProspectSummary {
    fn from(prospect: &Prospect) -> Self {
        Self {
            prospect_id: prospect.id,
            client_sdr_id: prospect.client_sdr_id,
            full_name: prospect.full_name.clone(),
            title: prospect.title.clone(),
            company: prospect.company.clone(),
        }
    }
}

impl ProspectSummary {
    /// "Name (Title @ Company)" with absent parts dropped.
    pub fn label(&self) -> String {
        match (&self.title, &self.company) {
            (Some(title), Some(company)) => format!("{} ({} @ {})", self.full_name, title, company),
            (Some(title), None) => format!("{} ({})", self.full_name, title),
            (None, Some(company)) => format!("{} ({})", self.full_name, company),
            (None, None) => self.full_name.clone(),
        }
    }
}

/// Notification payloads. Rendering to Slack blocks happens in the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// SDR booked a demo to be handed off to an account executive.
    DemoSetHandoff {
        prospect: ProspectSummary,
        channel: OutreachChannel,
    },
    /// A demo was detected automatically and needs confirmation.
    DemoSetDetected {
        prospect: ProspectSummary,
        channel: OutreachChannel,
    },
    InviteAccepted { prospect: ProspectSummary },
    ConversationStarted {
        prospect: ProspectSummary,
        channel: OutreachChannel,
    },
    DemoWon {
        prospect: ProspectSummary,
        channel: OutreachChannel,
    },
}

impl Notification {
    pub fn prospect(&self) -> &ProspectSummary {
        match self {
            Self::DemoSetHandoff { prospect, .. }
            | Self::DemoSetDetected { prospect, .. }
            | Self::InviteAccepted { prospect }
            | Self::ConversationStarted { prospect, .. }
            | Self::DemoWon { prospect, .. } => prospect,
        }
    }

    /// One-line plain-text summary, also used as the Slack fallback text.
    pub fn headline(&self) -> String {
        match self {
            Self::DemoSetHandoff { prospect, channel } => format!(
                "🎉 Demo set with {} via {}",
                prospect.label(),
                channel.display_name()
            ),
            Self::DemoSetDetected { prospect, channel } => format!(
                "🔎 Possible demo detected with {} via {}",
                prospect.label(),
                channel.display_name()
            ),
            Self::InviteAccepted { prospect } => {
                format!("🤝 {} accepted your LinkedIn invite", prospect.label())
            }
            Self::ConversationStarted { prospect, channel } => format!(
                "💬 {} started a conversation via {}",
                prospect.label(),
                channel.display_name()
            ),
            Self::DemoWon { prospect, channel } => format!(
                "🏆 Demo won with {} via {}",
                prospect.label(),
                channel.display_name()
            ),
        }
    }

    /// Whether the rendered message carries confirm/reject buttons.
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::DemoSetDetected { .. })
    }
}

/// Log level for logging effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
