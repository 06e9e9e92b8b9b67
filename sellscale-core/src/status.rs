//! Status vocabulary for both outreach channels.
//!
//! Each channel has its own closed set of statuses. Every status carries a
//! static [`StatusDescriptor`] that names it for display and maps it to the
//! channel-agnostic [`ProspectOverallStatus`]. Descriptors are exhaustive
//! `match` expressions, so adding a status without a descriptor does not
//! compile.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Human-readable record attached to every channel status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub overall: ProspectOverallStatus,
}

const fn descriptor(
    name: &'static str,
    description: &'static str,
    overall: ProspectOverallStatus,
) -> StatusDescriptor {
    StatusDescriptor {
        name,
        description,
        overall,
    }
}

// =============================================================================
// Overall status
// =============================================================================

/// Channel-agnostic summary of how far a prospect has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProspectOverallStatus {
    Prospected,
    SentOutreach,
    Accepted,
    Bumped,
    ActiveConvo,
    Demo,
    Removed,
    Nurture,
}

impl ProspectOverallStatus {
    pub const ALL: [ProspectOverallStatus; 8] = [
        Self::Prospected,
        Self::SentOutreach,
        Self::Accepted,
        Self::Bumped,
        Self::ActiveConvo,
        Self::Demo,
        Self::Removed,
        Self::Nurture,
    ];

    /// Forward-progress rank. Higher means further along the pipeline.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Removed | Self::Nurture => 0,
            Self::Prospected => 1,
            Self::SentOutreach => 2,
            Self::Accepted => 3,
            Self::Bumped => 4,
            Self::ActiveConvo => 5,
            Self::Demo => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prospected => "PROSPECTED",
            Self::SentOutreach => "SENT_OUTREACH",
            Self::Accepted => "ACCEPTED",
            Self::Bumped => "BUMPED",
            Self::ActiveConvo => "ACTIVE_CONVO",
            Self::Demo => "DEMO",
            Self::Removed => "REMOVED",
            Self::Nurture => "NURTURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Prospected => "Prospected",
            Self::SentOutreach => "Sent Outreach",
            Self::Accepted => "Accepted",
            Self::Bumped => "Bumped",
            Self::ActiveConvo => "Active Convo",
            Self::Demo => "Demo",
            Self::Removed => "Removed",
            Self::Nurture => "Nurture",
        }
    }
}

impl fmt::Display for ProspectOverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LinkedIn channel
// =============================================================================

/// LinkedIn outreach status of a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProspectStatus {
    Prospected,
    QueuedForOutreach,
    SendOutreachFailed,
    SentOutreach,
    Accepted,
    Responded,
    ActiveConvo,
    ActiveConvoQuestion,
    ActiveConvoQualNeeded,
    ActiveConvoObjection,
    ActiveConvoScheduling,
    ActiveConvoNextSteps,
    ActiveConvoRevival,
    ActiveConvoCircleBack,
    ActiveConvoReferral,
    ActiveConvoQueuedForSnooze,
    ActiveConvoContinueSequence,
    ActiveConvoBreakup,
    Scheduling,
    NotInterested,
    DemoSet,
    DemoWon,
    DemoLoss,
    NotQualified,
}

impl ProspectStatus {
    pub const ALL: [ProspectStatus; 24] = [
        Self::Prospected,
        Self::QueuedForOutreach,
        Self::SendOutreachFailed,
        Self::SentOutreach,
        Self::Accepted,
        Self::Responded,
        Self::ActiveConvo,
        Self::ActiveConvoQuestion,
        Self::ActiveConvoQualNeeded,
        Self::ActiveConvoObjection,
        Self::ActiveConvoScheduling,
        Self::ActiveConvoNextSteps,
        Self::ActiveConvoRevival,
        Self::ActiveConvoCircleBack,
        Self::ActiveConvoReferral,
        Self::ActiveConvoQueuedForSnooze,
        Self::ActiveConvoContinueSequence,
        Self::ActiveConvoBreakup,
        Self::Scheduling,
        Self::NotInterested,
        Self::DemoSet,
        Self::DemoWon,
        Self::DemoLoss,
        Self::NotQualified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prospected => "PROSPECTED",
            Self::QueuedForOutreach => "QUEUED_FOR_OUTREACH",
            Self::SendOutreachFailed => "SEND_OUTREACH_FAILED",
            Self::SentOutreach => "SENT_OUTREACH",
            Self::Accepted => "ACCEPTED",
            Self::Responded => "RESPONDED",
            Self::ActiveConvo => "ACTIVE_CONVO",
            Self::ActiveConvoQuestion => "ACTIVE_CONVO_QUESTION",
            Self::ActiveConvoQualNeeded => "ACTIVE_CONVO_QUAL_NEEDED",
            Self::ActiveConvoObjection => "ACTIVE_CONVO_OBJECTION",
            Self::ActiveConvoScheduling => "ACTIVE_CONVO_SCHEDULING",
            Self::ActiveConvoNextSteps => "ACTIVE_CONVO_NEXT_STEPS",
            Self::ActiveConvoRevival => "ACTIVE_CONVO_REVIVAL",
            Self::ActiveConvoCircleBack => "ACTIVE_CONVO_CIRCLE_BACK",
            Self::ActiveConvoReferral => "ACTIVE_CONVO_REFERRAL",
            Self::ActiveConvoQueuedForSnooze => "ACTIVE_CONVO_QUEUED_FOR_SNOOZE",
            Self::ActiveConvoContinueSequence => "ACTIVE_CONVO_CONTINUE_SEQUENCE",
            Self::ActiveConvoBreakup => "ACTIVE_CONVO_BREAKUP",
            Self::Scheduling => "SCHEDULING",
            Self::NotInterested => "NOT_INTERESTED",
            Self::DemoSet => "DEMO_SET",
            Self::DemoWon => "DEMO_WON",
            Self::DemoLoss => "DEMO_LOSS",
            Self::NotQualified => "NOT_QUALIFIED",
        }
    }

    /// Parse from the wire name (e.g. `"ACTIVE_CONVO_BREAKUP"`).
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn descriptor(&self) -> StatusDescriptor {
        use ProspectOverallStatus as O;
        match self {
            Self::Prospected => descriptor(
                "Prospected",
                "Prospect has been added to the system.",
                O::Prospected,
            ),
            Self::QueuedForOutreach => descriptor(
                "Queued for Outreach",
                "Prospect is queued for outreach.",
                O::Prospected,
            ),
            Self::SendOutreachFailed => descriptor(
                "Send Outreach Failed",
                "Outreach was unable to be sent to the Prospect.",
                O::Prospected,
            ),
            Self::SentOutreach => descriptor(
                "Sent Outreach",
                "Prospect has been sent an invitation to connect on LinkedIn.",
                O::SentOutreach,
            ),
            Self::Accepted => descriptor(
                "Accepted",
                "Prospect has accepted the invitation to connect on LinkedIn.",
                O::Accepted,
            ),
            Self::Responded => descriptor(
                "Bumped",
                "The Prospect has been bumped by the SDR.",
                O::Bumped,
            ),
            Self::ActiveConvo => descriptor(
                "Active Convo",
                "The Prospect has been engaged in an active conversation with the SDR.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoQuestion => descriptor(
                "Active Convo - Question",
                "The Prospect has asked a question.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoQualNeeded => descriptor(
                "Active Convo - Qualification Needed",
                "The Prospect needs to be qualified before a demo.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoObjection => descriptor(
                "Active Convo - Objection",
                "The Prospect has raised an objection.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoScheduling => descriptor(
                "Active Convo - Scheduling",
                "The Prospect is discussing scheduling.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoNextSteps => descriptor(
                "Active Convo - Next Steps",
                "The Prospect has agreed to next steps.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoRevival => descriptor(
                "Active Convo - Revival",
                "The Prospect has re-engaged after going quiet.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoCircleBack => descriptor(
                "Active Convo - Circle Back",
                "The Prospect asked to be contacted again later.",
                O::Nurture,
            ),
            Self::ActiveConvoReferral => descriptor(
                "Active Convo - Referral",
                "The Prospect has referred the SDR to someone else.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoQueuedForSnooze => descriptor(
                "Active Convo - Queued for Snooze",
                "The conversation is queued to be snoozed.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoContinueSequence => descriptor(
                "Active Convo - Continue Sequence",
                "The Prospect replied but the sequence should continue.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoBreakup => descriptor(
                "Active Convo - Breakup",
                "A breakup message has been sent to the Prospect.",
                O::ActiveConvo,
            ),
            Self::Scheduling => descriptor(
                "Scheduling",
                "The Prospect is scheduling time with the SDR.",
                O::ActiveConvo,
            ),
            Self::NotInterested => descriptor(
                "Not Interested",
                "The Prospect is not interested.",
                O::Removed,
            ),
            Self::DemoSet => descriptor(
                "Demo Set",
                "The Prospect has set a time to meet with the SDR.",
                O::Demo,
            ),
            Self::DemoWon => descriptor(
                "Demo Complete",
                "The Prospect is engaged and interested in continuing, following a meeting with the SDR.",
                O::Demo,
            ),
            Self::DemoLoss => descriptor(
                "Demo Missed",
                "The Prospect is not interested in continuing, following a meeting with the SDR.",
                O::Demo,
            ),
            Self::NotQualified => descriptor(
                "Not Qualified",
                "The Prospect is not qualified to receive outreach.",
                O::Removed,
            ),
        }
    }

    /// Overall status this LinkedIn status maps to.
    pub fn overall(&self) -> ProspectOverallStatus {
        self.descriptor().overall
    }

    /// True for `ACTIVE_CONVO` and every `ACTIVE_CONVO_*` sub-state.
    pub fn is_active_convo(&self) -> bool {
        matches!(
            self,
            Self::ActiveConvo
                | Self::ActiveConvoQuestion
                | Self::ActiveConvoQualNeeded
                | Self::ActiveConvoObjection
                | Self::ActiveConvoScheduling
                | Self::ActiveConvoNextSteps
                | Self::ActiveConvoRevival
                | Self::ActiveConvoCircleBack
                | Self::ActiveConvoReferral
                | Self::ActiveConvoQueuedForSnooze
                | Self::ActiveConvoContinueSequence
                | Self::ActiveConvoBreakup
        )
    }

    /// Prospects in these statuses have nothing committed yet, so their
    /// drafted messages may still be pulled.
    pub fn is_pre_outreach(&self) -> bool {
        matches!(self, Self::Prospected | Self::QueuedForOutreach)
    }
}

impl fmt::Display for ProspectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Email channel
// =============================================================================

/// Email outreach status of a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProspectEmailOutreachStatus {
    Unknown,
    NotSent,
    QueuedForOutreach,
    SentOutreach,
    EmailOpened,
    Accepted,
    ActiveConvo,
    ActiveConvoQuestion,
    ActiveConvoQualNeeded,
    ActiveConvoObjection,
    ActiveConvoScheduling,
    ActiveConvoNextSteps,
    ActiveConvoRevival,
    ActiveConvoOoo,
    Scheduling,
    NotInterested,
    Unsubscribed,
    Bounced,
    DemoSet,
    DemoWon,
    DemoLost,
}

impl ProspectEmailOutreachStatus {
    pub const ALL: [ProspectEmailOutreachStatus; 21] = [
        Self::Unknown,
        Self::NotSent,
        Self::QueuedForOutreach,
        Self::SentOutreach,
        Self::EmailOpened,
        Self::Accepted,
        Self::ActiveConvo,
        Self::ActiveConvoQuestion,
        Self::ActiveConvoQualNeeded,
        Self::ActiveConvoObjection,
        Self::ActiveConvoScheduling,
        Self::ActiveConvoNextSteps,
        Self::ActiveConvoRevival,
        Self::ActiveConvoOoo,
        Self::Scheduling,
        Self::NotInterested,
        Self::Unsubscribed,
        Self::Bounced,
        Self::DemoSet,
        Self::DemoWon,
        Self::DemoLost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotSent => "NOT_SENT",
            Self::QueuedForOutreach => "QUEUED_FOR_OUTREACH",
            Self::SentOutreach => "SENT_OUTREACH",
            Self::EmailOpened => "EMAIL_OPENED",
            Self::Accepted => "ACCEPTED",
            Self::ActiveConvo => "ACTIVE_CONVO",
            Self::ActiveConvoQuestion => "ACTIVE_CONVO_QUESTION",
            Self::ActiveConvoQualNeeded => "ACTIVE_CONVO_QUAL_NEEDED",
            Self::ActiveConvoObjection => "ACTIVE_CONVO_OBJECTION",
            Self::ActiveConvoScheduling => "ACTIVE_CONVO_SCHEDULING",
            Self::ActiveConvoNextSteps => "ACTIVE_CONVO_NEXT_STEPS",
            Self::ActiveConvoRevival => "ACTIVE_CONVO_REVIVAL",
            Self::ActiveConvoOoo => "ACTIVE_CONVO_OOO",
            Self::Scheduling => "SCHEDULING",
            Self::NotInterested => "NOT_INTERESTED",
            Self::Unsubscribed => "UNSUBSCRIBED",
            Self::Bounced => "BOUNCED",
            Self::DemoSet => "DEMO_SET",
            Self::DemoWon => "DEMO_WON",
            Self::DemoLost => "DEMO_LOST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn descriptor(&self) -> StatusDescriptor {
        use ProspectOverallStatus as O;
        match self {
            Self::Unknown => descriptor(
                "Unknown",
                "Email outreach status is unknown.",
                O::Prospected,
            ),
            Self::NotSent => descriptor(
                "Not Sent",
                "No email has been sent to the Prospect.",
                O::Prospected,
            ),
            Self::QueuedForOutreach => descriptor(
                "Queued for Outreach",
                "An email is queued to be sent to the Prospect.",
                O::Prospected,
            ),
            Self::SentOutreach => descriptor(
                "Sent Outreach",
                "The Prospect has been sent an email.",
                O::SentOutreach,
            ),
            Self::EmailOpened => descriptor(
                "Email Opened",
                "The Prospect has opened the email.",
                O::Accepted,
            ),
            Self::Accepted => descriptor(
                "Accepted",
                "The Prospect has clicked through the email.",
                O::Accepted,
            ),
            Self::ActiveConvo => descriptor(
                "Active Convo",
                "The Prospect has replied to the email.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoQuestion => descriptor(
                "Active Convo - Question",
                "The Prospect has asked a question.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoQualNeeded => descriptor(
                "Active Convo - Qualification Needed",
                "The Prospect needs to be qualified before a demo.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoObjection => descriptor(
                "Active Convo - Objection",
                "The Prospect has raised an objection.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoScheduling => descriptor(
                "Active Convo - Scheduling",
                "The Prospect is discussing scheduling.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoNextSteps => descriptor(
                "Active Convo - Next Steps",
                "The Prospect has agreed to next steps.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoRevival => descriptor(
                "Active Convo - Revival",
                "The Prospect has re-engaged after going quiet.",
                O::ActiveConvo,
            ),
            Self::ActiveConvoOoo => descriptor(
                "Active Convo - Out of Office",
                "The Prospect replied with an out-of-office notice.",
                O::ActiveConvo,
            ),
            Self::Scheduling => descriptor(
                "Scheduling",
                "The Prospect is scheduling time with the SDR.",
                O::ActiveConvo,
            ),
            Self::NotInterested => descriptor(
                "Not Interested",
                "The Prospect is not interested.",
                O::Removed,
            ),
            Self::Unsubscribed => descriptor(
                "Unsubscribed",
                "The Prospect has unsubscribed from emails.",
                O::Removed,
            ),
            Self::Bounced => descriptor(
                "Bounced",
                "The email to the Prospect bounced.",
                O::Removed,
            ),
            Self::DemoSet => descriptor(
                "Demo Set",
                "The Prospect has set a time to meet with the SDR.",
                O::Demo,
            ),
            Self::DemoWon => descriptor(
                "Demo Complete",
                "The Prospect is interested in continuing after the meeting.",
                O::Demo,
            ),
            Self::DemoLost => descriptor(
                "Demo Missed",
                "The Prospect is not interested in continuing after the meeting.",
                O::Demo,
            ),
        }
    }

    pub fn overall(&self) -> ProspectOverallStatus {
        self.descriptor().overall
    }
}

impl fmt::Display for ProspectEmailOutreachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status from both channels: the higher-ranked mapping wins, and a
/// tie resolves to the LinkedIn side.
pub fn overall_status_for(
    linkedin: ProspectStatus,
    email: Option<ProspectEmailOutreachStatus>,
) -> ProspectOverallStatus {
    let linkedin_overall = linkedin.overall();
    match email.map(|status| status.overall()) {
        Some(email_overall) if email_overall.rank() > linkedin_overall.rank() => email_overall,
        _ => linkedin_overall,
    }
}
