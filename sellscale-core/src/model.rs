//! Domain records shared by the planner and the repositories.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::{ProspectEmailOutreachStatus, ProspectOverallStatus, ProspectStatus};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(
    /// Database id of a prospect.
    ProspectId
);
id_newtype!(
    /// Database id of a sales development rep (the authenticated user).
    ClientSdrId
);
id_newtype!(
    /// Database id of a persona (client archetype).
    ArchetypeId
);
id_newtype!(MessageId);
id_newtype!(ProspectEmailId);
id_newtype!(BumpFrameworkId);

/// Why a prospect is hidden from outreach queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HiddenReason {
    RecentlyBumped,
    StatusChange,
    Manual,
}

impl HiddenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecentlyBumped => "RECENTLY_BUMPED",
            Self::StatusChange => "STATUS_CHANGE",
            Self::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECENTLY_BUMPED" => Some(Self::RecentlyBumped),
            "STATUS_CHANGE" => Some(Self::StatusChange),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A lead being worked by an SDR.
///
/// `status` and `overall_status` only change through the transition
/// planner. `version` increments on every write and backs the
/// compare-and-swap in the repositories.
/// Longest suppression window a prospect can be given, about a century.
pub const MAX_PURGATORY_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Purgatory length of {0} days is out of range (at most {MAX_PURGATORY_DAYS})")]
pub struct PurgatoryOutOfRange(pub i64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prospect {
    pub id: ProspectId,
    pub client_sdr_id: ClientSdrId,
    pub archetype_id: Option<ArchetypeId>,
    pub full_name: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub status: ProspectStatus,
    pub overall_status: ProspectOverallStatus,
    pub approved_outreach_message_id: Option<MessageId>,
    pub last_linkedin_message_at: Option<DateTime<Utc>>,
    pub last_email_message_at: Option<DateTime<Utc>>,
    pub times_bumped: u32,
    pub hidden_until: Option<DateTime<Utc>>,
    pub hidden_reason: Option<HiddenReason>,
    pub version: i64,
}

impl Prospect {
    /// True while the suppression window is open.
    pub fn in_purgatory(&self, now: DateTime<Utc>) -> bool {
        self.hidden_until.is_some_and(|until| until > now)
    }

    /// Hide the prospect for `days` days starting at `now`.
    ///
    /// Negative lengths hide nothing. Lengths above [`MAX_PURGATORY_DAYS`]
    /// are rejected and leave the prospect untouched.
    pub fn send_to_purgatory(
        &mut self,
        now: DateTime<Utc>,
        days: i64,
        reason: HiddenReason,
    ) -> Result<(), PurgatoryOutOfRange> {
        if days > MAX_PURGATORY_DAYS {
            return Err(PurgatoryOutOfRange(days));
        }
        let until = TimeDelta::try_days(days.max(0))
            .and_then(|delta| now.checked_add_signed(delta))
            .ok_or(PurgatoryOutOfRange(days))?;
        self.hidden_until = Some(until);
        self.hidden_reason = Some(reason);
        Ok(())
    }

    pub fn clear_purgatory(&mut self) {
        self.hidden_until = None;
        self.hidden_reason = None;
    }
}

/// Fields supplied when creating a prospect. New prospects always start in
/// `PROSPECTED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProspect {
    pub client_sdr_id: ClientSdrId,
    pub archetype_id: Option<ArchetypeId>,
    pub full_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

/// Email-channel record of a prospect. At most one per prospect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectEmail {
    pub id: ProspectEmailId,
    pub prospect_id: ProspectId,
    pub outreach_status: Option<ProspectEmailOutreachStatus>,
    pub personalized_subject_line: Option<MessageId>,
    pub personalized_first_line: Option<MessageId>,
    pub personalized_body: Option<MessageId>,
}

impl ProspectEmail {
    /// Message ids currently referenced by the three email slots.
    pub fn slot_message_ids(&self) -> impl Iterator<Item = MessageId> {
        [
            self.personalized_subject_line,
            self.personalized_first_line,
            self.personalized_body,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratedMessageType {
    Linkedin,
    Email,
}

impl GeneratedMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linkedin => "LINKEDIN",
            Self::Email => "EMAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LINKEDIN" => Some(Self::Linkedin),
            "EMAIL" => Some(Self::Email),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratedMessageStatus {
    Draft,
    QueuedForOutreach,
    Sent,
    Blocked,
}

impl GeneratedMessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::QueuedForOutreach => "QUEUED_FOR_OUTREACH",
            Self::Sent => "SENT",
            Self::Blocked => "BLOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(Self::Draft),
            "QUEUED_FOR_OUTREACH" => Some(Self::QueuedForOutreach),
            "SENT" => Some(Self::Sent),
            "BLOCKED" => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Only messages that have not gone out yet can be blocked.
    pub fn is_blockable(&self) -> bool {
        matches!(self, Self::Draft | Self::QueuedForOutreach)
    }
}

/// A drafted outreach message (LinkedIn invite note or one email slot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub id: MessageId,
    pub prospect_id: ProspectId,
    pub message_type: GeneratedMessageType,
    pub message_status: GeneratedMessageStatus,
    pub completion: String,
}

/// Audit row the planner asks the repository to append for a LinkedIn
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStatusRecord {
    pub from_status: ProspectStatus,
    pub to_status: ProspectStatus,
    pub automated: bool,
}

/// Email counterpart of [`NewStatusRecord`]. `from_status` is `None` when the
/// email record had no status yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmailStatusRecord {
    pub from_status: Option<ProspectEmailOutreachStatus>,
    pub to_status: ProspectEmailOutreachStatus,
    pub automated: bool,
}

/// Persisted LinkedIn audit row. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectStatusRecord {
    pub id: i64,
    pub prospect_id: ProspectId,
    pub from_status: ProspectStatus,
    pub to_status: ProspectStatus,
    pub automated: bool,
    pub created_at: DateTime<Utc>,
}

/// Persisted email audit row. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectEmailStatusRecord {
    pub id: i64,
    pub prospect_id: ProspectId,
    pub from_status: Option<ProspectEmailOutreachStatus>,
    pub to_status: ProspectEmailOutreachStatus,
    pub automated: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSdr {
    pub id: ClientSdrId,
    pub name: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
}

/// A persona an SDR targets. Prospects belong to at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientArchetype {
    pub id: ArchetypeId,
    pub client_sdr_id: ClientSdrId,
    pub name: String,
    pub active: bool,
}
