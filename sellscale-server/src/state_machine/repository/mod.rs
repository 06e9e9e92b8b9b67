//! Repository abstraction for prospect persistence.
//!
//! This module defines the `ProspectRepository` trait that abstracts storage
//! of prospects, their audit logs, drafted messages, bump frameworks and the
//! effect outbox. Implementations provide different backends (in-memory,
//! SQLite).
//!
//! Status writes are compare-and-swap on the prospect's `version`: a commit
//! whose expected version no longer matches fails with
//! [`RepositoryError::Conflict`] and writes nothing.

mod memory;
pub mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use sellscale_core::bump::{BumpFramework, NewBumpFramework};
use sellscale_core::model::{
    ArchetypeId, BumpFrameworkId, ClientArchetype, ClientSdr, ClientSdrId, GeneratedMessage,
    GeneratedMessageStatus, GeneratedMessageType, MessageId, NewProspect, Prospect, ProspectEmail,
    ProspectEmailStatusRecord, ProspectId, ProspectStatusRecord,
};
use sellscale_core::{Effect, EmailTransitionPlan, ProspectEmailOutreachStatus, TransitionPlan};

/// Errors returned by repository operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    #[error("corrupt {what} in database")]
    Corruption { what: String },

    #[error("prospect {prospect_id} was modified concurrently")]
    Conflict { prospect_id: ProspectId },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Both audit logs of a prospect, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusHistory {
    pub linkedin: Vec<ProspectStatusRecord>,
    pub email: Vec<ProspectEmailStatusRecord>,
}

/// Which email slot a message fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailSlot {
    SubjectLine,
    FirstLine,
    Body,
}

/// Messages blocked by a block operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockOutcome {
    pub blocked: Vec<MessageId>,
}

/// Result of deactivating a persona.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeactivationOutcome {
    pub archetype_id: Option<ArchetypeId>,
    /// Prospects whose unsent messages were blocked (hard deactivation only).
    pub cleared_prospects: Vec<ProspectId>,
    pub blocked_messages: Vec<MessageId>,
}

/// Lifecycle of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Written with the transition, not yet dispatched.
    Pending,
    Delivered,
    /// Dispatch failed; will be retried at `next_attempt_at`.
    Failed,
    /// Retries exhausted.
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// A persisted effect awaiting (or done with) dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub transition_id: Uuid,
    pub prospect_id: ProspectId,
    pub effect: Effect,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Everything a transition commit writes besides the plan itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommit {
    pub transition_id: Uuid,
    pub committed_at: DateTime<Utc>,
    /// Persistable effects of the plan.
    pub outbox_effects: Vec<Effect>,
    /// When the background loop may first pick the rows up. The store
    /// dispatches them itself right after commit, so this is a grace period
    /// for the crash-between-commit-and-dispatch case.
    pub outbox_first_attempt_at: DateTime<Utc>,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransition {
    /// The prospect as stored, with its new `version`.
    pub prospect: Prospect,
    pub outbox: Vec<OutboxEntry>,
}

/// Filter for listing bump frameworks. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BumpFrameworkFilter {
    pub client_sdr_id: Option<ClientSdrId>,
    pub overall_status: Option<sellscale_core::ProspectOverallStatus>,
    pub archetype_id: Option<ArchetypeId>,
    pub active: Option<bool>,
}

impl BumpFrameworkFilter {
    pub fn matches(&self, framework: &BumpFramework) -> bool {
        self.client_sdr_id.map_or(true, |id| framework.client_sdr_id == id)
            && self
                .overall_status
                .map_or(true, |s| framework.overall_status == s)
            && self
                .archetype_id
                .map_or(true, |id| framework.archetype_id == Some(id))
            && self.active.map_or(true, |a| framework.active == a)
    }
}

/// Repository trait for persisting prospects and everything hanging off them.
///
/// The `ProspectStore` uses this trait to stay independent of the storage
/// backend.
#[async_trait]
pub trait ProspectRepository: Send + Sync {
    // =========================================================================
    // SDRs and personas
    // =========================================================================

    async fn create_client_sdr(
        &self,
        name: &str,
        auth_token: &str,
    ) -> Result<ClientSdr, RepositoryError>;

    /// Look up the SDR owning a bearer token.
    async fn client_sdr_by_token(&self, token: &str) -> Result<Option<ClientSdr>, RepositoryError>;

    async fn create_archetype(
        &self,
        client_sdr_id: ClientSdrId,
        name: &str,
    ) -> Result<ClientArchetype, RepositoryError>;

    async fn get_archetype(
        &self,
        id: ArchetypeId,
    ) -> Result<Option<ClientArchetype>, RepositoryError>;

    /// Mark the persona inactive. When `hard`, also block and clear the
    /// unsent messages of every prospect of the persona still in
    /// `PROSPECTED` or `QUEUED_FOR_OUTREACH`, in the same transaction.
    async fn deactivate_archetype(
        &self,
        id: ArchetypeId,
        hard: bool,
    ) -> Result<DeactivationOutcome, RepositoryError>;

    // =========================================================================
    // Prospects
    // =========================================================================

    async fn create_prospect(&self, new: &NewProspect) -> Result<Prospect, RepositoryError>;

    async fn get_prospect(&self, id: ProspectId) -> Result<Option<Prospect>, RepositoryError>;

    async fn list_prospects(
        &self,
        client_sdr_id: ClientSdrId,
    ) -> Result<Vec<Prospect>, RepositoryError>;

    /// Write non-status fields (purgatory, persona) with compare-and-swap on
    /// `expected_version`. Returns the stored prospect with its new version.
    async fn update_prospect(
        &self,
        prospect: &Prospect,
        expected_version: i64,
    ) -> Result<Prospect, RepositoryError>;

    /// Delete the prospect and everything that references it. Returns false
    /// if it did not exist.
    async fn delete_prospect(&self, id: ProspectId) -> Result<bool, RepositoryError>;

    /// Atomically write a planned LinkedIn transition, its audit row and its
    /// outbox rows.
    async fn commit_linkedin_transition(
        &self,
        plan: &TransitionPlan,
        expected_version: i64,
        commit: &TransitionCommit,
    ) -> Result<CommittedTransition, RepositoryError>;

    /// Atomically write a planned email transition, its audit row and its
    /// outbox rows.
    async fn commit_email_transition(
        &self,
        plan: &EmailTransitionPlan,
        expected_version: i64,
        commit: &TransitionCommit,
    ) -> Result<CommittedTransition, RepositoryError>;

    async fn status_history(&self, id: ProspectId) -> Result<StatusHistory, RepositoryError>;

    // =========================================================================
    // Email record and drafted messages
    // =========================================================================

    async fn create_prospect_email(
        &self,
        prospect_id: ProspectId,
        outreach_status: Option<ProspectEmailOutreachStatus>,
    ) -> Result<ProspectEmail, RepositoryError>;

    async fn get_prospect_email(
        &self,
        prospect_id: ProspectId,
    ) -> Result<Option<ProspectEmail>, RepositoryError>;

    async fn create_generated_message(
        &self,
        prospect_id: ProspectId,
        message_type: GeneratedMessageType,
        message_status: GeneratedMessageStatus,
        completion: &str,
    ) -> Result<GeneratedMessage, RepositoryError>;

    async fn get_generated_message(
        &self,
        id: MessageId,
    ) -> Result<Option<GeneratedMessage>, RepositoryError>;

    /// Point the prospect's approved LinkedIn message at `message_id`.
    async fn approve_linkedin_message(
        &self,
        prospect_id: ProspectId,
        message_id: MessageId,
    ) -> Result<(), RepositoryError>;

    /// Fill one email slot with `message_id`.
    async fn set_email_slot(
        &self,
        prospect_id: ProspectId,
        slot: EmailSlot,
        message_id: MessageId,
    ) -> Result<(), RepositoryError>;

    /// Block the approved LinkedIn message if still unsent and clear the
    /// pointer. Sent messages are left untouched.
    async fn block_linkedin_message(
        &self,
        prospect_id: ProspectId,
    ) -> Result<BlockOutcome, RepositoryError>;

    /// Block each unsent email slot message and clear its slot.
    async fn block_email_messages(
        &self,
        prospect_id: ProspectId,
    ) -> Result<BlockOutcome, RepositoryError>;

    // =========================================================================
    // Bump frameworks
    // =========================================================================

    /// Insert a framework. If `new.default`, prior defaults of the same group
    /// are unset in the same transaction.
    async fn create_bump_framework(
        &self,
        client_sdr_id: ClientSdrId,
        new: &NewBumpFramework,
    ) -> Result<BumpFramework, RepositoryError>;

    async fn get_bump_framework(
        &self,
        id: BumpFrameworkId,
    ) -> Result<Option<BumpFramework>, RepositoryError>;

    /// Frameworks matching `filter`, ordered by id.
    async fn list_bump_frameworks(
        &self,
        filter: &BumpFrameworkFilter,
    ) -> Result<Vec<BumpFramework>, RepositoryError>;

    /// Overwrite the editable fields (title, description, stage, substatus,
    /// delay). If the framework is default and its group changed, other
    /// defaults of the new group are unset.
    async fn update_bump_framework(
        &self,
        framework: &BumpFramework,
    ) -> Result<(), RepositoryError>;

    /// Make `id` the only default of its group.
    async fn set_default_bump_framework(
        &self,
        id: BumpFrameworkId,
    ) -> Result<BumpFramework, RepositoryError>;

    async fn set_bump_framework_active(
        &self,
        id: BumpFrameworkId,
        active: bool,
    ) -> Result<BumpFramework, RepositoryError>;

    // =========================================================================
    // Effect outbox
    // =========================================================================

    /// Rows in `pending` or `failed` whose `next_attempt_at` has passed,
    /// oldest first.
    async fn due_outbox_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, RepositoryError>;

    async fn list_outbox(
        &self,
        status: Option<OutboxStatus>,
    ) -> Result<Vec<OutboxEntry>, RepositoryError>;

    async fn mark_outbox_delivered(&self, id: i64) -> Result<(), RepositoryError>;

    /// Record a failed attempt. `next_attempt_at = None` marks the row dead.
    async fn mark_outbox_failed(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;
}
