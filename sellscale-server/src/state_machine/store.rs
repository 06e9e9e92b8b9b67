//! Prospect store: validate, persist, then dispatch.
//!
//! `ProspectStore` is the runtime half of the transition applier. For every
//! status change it loads the prospect, authorizes the caller, runs the pure
//! planner, commits the plan (status columns, audit row and outbox rows in
//! one transaction, guarded by the prospect's `version`) and finally
//! dispatches the committed outbox rows.
//!
//! # Concurrency
//!
//! Transitions for one prospect are serialized in-process with a per-prospect
//! lock. The `version` compare-and-swap covers writers in other processes
//! (for example the CLI against the same database): on a conflict the whole
//! read/plan/commit cycle is retried, so two callers can never both commit a
//! transition from the same observed status.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use super::interpreter::{execute_effects, InterpreterContext};
use super::outbox::{dispatch_entries, DispatchReport, OutboxSettings};
use super::repository::{
    BumpFrameworkFilter, CommittedTransition, DeactivationOutcome, ProspectRepository,
    RepositoryError, StatusHistory, TransitionCommit,
};
use crate::slack::Notifier;
use crate::status::PipelineSummary;
use sellscale_core::bump::{
    select_bump_framework, validate_bump_framework, BumpFramework, BumpFrameworkError,
    BumpFrameworkUpdate, NewBumpFramework,
};
use sellscale_core::model::{
    ArchetypeId, BumpFrameworkId, ClientArchetype, ClientSdr, ClientSdrId, HiddenReason,
    NewProspect, Prospect, ProspectEmail, ProspectId, PurgatoryOutOfRange,
};
use sellscale_core::{
    plan_email_transition, plan_linkedin_transition, valid_next_email_statuses,
    valid_next_linkedin_statuses, Effect, OutreachChannel, PlannerSettings,
    ProspectEmailOutreachStatus, ProspectStatus, StatusDescriptor, TransitionError,
    TransitionRequest,
};

/// Attempts at the read/plan/commit cycle before a version conflict is
/// reported to the caller.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for StoreError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound { entity, id } => StoreError::NotFound { entity, id },
            other => StoreError::Repository(other),
        }
    }
}

impl From<TransitionError> for StoreError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::NoEmailRecord(id) => StoreError::NotFound {
                entity: "prospect_email",
                id: id.0,
            },
            other => StoreError::Validation(other.to_string()),
        }
    }
}

impl From<PurgatoryOutOfRange> for StoreError {
    fn from(e: PurgatoryOutOfRange) -> Self {
        StoreError::Validation(e.to_string())
    }
}

impl From<BumpFrameworkError> for StoreError {
    fn from(e: BumpFrameworkError) -> Self {
        StoreError::Validation(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSettings {
    pub planner: PlannerSettings,
    pub outbox: OutboxSettings,
}

/// Fields accepted when creating a prospect on behalf of an SDR.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateProspect {
    #[serde(default)]
    pub archetype_id: Option<ArchetypeId>,
    pub full_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

/// Result of a committed transition.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedTransition {
    pub transition_id: Uuid,
    pub channel: OutreachChannel,
    /// `None` when an email record had no status yet.
    pub from_status: Option<&'static str>,
    pub to_status: &'static str,
    pub prospect: Prospect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<ProspectEmail>,
    /// How the outbox rows of this transition fared on first dispatch.
    pub dispatch: DispatchReport,
}

/// One legal next status with its descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusOption {
    pub status: &'static str,
    #[serde(flatten)]
    pub descriptor: StatusDescriptor,
}

impl From<ProspectStatus> for StatusOption {
    fn from(status: ProspectStatus) -> Self {
        Self {
            status: status.as_str(),
            descriptor: status.descriptor(),
        }
    }
}

impl From<ProspectEmailOutreachStatus> for StatusOption {
    fn from(status: ProspectEmailOutreachStatus) -> Self {
        Self {
            status: status.as_str(),
            descriptor: status.descriptor(),
        }
    }
}

/// Legal next statuses on both channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextStatuses {
    pub linkedin: Vec<StatusOption>,
    /// `None` if the prospect has no email record.
    pub email: Option<Vec<StatusOption>>,
}

/// Store for prospects and everything hanging off them.
pub struct ProspectStore {
    ctx: InterpreterContext,
    settings: StoreSettings,
    /// Per-prospect locks serializing transitions within this process.
    prospect_locks: RwLock<HashMap<ProspectId, Arc<Mutex<()>>>>,
}

impl ProspectStore {
    pub fn new(
        repository: Arc<dyn ProspectRepository>,
        notifier: Arc<dyn Notifier>,
        app_base_url: impl Into<String>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            ctx: InterpreterContext {
                repository,
                notifier,
                app_base_url: app_base_url.into(),
            },
            settings,
            prospect_locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ProspectRepository> {
        &self.ctx.repository
    }

    /// Interpreter context shared with the outbox retry loop.
    pub fn interpreter(&self) -> &InterpreterContext {
        &self.ctx
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    async fn prospect_lock(&self, id: ProspectId) -> Arc<Mutex<()>> {
        {
            let locks = self.prospect_locks.read().await;
            if let Some(lock) = locks.get(&id) {
                return lock.clone();
            }
        }

        let mut locks = self.prospect_locks.write().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // =========================================================================
    // Authorization helpers
    // =========================================================================

    /// Resolve a bearer token to its SDR.
    pub async fn authenticate(&self, token: &str) -> Result<Option<ClientSdr>, StoreError> {
        Ok(self.ctx.repository.client_sdr_by_token(token).await?)
    }

    async fn owned_prospect(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
    ) -> Result<Prospect, StoreError> {
        let prospect = self
            .ctx
            .repository
            .get_prospect(id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "prospect",
                id: id.0,
            })?;
        if prospect.client_sdr_id != sdr {
            return Err(StoreError::Forbidden(format!(
                "Prospect {} does not belong to SDR {}",
                id, sdr
            )));
        }
        Ok(prospect)
    }

    async fn owned_archetype(
        &self,
        sdr: ClientSdrId,
        id: ArchetypeId,
    ) -> Result<ClientArchetype, StoreError> {
        let archetype = self
            .ctx
            .repository
            .get_archetype(id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "archetype",
                id: id.0,
            })?;
        if archetype.client_sdr_id != sdr {
            return Err(StoreError::Forbidden(format!(
                "Archetype {} does not belong to SDR {}",
                id, sdr
            )));
        }
        Ok(archetype)
    }

    async fn owned_bump_framework(
        &self,
        sdr: ClientSdrId,
        id: BumpFrameworkId,
    ) -> Result<BumpFramework, StoreError> {
        let framework = self
            .ctx
            .repository
            .get_bump_framework(id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "bump_framework",
                id: id.0,
            })?;
        if framework.client_sdr_id != sdr {
            return Err(StoreError::Forbidden(format!(
                "Bump framework {} does not belong to SDR {}",
                id, sdr
            )));
        }
        Ok(framework)
    }

    // =========================================================================
    // Prospects
    // =========================================================================

    pub async fn create_prospect(
        &self,
        sdr: ClientSdrId,
        request: CreateProspect,
    ) -> Result<Prospect, StoreError> {
        if request.full_name.trim().is_empty() {
            return Err(StoreError::Validation(
                "Prospect name must not be empty".to_string(),
            ));
        }
        if let Some(archetype_id) = request.archetype_id {
            self.owned_archetype(sdr, archetype_id).await?;
        }
        let prospect = self
            .ctx
            .repository
            .create_prospect(&NewProspect {
                client_sdr_id: sdr,
                archetype_id: request.archetype_id,
                full_name: request.full_name,
                title: request.title,
                company: request.company,
            })
            .await?;
        info!("Created prospect {} for SDR {}", prospect.id, sdr);
        Ok(prospect)
    }

    pub async fn get_prospect(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
    ) -> Result<Prospect, StoreError> {
        self.owned_prospect(sdr, id).await
    }

    /// Attach an email record to a prospect.
    pub async fn create_email_record(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
        outreach_status: Option<ProspectEmailOutreachStatus>,
    ) -> Result<ProspectEmail, StoreError> {
        self.owned_prospect(sdr, id).await?;
        if self.ctx.repository.get_prospect_email(id).await?.is_some() {
            return Err(StoreError::Validation(format!(
                "Prospect {} already has an email record",
                id
            )));
        }
        Ok(self
            .ctx
            .repository
            .create_prospect_email(id, outreach_status)
            .await?)
    }

    /// Delete a prospect and everything hanging off it. Administrative
    /// cleanup path; no ownership check.
    pub async fn delete_prospect(&self, id: ProspectId) -> Result<(), StoreError> {
        let lock = self.prospect_lock(id).await;
        let _guard = lock.lock().await;

        if !self.ctx.repository.delete_prospect(id).await? {
            return Err(StoreError::NotFound {
                entity: "prospect",
                id: id.0,
            });
        }
        self.prospect_locks.write().await.remove(&id);
        info!("Deleted prospect {}", id);
        Ok(())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn commit_for(&self, effects: &[Effect], now: DateTime<Utc>) -> TransitionCommit {
        TransitionCommit {
            transition_id: Uuid::new_v4(),
            committed_at: now,
            outbox_effects: effects
                .iter()
                .filter(|e| e.should_persist())
                .cloned()
                .collect(),
            outbox_first_attempt_at: self.settings.outbox.first_attempt_at(now),
        }
    }

    /// Run the effects that skip the outbox, then dispatch the committed
    /// outbox rows. Failures stay on the rows for the retry loop.
    async fn run_effects(
        &self,
        effects: &[Effect],
        committed: &CommittedTransition,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let immediate: Vec<Effect> = effects
            .iter()
            .filter(|e| !e.should_persist())
            .cloned()
            .collect();
        execute_effects(&self.ctx, &immediate).await;
        dispatch_entries(&self.ctx, &self.settings.outbox, &committed.outbox, now).await
    }

    /// Move a prospect to a new LinkedIn status.
    pub async fn update_linkedin_status(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
        request: &TransitionRequest<ProspectStatus>,
    ) -> Result<AppliedTransition, StoreError> {
        let lock = self.prospect_lock(id).await;
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let prospect = self.owned_prospect(sdr, id).await?;
            let email_status = self
                .ctx
                .repository
                .get_prospect_email(id)
                .await?
                .and_then(|e| e.outreach_status);
            let now = Utc::now();
            let plan = plan_linkedin_transition(
                &prospect,
                email_status,
                request,
                now,
                &self.settings.planner,
            )?;
            let commit = self.commit_for(&plan.effects, now);

            match self
                .ctx
                .repository
                .commit_linkedin_transition(&plan, prospect.version, &commit)
                .await
            {
                Ok(committed) => {
                    let dispatch = self.run_effects(&plan.effects, &committed, now).await;
                    return Ok(AppliedTransition {
                        transition_id: commit.transition_id,
                        channel: OutreachChannel::Linkedin,
                        from_status: Some(plan.record.from_status.as_str()),
                        to_status: plan.record.to_status.as_str(),
                        prospect: committed.prospect,
                        email: None,
                        dispatch,
                    });
                }
                Err(RepositoryError::Conflict { .. }) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(
                        "Prospect {} changed concurrently, retrying transition (attempt {})",
                        id, attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Move a prospect to a new email status. The prospect must have an email
    /// record.
    pub async fn update_email_status(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
        request: &TransitionRequest<ProspectEmailOutreachStatus>,
    ) -> Result<AppliedTransition, StoreError> {
        let lock = self.prospect_lock(id).await;
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let prospect = self.owned_prospect(sdr, id).await?;
            let email = self.ctx.repository.get_prospect_email(id).await?;
            let now = Utc::now();
            let plan = plan_email_transition(
                &prospect,
                email.as_ref(),
                request,
                now,
                &self.settings.planner,
            )?;
            let commit = self.commit_for(&plan.effects, now);

            match self
                .ctx
                .repository
                .commit_email_transition(&plan, prospect.version, &commit)
                .await
            {
                Ok(committed) => {
                    let dispatch = self.run_effects(&plan.effects, &committed, now).await;
                    return Ok(AppliedTransition {
                        transition_id: commit.transition_id,
                        channel: OutreachChannel::Email,
                        from_status: plan.record.from_status.map(|s| s.as_str()),
                        to_status: plan.record.to_status.as_str(),
                        prospect: committed.prospect,
                        email: Some(plan.email),
                        dispatch,
                    });
                }
                Err(RepositoryError::Conflict { .. }) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(
                        "Prospect {} changed concurrently, retrying email transition (attempt {})",
                        id, attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Legal next statuses on both channels, for display.
    pub async fn valid_next_statuses(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
    ) -> Result<NextStatuses, StoreError> {
        let prospect = self.owned_prospect(sdr, id).await?;
        let email = self.ctx.repository.get_prospect_email(id).await?;

        Ok(NextStatuses {
            linkedin: valid_next_linkedin_statuses(prospect.status)
                .iter()
                .map(|s| StatusOption::from(*s))
                .collect(),
            email: email.map(|e| {
                valid_next_email_statuses(
                    e.outreach_status
                        .unwrap_or(ProspectEmailOutreachStatus::Unknown),
                )
                .iter()
                .map(|s| StatusOption::from(*s))
                .collect()
            }),
        })
    }

    pub async fn status_history(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
    ) -> Result<StatusHistory, StoreError> {
        self.owned_prospect(sdr, id).await?;
        Ok(self.ctx.repository.status_history(id).await?)
    }

    // =========================================================================
    // Non-status edits
    // =========================================================================

    /// Apply `edit` to the prospect's non-status fields with CAS retry.
    async fn edit_prospect<F>(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
        edit: F,
    ) -> Result<Prospect, StoreError>
    where
        F: Fn(&mut Prospect) -> Result<(), StoreError>,
    {
        let lock = self.prospect_lock(id).await;
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let prospect = self.owned_prospect(sdr, id).await?;
            let mut edited = prospect.clone();
            edit(&mut edited)?;
            match self
                .ctx
                .repository
                .update_prospect(&edited, prospect.version)
                .await
            {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::Conflict { .. }) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!("Prospect {} changed concurrently, retrying edit", id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Hide the prospect from outreach queues for `days` days.
    pub async fn send_to_purgatory(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
        days: i64,
        reason: HiddenReason,
    ) -> Result<Prospect, StoreError> {
        if days < 0 {
            return Err(StoreError::Validation(format!(
                "Purgatory length must be non-negative, got {} days",
                days
            )));
        }
        let now = Utc::now();
        self.edit_prospect(sdr, id, |p| {
            p.send_to_purgatory(now, days, reason)?;
            Ok(())
        })
        .await
    }

    pub async fn remove_from_purgatory(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
    ) -> Result<Prospect, StoreError> {
        self.edit_prospect(sdr, id, |p| {
            p.clear_purgatory();
            Ok(())
        })
        .await
    }

    /// Move the prospect to another persona of the same SDR, or to none.
    pub async fn reassign_archetype(
        &self,
        sdr: ClientSdrId,
        id: ProspectId,
        archetype_id: Option<ArchetypeId>,
    ) -> Result<Prospect, StoreError> {
        if let Some(archetype_id) = archetype_id {
            let archetype = self.owned_archetype(sdr, archetype_id).await?;
            if !archetype.active {
                return Err(StoreError::Validation(format!(
                    "Archetype {} is inactive",
                    archetype_id
                )));
            }
        }
        self.edit_prospect(sdr, id, |p| {
            p.archetype_id = archetype_id;
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Personas
    // =========================================================================

    pub async fn create_archetype(
        &self,
        sdr: ClientSdrId,
        name: &str,
    ) -> Result<ClientArchetype, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation(
                "Archetype name must not be empty".to_string(),
            ));
        }
        Ok(self.ctx.repository.create_archetype(sdr, name).await?)
    }

    /// Mark a persona inactive. `hard` also blocks the unsent messages of its
    /// prospects that have not been contacted yet.
    pub async fn deactivate_archetype(
        &self,
        sdr: ClientSdrId,
        id: ArchetypeId,
        hard: bool,
    ) -> Result<DeactivationOutcome, StoreError> {
        self.owned_archetype(sdr, id).await?;
        let outcome = self.ctx.repository.deactivate_archetype(id, hard).await?;
        info!(
            "Deactivated archetype {} (hard: {}): cleared {} prospects, blocked {} messages",
            id,
            hard,
            outcome.cleared_prospects.len(),
            outcome.blocked_messages.len()
        );
        Ok(outcome)
    }

    // =========================================================================
    // Bump frameworks
    // =========================================================================

    pub async fn create_bump_framework(
        &self,
        sdr: ClientSdrId,
        new: NewBumpFramework,
    ) -> Result<BumpFramework, StoreError> {
        validate_bump_framework(
            &new.title,
            new.overall_status,
            new.substatus,
            new.bump_delay_days,
        )?;
        if let Some(archetype_id) = new.archetype_id {
            self.owned_archetype(sdr, archetype_id).await?;
        }
        Ok(self.ctx.repository.create_bump_framework(sdr, &new).await?)
    }

    /// The SDR's frameworks matching `filter`. The SDR in `filter` is
    /// replaced by `sdr`.
    pub async fn list_bump_frameworks(
        &self,
        sdr: ClientSdrId,
        filter: BumpFrameworkFilter,
    ) -> Result<Vec<BumpFramework>, StoreError> {
        let filter = BumpFrameworkFilter {
            client_sdr_id: Some(sdr),
            ..filter
        };
        Ok(self.ctx.repository.list_bump_frameworks(&filter).await?)
    }

    pub async fn update_bump_framework(
        &self,
        sdr: ClientSdrId,
        id: BumpFrameworkId,
        update: &BumpFrameworkUpdate,
    ) -> Result<BumpFramework, StoreError> {
        let mut framework = self.owned_bump_framework(sdr, id).await?;
        update.apply(&mut framework);
        validate_bump_framework(
            &framework.title,
            framework.overall_status,
            framework.substatus,
            framework.bump_delay_days,
        )?;
        self.ctx.repository.update_bump_framework(&framework).await?;
        self.owned_bump_framework(sdr, id).await
    }

    pub async fn set_default_bump_framework(
        &self,
        sdr: ClientSdrId,
        id: BumpFrameworkId,
    ) -> Result<BumpFramework, StoreError> {
        self.owned_bump_framework(sdr, id).await?;
        Ok(self.ctx.repository.set_default_bump_framework(id).await?)
    }

    pub async fn set_bump_framework_active(
        &self,
        sdr: ClientSdrId,
        id: BumpFrameworkId,
        active: bool,
    ) -> Result<BumpFramework, StoreError> {
        self.owned_bump_framework(sdr, id).await?;
        Ok(self
            .ctx
            .repository
            .set_bump_framework_active(id, active)
            .await?)
    }

    /// The framework the prospect's next bump should use, if any.
    pub async fn select_bump_framework(
        &self,
        sdr: ClientSdrId,
        prospect_id: ProspectId,
    ) -> Result<Option<BumpFramework>, StoreError> {
        let prospect = self.owned_prospect(sdr, prospect_id).await?;
        let frameworks = self
            .list_bump_frameworks(
                sdr,
                BumpFrameworkFilter {
                    overall_status: Some(prospect.overall_status),
                    active: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        Ok(select_bump_framework(&frameworks, &prospect).cloned())
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    pub async fn pipeline_summary(&self, sdr: ClientSdrId) -> Result<PipelineSummary, StoreError> {
        let prospects = self.ctx.repository.list_prospects(sdr).await?;
        Ok(PipelineSummary::from_prospects(&prospects, Utc::now()))
    }
}
