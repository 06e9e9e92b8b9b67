//! In-memory implementation of `ProspectRepository`.
//!
//! All tables live behind a single `RwLock`, so every operation is atomic
//! the way a SQLite transaction is. State is lost on restart; used by tests
//! and by `DATABASE_URL=sqlite::memory:`-style throwaway setups.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    BlockOutcome, BumpFrameworkFilter, CommittedTransition, DeactivationOutcome, EmailSlot,
    OutboxEntry, OutboxStatus, ProspectRepository, RepositoryError, StatusHistory,
    TransitionCommit,
};
use sellscale_core::bump::{apply_default, BumpFramework, NewBumpFramework};
use sellscale_core::model::{
    ArchetypeId, BumpFrameworkId, ClientArchetype, ClientSdr, ClientSdrId, GeneratedMessage,
    GeneratedMessageStatus, GeneratedMessageType, MessageId, NewProspect, Prospect, ProspectEmail,
    ProspectEmailId, ProspectEmailStatusRecord, ProspectId, ProspectStatusRecord,
};
use sellscale_core::{
    EmailTransitionPlan, ProspectEmailOutreachStatus, ProspectOverallStatus, ProspectStatus,
    TransitionPlan,
};

#[derive(Debug, Default)]
struct Counters {
    sdr: i64,
    archetype: i64,
    prospect: i64,
    email: i64,
    message: i64,
    record: i64,
    email_record: i64,
    bump: i64,
    outbox: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default)]
struct Tables {
    sdrs: BTreeMap<ClientSdrId, ClientSdr>,
    archetypes: BTreeMap<ArchetypeId, ClientArchetype>,
    prospects: BTreeMap<ProspectId, Prospect>,
    emails: BTreeMap<ProspectId, ProspectEmail>,
    messages: BTreeMap<MessageId, GeneratedMessage>,
    linkedin_records: Vec<ProspectStatusRecord>,
    email_records: Vec<ProspectEmailStatusRecord>,
    bump_frameworks: BTreeMap<BumpFrameworkId, BumpFramework>,
    outbox: BTreeMap<i64, OutboxEntry>,
    ids: Counters,
}

/// Block `slot`'s message if unsent and clear the slot. A slot pointing at a
/// missing message is cleared as well.
fn block_slot(
    slot: &mut Option<MessageId>,
    messages: &mut BTreeMap<MessageId, GeneratedMessage>,
) -> Option<MessageId> {
    let id = (*slot)?;
    match messages.get_mut(&id) {
        Some(message) if message.message_status.is_blockable() => {
            message.message_status = GeneratedMessageStatus::Blocked;
            *slot = None;
            Some(id)
        }
        Some(_) => None,
        None => {
            *slot = None;
            None
        }
    }
}

impl Tables {
    fn prospect(&self, id: ProspectId) -> Result<&Prospect, RepositoryError> {
        self.prospects
            .get(&id)
            .ok_or(RepositoryError::not_found("prospect", id.0))
    }

    fn check_version(&self, id: ProspectId, expected: i64) -> Result<(), RepositoryError> {
        if self.prospect(id)?.version != expected {
            return Err(RepositoryError::Conflict { prospect_id: id });
        }
        Ok(())
    }

    fn block_linkedin(&mut self, id: ProspectId) -> Result<Vec<MessageId>, RepositoryError> {
        let prospect = self
            .prospects
            .get_mut(&id)
            .ok_or(RepositoryError::not_found("prospect", id.0))?;
        let before = prospect.approved_outreach_message_id;
        let blocked = block_slot(&mut prospect.approved_outreach_message_id, &mut self.messages);
        if prospect.approved_outreach_message_id != before {
            prospect.version += 1;
        }
        Ok(blocked.into_iter().collect())
    }

    fn block_email(&mut self, id: ProspectId) -> Result<Vec<MessageId>, RepositoryError> {
        self.prospect(id)?;
        let Some(email) = self.emails.get_mut(&id) else {
            return Ok(Vec::new());
        };
        let mut blocked = Vec::new();
        for slot in [
            &mut email.personalized_subject_line,
            &mut email.personalized_first_line,
            &mut email.personalized_body,
        ] {
            blocked.extend(block_slot(slot, &mut self.messages));
        }
        Ok(blocked)
    }

    fn write_outbox(
        &mut self,
        prospect_id: ProspectId,
        commit: &TransitionCommit,
    ) -> Vec<OutboxEntry> {
        let mut written = Vec::with_capacity(commit.outbox_effects.len());
        for effect in &commit.outbox_effects {
            let entry = OutboxEntry {
                id: next_id(&mut self.ids.outbox),
                transition_id: commit.transition_id,
                prospect_id,
                effect: effect.clone(),
                status: OutboxStatus::Pending,
                attempts: 0,
                last_error: None,
                next_attempt_at: commit.outbox_first_attempt_at,
                created_at: commit.committed_at,
            };
            self.outbox.insert(entry.id, entry.clone());
            written.push(entry);
        }
        written
    }

    fn store_prospect(&mut self, mut prospect: Prospect, expected_version: i64) -> Prospect {
        prospect.version = expected_version + 1;
        self.prospects.insert(prospect.id, prospect.clone());
        prospect
    }

    fn make_default(&mut self, id: BumpFrameworkId) {
        let mut all: Vec<BumpFramework> = self.bump_frameworks.values().cloned().collect();
        apply_default(&mut all, id);
        for framework in all {
            self.bump_frameworks.insert(framework.id, framework);
        }
    }

    fn outbox_entry_mut(&mut self, id: i64) -> Result<&mut OutboxEntry, RepositoryError> {
        self.outbox
            .get_mut(&id)
            .ok_or(RepositoryError::not_found("outbox entry", id))
    }
}

/// In-memory prospect repository.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProspectRepository for InMemoryRepository {
    async fn create_client_sdr(
        &self,
        name: &str,
        auth_token: &str,
    ) -> Result<ClientSdr, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.sdrs.values().any(|sdr| sdr.auth_token == auth_token) {
            return Err(RepositoryError::storage(
                "create_client_sdr",
                "auth token already in use",
            ));
        }
        let sdr = ClientSdr {
            id: ClientSdrId(next_id(&mut tables.ids.sdr)),
            name: name.to_string(),
            auth_token: auth_token.to_string(),
        };
        tables.sdrs.insert(sdr.id, sdr.clone());
        Ok(sdr)
    }

    async fn client_sdr_by_token(&self, token: &str) -> Result<Option<ClientSdr>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sdrs
            .values()
            .find(|sdr| sdr.auth_token == token)
            .cloned())
    }

    async fn create_archetype(
        &self,
        client_sdr_id: ClientSdrId,
        name: &str,
    ) -> Result<ClientArchetype, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.sdrs.contains_key(&client_sdr_id) {
            return Err(RepositoryError::not_found("client_sdr", client_sdr_id.0));
        }
        let archetype = ClientArchetype {
            id: ArchetypeId(next_id(&mut tables.ids.archetype)),
            client_sdr_id,
            name: name.to_string(),
            active: true,
        };
        tables.archetypes.insert(archetype.id, archetype.clone());
        Ok(archetype)
    }

    async fn get_archetype(
        &self,
        id: ArchetypeId,
    ) -> Result<Option<ClientArchetype>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.archetypes.get(&id).cloned())
    }

    async fn deactivate_archetype(
        &self,
        id: ArchetypeId,
        hard: bool,
    ) -> Result<DeactivationOutcome, RepositoryError> {
        let mut tables = self.tables.write().await;
        let archetype = tables
            .archetypes
            .get_mut(&id)
            .ok_or(RepositoryError::not_found("archetype", id.0))?;
        archetype.active = false;

        let mut outcome = DeactivationOutcome {
            archetype_id: Some(id),
            ..Default::default()
        };
        if !hard {
            return Ok(outcome);
        }

        let targets: Vec<ProspectId> = tables
            .prospects
            .values()
            .filter(|p| p.archetype_id == Some(id) && p.status.is_pre_outreach())
            .map(|p| p.id)
            .collect();
        for prospect_id in targets {
            let mut blocked = tables.block_linkedin(prospect_id)?;
            blocked.extend(tables.block_email(prospect_id)?);
            outcome.cleared_prospects.push(prospect_id);
            outcome.blocked_messages.extend(blocked);
        }
        Ok(outcome)
    }

    async fn create_prospect(&self, new: &NewProspect) -> Result<Prospect, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.sdrs.contains_key(&new.client_sdr_id) {
            return Err(RepositoryError::not_found("client_sdr", new.client_sdr_id.0));
        }
        if let Some(archetype_id) = new.archetype_id {
            if !tables.archetypes.contains_key(&archetype_id) {
                return Err(RepositoryError::not_found("archetype", archetype_id.0));
            }
        }
        let prospect = Prospect {
            id: ProspectId(next_id(&mut tables.ids.prospect)),
            client_sdr_id: new.client_sdr_id,
            archetype_id: new.archetype_id,
            full_name: new.full_name.clone(),
            title: new.title.clone(),
            company: new.company.clone(),
            status: ProspectStatus::Prospected,
            overall_status: ProspectOverallStatus::Prospected,
            approved_outreach_message_id: None,
            last_linkedin_message_at: None,
            last_email_message_at: None,
            times_bumped: 0,
            hidden_until: None,
            hidden_reason: None,
            version: 0,
        };
        tables.prospects.insert(prospect.id, prospect.clone());
        Ok(prospect)
    }

    async fn get_prospect(&self, id: ProspectId) -> Result<Option<Prospect>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.prospects.get(&id).cloned())
    }

    async fn list_prospects(
        &self,
        client_sdr_id: ClientSdrId,
    ) -> Result<Vec<Prospect>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .prospects
            .values()
            .filter(|p| p.client_sdr_id == client_sdr_id)
            .cloned()
            .collect())
    }

    async fn update_prospect(
        &self,
        prospect: &Prospect,
        expected_version: i64,
    ) -> Result<Prospect, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.check_version(prospect.id, expected_version)?;
        if let Some(archetype_id) = prospect.archetype_id {
            if !tables.archetypes.contains_key(&archetype_id) {
                return Err(RepositoryError::not_found("archetype", archetype_id.0));
            }
        }
        // Status columns only move through the transition commits
        let mut next = tables.prospect(prospect.id)?.clone();
        next.archetype_id = prospect.archetype_id;
        next.full_name = prospect.full_name.clone();
        next.title = prospect.title.clone();
        next.company = prospect.company.clone();
        next.hidden_until = prospect.hidden_until;
        next.hidden_reason = prospect.hidden_reason;
        Ok(tables.store_prospect(next, expected_version))
    }

    async fn delete_prospect(&self, id: ProspectId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.prospects.remove(&id).is_none() {
            return Ok(false);
        }
        tables.emails.remove(&id);
        tables.messages.retain(|_, m| m.prospect_id != id);
        tables.linkedin_records.retain(|r| r.prospect_id != id);
        tables.email_records.retain(|r| r.prospect_id != id);
        tables.outbox.retain(|_, e| e.prospect_id != id);
        Ok(true)
    }

    async fn commit_linkedin_transition(
        &self,
        plan: &TransitionPlan,
        expected_version: i64,
        commit: &TransitionCommit,
    ) -> Result<CommittedTransition, RepositoryError> {
        let mut tables = self.tables.write().await;
        let prospect_id = plan.prospect.id;
        tables.check_version(prospect_id, expected_version)?;

        let prospect = tables.store_prospect(plan.prospect.clone(), expected_version);
        let record = ProspectStatusRecord {
            id: next_id(&mut tables.ids.record),
            prospect_id,
            from_status: plan.record.from_status,
            to_status: plan.record.to_status,
            automated: plan.record.automated,
            created_at: commit.committed_at,
        };
        tables.linkedin_records.push(record);
        let outbox = tables.write_outbox(prospect_id, commit);

        Ok(CommittedTransition { prospect, outbox })
    }

    async fn commit_email_transition(
        &self,
        plan: &EmailTransitionPlan,
        expected_version: i64,
        commit: &TransitionCommit,
    ) -> Result<CommittedTransition, RepositoryError> {
        let mut tables = self.tables.write().await;
        let prospect_id = plan.prospect.id;
        tables.check_version(prospect_id, expected_version)?;
        let Some(email) = tables.emails.get_mut(&prospect_id) else {
            return Err(RepositoryError::not_found("prospect_email", prospect_id.0));
        };
        // Only the status is the planner's to write; message slots may have
        // been blocked since the plan was made.
        email.outreach_status = plan.email.outreach_status;

        let prospect = tables.store_prospect(plan.prospect.clone(), expected_version);
        let record = ProspectEmailStatusRecord {
            id: next_id(&mut tables.ids.email_record),
            prospect_id,
            from_status: plan.record.from_status,
            to_status: plan.record.to_status,
            automated: plan.record.automated,
            created_at: commit.committed_at,
        };
        tables.email_records.push(record);
        let outbox = tables.write_outbox(prospect_id, commit);

        Ok(CommittedTransition { prospect, outbox })
    }

    async fn status_history(&self, id: ProspectId) -> Result<StatusHistory, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(StatusHistory {
            linkedin: tables
                .linkedin_records
                .iter()
                .filter(|r| r.prospect_id == id)
                .cloned()
                .collect(),
            email: tables
                .email_records
                .iter()
                .filter(|r| r.prospect_id == id)
                .cloned()
                .collect(),
        })
    }

    async fn create_prospect_email(
        &self,
        prospect_id: ProspectId,
        outreach_status: Option<ProspectEmailOutreachStatus>,
    ) -> Result<ProspectEmail, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.prospect(prospect_id)?;
        if tables.emails.contains_key(&prospect_id) {
            return Err(RepositoryError::storage(
                "create_prospect_email",
                format!("prospect {} already has an email record", prospect_id),
            ));
        }
        let email = ProspectEmail {
            id: ProspectEmailId(next_id(&mut tables.ids.email)),
            prospect_id,
            outreach_status,
            personalized_subject_line: None,
            personalized_first_line: None,
            personalized_body: None,
        };
        tables.emails.insert(prospect_id, email.clone());
        Ok(email)
    }

    async fn get_prospect_email(
        &self,
        prospect_id: ProspectId,
    ) -> Result<Option<ProspectEmail>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.emails.get(&prospect_id).cloned())
    }

    async fn create_generated_message(
        &self,
        prospect_id: ProspectId,
        message_type: GeneratedMessageType,
        message_status: GeneratedMessageStatus,
        completion: &str,
    ) -> Result<GeneratedMessage, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.prospect(prospect_id)?;
        let message = GeneratedMessage {
            id: MessageId(next_id(&mut tables.ids.message)),
            prospect_id,
            message_type,
            message_status,
            completion: completion.to_string(),
        };
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_generated_message(
        &self,
        id: MessageId,
    ) -> Result<Option<GeneratedMessage>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.messages.get(&id).cloned())
    }

    async fn approve_linkedin_message(
        &self,
        prospect_id: ProspectId,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.messages.contains_key(&message_id) {
            return Err(RepositoryError::not_found("generated_message", message_id.0));
        }
        let prospect = tables
            .prospects
            .get_mut(&prospect_id)
            .ok_or(RepositoryError::not_found("prospect", prospect_id.0))?;
        prospect.approved_outreach_message_id = Some(message_id);
        prospect.version += 1;
        Ok(())
    }

    async fn set_email_slot(
        &self,
        prospect_id: ProspectId,
        slot: EmailSlot,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.messages.contains_key(&message_id) {
            return Err(RepositoryError::not_found("generated_message", message_id.0));
        }
        let email = tables
            .emails
            .get_mut(&prospect_id)
            .ok_or(RepositoryError::not_found("prospect_email", prospect_id.0))?;
        let target = match slot {
            EmailSlot::SubjectLine => &mut email.personalized_subject_line,
            EmailSlot::FirstLine => &mut email.personalized_first_line,
            EmailSlot::Body => &mut email.personalized_body,
        };
        *target = Some(message_id);
        Ok(())
    }

    async fn block_linkedin_message(
        &self,
        prospect_id: ProspectId,
    ) -> Result<BlockOutcome, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(BlockOutcome {
            blocked: tables.block_linkedin(prospect_id)?,
        })
    }

    async fn block_email_messages(
        &self,
        prospect_id: ProspectId,
    ) -> Result<BlockOutcome, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(BlockOutcome {
            blocked: tables.block_email(prospect_id)?,
        })
    }

    async fn create_bump_framework(
        &self,
        client_sdr_id: ClientSdrId,
        new: &NewBumpFramework,
    ) -> Result<BumpFramework, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.sdrs.contains_key(&client_sdr_id) {
            return Err(RepositoryError::not_found("client_sdr", client_sdr_id.0));
        }
        let framework = BumpFramework {
            id: BumpFrameworkId(next_id(&mut tables.ids.bump)),
            client_sdr_id,
            archetype_id: new.archetype_id,
            title: new.title.clone(),
            description: new.description.clone(),
            overall_status: new.overall_status,
            substatus: new.substatus,
            default: new.default,
            active: true,
            bump_delay_days: new.bump_delay_days,
        };
        tables.bump_frameworks.insert(framework.id, framework.clone());
        if framework.default {
            tables.make_default(framework.id);
        }
        Ok(framework)
    }

    async fn get_bump_framework(
        &self,
        id: BumpFrameworkId,
    ) -> Result<Option<BumpFramework>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.bump_frameworks.get(&id).cloned())
    }

    async fn list_bump_frameworks(
        &self,
        filter: &BumpFrameworkFilter,
    ) -> Result<Vec<BumpFramework>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .bump_frameworks
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect())
    }

    async fn update_bump_framework(
        &self,
        framework: &BumpFramework,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .bump_frameworks
            .get_mut(&framework.id)
            .ok_or(RepositoryError::not_found("bump_framework", framework.id.0))?;
        stored.title = framework.title.clone();
        stored.description = framework.description.clone();
        stored.overall_status = framework.overall_status;
        stored.substatus = framework.substatus;
        stored.bump_delay_days = framework.bump_delay_days;
        if stored.default {
            tables.make_default(framework.id);
        }
        Ok(())
    }

    async fn set_default_bump_framework(
        &self,
        id: BumpFrameworkId,
    ) -> Result<BumpFramework, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.bump_frameworks.contains_key(&id) {
            return Err(RepositoryError::not_found("bump_framework", id.0));
        }
        tables.make_default(id);
        tables
            .bump_frameworks
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::not_found("bump_framework", id.0))
    }

    async fn set_bump_framework_active(
        &self,
        id: BumpFrameworkId,
        active: bool,
    ) -> Result<BumpFramework, RepositoryError> {
        let mut tables = self.tables.write().await;
        let framework = tables
            .bump_frameworks
            .get_mut(&id)
            .ok_or(RepositoryError::not_found("bump_framework", id.0))?;
        framework.active = active;
        Ok(framework.clone())
    }

    async fn due_outbox_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut due: Vec<OutboxEntry> = tables
            .outbox
            .values()
            .filter(|e| {
                matches!(e.status, OutboxStatus::Pending | OutboxStatus::Failed)
                    && e.next_attempt_at <= now
            })
            .cloned()
            .collect();
        due.sort_by_key(|e| (e.next_attempt_at, e.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn list_outbox(
        &self,
        status: Option<OutboxStatus>,
    ) -> Result<Vec<OutboxEntry>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .outbox
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect())
    }

    async fn mark_outbox_delivered(&self, id: i64) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let entry = tables.outbox_entry_mut(id)?;
        entry.status = OutboxStatus::Delivered;
        entry.attempts += 1;
        entry.last_error = None;
        Ok(())
    }

    async fn mark_outbox_failed(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let entry = tables.outbox_entry_mut(id)?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        match next_attempt_at {
            Some(at) => {
                entry.status = OutboxStatus::Failed;
                entry.next_attempt_at = at;
            }
            None => entry.status = OutboxStatus::Dead,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sellscale_core::{PlannerSettings, TransitionRequest};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn commit() -> TransitionCommit {
        TransitionCommit {
            transition_id: Uuid::new_v4(),
            committed_at: now(),
            outbox_effects: Vec::new(),
            outbox_first_attempt_at: now(),
        }
    }

    async fn seeded() -> (InMemoryRepository, ClientSdr, Prospect) {
        let repo = InMemoryRepository::new();
        let sdr = repo.create_client_sdr("Sam", "token-1").await.unwrap();
        let prospect = repo
            .create_prospect(&NewProspect {
                client_sdr_id: sdr.id,
                archetype_id: None,
                full_name: "Ada".to_string(),
                title: None,
                company: None,
            })
            .await
            .unwrap();
        (repo, sdr, prospect)
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_version() {
        let (repo, _, prospect) = seeded().await;
        let plan = sellscale_core::plan_linkedin_transition(
            &prospect,
            None,
            &TransitionRequest::to(ProspectStatus::SentOutreach),
            now(),
            &PlannerSettings::default(),
        )
        .unwrap();

        let committed = repo
            .commit_linkedin_transition(&plan, prospect.version, &commit())
            .await
            .unwrap();
        assert_eq!(committed.prospect.version, prospect.version + 1);

        let err = repo
            .commit_linkedin_transition(&plan, prospect.version, &commit())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Conflict {
                prospect_id: prospect.id
            }
        );
        assert_eq!(repo.status_history(prospect.id).await.unwrap().linkedin.len(), 1);
    }

    #[tokio::test]
    async fn test_email_commit_keeps_slots_blocked_after_planning() {
        let (repo, _, prospect) = seeded().await;
        let email = repo.create_prospect_email(prospect.id, None).await.unwrap();
        let body = repo
            .create_generated_message(
                prospect.id,
                GeneratedMessageType::Email,
                GeneratedMessageStatus::Draft,
                "Body",
            )
            .await
            .unwrap();
        repo.set_email_slot(prospect.id, EmailSlot::Body, body.id)
            .await
            .unwrap();
        let email = repo
            .get_prospect_email(email.prospect_id)
            .await
            .unwrap()
            .unwrap();
        let prospect = repo.get_prospect(prospect.id).await.unwrap().unwrap();

        let plan = sellscale_core::plan_email_transition(
            &prospect,
            Some(&email),
            &TransitionRequest::to(ProspectEmailOutreachStatus::SentOutreach),
            now(),
            &PlannerSettings::default(),
        )
        .unwrap();

        // A deactivation lands between planning and committing
        let outcome = repo.block_email_messages(prospect.id).await.unwrap();
        assert_eq!(outcome.blocked, vec![body.id]);

        repo.commit_email_transition(&plan, prospect.version, &commit())
            .await
            .unwrap();
        let stored = repo.get_prospect_email(prospect.id).await.unwrap().unwrap();
        assert_eq!(
            stored.outreach_status,
            Some(ProspectEmailOutreachStatus::SentOutreach)
        );
        assert_eq!(stored.personalized_body, None);
    }

    #[tokio::test]
    async fn test_block_leaves_sent_message_alone() {
        let (repo, _, prospect) = seeded().await;
        let sent = repo
            .create_generated_message(
                prospect.id,
                GeneratedMessageType::Linkedin,
                GeneratedMessageStatus::Sent,
                "hi",
            )
            .await
            .unwrap();
        repo.approve_linkedin_message(prospect.id, sent.id)
            .await
            .unwrap();

        let outcome = repo.block_linkedin_message(prospect.id).await.unwrap();
        assert!(outcome.blocked.is_empty());
        let stored = repo.get_prospect(prospect.id).await.unwrap().unwrap();
        assert_eq!(stored.approved_outreach_message_id, Some(sent.id));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (repo, _, prospect) = seeded().await;
        repo.create_prospect_email(prospect.id, None).await.unwrap();
        let message = repo
            .create_generated_message(
                prospect.id,
                GeneratedMessageType::Email,
                GeneratedMessageStatus::Draft,
                "subject",
            )
            .await
            .unwrap();

        assert!(repo.delete_prospect(prospect.id).await.unwrap());
        assert!(repo.get_prospect(prospect.id).await.unwrap().is_none());
        assert!(repo.get_prospect_email(prospect.id).await.unwrap().is_none());
        assert!(repo
            .get_generated_message(message.id)
            .await
            .unwrap()
            .is_none());
        assert!(!repo.delete_prospect(prospect.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected() {
        let (repo, _, _) = seeded().await;
        assert!(repo.create_client_sdr("Other", "token-1").await.is_err());
    }
}
