//! Tests for SQLite repository implementation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::params;
use uuid::Uuid;

use super::super::{
    BumpFrameworkFilter, EmailSlot, OutboxStatus, ProspectRepository, RepositoryError,
    TransitionCommit,
};
use super::{SqliteRepository, CURRENT_SCHEMA_VERSION};
use sellscale_core::bump::NewBumpFramework;
use sellscale_core::model::{
    ArchetypeId, ClientSdr, GeneratedMessageStatus, GeneratedMessageType, HiddenReason,
    NewProspect, Prospect,
};
use sellscale_core::{
    plan_email_transition, plan_linkedin_transition, Effect, PlannerSettings,
    ProspectEmailOutreachStatus, ProspectOverallStatus, ProspectStatus, TransitionRequest,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap()
}

fn commit_with(effects: Vec<Effect>) -> TransitionCommit {
    TransitionCommit {
        transition_id: Uuid::new_v4(),
        committed_at: now(),
        outbox_effects: effects,
        outbox_first_attempt_at: now() + Duration::seconds(30),
    }
}

fn new_prospect(sdr: &ClientSdr, archetype_id: Option<ArchetypeId>, name: &str) -> NewProspect {
    NewProspect {
        client_sdr_id: sdr.id,
        archetype_id,
        full_name: name.to_string(),
        title: Some("VP Sales".to_string()),
        company: Some("Acme".to_string()),
    }
}

async fn seeded(repo: &SqliteRepository) -> (ClientSdr, Prospect) {
    let sdr = repo.create_client_sdr("Sam", "token-sam").await.unwrap();
    let prospect = repo
        .create_prospect(&new_prospect(&sdr, None, "Ada Lovelace"))
        .await
        .unwrap();
    (sdr, prospect)
}

async fn move_linkedin(
    repo: &SqliteRepository,
    prospect: &Prospect,
    to: ProspectStatus,
) -> Prospect {
    let plan = plan_linkedin_transition(
        prospect,
        None,
        &TransitionRequest::to(to),
        now(),
        &PlannerSettings::default(),
    )
    .unwrap();
    let effects = plan
        .effects
        .iter()
        .filter(|e| e.should_persist())
        .cloned()
        .collect();
    repo.commit_linkedin_transition(&plan, prospect.version, &commit_with(effects))
        .await
        .unwrap()
        .prospect
}

#[tokio::test]
async fn test_get_returns_none_for_missing() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let result = repo
        .get_prospect(sellscale_core::ProspectId(42))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_create_prospect_starts_prospected() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;

    assert_eq!(prospect.status, ProspectStatus::Prospected);
    assert_eq!(prospect.overall_status, ProspectOverallStatus::Prospected);
    assert_eq!(prospect.version, 0);
    assert_eq!(prospect.times_bumped, 0);
    assert_eq!(prospect.title.as_deref(), Some("VP Sales"));
}

#[tokio::test]
async fn test_client_sdr_lookup_by_token() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (sdr, _) = seeded(&repo).await;

    let found = repo.client_sdr_by_token("token-sam").await.unwrap();
    assert_eq!(found.map(|s| s.id), Some(sdr.id));
    assert!(repo.client_sdr_by_token("nope").await.unwrap().is_none());
    assert!(repo.create_client_sdr("Dup", "token-sam").await.is_err());
}

#[tokio::test]
async fn test_commit_writes_status_record_and_bumps_version() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;

    let sent = move_linkedin(&repo, &prospect, ProspectStatus::SentOutreach).await;
    assert_eq!(sent.status, ProspectStatus::SentOutreach);
    assert_eq!(sent.overall_status, ProspectOverallStatus::SentOutreach);
    assert_eq!(sent.last_linkedin_message_at, Some(now()));
    assert_eq!(sent.version, 1);

    let history = repo.status_history(prospect.id).await.unwrap();
    assert_eq!(history.linkedin.len(), 1);
    assert_eq!(history.linkedin[0].from_status, ProspectStatus::Prospected);
    assert_eq!(history.linkedin[0].to_status, ProspectStatus::SentOutreach);
    assert_eq!(history.linkedin[0].created_at, now());
    assert!(history.email.is_empty());
}

#[tokio::test]
async fn test_stale_commit_is_a_conflict_and_writes_nothing() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    move_linkedin(&repo, &prospect, ProspectStatus::SentOutreach).await;

    let plan = plan_linkedin_transition(
        &prospect,
        None,
        &TransitionRequest::to(ProspectStatus::NotQualified),
        now(),
        &PlannerSettings::default(),
    )
    .unwrap();
    let err = repo
        .commit_linkedin_transition(&plan, prospect.version, &commit_with(Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RepositoryError::Conflict {
            prospect_id: prospect.id
        }
    );

    let stored = repo.get_prospect(prospect.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProspectStatus::SentOutreach);
    assert_eq!(repo.status_history(prospect.id).await.unwrap().linkedin.len(), 1);
}

#[tokio::test]
async fn test_commit_for_missing_prospect_is_not_found() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    let plan = plan_linkedin_transition(
        &prospect,
        None,
        &TransitionRequest::to(ProspectStatus::SentOutreach),
        now(),
        &PlannerSettings::default(),
    )
    .unwrap();
    repo.delete_prospect(prospect.id).await.unwrap();

    let err = repo
        .commit_linkedin_transition(&plan, prospect.version, &commit_with(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn test_commit_writes_outbox_rows() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    let prospect = move_linkedin(&repo, &prospect, ProspectStatus::SentOutreach).await;
    move_linkedin(&repo, &prospect, ProspectStatus::Accepted).await;

    let pending = repo.list_outbox(Some(OutboxStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].effect.kind(), "notify");
    assert_eq!(pending[0].attempts, 0);
    assert_eq!(pending[0].next_attempt_at, now() + Duration::seconds(30));

    // Not due before the grace period ends
    assert!(repo.due_outbox_entries(now(), 10).await.unwrap().is_empty());
    let due = repo
        .due_outbox_entries(now() + Duration::minutes(1), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, pending[0].id);
}

#[tokio::test]
async fn test_outbox_failure_then_delivery() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    let prospect = move_linkedin(&repo, &prospect, ProspectStatus::SentOutreach).await;
    move_linkedin(&repo, &prospect, ProspectStatus::Accepted).await;
    let entry = repo.list_outbox(None).await.unwrap().remove(0);

    let retry_at = now() + Duration::minutes(5);
    repo.mark_outbox_failed(entry.id, "slack down", Some(retry_at))
        .await
        .unwrap();
    let failed = repo.list_outbox(Some(OutboxStatus::Failed)).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 1);
    assert_eq!(failed[0].last_error.as_deref(), Some("slack down"));
    assert_eq!(failed[0].next_attempt_at, retry_at);

    repo.mark_outbox_delivered(entry.id).await.unwrap();
    let delivered = repo.list_outbox(Some(OutboxStatus::Delivered)).await.unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].attempts, 2);
    assert!(delivered[0].last_error.is_none());
    assert!(repo
        .due_outbox_entries(now() + Duration::days(1), 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_outbox_dead_letter() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    let prospect = move_linkedin(&repo, &prospect, ProspectStatus::SentOutreach).await;
    move_linkedin(&repo, &prospect, ProspectStatus::Accepted).await;
    let entry = repo.list_outbox(None).await.unwrap().remove(0);

    repo.mark_outbox_failed(entry.id, "gone", None).await.unwrap();
    let dead = repo.list_outbox(Some(OutboxStatus::Dead)).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert!(repo
        .due_outbox_entries(now() + Duration::days(1), 10)
        .await
        .unwrap()
        .is_empty());

    let err = repo.mark_outbox_delivered(9999).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn test_email_commit_updates_record_and_overall() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    let email = repo.create_prospect_email(prospect.id, None).await.unwrap();

    let plan = plan_email_transition(
        &prospect,
        Some(&email),
        &TransitionRequest::to(ProspectEmailOutreachStatus::SentOutreach),
        now(),
        &PlannerSettings::default(),
    )
    .unwrap();
    let committed = repo
        .commit_email_transition(&plan, prospect.version, &commit_with(Vec::new()))
        .await
        .unwrap();
    assert_eq!(
        committed.prospect.overall_status,
        ProspectOverallStatus::SentOutreach
    );
    assert_eq!(committed.prospect.last_email_message_at, Some(now()));

    let stored = repo.get_prospect_email(prospect.id).await.unwrap().unwrap();
    assert_eq!(
        stored.outreach_status,
        Some(ProspectEmailOutreachStatus::SentOutreach)
    );
    let history = repo.status_history(prospect.id).await.unwrap();
    assert_eq!(history.email.len(), 1);
    assert_eq!(history.email[0].from_status, None);
}

#[tokio::test]
async fn test_email_record_must_exist_for_a_prospect() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let err = repo
        .create_prospect_email(sellscale_core::ProspectId(77), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));

    let (_, prospect) = seeded(&repo).await;
    repo.create_prospect_email(prospect.id, None).await.unwrap();
    assert!(repo.create_prospect_email(prospect.id, None).await.is_err());
}

#[tokio::test]
async fn test_block_linkedin_message_blocks_unsent_and_clears_pointer() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    let message = repo
        .create_generated_message(
            prospect.id,
            GeneratedMessageType::Linkedin,
            GeneratedMessageStatus::QueuedForOutreach,
            "Hi Ada",
        )
        .await
        .unwrap();
    repo.approve_linkedin_message(prospect.id, message.id)
        .await
        .unwrap();

    let outcome = repo.block_linkedin_message(prospect.id).await.unwrap();
    assert_eq!(outcome.blocked, vec![message.id]);

    let stored = repo.get_prospect(prospect.id).await.unwrap().unwrap();
    assert!(stored.approved_outreach_message_id.is_none());
    let message = repo.get_generated_message(message.id).await.unwrap().unwrap();
    assert_eq!(message.message_status, GeneratedMessageStatus::Blocked);

    // Idempotent
    let again = repo.block_linkedin_message(prospect.id).await.unwrap();
    assert!(again.blocked.is_empty());
}

#[tokio::test]
async fn test_block_linkedin_leaves_sent_message() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    let message = repo
        .create_generated_message(
            prospect.id,
            GeneratedMessageType::Linkedin,
            GeneratedMessageStatus::Sent,
            "Hi Ada",
        )
        .await
        .unwrap();
    repo.approve_linkedin_message(prospect.id, message.id)
        .await
        .unwrap();

    let outcome = repo.block_linkedin_message(prospect.id).await.unwrap();
    assert!(outcome.blocked.is_empty());
    let stored = repo.get_prospect(prospect.id).await.unwrap().unwrap();
    assert_eq!(stored.approved_outreach_message_id, Some(message.id));
}

#[tokio::test]
async fn test_block_email_messages_clears_unsent_slots() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    repo.create_prospect_email(prospect.id, None).await.unwrap();

    let subject = repo
        .create_generated_message(
            prospect.id,
            GeneratedMessageType::Email,
            GeneratedMessageStatus::Draft,
            "Quick question",
        )
        .await
        .unwrap();
    let body = repo
        .create_generated_message(
            prospect.id,
            GeneratedMessageType::Email,
            GeneratedMessageStatus::Sent,
            "Body",
        )
        .await
        .unwrap();
    repo.set_email_slot(prospect.id, EmailSlot::SubjectLine, subject.id)
        .await
        .unwrap();
    repo.set_email_slot(prospect.id, EmailSlot::Body, body.id)
        .await
        .unwrap();

    let outcome = repo.block_email_messages(prospect.id).await.unwrap();
    assert_eq!(outcome.blocked, vec![subject.id]);

    let email = repo.get_prospect_email(prospect.id).await.unwrap().unwrap();
    assert!(email.personalized_subject_line.is_none());
    assert_eq!(email.personalized_body, Some(body.id));
}

#[tokio::test]
async fn test_email_commit_keeps_slots_blocked_after_planning() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    repo.create_prospect_email(prospect.id, None).await.unwrap();
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
    let email = repo.get_prospect_email(prospect.id).await.unwrap().unwrap();
    let prospect = repo.get_prospect(prospect.id).await.unwrap().unwrap();

    let plan = plan_email_transition(
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

    repo.commit_email_transition(&plan, prospect.version, &commit_with(Vec::new()))
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
async fn test_block_email_without_record_is_noop() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    let outcome = repo.block_email_messages(prospect.id).await.unwrap();
    assert!(outcome.blocked.is_empty());
}

#[tokio::test]
async fn test_hard_deactivation_clears_only_pre_outreach_prospects() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let sdr = repo.create_client_sdr("Sam", "token-sam").await.unwrap();
    let archetype = repo.create_archetype(sdr.id, "CFOs").await.unwrap();

    let queued = repo
        .create_prospect(&new_prospect(&sdr, Some(archetype.id), "Queued"))
        .await
        .unwrap();
    let contacted = repo
        .create_prospect(&new_prospect(&sdr, Some(archetype.id), "Contacted"))
        .await
        .unwrap();
    let contacted = move_linkedin(&repo, &contacted, ProspectStatus::SentOutreach).await;

    let mut messages = Vec::new();
    for prospect in [&queued, &contacted] {
        let message = repo
            .create_generated_message(
                prospect.id,
                GeneratedMessageType::Linkedin,
                GeneratedMessageStatus::QueuedForOutreach,
                "Hello",
            )
            .await
            .unwrap();
        repo.approve_linkedin_message(prospect.id, message.id)
            .await
            .unwrap();
        messages.push(message.id);
    }

    let outcome = repo.deactivate_archetype(archetype.id, true).await.unwrap();
    assert_eq!(outcome.cleared_prospects, vec![queued.id]);
    assert_eq!(outcome.blocked_messages, vec![messages[0]]);

    let archetype = repo.get_archetype(archetype.id).await.unwrap().unwrap();
    assert!(!archetype.active);
    let contacted = repo.get_prospect(contacted.id).await.unwrap().unwrap();
    assert_eq!(contacted.approved_outreach_message_id, Some(messages[1]));
}

#[tokio::test]
async fn test_soft_deactivation_only_flips_flag() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let sdr = repo.create_client_sdr("Sam", "token-sam").await.unwrap();
    let archetype = repo.create_archetype(sdr.id, "CFOs").await.unwrap();
    repo.create_prospect(&new_prospect(&sdr, Some(archetype.id), "Queued"))
        .await
        .unwrap();

    let outcome = repo.deactivate_archetype(archetype.id, false).await.unwrap();
    assert!(outcome.cleared_prospects.is_empty());
    assert!(!repo.get_archetype(archetype.id).await.unwrap().unwrap().active);

    let err = repo
        .deactivate_archetype(ArchetypeId(999), false)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn test_update_prospect_writes_purgatory_not_status() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;

    let mut edited = prospect.clone();
    edited.send_to_purgatory(now(), 3, HiddenReason::Manual)
        .unwrap();
    edited.status = ProspectStatus::DemoWon;
    let stored = repo.update_prospect(&edited, prospect.version).await.unwrap();

    assert_eq!(stored.status, ProspectStatus::Prospected);
    assert_eq!(stored.hidden_until, Some(now() + Duration::days(3)));
    assert_eq!(stored.hidden_reason, Some(HiddenReason::Manual));
    assert_eq!(stored.version, prospect.version + 1);

    let err = repo
        .update_prospect(&edited, prospect.version)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));
}

#[tokio::test]
async fn test_delete_cascades() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    repo.create_prospect_email(prospect.id, None).await.unwrap();
    let message = repo
        .create_generated_message(
            prospect.id,
            GeneratedMessageType::Email,
            GeneratedMessageStatus::Draft,
            "Hi",
        )
        .await
        .unwrap();
    let sent = move_linkedin(&repo, &prospect, ProspectStatus::SentOutreach).await;
    move_linkedin(&repo, &sent, ProspectStatus::Accepted).await;

    assert!(repo.delete_prospect(prospect.id).await.unwrap());
    assert!(repo.get_prospect_email(prospect.id).await.unwrap().is_none());
    assert!(repo.get_generated_message(message.id).await.unwrap().is_none());
    assert!(repo.status_history(prospect.id).await.unwrap().linkedin.is_empty());
    assert!(repo.list_outbox(None).await.unwrap().is_empty());
    assert!(!repo.delete_prospect(prospect.id).await.unwrap());
}

#[tokio::test]
async fn test_list_prospects_filters_by_sdr() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (sdr, _) = seeded(&repo).await;
    let other = repo.create_client_sdr("Other", "token-other").await.unwrap();
    repo.create_prospect(&new_prospect(&other, None, "Grace"))
        .await
        .unwrap();

    let mine = repo.list_prospects(sdr.id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].full_name, "Ada Lovelace");
}

// =========================================================================
// Bump frameworks
// =========================================================================

fn framework(title: &str, default: bool) -> NewBumpFramework {
    NewBumpFramework {
        archetype_id: None,
        title: title.to_string(),
        description: String::new(),
        overall_status: ProspectOverallStatus::Accepted,
        substatus: None,
        default,
        bump_delay_days: 2,
    }
}

#[tokio::test]
async fn test_new_default_framework_unsets_previous_default() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (sdr, _) = seeded(&repo).await;

    let first = repo
        .create_bump_framework(sdr.id, &framework("First", true))
        .await
        .unwrap();
    let second = repo
        .create_bump_framework(sdr.id, &framework("Second", true))
        .await
        .unwrap();
    assert!(second.default);

    let first = repo.get_bump_framework(first.id).await.unwrap().unwrap();
    assert!(!first.default);

    let restored = repo.set_default_bump_framework(first.id).await.unwrap();
    assert!(restored.default);
    let second = repo.get_bump_framework(second.id).await.unwrap().unwrap();
    assert!(!second.default);
}

#[tokio::test]
async fn test_defaults_are_scoped_to_substatus_group() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (sdr, _) = seeded(&repo).await;

    let general = repo
        .create_bump_framework(sdr.id, &framework("General", true))
        .await
        .unwrap();
    let mut scheduling = framework("Scheduling", true);
    scheduling.overall_status = ProspectOverallStatus::ActiveConvo;
    scheduling.substatus = Some(ProspectStatus::ActiveConvoScheduling);
    repo.create_bump_framework(sdr.id, &scheduling).await.unwrap();

    let general = repo.get_bump_framework(general.id).await.unwrap().unwrap();
    assert!(general.default);
}

#[tokio::test]
async fn test_list_bump_frameworks_filter() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (sdr, _) = seeded(&repo).await;
    let a = repo
        .create_bump_framework(sdr.id, &framework("A", false))
        .await
        .unwrap();
    let mut b = framework("B", false);
    b.overall_status = ProspectOverallStatus::Bumped;
    repo.create_bump_framework(sdr.id, &b).await.unwrap();
    repo.set_bump_framework_active(a.id, false).await.unwrap();

    let all = repo
        .list_bump_frameworks(&BumpFrameworkFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let active = repo
        .list_bump_frameworks(&BumpFrameworkFilter {
            active: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "B");

    let accepted = repo
        .list_bump_frameworks(&BumpFrameworkFilter {
            overall_status: Some(ProspectOverallStatus::Accepted),
            client_sdr_id: Some(sdr.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id, a.id);
}

#[tokio::test]
async fn test_update_bump_framework_moves_default_into_new_group() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (sdr, _) = seeded(&repo).await;
    let mut bumped = framework("Bumped default", true);
    bumped.overall_status = ProspectOverallStatus::Bumped;
    let bumped = repo.create_bump_framework(sdr.id, &bumped).await.unwrap();
    let moving = repo
        .create_bump_framework(sdr.id, &framework("Moving", true))
        .await
        .unwrap();

    let mut edited = moving.clone();
    edited.overall_status = ProspectOverallStatus::Bumped;
    repo.update_bump_framework(&edited).await.unwrap();

    let bumped = repo.get_bump_framework(bumped.id).await.unwrap().unwrap();
    assert!(!bumped.default);
    let moving = repo.get_bump_framework(moving.id).await.unwrap().unwrap();
    assert!(moving.default);
    assert_eq!(moving.overall_status, ProspectOverallStatus::Bumped);
}

// =========================================================================
// On-disk persistence tests
// =========================================================================

/// Write a transition, close the database, reopen, and read it back.
#[tokio::test]
async fn test_on_disk_persistence_basic() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let prospect_id = {
        let repo = SqliteRepository::new(&db_path).unwrap();
        let (_, prospect) = seeded(&repo).await;
        move_linkedin(&repo, &prospect, ProspectStatus::SentOutreach).await;
        prospect.id
    };

    {
        let repo = SqliteRepository::new(&db_path).unwrap();
        let stored = repo.get_prospect(prospect_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProspectStatus::SentOutreach);
        assert_eq!(stored.version, 1);
        assert_eq!(
            repo.status_history(prospect_id).await.unwrap().linkedin.len(),
            1
        );
    }
}

#[tokio::test]
async fn test_creates_parent_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("deeply").join("test.db");
    assert!(!db_path.parent().unwrap().exists());

    let repo = SqliteRepository::new(&db_path).unwrap();
    seeded(&repo).await;
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_schema_version_persisted() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let _repo = SqliteRepository::new(&db_path).unwrap();
    }

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let version: i64 = conn
        .query_row(
            "SELECT version FROM schema_version WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_newer_schema_version_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .unwrap();
        conn.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION + 1],
        )
        .unwrap();
    }

    assert!(SqliteRepository::new(&db_path).is_err());
}

/// Prospects written before optimistic concurrency existed start at
/// version 0 after migrating.
#[tokio::test]
async fn test_v2_to_v3_migration_adds_version_column() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            INSERT INTO schema_version (id, version) VALUES (1, 2);

            CREATE TABLE client_sdr (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                auth_token TEXT NOT NULL UNIQUE
            );
            INSERT INTO client_sdr (id, name, auth_token) VALUES (1, 'Sam', 'token');

            CREATE TABLE prospect (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_sdr_id INTEGER NOT NULL REFERENCES client_sdr(id),
                archetype_id INTEGER,
                full_name TEXT NOT NULL,
                title TEXT,
                company TEXT,
                status TEXT NOT NULL,
                overall_status TEXT NOT NULL,
                approved_outreach_message_id INTEGER,
                last_linkedin_message_at INTEGER,
                last_email_message_at INTEGER,
                times_bumped INTEGER NOT NULL DEFAULT 0,
                hidden_until INTEGER,
                hidden_reason TEXT
            );
            INSERT INTO prospect (id, client_sdr_id, full_name, status, overall_status)
                VALUES (7, 1, 'Old Prospect', 'ACCEPTED', 'ACCEPTED');
            "#,
        )
        .unwrap();
    }

    let repo = SqliteRepository::new(&db_path).unwrap();
    let stored = repo
        .get_prospect(sellscale_core::ProspectId(7))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, 0);
    assert_eq!(stored.status, ProspectStatus::Accepted);
    assert!(repo.list_outbox(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_status_is_reported_as_corruption() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let (_, prospect) = seeded(&repo).await;
    {
        let conn = repo.conn.lock().unwrap();
        conn.execute(
            "UPDATE prospect SET status = 'NOT_A_STATUS' WHERE id = ?1",
            params![prospect.id.0],
        )
        .unwrap();
    }

    let err = repo.get_prospect(prospect.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Corruption { .. }));
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let _repo = SqliteRepository::new(&db_path).unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(
        journal_mode.to_lowercase(),
        "wal",
        "Database should be in WAL mode"
    );
}
