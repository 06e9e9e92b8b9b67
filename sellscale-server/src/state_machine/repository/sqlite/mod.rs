//! SQLite implementation of `ProspectRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Timestamps
//!
//! All timestamps are stored as INTEGER milliseconds since the Unix epoch.

mod bump;
mod messages;
mod outbox;
mod prospects;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;

use super::{
    BlockOutcome, BumpFrameworkFilter, CommittedTransition, DeactivationOutcome, EmailSlot,
    OutboxEntry, OutboxStatus, ProspectRepository, RepositoryError, StatusHistory,
    TransitionCommit,
};
use sellscale_core::bump::{BumpFramework, NewBumpFramework};
use sellscale_core::model::{
    ArchetypeId, BumpFrameworkId, ClientArchetype, ClientSdr, ClientSdrId, GeneratedMessage,
    GeneratedMessageStatus, GeneratedMessageType, MessageId, NewProspect, Prospect, ProspectEmail,
    ProspectId,
};
use sellscale_core::{EmailTransitionPlan, ProspectEmailOutreachStatus, TransitionPlan};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
pub(crate) const CURRENT_SCHEMA_VERSION: i64 = 3;

/// SQLite-backed prospect repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    /// Exposed as `pub(crate)` so tests can poke at rows directly.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring its schema up to
    /// date.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` so committed transitions survive power loss
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    /// - `foreign_keys = ON` so prospect deletion cascades
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Version 1: SDRs, personas, prospects, email records, drafted
        // messages and both audit logs.
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS client_sdr (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    auth_token TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS client_archetype (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    client_sdr_id INTEGER NOT NULL REFERENCES client_sdr(id),
                    name TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS prospect (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    client_sdr_id INTEGER NOT NULL REFERENCES client_sdr(id),
                    archetype_id INTEGER REFERENCES client_archetype(id),
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

                CREATE INDEX IF NOT EXISTS idx_prospect_sdr ON prospect(client_sdr_id);
                CREATE INDEX IF NOT EXISTS idx_prospect_archetype ON prospect(archetype_id);

                CREATE TABLE IF NOT EXISTS prospect_email (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    prospect_id INTEGER NOT NULL UNIQUE
                        REFERENCES prospect(id) ON DELETE CASCADE,
                    outreach_status TEXT,
                    personalized_subject_line INTEGER,
                    personalized_first_line INTEGER,
                    personalized_body INTEGER
                );

                CREATE TABLE IF NOT EXISTS generated_message (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    prospect_id INTEGER NOT NULL REFERENCES prospect(id) ON DELETE CASCADE,
                    message_type TEXT NOT NULL,
                    message_status TEXT NOT NULL,
                    completion TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS prospect_status_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    prospect_id INTEGER NOT NULL REFERENCES prospect(id) ON DELETE CASCADE,
                    from_status TEXT NOT NULL,
                    to_status TEXT NOT NULL,
                    automated INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_status_records_prospect
                    ON prospect_status_records(prospect_id, id);

                CREATE TABLE IF NOT EXISTS prospect_email_status_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    prospect_id INTEGER NOT NULL REFERENCES prospect(id) ON DELETE CASCADE,
                    from_status TEXT,
                    to_status TEXT NOT NULL,
                    automated INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_email_status_records_prospect
                    ON prospect_email_status_records(prospect_id, id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Version 2: bump frameworks.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS bump_framework (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    client_sdr_id INTEGER NOT NULL REFERENCES client_sdr(id),
                    archetype_id INTEGER REFERENCES client_archetype(id),
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    overall_status TEXT NOT NULL,
                    substatus TEXT,
                    is_default INTEGER NOT NULL DEFAULT 0,
                    active INTEGER NOT NULL DEFAULT 1,
                    bump_delay_days INTEGER NOT NULL DEFAULT 2
                );
                CREATE INDEX IF NOT EXISTS idx_bump_framework_group
                    ON bump_framework(client_sdr_id, overall_status);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        // Version 3: optimistic concurrency on prospects and the effect
        // outbox written in the same transaction as status changes.
        if from_version < 3 {
            conn.execute_batch(
                r#"
                ALTER TABLE prospect ADD COLUMN version INTEGER NOT NULL DEFAULT 0;

                CREATE TABLE IF NOT EXISTS effect_outbox (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    transition_id TEXT NOT NULL,
                    prospect_id INTEGER NOT NULL REFERENCES prospect(id) ON DELETE CASCADE,
                    effect_kind TEXT NOT NULL,
                    effect_json TEXT NOT NULL,
                    status TEXT NOT NULL,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    next_attempt_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_outbox_due
                    ON effect_outbox(next_attempt_at) WHERE status IN ('pending', 'failed');
                CREATE INDEX IF NOT EXISTS idx_outbox_transition
                    ON effect_outbox(transition_id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v3", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    pub(super) async fn with_conn<T, F>(
        &self,
        operation: &'static str,
        f: F,
    ) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Row conversion helpers
// =============================================================================

/// Map a rusqlite error, treating undecodable column values as corruption.
pub(super) fn sql_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> RepositoryError {
    move |e| match e {
        rusqlite::Error::FromSqlConversionFailure(_, _, source) => {
            RepositoryError::corruption(format!("{} ({})", operation, source))
        }
        other => RepositoryError::storage(operation, other.to_string()),
    }
}

pub(super) fn conversion_failure(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// Read a TEXT column holding an enum wire name.
pub(super) fn enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_failure(idx, format!("unknown value {:?}", raw)))
}

/// Nullable variant of [`enum_col`].
pub(super) fn opt_enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        parse(&raw).ok_or_else(|| conversion_failure(idx, format!("unknown value {:?}", raw)))
    })
    .transpose()
}

pub(super) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(super) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| conversion_failure(idx, format!("timestamp {} out of range", millis)))
}

pub(super) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(idx)?;
    millis
        .map(|millis| {
            DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                conversion_failure(idx, format!("timestamp {} out of range", millis))
            })
        })
        .transpose()
}

/// Convert a usize limit to i64 for a SQLite LIMIT clause without wrapping.
pub(super) fn usize_to_i64_limit(
    limit: usize,
    operation: &'static str,
) -> Result<i64, RepositoryError> {
    i64::try_from(limit).map_err(|_| {
        RepositoryError::storage(
            operation,
            format!("limit {} exceeds maximum storable value ({})", limit, i64::MAX),
        )
    })
}

// =============================================================================
// ProspectRepository trait implementation
// =============================================================================

#[async_trait]
impl ProspectRepository for SqliteRepository {
    async fn create_client_sdr(
        &self,
        name: &str,
        auth_token: &str,
    ) -> Result<ClientSdr, RepositoryError> {
        self.create_client_sdr_impl(name, auth_token).await
    }

    async fn client_sdr_by_token(&self, token: &str) -> Result<Option<ClientSdr>, RepositoryError> {
        self.client_sdr_by_token_impl(token).await
    }

    async fn create_archetype(
        &self,
        client_sdr_id: ClientSdrId,
        name: &str,
    ) -> Result<ClientArchetype, RepositoryError> {
        self.create_archetype_impl(client_sdr_id, name).await
    }

    async fn get_archetype(
        &self,
        id: ArchetypeId,
    ) -> Result<Option<ClientArchetype>, RepositoryError> {
        self.get_archetype_impl(id).await
    }

    async fn deactivate_archetype(
        &self,
        id: ArchetypeId,
        hard: bool,
    ) -> Result<DeactivationOutcome, RepositoryError> {
        self.deactivate_archetype_impl(id, hard).await
    }

    async fn create_prospect(&self, new: &NewProspect) -> Result<Prospect, RepositoryError> {
        self.create_prospect_impl(new).await
    }

    async fn get_prospect(&self, id: ProspectId) -> Result<Option<Prospect>, RepositoryError> {
        self.get_prospect_impl(id).await
    }

    async fn list_prospects(
        &self,
        client_sdr_id: ClientSdrId,
    ) -> Result<Vec<Prospect>, RepositoryError> {
        self.list_prospects_impl(client_sdr_id).await
    }

    async fn update_prospect(
        &self,
        prospect: &Prospect,
        expected_version: i64,
    ) -> Result<Prospect, RepositoryError> {
        self.update_prospect_impl(prospect, expected_version).await
    }

    async fn delete_prospect(&self, id: ProspectId) -> Result<bool, RepositoryError> {
        self.delete_prospect_impl(id).await
    }

    async fn commit_linkedin_transition(
        &self,
        plan: &TransitionPlan,
        expected_version: i64,
        commit: &TransitionCommit,
    ) -> Result<CommittedTransition, RepositoryError> {
        self.commit_linkedin_transition_impl(plan, expected_version, commit)
            .await
    }

    async fn commit_email_transition(
        &self,
        plan: &EmailTransitionPlan,
        expected_version: i64,
        commit: &TransitionCommit,
    ) -> Result<CommittedTransition, RepositoryError> {
        self.commit_email_transition_impl(plan, expected_version, commit)
            .await
    }

    async fn status_history(&self, id: ProspectId) -> Result<StatusHistory, RepositoryError> {
        self.status_history_impl(id).await
    }

    async fn create_prospect_email(
        &self,
        prospect_id: ProspectId,
        outreach_status: Option<ProspectEmailOutreachStatus>,
    ) -> Result<ProspectEmail, RepositoryError> {
        self.create_prospect_email_impl(prospect_id, outreach_status)
            .await
    }

    async fn get_prospect_email(
        &self,
        prospect_id: ProspectId,
    ) -> Result<Option<ProspectEmail>, RepositoryError> {
        self.get_prospect_email_impl(prospect_id).await
    }

    async fn create_generated_message(
        &self,
        prospect_id: ProspectId,
        message_type: GeneratedMessageType,
        message_status: GeneratedMessageStatus,
        completion: &str,
    ) -> Result<GeneratedMessage, RepositoryError> {
        self.create_generated_message_impl(prospect_id, message_type, message_status, completion)
            .await
    }

    async fn get_generated_message(
        &self,
        id: MessageId,
    ) -> Result<Option<GeneratedMessage>, RepositoryError> {
        self.get_generated_message_impl(id).await
    }

    async fn approve_linkedin_message(
        &self,
        prospect_id: ProspectId,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        self.approve_linkedin_message_impl(prospect_id, message_id)
            .await
    }

    async fn set_email_slot(
        &self,
        prospect_id: ProspectId,
        slot: EmailSlot,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        self.set_email_slot_impl(prospect_id, slot, message_id)
            .await
    }

    async fn block_linkedin_message(
        &self,
        prospect_id: ProspectId,
    ) -> Result<BlockOutcome, RepositoryError> {
        self.block_linkedin_message_impl(prospect_id).await
    }

    async fn block_email_messages(
        &self,
        prospect_id: ProspectId,
    ) -> Result<BlockOutcome, RepositoryError> {
        self.block_email_messages_impl(prospect_id).await
    }

    async fn create_bump_framework(
        &self,
        client_sdr_id: ClientSdrId,
        new: &NewBumpFramework,
    ) -> Result<BumpFramework, RepositoryError> {
        self.create_bump_framework_impl(client_sdr_id, new).await
    }

    async fn get_bump_framework(
        &self,
        id: BumpFrameworkId,
    ) -> Result<Option<BumpFramework>, RepositoryError> {
        self.get_bump_framework_impl(id).await
    }

    async fn list_bump_frameworks(
        &self,
        filter: &BumpFrameworkFilter,
    ) -> Result<Vec<BumpFramework>, RepositoryError> {
        self.list_bump_frameworks_impl(filter).await
    }

    async fn update_bump_framework(
        &self,
        framework: &BumpFramework,
    ) -> Result<(), RepositoryError> {
        self.update_bump_framework_impl(framework).await
    }

    async fn set_default_bump_framework(
        &self,
        id: BumpFrameworkId,
    ) -> Result<BumpFramework, RepositoryError> {
        self.set_default_bump_framework_impl(id).await
    }

    async fn set_bump_framework_active(
        &self,
        id: BumpFrameworkId,
        active: bool,
    ) -> Result<BumpFramework, RepositoryError> {
        self.set_bump_framework_active_impl(id, active).await
    }

    async fn due_outbox_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, RepositoryError> {
        self.due_outbox_entries_impl(now, limit).await
    }

    async fn list_outbox(
        &self,
        status: Option<OutboxStatus>,
    ) -> Result<Vec<OutboxEntry>, RepositoryError> {
        self.list_outbox_impl(status).await
    }

    async fn mark_outbox_delivered(&self, id: i64) -> Result<(), RepositoryError> {
        self.mark_outbox_delivered_impl(id).await
    }

    async fn mark_outbox_failed(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        if next_attempt_at.is_none() {
            warn!("Outbox entry {} exhausted its retries: {}", id, error);
        }
        self.mark_outbox_failed_impl(id, error, next_attempt_at)
            .await
    }
}
