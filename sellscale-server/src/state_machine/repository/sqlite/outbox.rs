//! Effect outbox rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::super::{OutboxEntry, OutboxStatus, RepositoryError, TransitionCommit};
use super::{
    conversion_failure, enum_col, sql_err, to_millis, ts_col, usize_to_i64_limit,
    SqliteRepository,
};
use sellscale_core::model::ProspectId;
use sellscale_core::Effect;

const OUTBOX_COLUMNS: &str = "id, transition_id, prospect_id, effect_json, status, attempts, \
     last_error, next_attempt_at, created_at";

fn outbox_from_row(row: &Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let transition_id: String = row.get(1)?;
    let transition_id = Uuid::parse_str(&transition_id)
        .map_err(|e| conversion_failure(1, format!("transition id: {}", e)))?;
    let effect_json: String = row.get(3)?;
    let effect: Effect = serde_json::from_str(&effect_json)
        .map_err(|e| conversion_failure(3, format!("effect payload: {}", e)))?;
    Ok(OutboxEntry {
        id: row.get(0)?,
        transition_id,
        prospect_id: ProspectId(row.get(2)?),
        effect,
        status: enum_col(row, 4, OutboxStatus::parse)?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        next_attempt_at: ts_col(row, 7)?,
        created_at: ts_col(row, 8)?,
    })
}

/// Write one pending row per persistable effect of `commit`. Runs on the
/// caller's connection so the rows share the status change's transaction.
pub(super) fn insert_outbox_rows(
    conn: &Connection,
    prospect_id: ProspectId,
    commit: &TransitionCommit,
) -> Result<Vec<OutboxEntry>, RepositoryError> {
    let mut written = Vec::with_capacity(commit.outbox_effects.len());
    for effect in &commit.outbox_effects {
        let effect_json = serde_json::to_string(effect)
            .map_err(|e| RepositoryError::storage("write_outbox", e.to_string()))?;
        conn.execute(
            "INSERT INTO effect_outbox
                 (transition_id, prospect_id, effect_kind, effect_json, status, attempts,
                  next_attempt_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                commit.transition_id.to_string(),
                prospect_id.0,
                effect.kind(),
                effect_json,
                OutboxStatus::Pending.as_str(),
                to_millis(commit.outbox_first_attempt_at),
                to_millis(commit.committed_at),
            ],
        )
        .map_err(sql_err("write_outbox"))?;
        written.push(OutboxEntry {
            id: conn.last_insert_rowid(),
            transition_id: commit.transition_id,
            prospect_id,
            effect: effect.clone(),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: commit.outbox_first_attempt_at,
            created_at: commit.committed_at,
        });
    }
    Ok(written)
}

impl SqliteRepository {
    pub(super) async fn due_outbox_entries_impl(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, RepositoryError> {
        let limit = usize_to_i64_limit(limit, "due_outbox_entries")?;
        self.with_conn("due_outbox_entries", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM effect_outbox
                     WHERE status IN ('pending', 'failed') AND next_attempt_at <= ?1
                     ORDER BY next_attempt_at, id
                     LIMIT ?2",
                    OUTBOX_COLUMNS
                ))
                .map_err(sql_err("due_outbox_entries"))?;
            let rows = stmt
                .query_map(params![to_millis(now), limit], outbox_from_row)
                .map_err(sql_err("due_outbox_entries"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(sql_err("due_outbox_entries"))
        })
        .await
    }

    pub(super) async fn list_outbox_impl(
        &self,
        status: Option<OutboxStatus>,
    ) -> Result<Vec<OutboxEntry>, RepositoryError> {
        self.with_conn("list_outbox", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM effect_outbox
                     WHERE (?1 IS NULL OR status = ?1)
                     ORDER BY id",
                    OUTBOX_COLUMNS
                ))
                .map_err(sql_err("list_outbox"))?;
            let rows = stmt
                .query_map(params![status.map(|s| s.as_str())], outbox_from_row)
                .map_err(sql_err("list_outbox"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(sql_err("list_outbox"))
        })
        .await
    }

    pub(super) async fn mark_outbox_delivered_impl(&self, id: i64) -> Result<(), RepositoryError> {
        self.with_conn("mark_outbox_delivered", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE effect_outbox
                     SET status = ?1, attempts = attempts + 1, last_error = NULL
                     WHERE id = ?2",
                    params![OutboxStatus::Delivered.as_str(), id],
                )
                .map_err(sql_err("mark_outbox_delivered"))?;
            if updated == 0 {
                return Err(RepositoryError::not_found("outbox entry", id));
            }
            Ok(())
        })
        .await
    }

    pub(super) async fn mark_outbox_failed_impl(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let error = error.to_string();
        self.with_conn("mark_outbox_failed", move |conn| {
            let updated = match next_attempt_at {
                Some(next) => conn.execute(
                    "UPDATE effect_outbox
                     SET status = ?1, attempts = attempts + 1, last_error = ?2,
                         next_attempt_at = ?3
                     WHERE id = ?4",
                    params![OutboxStatus::Failed.as_str(), error, to_millis(next), id],
                ),
                None => conn.execute(
                    "UPDATE effect_outbox
                     SET status = ?1, attempts = attempts + 1, last_error = ?2
                     WHERE id = ?3",
                    params![OutboxStatus::Dead.as_str(), error, id],
                ),
            }
            .map_err(sql_err("mark_outbox_failed"))?;
            if updated == 0 {
                return Err(RepositoryError::not_found("outbox entry", id));
            }
            Ok(())
        })
        .await
    }
}
