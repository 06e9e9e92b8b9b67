//! SDR, persona and prospect operations, including the transition commits.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::super::{
    CommittedTransition, DeactivationOutcome, RepositoryError, StatusHistory, TransitionCommit,
};
use super::messages::{block_email_in, block_linkedin_in};
use super::outbox::insert_outbox_rows;
use super::{enum_col, opt_enum_col, opt_ts_col, sql_err, to_millis, ts_col, SqliteRepository};
use sellscale_core::model::{
    ArchetypeId, ClientArchetype, ClientSdr, ClientSdrId, HiddenReason, MessageId, NewProspect,
    Prospect, ProspectEmailStatusRecord, ProspectId, ProspectStatusRecord,
};
use sellscale_core::{
    EmailTransitionPlan, ProspectEmailOutreachStatus, ProspectOverallStatus, ProspectStatus,
    TransitionPlan,
};

const PROSPECT_COLUMNS: &str = "id, client_sdr_id, archetype_id, full_name, title, company, \
     status, overall_status, approved_outreach_message_id, last_linkedin_message_at, \
     last_email_message_at, times_bumped, hidden_until, hidden_reason, version";

fn prospect_from_row(row: &Row<'_>) -> rusqlite::Result<Prospect> {
    Ok(Prospect {
        id: ProspectId(row.get(0)?),
        client_sdr_id: ClientSdrId(row.get(1)?),
        archetype_id: row.get::<_, Option<i64>>(2)?.map(ArchetypeId),
        full_name: row.get(3)?,
        title: row.get(4)?,
        company: row.get(5)?,
        status: enum_col(row, 6, ProspectStatus::parse)?,
        overall_status: enum_col(row, 7, ProspectOverallStatus::parse)?,
        approved_outreach_message_id: row.get::<_, Option<i64>>(8)?.map(MessageId),
        last_linkedin_message_at: opt_ts_col(row, 9)?,
        last_email_message_at: opt_ts_col(row, 10)?,
        times_bumped: row.get(11)?,
        hidden_until: opt_ts_col(row, 12)?,
        hidden_reason: opt_enum_col(row, 13, HiddenReason::parse)?,
        version: row.get(14)?,
    })
}

pub(super) fn load_prospect(
    conn: &Connection,
    id: ProspectId,
) -> Result<Option<Prospect>, RepositoryError> {
    conn.query_row(
        &format!("SELECT {} FROM prospect WHERE id = ?1", PROSPECT_COLUMNS),
        params![id.0],
        prospect_from_row,
    )
    .optional()
    .map_err(sql_err("get_prospect"))
}

fn require_prospect(conn: &Connection, id: ProspectId) -> Result<Prospect, RepositoryError> {
    load_prospect(conn, id)?.ok_or_else(|| RepositoryError::not_found("prospect", id.0))
}

/// Explain a CAS update that touched no rows.
fn missing_or_conflict(conn: &Connection, id: ProspectId, operation: &'static str) -> RepositoryError {
    match conn
        .query_row("SELECT 1 FROM prospect WHERE id = ?1", params![id.0], |_| Ok(()))
        .optional()
    {
        Ok(Some(())) => RepositoryError::Conflict { prospect_id: id },
        Ok(None) => RepositoryError::not_found("prospect", id.0),
        Err(e) => sql_err(operation)(e),
    }
}

/// Write the columns a transition plan may change, guarded by `version`.
fn write_transition_columns(
    conn: &Connection,
    prospect: &Prospect,
    expected_version: i64,
    operation: &'static str,
) -> Result<(), RepositoryError> {
    let updated = conn
        .execute(
            "UPDATE prospect SET
                 status = ?1,
                 overall_status = ?2,
                 last_linkedin_message_at = ?3,
                 last_email_message_at = ?4,
                 times_bumped = ?5,
                 hidden_until = ?6,
                 hidden_reason = ?7,
                 version = version + 1
             WHERE id = ?8 AND version = ?9",
            params![
                prospect.status.as_str(),
                prospect.overall_status.as_str(),
                prospect.last_linkedin_message_at.map(to_millis),
                prospect.last_email_message_at.map(to_millis),
                prospect.times_bumped,
                prospect.hidden_until.map(to_millis),
                prospect.hidden_reason.map(|r| r.as_str()),
                prospect.id.0,
                expected_version,
            ],
        )
        .map_err(sql_err(operation))?;
    if updated == 0 {
        return Err(missing_or_conflict(conn, prospect.id, operation));
    }
    Ok(())
}

fn archetype_from_row(row: &Row<'_>) -> rusqlite::Result<ClientArchetype> {
    Ok(ClientArchetype {
        id: ArchetypeId(row.get(0)?),
        client_sdr_id: ClientSdrId(row.get(1)?),
        name: row.get(2)?,
        active: row.get(3)?,
    })
}

impl SqliteRepository {
    pub(super) async fn create_client_sdr_impl(
        &self,
        name: &str,
        auth_token: &str,
    ) -> Result<ClientSdr, RepositoryError> {
        let name = name.to_string();
        let auth_token = auth_token.to_string();
        self.with_conn("create_client_sdr", move |conn| {
            conn.execute(
                "INSERT INTO client_sdr (name, auth_token) VALUES (?1, ?2)",
                params![name, auth_token],
            )
            .map_err(sql_err("create_client_sdr"))?;
            Ok(ClientSdr {
                id: ClientSdrId(conn.last_insert_rowid()),
                name,
                auth_token,
            })
        })
        .await
    }

    pub(super) async fn client_sdr_by_token_impl(
        &self,
        token: &str,
    ) -> Result<Option<ClientSdr>, RepositoryError> {
        let token = token.to_string();
        self.with_conn("client_sdr_by_token", move |conn| {
            conn.query_row(
                "SELECT id, name, auth_token FROM client_sdr WHERE auth_token = ?1",
                params![token],
                |row| {
                    Ok(ClientSdr {
                        id: ClientSdrId(row.get(0)?),
                        name: row.get(1)?,
                        auth_token: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(sql_err("client_sdr_by_token"))
        })
        .await
    }

    pub(super) async fn create_archetype_impl(
        &self,
        client_sdr_id: ClientSdrId,
        name: &str,
    ) -> Result<ClientArchetype, RepositoryError> {
        let name = name.to_string();
        self.with_conn("create_archetype", move |conn| {
            conn.execute(
                "INSERT INTO client_archetype (client_sdr_id, name, active) VALUES (?1, ?2, 1)",
                params![client_sdr_id.0, name],
            )
            .map_err(sql_err("create_archetype"))?;
            Ok(ClientArchetype {
                id: ArchetypeId(conn.last_insert_rowid()),
                client_sdr_id,
                name,
                active: true,
            })
        })
        .await
    }

    pub(super) async fn get_archetype_impl(
        &self,
        id: ArchetypeId,
    ) -> Result<Option<ClientArchetype>, RepositoryError> {
        self.with_conn("get_archetype", move |conn| {
            conn.query_row(
                "SELECT id, client_sdr_id, name, active FROM client_archetype WHERE id = ?1",
                params![id.0],
                archetype_from_row,
            )
            .optional()
            .map_err(sql_err("get_archetype"))
        })
        .await
    }

    pub(super) async fn deactivate_archetype_impl(
        &self,
        id: ArchetypeId,
        hard: bool,
    ) -> Result<DeactivationOutcome, RepositoryError> {
        self.with_conn("deactivate_archetype", move |conn| {
            let tx = conn
                .transaction()
                .map_err(sql_err("deactivate_archetype"))?;

            let updated = tx
                .execute(
                    "UPDATE client_archetype SET active = 0 WHERE id = ?1",
                    params![id.0],
                )
                .map_err(sql_err("deactivate_archetype"))?;
            if updated == 0 {
                return Err(RepositoryError::not_found("archetype", id.0));
            }

            let mut outcome = DeactivationOutcome {
                archetype_id: Some(id),
                ..Default::default()
            };

            if hard {
                let targets: Vec<ProspectId> = {
                    let mut stmt = tx
                        .prepare(
                            "SELECT id FROM prospect
                             WHERE archetype_id = ?1 AND status IN (?2, ?3)
                             ORDER BY id",
                        )
                        .map_err(sql_err("deactivate_archetype"))?;
                    let rows = stmt
                        .query_map(
                            params![
                                id.0,
                                ProspectStatus::Prospected.as_str(),
                                ProspectStatus::QueuedForOutreach.as_str()
                            ],
                            |row| row.get::<_, i64>(0).map(ProspectId),
                        )
                        .map_err(sql_err("deactivate_archetype"))?;
                    rows.collect::<Result<_, _>>()
                        .map_err(sql_err("deactivate_archetype"))?
                };

                for prospect_id in targets {
                    outcome
                        .blocked_messages
                        .extend(block_linkedin_in(&tx, prospect_id)?);
                    outcome
                        .blocked_messages
                        .extend(block_email_in(&tx, prospect_id)?);
                    outcome.cleared_prospects.push(prospect_id);
                }
            }

            tx.commit().map_err(sql_err("deactivate_archetype"))?;
            Ok(outcome)
        })
        .await
    }

    pub(super) async fn create_prospect_impl(
        &self,
        new: &NewProspect,
    ) -> Result<Prospect, RepositoryError> {
        let new = new.clone();
        self.with_conn("create_prospect", move |conn| {
            conn.execute(
                "INSERT INTO prospect (client_sdr_id, archetype_id, full_name, title, company,
                                       status, overall_status, times_bumped, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0)",
                params![
                    new.client_sdr_id.0,
                    new.archetype_id.map(|a| a.0),
                    new.full_name,
                    new.title,
                    new.company,
                    ProspectStatus::Prospected.as_str(),
                    ProspectOverallStatus::Prospected.as_str(),
                ],
            )
            .map_err(sql_err("create_prospect"))?;
            let id = ProspectId(conn.last_insert_rowid());
            require_prospect(conn, id)
        })
        .await
    }

    pub(super) async fn get_prospect_impl(
        &self,
        id: ProspectId,
    ) -> Result<Option<Prospect>, RepositoryError> {
        self.with_conn("get_prospect", move |conn| load_prospect(conn, id))
            .await
    }

    pub(super) async fn list_prospects_impl(
        &self,
        client_sdr_id: ClientSdrId,
    ) -> Result<Vec<Prospect>, RepositoryError> {
        self.with_conn("list_prospects", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM prospect WHERE client_sdr_id = ?1 ORDER BY id",
                    PROSPECT_COLUMNS
                ))
                .map_err(sql_err("list_prospects"))?;
            let rows = stmt
                .query_map(params![client_sdr_id.0], prospect_from_row)
                .map_err(sql_err("list_prospects"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(sql_err("list_prospects"))
        })
        .await
    }

    pub(super) async fn update_prospect_impl(
        &self,
        prospect: &Prospect,
        expected_version: i64,
    ) -> Result<Prospect, RepositoryError> {
        let prospect = prospect.clone();
        self.with_conn("update_prospect", move |conn| {
            // Status columns only move through the transition commits
            let updated = conn
                .execute(
                    "UPDATE prospect SET
                         archetype_id = ?1,
                         full_name = ?2,
                         title = ?3,
                         company = ?4,
                         hidden_until = ?5,
                         hidden_reason = ?6,
                         version = version + 1
                     WHERE id = ?7 AND version = ?8",
                    params![
                        prospect.archetype_id.map(|a| a.0),
                        prospect.full_name,
                        prospect.title,
                        prospect.company,
                        prospect.hidden_until.map(to_millis),
                        prospect.hidden_reason.map(|r| r.as_str()),
                        prospect.id.0,
                        expected_version,
                    ],
                )
                .map_err(sql_err("update_prospect"))?;
            if updated == 0 {
                return Err(missing_or_conflict(conn, prospect.id, "update_prospect"));
            }
            require_prospect(conn, prospect.id)
        })
        .await
    }

    pub(super) async fn delete_prospect_impl(&self, id: ProspectId) -> Result<bool, RepositoryError> {
        // Email record, messages, audit rows and outbox rows cascade
        self.with_conn("delete_prospect", move |conn| {
            let deleted = conn
                .execute("DELETE FROM prospect WHERE id = ?1", params![id.0])
                .map_err(sql_err("delete_prospect"))?;
            Ok(deleted > 0)
        })
        .await
    }

    pub(super) async fn commit_linkedin_transition_impl(
        &self,
        plan: &TransitionPlan,
        expected_version: i64,
        commit: &TransitionCommit,
    ) -> Result<CommittedTransition, RepositoryError> {
        const OP: &str = "commit_linkedin_transition";
        let plan = plan.clone();
        let commit = commit.clone();
        self.with_conn(OP, move |conn| {
            let tx = conn.transaction().map_err(sql_err(OP))?;
            let prospect_id = plan.prospect.id;

            write_transition_columns(&tx, &plan.prospect, expected_version, OP)?;
            tx.execute(
                "INSERT INTO prospect_status_records
                     (prospect_id, from_status, to_status, automated, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    prospect_id.0,
                    plan.record.from_status.as_str(),
                    plan.record.to_status.as_str(),
                    plan.record.automated,
                    to_millis(commit.committed_at),
                ],
            )
            .map_err(sql_err(OP))?;
            let outbox = insert_outbox_rows(&tx, prospect_id, &commit)?;
            let prospect = require_prospect(&tx, prospect_id)?;

            tx.commit().map_err(sql_err(OP))?;
            Ok(CommittedTransition { prospect, outbox })
        })
        .await
    }

    pub(super) async fn commit_email_transition_impl(
        &self,
        plan: &EmailTransitionPlan,
        expected_version: i64,
        commit: &TransitionCommit,
    ) -> Result<CommittedTransition, RepositoryError> {
        const OP: &str = "commit_email_transition";
        let plan = plan.clone();
        let commit = commit.clone();
        self.with_conn(OP, move |conn| {
            let tx = conn.transaction().map_err(sql_err(OP))?;
            let prospect_id = plan.prospect.id;

            write_transition_columns(&tx, &plan.prospect, expected_version, OP)?;
            let updated = tx
                .execute(
                    "UPDATE prospect_email SET outreach_status = ?1 WHERE prospect_id = ?2",
                    params![plan.record.to_status.as_str(), prospect_id.0],
                )
                .map_err(sql_err(OP))?;
            if updated == 0 {
                return Err(RepositoryError::not_found("prospect_email", prospect_id.0));
            }
            tx.execute(
                "INSERT INTO prospect_email_status_records
                     (prospect_id, from_status, to_status, automated, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    prospect_id.0,
                    plan.record.from_status.map(|s| s.as_str()),
                    plan.record.to_status.as_str(),
                    plan.record.automated,
                    to_millis(commit.committed_at),
                ],
            )
            .map_err(sql_err(OP))?;
            let outbox = insert_outbox_rows(&tx, prospect_id, &commit)?;
            let prospect = require_prospect(&tx, prospect_id)?;

            tx.commit().map_err(sql_err(OP))?;
            Ok(CommittedTransition { prospect, outbox })
        })
        .await
    }

    pub(super) async fn status_history_impl(
        &self,
        id: ProspectId,
    ) -> Result<StatusHistory, RepositoryError> {
        self.with_conn("status_history", move |conn| {
            let linkedin = {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, prospect_id, from_status, to_status, automated, created_at
                         FROM prospect_status_records WHERE prospect_id = ?1 ORDER BY id",
                    )
                    .map_err(sql_err("status_history"))?;
                let rows = stmt
                    .query_map(params![id.0], |row| {
                        Ok(ProspectStatusRecord {
                            id: row.get(0)?,
                            prospect_id: ProspectId(row.get(1)?),
                            from_status: enum_col(row, 2, ProspectStatus::parse)?,
                            to_status: enum_col(row, 3, ProspectStatus::parse)?,
                            automated: row.get(4)?,
                            created_at: ts_col(row, 5)?,
                        })
                    })
                    .map_err(sql_err("status_history"))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(sql_err("status_history"))?
            };

            let email = {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, prospect_id, from_status, to_status, automated, created_at
                         FROM prospect_email_status_records WHERE prospect_id = ?1 ORDER BY id",
                    )
                    .map_err(sql_err("status_history"))?;
                let rows = stmt
                    .query_map(params![id.0], |row| {
                        Ok(ProspectEmailStatusRecord {
                            id: row.get(0)?,
                            prospect_id: ProspectId(row.get(1)?),
                            from_status: opt_enum_col(
                                row,
                                2,
                                ProspectEmailOutreachStatus::parse,
                            )?,
                            to_status: enum_col(row, 3, ProspectEmailOutreachStatus::parse)?,
                            automated: row.get(4)?,
                            created_at: ts_col(row, 5)?,
                        })
                    })
                    .map_err(sql_err("status_history"))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(sql_err("status_history"))?
            };

            Ok(StatusHistory { linkedin, email })
        })
        .await
    }
}
