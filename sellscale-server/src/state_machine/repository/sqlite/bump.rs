//! Bump framework storage.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::super::{BumpFrameworkFilter, RepositoryError};
use super::{enum_col, opt_enum_col, sql_err, SqliteRepository};
use sellscale_core::bump::{BumpFramework, NewBumpFramework};
use sellscale_core::model::{ArchetypeId, BumpFrameworkId, ClientSdrId};
use sellscale_core::{ProspectOverallStatus, ProspectStatus};

const BUMP_COLUMNS: &str = "id, client_sdr_id, archetype_id, title, description, \
     overall_status, substatus, is_default, active, bump_delay_days";

fn bump_from_row(row: &Row<'_>) -> rusqlite::Result<BumpFramework> {
    Ok(BumpFramework {
        id: BumpFrameworkId(row.get(0)?),
        client_sdr_id: ClientSdrId(row.get(1)?),
        archetype_id: row.get::<_, Option<i64>>(2)?.map(ArchetypeId),
        title: row.get(3)?,
        description: row.get(4)?,
        overall_status: enum_col(row, 5, ProspectOverallStatus::parse)?,
        substatus: opt_enum_col(row, 6, ProspectStatus::parse)?,
        default: row.get(7)?,
        active: row.get(8)?,
        bump_delay_days: row.get(9)?,
    })
}

fn load_bump(
    conn: &Connection,
    id: BumpFrameworkId,
) -> Result<Option<BumpFramework>, RepositoryError> {
    conn.query_row(
        &format!("SELECT {} FROM bump_framework WHERE id = ?1", BUMP_COLUMNS),
        params![id.0],
        bump_from_row,
    )
    .optional()
    .map_err(sql_err("get_bump_framework"))
}

fn require_bump(conn: &Connection, id: BumpFrameworkId) -> Result<BumpFramework, RepositoryError> {
    load_bump(conn, id)?.ok_or_else(|| RepositoryError::not_found("bump_framework", id.0))
}

/// Make `id` the only default within its (SDR, overall status, substatus)
/// group. `IS` compares NULL substatuses as equal.
fn make_default_in(conn: &Connection, id: BumpFrameworkId) -> Result<(), RepositoryError> {
    conn.execute(
        "UPDATE bump_framework SET is_default = (id = ?1)
         WHERE client_sdr_id = (SELECT client_sdr_id FROM bump_framework WHERE id = ?1)
           AND overall_status = (SELECT overall_status FROM bump_framework WHERE id = ?1)
           AND substatus IS (SELECT substatus FROM bump_framework WHERE id = ?1)",
        params![id.0],
    )
    .map_err(sql_err("set_default_bump_framework"))?;
    Ok(())
}

impl SqliteRepository {
    pub(super) async fn create_bump_framework_impl(
        &self,
        client_sdr_id: ClientSdrId,
        new: &NewBumpFramework,
    ) -> Result<BumpFramework, RepositoryError> {
        let new = new.clone();
        self.with_conn("create_bump_framework", move |conn| {
            let tx = conn
                .transaction()
                .map_err(sql_err("create_bump_framework"))?;
            tx.execute(
                "INSERT INTO bump_framework
                     (client_sdr_id, archetype_id, title, description, overall_status,
                      substatus, is_default, active, bump_delay_days)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
                params![
                    client_sdr_id.0,
                    new.archetype_id.map(|a| a.0),
                    new.title,
                    new.description,
                    new.overall_status.as_str(),
                    new.substatus.map(|s| s.as_str()),
                    new.default,
                    new.bump_delay_days,
                ],
            )
            .map_err(sql_err("create_bump_framework"))?;
            let id = BumpFrameworkId(tx.last_insert_rowid());
            if new.default {
                make_default_in(&tx, id)?;
            }
            let framework = require_bump(&tx, id)?;
            tx.commit().map_err(sql_err("create_bump_framework"))?;
            Ok(framework)
        })
        .await
    }

    pub(super) async fn get_bump_framework_impl(
        &self,
        id: BumpFrameworkId,
    ) -> Result<Option<BumpFramework>, RepositoryError> {
        self.with_conn("get_bump_framework", move |conn| load_bump(conn, id))
            .await
    }

    pub(super) async fn list_bump_frameworks_impl(
        &self,
        filter: &BumpFrameworkFilter,
    ) -> Result<Vec<BumpFramework>, RepositoryError> {
        let filter = filter.clone();
        self.with_conn("list_bump_frameworks", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM bump_framework
                     WHERE (?1 IS NULL OR client_sdr_id = ?1)
                       AND (?2 IS NULL OR overall_status = ?2)
                       AND (?3 IS NULL OR archetype_id = ?3)
                       AND (?4 IS NULL OR active = ?4)
                     ORDER BY id",
                    BUMP_COLUMNS
                ))
                .map_err(sql_err("list_bump_frameworks"))?;
            let rows = stmt
                .query_map(
                    params![
                        filter.client_sdr_id.map(|id| id.0),
                        filter.overall_status.map(|s| s.as_str()),
                        filter.archetype_id.map(|id| id.0),
                        filter.active,
                    ],
                    bump_from_row,
                )
                .map_err(sql_err("list_bump_frameworks"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(sql_err("list_bump_frameworks"))
        })
        .await
    }

    pub(super) async fn update_bump_framework_impl(
        &self,
        framework: &BumpFramework,
    ) -> Result<(), RepositoryError> {
        let framework = framework.clone();
        self.with_conn("update_bump_framework", move |conn| {
            let tx = conn
                .transaction()
                .map_err(sql_err("update_bump_framework"))?;
            let updated = tx
                .execute(
                    "UPDATE bump_framework SET
                         title = ?1,
                         description = ?2,
                         overall_status = ?3,
                         substatus = ?4,
                         bump_delay_days = ?5
                     WHERE id = ?6",
                    params![
                        framework.title,
                        framework.description,
                        framework.overall_status.as_str(),
                        framework.substatus.map(|s| s.as_str()),
                        framework.bump_delay_days,
                        framework.id.0,
                    ],
                )
                .map_err(sql_err("update_bump_framework"))?;
            if updated == 0 {
                return Err(RepositoryError::not_found("bump_framework", framework.id.0));
            }
            if require_bump(&tx, framework.id)?.default {
                make_default_in(&tx, framework.id)?;
            }
            tx.commit().map_err(sql_err("update_bump_framework"))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn set_default_bump_framework_impl(
        &self,
        id: BumpFrameworkId,
    ) -> Result<BumpFramework, RepositoryError> {
        self.with_conn("set_default_bump_framework", move |conn| {
            let tx = conn
                .transaction()
                .map_err(sql_err("set_default_bump_framework"))?;
            require_bump(&tx, id)?;
            make_default_in(&tx, id)?;
            let framework = require_bump(&tx, id)?;
            tx.commit().map_err(sql_err("set_default_bump_framework"))?;
            Ok(framework)
        })
        .await
    }

    pub(super) async fn set_bump_framework_active_impl(
        &self,
        id: BumpFrameworkId,
        active: bool,
    ) -> Result<BumpFramework, RepositoryError> {
        self.with_conn("set_bump_framework_active", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE bump_framework SET active = ?1 WHERE id = ?2",
                    params![active, id.0],
                )
                .map_err(sql_err("set_bump_framework_active"))?;
            if updated == 0 {
                return Err(RepositoryError::not_found("bump_framework", id.0));
            }
            require_bump(conn, id)
        })
        .await
    }
}
