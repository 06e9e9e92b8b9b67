//! Email records, drafted messages and message blocking.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::super::{BlockOutcome, EmailSlot, RepositoryError};
use super::{enum_col, opt_enum_col, sql_err, SqliteRepository};
use sellscale_core::model::{
    GeneratedMessage, GeneratedMessageStatus, GeneratedMessageType, MessageId, ProspectEmail,
    ProspectEmailId, ProspectId,
};
use sellscale_core::ProspectEmailOutreachStatus;

const EMAIL_COLUMNS: &str = "id, prospect_id, outreach_status, personalized_subject_line, \
     personalized_first_line, personalized_body";

fn email_from_row(row: &Row<'_>) -> rusqlite::Result<ProspectEmail> {
    Ok(ProspectEmail {
        id: ProspectEmailId(row.get(0)?),
        prospect_id: ProspectId(row.get(1)?),
        outreach_status: opt_enum_col(row, 2, ProspectEmailOutreachStatus::parse)?,
        personalized_subject_line: row.get::<_, Option<i64>>(3)?.map(MessageId),
        personalized_first_line: row.get::<_, Option<i64>>(4)?.map(MessageId),
        personalized_body: row.get::<_, Option<i64>>(5)?.map(MessageId),
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<GeneratedMessage> {
    Ok(GeneratedMessage {
        id: MessageId(row.get(0)?),
        prospect_id: ProspectId(row.get(1)?),
        message_type: enum_col(row, 2, GeneratedMessageType::parse)?,
        message_status: enum_col(row, 3, GeneratedMessageStatus::parse)?,
        completion: row.get(4)?,
    })
}

fn load_email(
    conn: &Connection,
    prospect_id: ProspectId,
) -> Result<Option<ProspectEmail>, RepositoryError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM prospect_email WHERE prospect_id = ?1",
            EMAIL_COLUMNS
        ),
        params![prospect_id.0],
        email_from_row,
    )
    .optional()
    .map_err(sql_err("get_prospect_email"))
}

fn message_exists(conn: &Connection, id: MessageId) -> Result<bool, RepositoryError> {
    conn.query_row(
        "SELECT 1 FROM generated_message WHERE id = ?1",
        params![id.0],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(sql_err("get_generated_message"))
}

/// What happened to the message a slot pointed at.
enum SlotBlock {
    /// The message was unsent and is now blocked.
    Blocked,
    /// Already sent; the slot keeps pointing at it.
    Keep,
    /// The slot pointed at nothing.
    Missing,
}

fn block_message(conn: &Connection, id: MessageId) -> Result<SlotBlock, RepositoryError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT message_status FROM generated_message WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err("block_message"))?;
    let Some(raw) = status else {
        return Ok(SlotBlock::Missing);
    };
    let status = GeneratedMessageStatus::parse(&raw)
        .ok_or_else(|| RepositoryError::corruption(format!("message status {:?}", raw)))?;
    if !status.is_blockable() {
        return Ok(SlotBlock::Keep);
    }
    conn.execute(
        "UPDATE generated_message SET message_status = ?1 WHERE id = ?2",
        params![GeneratedMessageStatus::Blocked.as_str(), id.0],
    )
    .map_err(sql_err("block_message"))?;
    Ok(SlotBlock::Blocked)
}

/// Block the approved LinkedIn message of `prospect_id` and clear the pointer.
/// Runs on the caller's connection so it can join a larger transaction.
pub(super) fn block_linkedin_in(
    conn: &Connection,
    prospect_id: ProspectId,
) -> Result<Vec<MessageId>, RepositoryError> {
    let approved: Option<Option<i64>> = conn
        .query_row(
            "SELECT approved_outreach_message_id FROM prospect WHERE id = ?1",
            params![prospect_id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err("block_linkedin_message"))?;
    let Some(approved) = approved else {
        return Err(RepositoryError::not_found("prospect", prospect_id.0));
    };
    let Some(message_id) = approved.map(MessageId) else {
        return Ok(Vec::new());
    };

    let outcome = block_message(conn, message_id)?;
    if matches!(outcome, SlotBlock::Keep) {
        return Ok(Vec::new());
    }
    conn.execute(
        "UPDATE prospect SET approved_outreach_message_id = NULL, version = version + 1
         WHERE id = ?1",
        params![prospect_id.0],
    )
    .map_err(sql_err("block_linkedin_message"))?;

    Ok(match outcome {
        SlotBlock::Blocked => vec![message_id],
        _ => Vec::new(),
    })
}

/// Block every unsent email slot message of `prospect_id` and clear the
/// slots. A prospect without an email record has nothing to block.
pub(super) fn block_email_in(
    conn: &Connection,
    prospect_id: ProspectId,
) -> Result<Vec<MessageId>, RepositoryError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM prospect WHERE id = ?1",
            params![prospect_id.0],
            |_| Ok(()),
        )
        .optional()
        .map_err(sql_err("block_email_messages"))?;
    if exists.is_none() {
        return Err(RepositoryError::not_found("prospect", prospect_id.0));
    }
    let Some(email) = load_email(conn, prospect_id)? else {
        return Ok(Vec::new());
    };

    let slots = [
        ("personalized_subject_line", email.personalized_subject_line),
        ("personalized_first_line", email.personalized_first_line),
        ("personalized_body", email.personalized_body),
    ];
    let mut blocked = Vec::new();
    for (column, message_id) in slots {
        let Some(message_id) = message_id else {
            continue;
        };
        let outcome = block_message(conn, message_id)?;
        if matches!(outcome, SlotBlock::Keep) {
            continue;
        }
        // Column names come from the fixed list above
        conn.execute(
            &format!(
                "UPDATE prospect_email SET {} = NULL WHERE prospect_id = ?1",
                column
            ),
            params![prospect_id.0],
        )
        .map_err(sql_err("block_email_messages"))?;
        if matches!(outcome, SlotBlock::Blocked) {
            blocked.push(message_id);
        }
    }
    Ok(blocked)
}

impl SqliteRepository {
    pub(super) async fn create_prospect_email_impl(
        &self,
        prospect_id: ProspectId,
        outreach_status: Option<ProspectEmailOutreachStatus>,
    ) -> Result<ProspectEmail, RepositoryError> {
        self.with_conn("create_prospect_email", move |conn| {
            if load_email(conn, prospect_id)?.is_some() {
                return Err(RepositoryError::storage(
                    "create_prospect_email",
                    format!("prospect {} already has an email record", prospect_id),
                ));
            }
            conn.execute(
                "INSERT INTO prospect_email (prospect_id, outreach_status) VALUES (?1, ?2)",
                params![prospect_id.0, outreach_status.map(|s| s.as_str())],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    RepositoryError::not_found("prospect", prospect_id.0)
                }
                other => sql_err("create_prospect_email")(other),
            })?;
            Ok(ProspectEmail {
                id: ProspectEmailId(conn.last_insert_rowid()),
                prospect_id,
                outreach_status,
                personalized_subject_line: None,
                personalized_first_line: None,
                personalized_body: None,
            })
        })
        .await
    }

    pub(super) async fn get_prospect_email_impl(
        &self,
        prospect_id: ProspectId,
    ) -> Result<Option<ProspectEmail>, RepositoryError> {
        self.with_conn("get_prospect_email", move |conn| {
            load_email(conn, prospect_id)
        })
        .await
    }

    pub(super) async fn create_generated_message_impl(
        &self,
        prospect_id: ProspectId,
        message_type: GeneratedMessageType,
        message_status: GeneratedMessageStatus,
        completion: &str,
    ) -> Result<GeneratedMessage, RepositoryError> {
        let completion = completion.to_string();
        self.with_conn("create_generated_message", move |conn| {
            conn.execute(
                "INSERT INTO generated_message (prospect_id, message_type, message_status, completion)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    prospect_id.0,
                    message_type.as_str(),
                    message_status.as_str(),
                    completion
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    RepositoryError::not_found("prospect", prospect_id.0)
                }
                other => sql_err("create_generated_message")(other),
            })?;
            Ok(GeneratedMessage {
                id: MessageId(conn.last_insert_rowid()),
                prospect_id,
                message_type,
                message_status,
                completion,
            })
        })
        .await
    }

    pub(super) async fn get_generated_message_impl(
        &self,
        id: MessageId,
    ) -> Result<Option<GeneratedMessage>, RepositoryError> {
        self.with_conn("get_generated_message", move |conn| {
            conn.query_row(
                "SELECT id, prospect_id, message_type, message_status, completion
                 FROM generated_message WHERE id = ?1",
                params![id.0],
                message_from_row,
            )
            .optional()
            .map_err(sql_err("get_generated_message"))
        })
        .await
    }

    pub(super) async fn approve_linkedin_message_impl(
        &self,
        prospect_id: ProspectId,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        self.with_conn("approve_linkedin_message", move |conn| {
            if !message_exists(conn, message_id)? {
                return Err(RepositoryError::not_found("generated_message", message_id.0));
            }
            let updated = conn
                .execute(
                    "UPDATE prospect SET approved_outreach_message_id = ?1, version = version + 1
                     WHERE id = ?2",
                    params![message_id.0, prospect_id.0],
                )
                .map_err(sql_err("approve_linkedin_message"))?;
            if updated == 0 {
                return Err(RepositoryError::not_found("prospect", prospect_id.0));
            }
            Ok(())
        })
        .await
    }

    pub(super) async fn set_email_slot_impl(
        &self,
        prospect_id: ProspectId,
        slot: EmailSlot,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        let column = match slot {
            EmailSlot::SubjectLine => "personalized_subject_line",
            EmailSlot::FirstLine => "personalized_first_line",
            EmailSlot::Body => "personalized_body",
        };
        self.with_conn("set_email_slot", move |conn| {
            if !message_exists(conn, message_id)? {
                return Err(RepositoryError::not_found("generated_message", message_id.0));
            }
            let updated = conn
                .execute(
                    &format!(
                        "UPDATE prospect_email SET {} = ?1 WHERE prospect_id = ?2",
                        column
                    ),
                    params![message_id.0, prospect_id.0],
                )
                .map_err(sql_err("set_email_slot"))?;
            if updated == 0 {
                return Err(RepositoryError::not_found("prospect_email", prospect_id.0));
            }
            Ok(())
        })
        .await
    }

    pub(super) async fn block_linkedin_message_impl(
        &self,
        prospect_id: ProspectId,
    ) -> Result<BlockOutcome, RepositoryError> {
        self.with_conn("block_linkedin_message", move |conn| {
            let tx = conn
                .transaction()
                .map_err(sql_err("block_linkedin_message"))?;
            let blocked = block_linkedin_in(&tx, prospect_id)?;
            tx.commit().map_err(sql_err("block_linkedin_message"))?;
            Ok(BlockOutcome { blocked })
        })
        .await
    }

    pub(super) async fn block_email_messages_impl(
        &self,
        prospect_id: ProspectId,
    ) -> Result<BlockOutcome, RepositoryError> {
        self.with_conn("block_email_messages", move |conn| {
            let tx = conn
                .transaction()
                .map_err(sql_err("block_email_messages"))?;
            let blocked = block_email_in(&tx, prospect_id)?;
            tx.commit().map_err(sql_err("block_email_messages"))?;
            Ok(BlockOutcome { blocked })
        })
        .await
    }
}
