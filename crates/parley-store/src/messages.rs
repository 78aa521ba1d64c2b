use chrono::{DateTime, Local};
use rusqlite::params;

use parley_shared::MessageKind;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{MessageStatus, StoredMessage};

/// The persistence contract the router consumes.
///
/// Implemented by [`Database`]; tests substitute recording fakes.
pub trait MessageStore: Send + Sync {
    /// Record a message durably. Idempotent by uuid: writing an id that
    /// already exists succeeds without modifying the stored row.
    fn write_message(&self, message: &StoredMessage) -> Result<()>;

    /// Transition a message to Sent once it reached at least one wire.
    fn mark_sent(&self, uuid: &str) -> Result<()>;

    /// Ordered member list of a group. `NotFound` when the group does not
    /// exist.
    fn load_group_members(&self, group_id: &str) -> Result<Vec<String>>;
}

impl MessageStore for Database {
    fn write_message(&self, message: &StoredMessage) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO messages
                 (uuid, session_id, type, content, url,
                  send_id, send_name, send_avatar, receive_id,
                  file_size, file_type, file_name, status, created_at, av_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                message.uuid,
                message.session_id,
                message.kind.code(),
                message.content,
                message.url,
                message.send_id,
                message.send_name,
                message.send_avatar,
                message.receive_id,
                message.file_size,
                message.file_type,
                message.file_name,
                message.status.code(),
                message.created_at.to_rfc3339(),
                message.av_data,
            ],
        )?;
        Ok(())
    }

    fn mark_sent(&self, uuid: &str) -> Result<()> {
        // Zero affected rows is fine: the message may have been pruned.
        self.conn().execute(
            "UPDATE messages SET status = ?1 WHERE uuid = ?2",
            params![MessageStatus::Sent.code(), uuid],
        )?;
        Ok(())
    }

    fn load_group_members(&self, group_id: &str) -> Result<Vec<String>> {
        self.get_group(group_id).map(|group| group.members)
    }
}

impl Database {
    pub fn get_message(&self, uuid: &str) -> Result<StoredMessage> {
        self.conn()
            .query_row(
                "SELECT uuid, session_id, type, content, url,
                        send_id, send_name, send_avatar, receive_id,
                        file_size, file_type, file_name, status, created_at, av_data
                 FROM messages WHERE uuid = ?1",
                params![uuid],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Messages exchanged between two users, oldest first. Feeds the
    /// conversation-list read path that repopulates a cold cache.
    pub fn messages_for_pair(&self, send_id: &str, receive_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT uuid, session_id, type, content, url,
                    send_id, send_name, send_avatar, receive_id,
                    file_size, file_type, file_name, status, created_at, av_data
             FROM messages
             WHERE (send_id = ?1 AND receive_id = ?2)
                OR (send_id = ?2 AND receive_id = ?1)
             ORDER BY created_at",
        )?;

        let rows = stmt.query_map(params![send_id, receive_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Messages addressed to a group, oldest first.
    pub fn messages_for_group(&self, group_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT uuid, session_id, type, content, url,
                    send_id, send_name, send_avatar, receive_id,
                    file_size, file_type, file_name, status, created_at, av_data
             FROM messages
             WHERE receive_id = ?1
             ORDER BY created_at",
        )?;

        let rows = stmt.query_map(params![group_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let kind_code: u8 = row.get(2)?;
    let kind = MessageKind::from_code(kind_code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Integer,
            format!("unknown message type {kind_code}").into(),
        )
    })?;

    let status_code: u8 = row.get(12)?;
    let status = MessageStatus::from_code(status_code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            12,
            rusqlite::types::Type::Integer,
            format!("unknown message status {status_code}").into(),
        )
    })?;

    let ts_str: String = row.get(13)?;
    let created_at: DateTime<Local> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StoredMessage {
        uuid: row.get(0)?,
        session_id: row.get(1)?,
        kind,
        content: row.get(3)?,
        url: row.get(4)?,
        send_id: row.get(5)?,
        send_name: row.get(6)?,
        send_avatar: row.get(7)?,
        receive_id: row.get(8)?,
        file_size: row.get(9)?,
        file_type: row.get(10)?,
        file_name: row.get(11)?,
        status,
        created_at,
        av_data: row.get(14)?,
    })
}
