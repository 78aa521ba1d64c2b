use chrono::{DateTime, Local};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Group;

impl Database {
    /// Insert or replace a group. Membership is stored as a JSON array
    /// inside a TEXT column; callers never see the encoding.
    pub fn upsert_group(&self, group: &Group) -> Result<()> {
        let members = serde_json::to_string(&group.members)?;
        self.conn().execute(
            "INSERT INTO groups (uuid, name, members, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(uuid) DO UPDATE SET
                 name = excluded.name,
                 members = excluded.members",
            params![
                group.uuid,
                group.name,
                members,
                group.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_group(&self, uuid: &str) -> Result<Group> {
        self.conn()
            .query_row(
                "SELECT uuid, name, members, created_at FROM groups WHERE uuid = ?1",
                params![uuid],
                row_to_group,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn delete_group(&self, uuid: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM groups WHERE uuid = ?1", params![uuid])?;
        Ok(affected > 0)
    }
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let members_json: String = row.get(2)?;
    let members: Vec<String> = serde_json::from_str(&members_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let ts_str: String = row.get(3)?;
    let created_at: DateTime<Local> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Group {
        uuid: row.get(0)?,
        name: row.get(1)?,
        members,
        created_at,
    })
}
