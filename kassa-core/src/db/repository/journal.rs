//! Journal Repository (append-only)

use crate::db::DbResult;
use shared::models::JournalLine;
use sqlx::SqliteConnection;

pub async fn insert(conn: &mut SqliteConnection, line: &JournalLine) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO journal (version, cashregisterid, datetime, text, userId) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&line.version)
    .bind(&line.cash_register_id)
    .bind(&line.datetime)
    .bind(&line.text)
    .bind(line.user_id.as_deref())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Newest lines first
pub async fn recent(conn: &mut SqliteConnection, limit: i64) -> DbResult<Vec<JournalLine>> {
    let rows: Vec<JournalLine> = sqlx::query_as(
        "SELECT version, cashregisterid, datetime, text, userId FROM journal ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn count(conn: &mut SqliteConnection) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM journal")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0)
}
