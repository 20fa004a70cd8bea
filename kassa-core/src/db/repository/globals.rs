//! Globals Repository (`globals` key/value table)

use crate::db::{DbError, DbResult};
use sqlx::SqliteConnection;

pub const LAST_RECEIPT_NUM: &str = "lastReceiptNum";
pub const CURFEW: &str = "curfew";
pub const CASH_REGISTER_ID: &str = "cashRegisterId";

/// Take the database write lock for the current transaction
///
/// Issued as the first statement of a writing transaction so concurrent
/// writers queue on `busy_timeout` instead of failing on lock upgrade.
pub async fn acquire_write_lock(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("UPDATE globals SET value = value WHERE name = ?")
        .bind(LAST_RECEIPT_NUM)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Allocate the next receipt number
pub async fn next_receipt_num(conn: &mut SqliteConnection) -> DbResult<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        "UPDATE globals SET value = COALESCE(value, 0) + 1 WHERE name = ? RETURNING value",
    )
    .bind(LAST_RECEIPT_NUM)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|(n,)| n)
        .ok_or_else(|| DbError::NotFound(format!("globals.{LAST_RECEIPT_NUM}")))
}

pub async fn last_receipt_num(conn: &mut SqliteConnection) -> DbResult<i64> {
    let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT value FROM globals WHERE name = ?")
        .bind(LAST_RECEIPT_NUM)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

pub async fn get_string(conn: &mut SqliteConnection, name: &str) -> DbResult<Option<String>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT strValue FROM globals WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.and_then(|(v,)| v))
}

pub async fn set_string(conn: &mut SqliteConnection, name: &str, value: &str) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO globals (name, strValue) VALUES (?, ?)
        ON CONFLICT(name) DO UPDATE SET strValue = excluded.strValue
        "#,
    )
    .bind(name)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Store `value` unless the key already holds one; returns the effective value
pub async fn seed_string(conn: &mut SqliteConnection, name: &str, value: &str) -> DbResult<String> {
    match get_string(conn, name).await? {
        Some(existing) => Ok(existing),
        None => {
            set_string(conn, name, value).await?;
            Ok(value.to_string())
        }
    }
}
