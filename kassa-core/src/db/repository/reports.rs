//! Closing Report Repository (`reports` table)

use super::parse_timestamp;
use crate::db::{DbError, DbResult};
use chrono::NaiveDateTime;
use shared::models::{ClosingKind, ClosingRecord, ReportSection};
use shared::util::format_ts;
use sqlx::SqliteConnection;

/// Header shared by all text lines of one closing
#[derive(Debug, Clone)]
pub struct ReportHeader<'a> {
    pub receipt_num: i64,
    pub timestamp: &'a NaiveDateTime,
    pub timestamp_from: &'a NaiveDateTime,
    pub curfew: &'a str,
    pub kind: ClosingKind,
}

pub async fn insert_lines(
    conn: &mut SqliteConnection,
    header: &ReportHeader<'_>,
    lines: &[(ReportSection, String)],
) -> DbResult<()> {
    let to = format_ts(header.timestamp);
    let from = format_ts(header.timestamp_from);
    for (section, text) in lines {
        sqlx::query(
            r#"
            INSERT INTO reports (receiptNum, timestamp, timestampfrom, curfew, text, type, kind)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(header.receipt_num)
        .bind(&to)
        .bind(&from)
        .bind(header.curfew)
        .bind(text)
        .bind(section.code())
        .bind(header.kind.code())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn count(conn: &mut SqliteConnection) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reports")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0)
}

/// Whether a closing of `kind` overlapping `[from, to]` already exists
pub async fn exists_overlapping(
    conn: &mut SqliteConnection,
    kind: ClosingKind,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> DbResult<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM reports WHERE kind = ? AND timestampfrom <= ? AND timestamp >= ?",
    )
    .bind(kind.code())
    .bind(format_ts(to))
    .bind(format_ts(from))
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.0 > 0)
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    #[sqlx(rename = "receiptNum")]
    receipt_num: i64,
    timestamp: String,
    timestampfrom: String,
    curfew: String,
    text: String,
    #[sqlx(rename = "type")]
    section: i64,
    kind: i64,
}

fn rows_to_record(rows: Vec<ReportRow>) -> DbResult<Option<ClosingRecord>> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let kind = ClosingKind::from_code(first.kind).ok_or_else(|| {
        DbError::Corrupt(format!("report {} has kind {}", first.receipt_num, first.kind))
    })?;
    let mut record = ClosingRecord {
        receipt_num: first.receipt_num,
        timestamp: parse_timestamp("reports.timestamp", &first.timestamp)?,
        timestamp_from: parse_timestamp("reports.timestampfrom", &first.timestampfrom)?,
        curfew: first.curfew.clone(),
        kind,
        lines: Vec::with_capacity(rows.len()),
    };
    record.lines = rows
        .into_iter()
        .map(|row| (ReportSection::from_code(row.section), row.text))
        .collect();
    Ok(Some(record))
}

pub async fn load_closing(conn: &mut SqliteConnection, receipt_num: i64) -> DbResult<Option<ClosingRecord>> {
    let rows: Vec<ReportRow> = sqlx::query_as(
        "SELECT receiptNum, timestamp, timestampfrom, curfew, text, type, kind FROM reports WHERE receiptNum = ? ORDER BY id",
    )
    .bind(receipt_num)
    .fetch_all(&mut *conn)
    .await?;
    rows_to_record(rows)
}

/// Most recent closing of a kind
pub async fn last_closing(conn: &mut SqliteConnection, kind: ClosingKind) -> DbResult<Option<ClosingRecord>> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT receiptNum FROM reports WHERE kind = ? ORDER BY receiptNum DESC LIMIT 1")
            .bind(kind.code())
            .fetch_optional(&mut *conn)
            .await?;
    match row {
        Some((receipt_num,)) => load_closing(conn, receipt_num).await,
        None => Ok(None),
    }
}
