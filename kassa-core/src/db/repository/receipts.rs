//! Receipt Repository

use super::{parse_decimal, parse_timestamp};
use crate::db::{DbError, DbResult};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use shared::models::{PayedBy, Receipt, StornoState};
use shared::util::format_ts;
use sqlx::SqliteConnection;

const SALE_CODES: &str = "(0, 1, 2)";

#[derive(Debug, sqlx::FromRow)]
struct ReceiptRow {
    id: i64,
    #[sqlx(rename = "receiptNum")]
    receipt_num: Option<i64>,
    timestamp: String,
    #[sqlx(rename = "payedBy")]
    payed_by: Option<i64>,
    gross: String,
    net: String,
    storno: i64,
    #[sqlx(rename = "stornoId")]
    storno_id: i64,
    #[sqlx(rename = "userId")]
    user_id: Option<String>,
    signature: Option<String>,
}

impl TryFrom<ReceiptRow> for Receipt {
    type Error = DbError;

    fn try_from(row: ReceiptRow) -> DbResult<Self> {
        let receipt_num = row
            .receipt_num
            .ok_or_else(|| DbError::Corrupt(format!("receipt {} is not finalized", row.id)))?;
        let payed_by = row
            .payed_by
            .and_then(PayedBy::from_code)
            .ok_or_else(|| DbError::Corrupt(format!("receipt {receipt_num} has no valid payedBy")))?;

        Ok(Receipt {
            id: row.id,
            receipt_num,
            timestamp: parse_timestamp("receipts.timestamp", &row.timestamp)?,
            payed_by,
            gross: parse_decimal("receipts.gross", &row.gross)?,
            net: parse_decimal("receipts.net", &row.net)?,
            storno: StornoState::from_code(row.storno),
            storno_id: row.storno_id,
            user_id: row.user_id,
            signature: row.signature.unwrap_or_default(),
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, receiptNum, timestamp, payedBy, gross, net, storno, stornoId, userId, signature FROM receipts";

/// Insert a pending receipt (no number, type or signature yet)
pub async fn insert_pending(
    conn: &mut SqliteConnection,
    timestamp: &NaiveDateTime,
    user_id: Option<&str>,
) -> DbResult<i64> {
    let row: (i64,) =
        sqlx::query_as("INSERT INTO receipts (timestamp, userId) VALUES (?, ?) RETURNING id")
            .bind(format_ts(timestamp))
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(row.0)
}

/// Values written when a pending receipt is finalized
#[derive(Debug, Clone)]
pub struct FinalizeRow<'a> {
    pub receipt_num: i64,
    pub timestamp: &'a NaiveDateTime,
    pub payed_by: PayedBy,
    pub gross: Decimal,
    pub net: Decimal,
    pub signature: &'a str,
}

pub async fn finalize(conn: &mut SqliteConnection, id: i64, row: &FinalizeRow<'_>) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE receipts
        SET receiptNum = ?, timestamp = ?, payedBy = ?, gross = ?, net = ?, signature = ?
        WHERE id = ? AND receiptNum IS NULL
        "#,
    )
    .bind(row.receipt_num)
    .bind(format_ts(row.timestamp))
    .bind(row.payed_by.code())
    .bind(row.gross.to_string())
    .bind(row.net.to_string())
    .bind(row.signature)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(DbError::NotFound(format!("pending receipt {id}")));
    }
    Ok(())
}

pub async fn set_storno(
    conn: &mut SqliteConnection,
    id: i64,
    storno: StornoState,
    storno_id: i64,
) -> DbResult<()> {
    sqlx::query("UPDATE receipts SET storno = ?, stornoId = ? WHERE id = ?")
        .bind(storno.code())
        .bind(storno_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Most recent finalized receipt
pub async fn last_finalized(conn: &mut SqliteConnection) -> DbResult<Option<Receipt>> {
    let row: Option<ReceiptRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE receiptNum IS NOT NULL ORDER BY receiptNum DESC LIMIT 1"
    ))
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Receipt::try_from).transpose()
}

pub async fn find_by_num(conn: &mut SqliteConnection, receipt_num: i64) -> DbResult<Option<Receipt>> {
    let row: Option<ReceiptRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE receiptNum = ?"))
        .bind(receipt_num)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Receipt::try_from).transpose()
}

/// All finalized receipts in chain order
pub async fn all_finalized(conn: &mut SqliteConnection) -> DbResult<Vec<Receipt>> {
    let rows: Vec<ReceiptRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE receiptNum IS NOT NULL ORDER BY receiptNum ASC"
    ))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Receipt::try_from).collect()
}

/// Finalized sales with `from <= timestamp <= to`
pub async fn sales_in_window(
    conn: &mut SqliteConnection,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> DbResult<Vec<Receipt>> {
    let rows: Vec<ReceiptRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE receiptNum IS NOT NULL AND payedBy IN {SALE_CODES} \
         AND timestamp >= ? AND timestamp <= ? ORDER BY receiptNum ASC"
    ))
    .bind(format_ts(from))
    .bind(format_ts(to))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Receipt::try_from).collect()
}

/// Gross turnover of sales in a window (storno receipts included, negative)
pub async fn turnover_in_window(
    conn: &mut SqliteConnection,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> DbResult<Decimal> {
    Ok(sales_in_window(conn, from, to)
        .await?
        .iter()
        .map(|r| r.gross)
        .sum())
}

pub async fn count_finalized(conn: &mut SqliteConnection) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM receipts WHERE receiptNum IS NOT NULL")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0)
}
