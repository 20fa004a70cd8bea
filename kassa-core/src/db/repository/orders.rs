//! Order Line Repository

use super::{parse_decimal, parse_timestamp};
use crate::db::{DbError, DbResult};
use chrono::NaiveDateTime;
use shared::models::{OrderLine, PayedBy};
use shared::util::format_ts;
use sqlx::SqliteConnection;

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    product: String,
    #[sqlx(rename = "productGroup")]
    product_group: Option<String>,
    count: String,
    gross: String,
    tax: String,
    discount: String,
}

impl TryFrom<OrderRow> for OrderLine {
    type Error = DbError;

    fn try_from(row: OrderRow) -> DbResult<Self> {
        Ok(OrderLine {
            product: row.product,
            product_group: row.product_group,
            count: parse_decimal("orders.count", &row.count)?,
            gross: parse_decimal("orders.gross", &row.gross)?,
            tax: parse_decimal("orders.tax", &row.tax)?,
            discount: parse_decimal("orders.discount", &row.discount)?,
        })
    }
}

pub async fn insert(conn: &mut SqliteConnection, receipt_id: i64, line: &OrderLine) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (receiptId, product, productGroup, count, gross, tax, discount)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(receipt_id)
    .bind(&line.product)
    .bind(line.product_group.as_deref())
    .bind(line.count.to_string())
    .bind(line.gross.to_string())
    .bind(line.tax.to_string())
    .bind(line.discount.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn for_receipt(conn: &mut SqliteConnection, receipt_id: i64) -> DbResult<Vec<OrderLine>> {
    let rows: Vec<OrderRow> = sqlx::query_as(
        "SELECT product, productGroup, count, gross, tax, discount FROM orders WHERE receiptId = ? ORDER BY id",
    )
    .bind(receipt_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(OrderLine::try_from).collect()
}

/// An order line of a sale together with its receipt's attributes
#[derive(Debug, Clone)]
pub struct SaleLine {
    pub receipt_num: i64,
    pub timestamp: NaiveDateTime,
    pub payed_by: PayedBy,
    pub user_id: Option<String>,
    pub line: OrderLine,
}

#[derive(Debug, sqlx::FromRow)]
struct SaleLineRow {
    #[sqlx(rename = "receiptNum")]
    receipt_num: i64,
    timestamp: String,
    #[sqlx(rename = "payedBy")]
    payed_by: i64,
    #[sqlx(rename = "userId")]
    user_id: Option<String>,
    #[sqlx(flatten)]
    order: OrderRow,
}

/// Order lines of all finalized sales with `from <= timestamp <= to`
pub async fn sale_lines_in_window(
    conn: &mut SqliteConnection,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> DbResult<Vec<SaleLine>> {
    let rows: Vec<SaleLineRow> = sqlx::query_as(
        r#"
        SELECT r.receiptNum, r.timestamp, r.payedBy, r.userId,
               o.product, o.productGroup, o.count, o.gross, o.tax, o.discount
        FROM orders o
        JOIN receipts r ON r.id = o.receiptId
        WHERE r.receiptNum IS NOT NULL
          AND r.payedBy IN (0, 1, 2)
          AND r.timestamp >= ? AND r.timestamp <= ?
        ORDER BY r.receiptNum, o.id
        "#,
    )
    .bind(format_ts(from))
    .bind(format_ts(to))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let payed_by = PayedBy::from_code(row.payed_by).ok_or_else(|| {
                DbError::Corrupt(format!("receipt {} has payedBy {}", row.receipt_num, row.payed_by))
            })?;
            Ok(SaleLine {
                receipt_num: row.receipt_num,
                timestamp: parse_timestamp("receipts.timestamp", &row.timestamp)?,
                payed_by,
                user_id: row.user_id,
                line: OrderLine::try_from(row.order)?,
            })
        })
        .collect()
}
