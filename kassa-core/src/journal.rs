//! Journal (Kassenjournal)
//!
//! Append-only log of every receipt position, receipt summary and report
//! line. There is no update or delete API and the schema rejects both.
//! Writes are best-effort: a failure is logged and swallowed so it can never
//! undo an already committed receipt.

use crate::db::repository::journal as repo;
use crate::db::{DbResult, DbService};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use shared::models::{JournalLine, OrderLine, Receipt, TaxBracket, TaxBracketSums};
use shared::money::format_amount;
use shared::util::{format_ts, now_local};

pub const JOURNAL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the journal records about one finalized receipt
#[derive(Debug, Clone)]
pub struct ReceiptJournalData<'a> {
    pub receipt: &'a Receipt,
    pub lines: &'a [OrderLine],
    pub sums: &'a TaxBracketSums,
    /// Free text, e.g. the voided receipt of a storno
    pub comment: String,
    /// Gross turnover of the calendar year up to and including this receipt
    pub year_turnover: Decimal,
}

#[derive(Clone)]
pub struct Journal {
    db: DbService,
    cash_register_id: String,
}

impl Journal {
    pub fn new(db: DbService, cash_register_id: impl Into<String>) -> Self {
        Self {
            db,
            cash_register_id: cash_register_id.into(),
        }
    }

    fn line(&self, title: &str, text: &str, at: &NaiveDateTime, user_id: Option<&str>) -> JournalLine {
        JournalLine {
            version: JOURNAL_VERSION.to_string(),
            cash_register_id: self.cash_register_id.clone(),
            datetime: format_ts(at),
            text: format!("{title}\t{text}\t{}", format_ts(at)),
            user_id: user_id.map(str::to_string),
        }
    }

    async fn write_all(&self, lines: &[JournalLine]) -> DbResult<()> {
        let mut tx = self.db.pool.begin().await?;
        for line in lines {
            repo::insert(&mut *tx, line).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn write(&self, lines: &[JournalLine]) {
        if let Err(e) = self.write_all(lines).await {
            tracing::error!(error = %e, lines = lines.len(), "Journal write failed");
        }
    }

    /// `title\ttext\t<datetime>`
    pub async fn insert_line(&self, title: &str, text: &str, user_id: Option<&str>) {
        let line = self.line(title, text, &now_local(), user_id);
        self.write(std::slice::from_ref(&line)).await;
    }

    /// One "Produktposition" per order line plus the receipt summary
    pub async fn insert_receipt_lines(&self, data: &ReceiptJournalData<'_>) {
        let now = now_local();
        let receipt = data.receipt;
        let user = receipt.user_id.as_deref();

        let mut lines: Vec<JournalLine> = data
            .lines
            .iter()
            .map(|l| {
                let text = format!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    l.count,
                    l.product,
                    format_amount(l.gross),
                    format_amount(l.total()),
                    l.tax.normalize(),
                    l.discount.normalize(),
                );
                self.line("Produktposition", &text, &now, user)
            })
            .collect();

        let sums: Vec<String> = TaxBracket::ALL
            .iter()
            .map(|b| format!("{}: {}", b.label(), format_amount(data.sums.get(*b))))
            .collect();
        let summary = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\tJahresumsatz: {}",
            receipt.payed_by.action_text(),
            receipt.payed_by.code(),
            data.comment,
            receipt.receipt_num,
            format_ts(&receipt.timestamp),
            sums.join("\t"),
            format_amount(data.year_turnover),
        );
        lines.push(self.line("Beleg", &summary, &now, user));

        self.write(&lines).await;
    }

    /// One "Textposition" per report line
    pub async fn insert_report_lines(&self, report_lines: &[String], user_id: Option<&str>) {
        let now = now_local();
        let lines: Vec<JournalLine> = report_lines
            .iter()
            .map(|text| self.line("Textposition", text, &now, user_id))
            .collect();
        self.write(&lines).await;
    }

    /// Newest lines first
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<JournalLine>> {
        let mut conn = self.db.pool.acquire().await?;
        repo::recent(&mut *conn, limit).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let mut conn = self.db.pool.acquire().await?;
        repo::count(&mut *conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{PayedBy, StornoState};
    use std::str::FromStr;

    async fn journal() -> Journal {
        Journal::new(DbService::in_memory().await.unwrap(), "KASSE-01")
    }

    #[tokio::test]
    async fn test_insert_line_format() {
        let journal = journal().await;
        journal.insert_line("Anmeldung", "Benutzer anna", Some("anna")).await;

        let lines = journal.recent(10).await.unwrap();
        assert_eq!(lines.len(), 1);
        let parts: Vec<&str> = lines[0].text.split('\t').collect();
        assert_eq!(parts[0], "Anmeldung");
        assert_eq!(parts[1], "Benutzer anna");
        assert_eq!(parts[2], lines[0].datetime);
        assert_eq!(lines[0].cash_register_id, "KASSE-01");
        assert_eq!(lines[0].user_id.as_deref(), Some("anna"));
    }

    #[tokio::test]
    async fn test_receipt_lines() {
        let journal = journal().await;
        let d = |s: &str| Decimal::from_str(s).unwrap();
        let lines = vec![
            OrderLine::new("Melange", d("2"), d("3.80"), d("10")),
            OrderLine::new("Spritzer", d("1"), d("3.20"), d("20")),
        ];
        let mut sums = TaxBracketSums::default();
        sums.add(TaxBracket::Reduced1, d("7.60"));
        sums.add(TaxBracket::Normal, d("3.20"));
        let receipt = Receipt {
            id: 1,
            receipt_num: 17,
            timestamp: shared::util::parse_ts("2024-04-01T12:00:00").unwrap(),
            payed_by: PayedBy::Cash,
            gross: d("10.80"),
            net: d("9.58"),
            storno: StornoState::None,
            storno_id: 0,
            user_id: None,
            signature: String::new(),
        };

        journal
            .insert_receipt_lines(&ReceiptJournalData {
                receipt: &receipt,
                lines: &lines,
                sums: &sums,
                comment: String::new(),
                year_turnover: d("10.80"),
            })
            .await;

        let recent = journal.recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].text.starts_with("Beleg\tBar\t0\t\t17\t"));
        assert!(recent[0].text.contains("Satz-Ermaessigt-1: 7,60"));
        assert!(recent[0].text.contains("Jahresumsatz: 10,80"));
        assert!(recent[2].text.starts_with("Produktposition\t2\tMelange\t3,80\t7,60"));
    }

    #[tokio::test]
    async fn test_journal_is_append_only() {
        let journal = journal().await;
        journal.insert_report_lines(&["Summe: 1,00".into()], None).await;

        let update = sqlx::query("UPDATE journal SET text = 'x'")
            .execute(&journal.db.pool)
            .await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM journal").execute(&journal.db.pool).await;
        assert!(delete.is_err());
        assert_eq!(journal.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let journal = journal().await;
        journal.db.pool.close().await;
        // must not panic or return an error
        journal.insert_line("Test", "nach dem Schliessen", None).await;
    }
}
