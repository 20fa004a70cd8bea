//! Closing Engine (日结 / 月结)
//!
//! - **due**: business day arithmetic and the due-closing decision
//! - **stats**: report text lines of a closing window
//! - **tracker**: in-process closing phases
//!
//! A closing is one transaction: report receipt, report lines and (month
//! closings with an active signature device) the null receipt are committed
//! together or not at all.

pub mod due;
pub mod stats;
pub mod tracker;

pub use due::{ClosingWindow, DueClosings, business_day, compute_due_closings};
pub use tracker::{ClosingPhase, ClosingTracker};

use crate::collaborators::{BackupError, BackupService, DepExporter, DocumentPrinter, ReportDocument};
use crate::db::repository::reports::{self, ReportHeader};
use crate::db::repository::{globals, receipts};
use crate::db::{DbError, DbResult, DbService};
use crate::receipts::{ChainError, ChainWriter, FinalizedReceipt, PendingReceipt};
use crate::signature::SignatureModule;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use due::{closable_day, closable_month, day_closed_at, month_of};
use serde::Serialize;
use shared::ErrorCode;
use shared::models::{ClosingKind, ClosingRecord, PayedBy, Receipt};
use shared::util::format_curfew;
use sqlx::SqliteConnection;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClosingError {
    #[error("Closing required: {0}")]
    ClosingRequired(String),

    #[error("Business day {0} is already closed")]
    DayAlreadyClosed(NaiveDate),

    #[error("Day closing for {0} must be created before the month closing")]
    DayClosingRequired(NaiveDate),

    #[error("Nothing to close")]
    NothingToClose,

    #[error("Closing already exists: {0}")]
    AlreadyClosed(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("No closing report for receipt {0}")]
    ReportNotFound(i64),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for ClosingError {
    fn from(e: sqlx::Error) -> Self {
        Self::Db(DbError::from(e))
    }
}

impl ClosingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ClosingRequired(_) => ErrorCode::ClosingRequired,
            Self::DayAlreadyClosed(_) => ErrorCode::DayAlreadyClosed,
            Self::DayClosingRequired(_) => ErrorCode::DayClosingRequired,
            Self::NothingToClose | Self::AlreadyClosed(_) => ErrorCode::NothingToClose,
            Self::ConcurrencyConflict(_) => ErrorCode::ConcurrencyConflict,
            Self::ReportNotFound(_) => ErrorCode::NotFound,
            Self::Chain(e) => e.code(),
            Self::Backup(e) => e.code(),
            Self::Db(e) => e.code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrencyConflict(_) => true,
            Self::Chain(e) => e.is_retryable(),
            Self::Backup(e) => e.is_retryable(),
            Self::Db(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type ClosingResult<T> = Result<T, ClosingError>;

/// Result of the DEP export that follows a month closing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ExportOutcome {
    /// Day closing, or no signature device
    Skipped,
    Exported { receipts: usize },
    /// The closing is committed regardless; the operator must export manually
    Failed { reason: String },
}

/// A committed closing
#[derive(Debug, Clone)]
pub struct ClosingOutcome {
    pub window: ClosingWindow,
    pub report: FinalizedReceipt,
    pub record: ClosingRecord,
    /// Month / year null receipt
    pub null_receipt: Option<FinalizedReceipt>,
    pub export: ExportOutcome,
}

#[derive(Clone)]
pub struct ClosingEngine {
    db: DbService,
    writer: ChainWriter,
    backup: Arc<dyn BackupService>,
    exporter: Arc<dyn DepExporter>,
    printer: Arc<dyn DocumentPrinter>,
    curfew: NaiveTime,
    auto_day_before_month: bool,
    report_by_product_group: bool,
    tracker: ClosingTracker,
}

impl ClosingEngine {
    pub fn new(
        db: DbService,
        writer: ChainWriter,
        backup: Arc<dyn BackupService>,
        exporter: Arc<dyn DepExporter>,
        printer: Arc<dyn DocumentPrinter>,
        curfew: NaiveTime,
        auto_day_before_month: bool,
    ) -> Self {
        Self {
            db,
            writer,
            backup,
            exporter,
            printer,
            curfew,
            auto_day_before_month,
            report_by_product_group: false,
            tracker: ClosingTracker::new(),
        }
    }

    /// Print product groups instead of single products
    pub fn with_product_group_report(mut self, enabled: bool) -> Self {
        self.report_by_product_group = enabled;
        self
    }

    pub fn curfew(&self) -> NaiveTime {
        self.curfew
    }

    pub fn phase(&self, kind: ClosingKind) -> ClosingPhase {
        self.tracker.phase(kind)
    }

    async fn last_receipt(&self) -> DbResult<Option<Receipt>> {
        let mut conn = self.db.pool.acquire().await?;
        receipts::last_finalized(&mut *conn).await
    }

    /// Stored report of the closing receipt `receipt_num`
    pub async fn closing_record(&self, receipt_num: i64) -> ClosingResult<Option<ClosingRecord>> {
        let mut conn = self.db.pool.acquire().await?;
        Ok(reports::load_closing(&mut *conn, receipt_num).await?)
    }

    /// Most recent stored closing of `kind`
    pub async fn last_closing(&self, kind: ClosingKind) -> ClosingResult<Option<ClosingRecord>> {
        let mut conn = self.db.pool.acquire().await?;
        Ok(reports::last_closing(&mut *conn, kind).await?)
    }

    /// Print a stored closing again (Nachdruck)
    pub async fn reprint(&self, receipt_num: i64) -> ClosingResult<ClosingRecord> {
        let record = self
            .closing_record(receipt_num)
            .await?
            .ok_or(ClosingError::ReportNotFound(receipt_num))?;
        let doc = ReportDocument {
            record,
            by_product_group: self.report_by_product_group,
        };
        if let Err(e) = self.printer.print_report(&doc).await {
            tracing::warn!(receipt_num, error = %e, "Report reprint failed");
        }
        tracing::info!(receipt_num, kind = doc.record.kind.title(), "Closing reprinted");
        Ok(doc.record)
    }

    /// Closings required at `check`
    pub async fn due_closings(&self, check: &NaiveDateTime) -> ClosingResult<DueClosings> {
        let last = self.last_receipt().await?;
        let due = compute_due_closings(last.as_ref(), check, self.curfew);
        self.tracker.refresh(&due);
        Ok(due)
    }

    /// Refuse a sale while a closing is due or the business day is closed
    pub async fn ensure_sale_allowed(&self, check: &NaiveDateTime) -> ClosingResult<()> {
        let last = self.last_receipt().await?;
        let due = compute_due_closings(last.as_ref(), check, self.curfew);
        self.tracker.refresh(&due);

        if let Some(window) = due.next() {
            return Err(ClosingError::ClosingRequired(format!(
                "{} for {}",
                window.kind.title(),
                window.period
            )));
        }
        if day_closed_at(last.as_ref(), check, self.curfew) {
            return Err(ClosingError::DayAlreadyClosed(business_day(check, self.curfew)));
        }
        Ok(())
    }

    /// Close the business day of the most recent receipt
    pub async fn end_of_day(&self, check: &NaiveDateTime) -> ClosingResult<ClosingOutcome> {
        let last = self.last_receipt().await?;
        let day = closable_day(last.as_ref(), self.curfew)
            .filter(|day| *day <= business_day(check, self.curfew))
            .ok_or(ClosingError::NothingToClose)?;
        self.do_end_of_day(ClosingWindow::day(day, self.curfew)).await
    }

    /// Close the month of the most recent receipt, then every earlier month still due
    ///
    /// Closings already committed stay committed when a later one fails.
    pub async fn end_of_month(&self, check: &NaiveDateTime) -> ClosingResult<Vec<ClosingOutcome>> {
        let check_month = month_of(business_day(check, self.curfew));
        let mut outcomes = Vec::new();

        let last = self.last_receipt().await?;
        if let Some(day) = closable_day(last.as_ref(), self.curfew) {
            if !self.auto_day_before_month {
                return Err(ClosingError::DayClosingRequired(day));
            }
            tracing::info!(business_day = %day, "Closing the business day before the month");
            outcomes.push(self.do_end_of_day(ClosingWindow::day(day, self.curfew)).await?);
        }

        let mut months = 0;
        loop {
            let last = self.last_receipt().await?;
            let Some(month) = closable_month(last.as_ref(), self.curfew) else {
                break;
            };
            // the current month only on explicit request, catch-up stops before it
            if month > check_month || (months > 0 && month >= check_month) {
                break;
            }
            outcomes.push(self.do_end_of_month(ClosingWindow::month(month, self.curfew)).await?);
            months += 1;
        }

        if months == 0 {
            return Err(ClosingError::NothingToClose);
        }
        Ok(outcomes)
    }

    pub async fn do_end_of_day(&self, window: ClosingWindow) -> ClosingResult<ClosingOutcome> {
        if window.kind != ClosingKind::Day {
            return Err(ClosingError::AlreadyClosed(format!("{window:?} is not a day window")));
        }
        self.run_closing(window).await
    }

    pub async fn do_end_of_month(&self, window: ClosingWindow) -> ClosingResult<ClosingOutcome> {
        if window.kind != ClosingKind::Month {
            return Err(ClosingError::AlreadyClosed(format!("{window:?} is not a month window")));
        }
        self.run_closing(window).await
    }

    async fn run_closing(&self, window: ClosingWindow) -> ClosingResult<ClosingOutcome> {
        let guard = self.tracker.begin(window.kind)?;
        let chain = self.writer.lock_chain().await;

        tracing::info!(
            kind = window.kind.title(),
            period = %window.period,
            from = %window.from,
            to = %window.to,
            "Closing started"
        );

        // 1. WAL checkpoint + backup; a missing backup aborts the closing
        if let Err(e) = self.db.wal_checkpoint().await {
            tracing::warn!(error = %e, "WAL checkpoint failed");
        }
        self.backup.create().await.inspect_err(|e| {
            tracing::error!(error = %e, "Backup failed, closing aborted");
        })?;

        // 2. Report receipt, report lines and null receipt in one transaction
        let mut tx = self.db.pool.begin().await?;
        let (report, record, null_receipt) = match self.write_closing(&mut *tx, &window).await {
            Ok(written) => {
                tx.commit().await?;
                written
            }
            Err(e) => {
                tracing::error!(
                    kind = window.kind.title(),
                    period = %window.period,
                    error = %e,
                    code = %e.code(),
                    "Closing failed, rolling back"
                );
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "Rollback failed");
                }
                return Err(e);
            }
        };
        guard.complete();
        drop(chain);

        tracing::info!(
            kind = window.kind.title(),
            receipt_num = report.receipt.receipt_num,
            lines = record.lines.len(),
            "Closing committed"
        );

        // 3. Post-commit side effects
        let export = self.publish(&window, &report, &record, null_receipt.as_ref()).await;
        Ok(ClosingOutcome {
            window,
            report,
            record,
            null_receipt,
            export,
        })
    }

    /// Refuse a closing the stored chain does not call for
    async fn check_closable(
        &self,
        conn: &mut SqliteConnection,
        window: &ClosingWindow,
    ) -> ClosingResult<()> {
        let last = receipts::last_finalized(conn).await?;
        let last = last.as_ref();

        match window.kind {
            ClosingKind::Day => match closable_day(last, self.curfew) {
                None if last.is_some() => {
                    return Err(ClosingError::AlreadyClosed(format!(
                        "business day {} is closed",
                        window.period
                    )));
                }
                None => return Err(ClosingError::NothingToClose),
                Some(day) if day != window.period => {
                    return Err(ClosingError::ConcurrencyConflict(format!(
                        "last receipt belongs to business day {day}, not {}",
                        window.period
                    )));
                }
                Some(_) => {}
            },
            ClosingKind::Month => {
                if let Some(day) = closable_day(last, self.curfew) {
                    return Err(ClosingError::DayClosingRequired(day));
                }
                match closable_month(last, self.curfew) {
                    None => return Err(ClosingError::NothingToClose),
                    Some(month) if month > window.period => {
                        return Err(ClosingError::AlreadyClosed(format!(
                            "month {} is closed",
                            window.period
                        )));
                    }
                    Some(month) if month < window.period => {
                        return Err(ClosingError::ClosingRequired(format!(
                            "month {month} must be closed first"
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        // another register process may have closed the window already
        if reports::exists_overlapping(conn, window.kind, &window.from, &window.to).await? {
            return Err(ClosingError::AlreadyClosed(format!(
                "{} overlapping {} - {} exists",
                window.kind.title(),
                window.from,
                window.to
            )));
        }
        Ok(())
    }

    async fn write_closing(
        &self,
        conn: &mut SqliteConnection,
        window: &ClosingWindow,
    ) -> ClosingResult<(FinalizedReceipt, ClosingRecord, Option<FinalizedReceipt>)> {
        globals::acquire_write_lock(conn).await?;
        self.check_closable(conn, window).await?;

        let (payed_by, title) = match window.kind {
            ClosingKind::Day => (PayedBy::ReportEod, stats::DAY_TITLE),
            ClosingKind::Month => (PayedBy::ReportEom, stats::MONTH_TITLE),
        };

        let pending = PendingReceipt::create(conn, window.to, None, Vec::new()).await?;
        let report = self
            .writer
            .finalize_receipt(conn, &pending, payed_by, 0, true)
            .await?;

        let mut lines = stats::window_stats(conn, title, &window.from, &window.to).await?;
        if window.closes_year() {
            lines.extend(stats::year_stats(conn, window.period.year(), self.curfew, &window.to).await?);
        }

        let curfew = format_curfew(&self.curfew);
        reports::insert_lines(
            conn,
            &ReportHeader {
                receipt_num: report.receipt.receipt_num,
                timestamp: &window.to,
                timestamp_from: &window.from,
                curfew: &curfew,
                kind: window.kind,
            },
            &lines,
        )
        .await?;

        let null_receipt = if window.kind == ClosingKind::Month && self.writer.signature().is_active() {
            let payed_by = if window.closes_year() {
                PayedBy::NullYear
            } else {
                PayedBy::NullMonth
            };
            let pending = PendingReceipt::create(conn, window.to, None, Vec::new()).await?;
            Some(
                self.writer
                    .finalize_receipt(conn, &pending, payed_by, 0, false)
                    .await?,
            )
        } else {
            None
        };

        let record = ClosingRecord {
            receipt_num: report.receipt.receipt_num,
            timestamp: window.to,
            timestamp_from: window.from,
            curfew,
            kind: window.kind,
            lines,
        };
        Ok((report, record, null_receipt))
    }

    async fn publish(
        &self,
        window: &ClosingWindow,
        report: &FinalizedReceipt,
        record: &ClosingRecord,
        null_receipt: Option<&FinalizedReceipt>,
    ) -> ExportOutcome {
        self.writer.journal_receipt(report).await;
        let texts: Vec<String> = record.lines.iter().map(|(_, text)| text.clone()).collect();
        self.writer.journal().insert_report_lines(&texts, None).await;

        let doc = ReportDocument {
            record: record.clone(),
            by_product_group: self.report_by_product_group,
        };
        if let Err(e) = self.printer.print_report(&doc).await {
            tracing::warn!(receipt_num = record.receipt_num, error = %e, "Report not printed");
        }

        if let Some(null_receipt) = null_receipt {
            self.writer.publish(null_receipt).await;
        }

        if window.kind != ClosingKind::Month || !self.writer.signature().is_active() {
            return ExportOutcome::Skipped;
        }
        match self.exporter.export_after_month_closing().await {
            Ok(receipts) => ExportOutcome::Exported { receipts },
            Err(e) => {
                tracing::warn!(error = %e, "DEP export after month closing failed, export manually");
                ExportOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
