//! External collaborators of the fiscal core
//!
//! - [`DocumentPrinter`] - receipt / report output
//! - [`BackupService`] - database backup before every closing
//! - [`DepExporter`] - DEP export after a month closing

use async_trait::async_trait;
use serde::Serialize;
use shared::ErrorCode;
use shared::models::{ClosingRecord, OrderLine, Receipt, TaxBracketSums};
use shared::util::{format_ts, now_local};
use sqlx::SqlitePool;
use std::path::PathBuf;
use thiserror::Error;

use crate::db::repository::receipts;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup failed: {0}")]
    Database(String),

    #[error("Export failed: {0}")]
    Export(String),
}

impl BackupError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::BackupFailed
    }

    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Error)]
#[error("Printer error: {0}")]
pub struct PrintError(pub String);

// ========== Printing ==========

/// A finalized receipt ready for output
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptDocument {
    pub receipt: Receipt,
    pub lines: Vec<OrderLine>,
    pub sums: TaxBracketSums,
    /// QR payload (the signature string)
    pub qr_code: String,
    /// OCR representation, when the signature string is a receipt code
    pub ocr_code: Option<String>,
    /// Signed with the damaged marker
    pub damaged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub record: ClosingRecord,
    pub by_product_group: bool,
}

#[async_trait]
pub trait DocumentPrinter: Send + Sync {
    async fn print_receipt(&self, doc: &ReceiptDocument) -> Result<(), PrintError>;
    async fn print_report(&self, doc: &ReportDocument) -> Result<(), PrintError>;
}

/// Printer that only writes a structured log entry
#[derive(Debug, Default, Clone)]
pub struct LogPrinter;

#[async_trait]
impl DocumentPrinter for LogPrinter {
    async fn print_receipt(&self, doc: &ReceiptDocument) -> Result<(), PrintError> {
        tracing::info!(
            receipt_num = doc.receipt.receipt_num,
            payed_by = %doc.receipt.payed_by,
            gross = %doc.receipt.gross,
            lines = doc.lines.len(),
            damaged = doc.damaged,
            "Receipt printed"
        );
        Ok(())
    }

    async fn print_report(&self, doc: &ReportDocument) -> Result<(), PrintError> {
        tracing::info!(
            receipt_num = doc.record.receipt_num,
            kind = doc.record.kind.title(),
            lines = doc.record.printable_lines(doc.by_product_group).len(),
            "Report printed"
        );
        Ok(())
    }
}

// ========== Backup ==========

#[async_trait]
pub trait BackupService: Send + Sync {
    /// Create a backup; an error aborts the closing
    async fn create(&self) -> Result<(), BackupError>;
}

/// `VACUUM INTO <dir>/kassa-<timestamp>.db`
pub struct SqliteBackup {
    pool: SqlitePool,
    dir: PathBuf,
}

impl SqliteBackup {
    pub fn new(pool: SqlitePool, dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl BackupService for SqliteBackup {
    async fn create(&self) -> Result<(), BackupError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file = self
            .dir
            .join(format!("kassa-{}.db", now_local().format("%Y%m%d-%H%M%S")));
        if tokio::fs::try_exists(&file).await? {
            tokio::fs::remove_file(&file).await?;
        }
        let target = file
            .to_str()
            .ok_or_else(|| BackupError::Database(format!("Non UTF-8 backup path {file:?}")))?;

        sqlx::query("VACUUM INTO ?")
            .bind(target)
            .execute(&self.pool)
            .await
            .map_err(|e| BackupError::Database(e.to_string()))?;

        tracing::info!(file = %target, "Database backup created");
        Ok(())
    }
}

/// No backup (tests, registers with external backup)
#[derive(Debug, Default, Clone)]
pub struct NoBackup;

#[async_trait]
impl BackupService for NoBackup {
    async fn create(&self) -> Result<(), BackupError> {
        Ok(())
    }
}

// ========== DEP export ==========

#[async_trait]
pub trait DepExporter: Send + Sync {
    /// Export the receipt journal; returns the number of exported receipts
    async fn export_after_month_closing(&self) -> Result<usize, BackupError>;
}

#[derive(Debug, Default, Clone)]
pub struct NoExport;

#[async_trait]
impl DepExporter for NoExport {
    async fn export_after_month_closing(&self) -> Result<usize, BackupError> {
        Ok(0)
    }
}

#[derive(Serialize)]
struct DepGroup<'a> {
    #[serde(rename = "Signaturzertifikat")]
    certificate: &'a str,
    #[serde(rename = "Belege-kompakt")]
    receipts: Vec<String>,
}

#[derive(Serialize)]
struct DepExport<'a> {
    #[serde(rename = "Belege-Gruppe")]
    groups: Vec<DepGroup<'a>>,
}

/// Writes all signature strings as `dep-export-<timestamp>.json`
pub struct JsonDepExporter {
    pool: SqlitePool,
    dir: PathBuf,
}

impl JsonDepExporter {
    pub fn new(pool: SqlitePool, dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl DepExporter for JsonDepExporter {
    async fn export_after_month_closing(&self) -> Result<usize, BackupError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| BackupError::Export(e.to_string()))?;
        let all = receipts::all_finalized(&mut *conn)
            .await
            .map_err(|e| BackupError::Export(e.to_string()))?;
        drop(conn);

        let export = DepExport {
            groups: vec![DepGroup {
                certificate: "",
                receipts: all.iter().map(|r| r.signature.clone()).collect(),
            }],
        };
        let json =
            serde_json::to_vec_pretty(&export).map_err(|e| BackupError::Export(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let file = self
            .dir
            .join(format!("dep-export-{}.json", format_ts(&now_local()).replace(':', "")));
        tokio::fs::write(&file, json).await?;

        tracing::info!(file = ?file, receipts = all.len(), "DEP export written");
        Ok(all.len())
    }
}
