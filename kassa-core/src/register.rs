//! Fiscal Register (收银机门面)
//!
//! Wires configuration, database, signature unit, chain writer and closing
//! engine together. Sales pass the closing check first; every other
//! operation delegates to the component that owns it.

use crate::collaborators::{
    BackupService, DepExporter, DocumentPrinter, JsonDepExporter, LogPrinter, NoBackup, NoExport,
    SqliteBackup,
};
use crate::core::{Config, ConfigError, Result};
use crate::db::DbService;
use crate::db::repository::{globals, receipts};
use crate::journal::Journal;
use crate::receipts::{ChainWriter, FinalizedReceipt, NewReceipt};
use crate::reports::{ClosingEngine, ClosingOutcome, ClosingPhase, DueClosings};
use crate::signature::{ChainReport, SignatureModule, SignatureUnit};
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use shared::models::{ClosingKind, ClosingRecord, JournalLine, PayedBy};
use shared::util::{format_curfew, now_local, parse_curfew};
use std::path::Path;
use std::sync::Arc;

/// Printer, backup and export used by a register
#[derive(Clone)]
pub struct Collaborators {
    pub printer: Arc<dyn DocumentPrinter>,
    pub backup: Arc<dyn BackupService>,
    pub exporter: Arc<dyn DepExporter>,
}

impl Collaborators {
    /// Log printer; backup and DEP export into `BACKUP_DIR` when configured
    pub fn from_config(config: &Config, db: &DbService) -> Self {
        let (backup, exporter): (Arc<dyn BackupService>, Arc<dyn DepExporter>) =
            match config.backup_dir.as_deref() {
                Some(dir) => (
                    Arc::new(SqliteBackup::new(db.pool.clone(), dir)),
                    Arc::new(JsonDepExporter::new(db.pool.clone(), Path::new(dir).join("dep"))),
                ),
                None => (Arc::new(NoBackup), Arc::new(NoExport)),
            };
        Self {
            printer: Arc::new(LogPrinter),
            backup,
            exporter,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            printer: Arc::new(LogPrinter),
            backup: Arc::new(NoBackup),
            exporter: Arc::new(NoExport),
        }
    }
}

/// Snapshot for `kassa status`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterStatus {
    pub cash_register_id: String,
    pub algorithm: &'static str,
    pub signature_active: bool,
    pub hardware_damaged: bool,
    pub halted: bool,
    pub last_receipt_num: i64,
    pub curfew: String,
    pub due: DueClosings,
    pub day_phase: ClosingPhase,
    pub month_phase: ClosingPhase,
}

#[derive(Clone)]
pub struct FiscalRegister {
    db: DbService,
    writer: ChainWriter,
    closings: ClosingEngine,
    cash_register_id: String,
    curfew: NaiveTime,
}

impl FiscalRegister {
    /// Open the register database and build the configured signature unit
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let db = DbService::new(&config.db_path).await?;
        let signature = SignatureUnit::from_config(&config.signature, &config.cash_register_id);
        let collaborators = Collaborators::from_config(&config, &db);
        Self::assemble(config, db, signature, collaborators).await
    }

    /// Build a register from already constructed parts
    pub async fn assemble(
        config: Config,
        db: DbService,
        signature: SignatureUnit,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let curfew = Self::init_globals(&db, &config).await?;

        let journal = Journal::new(db.clone(), &config.cash_register_id);
        let writer = ChainWriter::new(
            db.clone(),
            Arc::new(signature),
            journal,
            collaborators.printer.clone(),
            &config.cash_register_id,
            curfew,
            config.allow_sales_when_damaged,
        );
        let closings = ClosingEngine::new(
            db.clone(),
            writer.clone(),
            collaborators.backup,
            collaborators.exporter,
            collaborators.printer,
            curfew,
            config.auto_day_before_month,
        );

        tracing::info!(
            cash_register_id = %config.cash_register_id,
            curfew = %format_curfew(&curfew),
            algorithm = writer.signature().algorithm_id(),
            "Fiscal register opened"
        );

        Ok(Self {
            db,
            writer,
            closings,
            cash_register_id: config.cash_register_id,
            curfew,
        })
    }

    /// Seed register id and curfew; the stored values win over the configuration
    async fn init_globals(db: &DbService, config: &Config) -> Result<NaiveTime> {
        let mut tx = db.pool.begin().await?;

        let stored_id =
            globals::seed_string(&mut *tx, globals::CASH_REGISTER_ID, &config.cash_register_id)
                .await?;
        if stored_id != config.cash_register_id {
            return Err(ConfigError::RegisterMismatch {
                stored: stored_id,
                configured: config.cash_register_id.clone(),
            }
            .into());
        }

        let stored_curfew =
            globals::seed_string(&mut *tx, globals::CURFEW, &format_curfew(&config.curfew))
                .await?;
        let curfew = parse_curfew(&stored_curfew).ok_or_else(|| ConfigError::InvalidValue {
            name: "globals.curfew",
            value: stored_curfew.clone(),
        })?;
        if curfew != config.curfew {
            tracing::warn!(
                stored = %stored_curfew,
                configured = %format_curfew(&config.curfew),
                "Configured curfew differs from the stored one, using the stored curfew"
            );
        }

        tx.commit().await?;
        Ok(curfew)
    }

    pub fn cash_register_id(&self) -> &str {
        &self.cash_register_id
    }

    pub fn curfew(&self) -> NaiveTime {
        self.curfew
    }

    pub fn signature(&self) -> &SignatureUnit {
        self.writer.signature()
    }

    pub fn closings(&self) -> &ClosingEngine {
        &self.closings
    }

    // ========== Receipts ==========

    /// Sell, unless a closing is due or the business day is already closed
    pub async fn sell(&self, receipt: NewReceipt) -> Result<FinalizedReceipt> {
        let at = receipt.timestamp.unwrap_or_else(now_local);
        self.closings.ensure_sale_allowed(&at).await?;
        Ok(self.writer.checkout(receipt.at(at)).await?)
    }

    /// Void receipt `receipt_num`
    pub async fn storno(
        &self,
        receipt_num: i64,
        user_id: Option<String>,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<FinalizedReceipt> {
        let at = timestamp.unwrap_or_else(now_local);
        self.closings.ensure_sale_allowed(&at).await?;
        Ok(self.writer.storno(receipt_num, user_id, Some(at)).await?)
    }

    pub async fn start_receipt(&self, user_id: Option<String>) -> Result<FinalizedReceipt> {
        Ok(self
            .writer
            .special_receipt(PayedBy::StartReceipt, user_id)
            .await?)
    }

    pub async fn control_receipt(&self, user_id: Option<String>) -> Result<FinalizedReceipt> {
        self.closings.ensure_sale_allowed(&now_local()).await?;
        Ok(self
            .writer
            .special_receipt(PayedBy::ControlReceipt, user_id)
            .await?)
    }

    // ========== Closings ==========

    pub async fn due_closings(&self, check: &NaiveDateTime) -> Result<DueClosings> {
        Ok(self.closings.due_closings(check).await?)
    }

    pub async fn end_of_day(&self, check: &NaiveDateTime) -> Result<ClosingOutcome> {
        Ok(self.closings.end_of_day(check).await?)
    }

    pub async fn end_of_month(&self, check: &NaiveDateTime) -> Result<Vec<ClosingOutcome>> {
        Ok(self.closings.end_of_month(check).await?)
    }

    /// Most recent stored closing of `kind`
    pub async fn last_closing(&self, kind: ClosingKind) -> Result<Option<ClosingRecord>> {
        Ok(self.closings.last_closing(kind).await?)
    }

    /// Print the stored report of closing receipt `receipt_num` again
    pub async fn reprint_closing(&self, receipt_num: i64) -> Result<ClosingRecord> {
        Ok(self.closings.reprint(receipt_num).await?)
    }

    // ========== Integrity ==========

    pub async fn verify_chain(&self) -> Result<ChainReport> {
        Ok(self.writer.verify().await?)
    }

    /// Lift the halt after an integrity violation was investigated
    pub fn resume_after_intervention(&self) {
        self.writer.resume_after_intervention();
    }

    pub async fn journal(&self, limit: i64) -> Result<Vec<JournalLine>> {
        Ok(self.writer.journal().recent(limit).await?)
    }

    pub async fn status(&self, check: &NaiveDateTime) -> Result<RegisterStatus> {
        let due = self.closings.due_closings(check).await?;
        let last_receipt_num = {
            let mut conn = self.db.pool.acquire().await?;
            receipts::last_finalized(&mut *conn)
                .await?
                .map(|r| r.receipt_num)
                .unwrap_or(0)
        };
        let signature = self.writer.signature();
        Ok(RegisterStatus {
            cash_register_id: self.cash_register_id.clone(),
            algorithm: signature.algorithm_id(),
            signature_active: signature.is_active(),
            hardware_damaged: signature.is_hardware_damaged(),
            halted: self.writer.is_halted(),
            last_receipt_num,
            curfew: format_curfew(&self.curfew),
            due,
            day_phase: self.closings.phase(ClosingKind::Day),
            month_phase: self.closings.phase(ClosingKind::Month),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FiscalError;
    use crate::signature::NullSignature;

    async fn register(db: DbService, id: &str, curfew: NaiveTime) -> Result<FiscalRegister> {
        let mut config = Config::with_overrides(":memory:", id);
        config.curfew = curfew;
        FiscalRegister::assemble(
            config,
            db,
            SignatureUnit::Null(NullSignature::new(id)),
            Collaborators::default(),
        )
        .await
    }

    #[tokio::test]
    async fn test_stored_curfew_wins() {
        let db = DbService::in_memory().await.unwrap();
        let four = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
        let first = register(db.clone(), "KASSE-01", four).await.unwrap();
        assert_eq!(first.curfew(), four);

        let second = register(db, "KASSE-01", NaiveTime::MIN).await.unwrap();
        assert_eq!(second.curfew(), four);
    }

    #[tokio::test]
    async fn test_register_mismatch() {
        let db = DbService::in_memory().await.unwrap();
        register(db.clone(), "KASSE-01", NaiveTime::MIN).await.unwrap();
        let err = register(db, "KASSE-02", NaiveTime::MIN).await.err().unwrap();
        assert!(matches!(
            err,
            FiscalError::Config(ConfigError::RegisterMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_of_fresh_register() {
        let db = DbService::in_memory().await.unwrap();
        let register = register(db, "KASSE-01", NaiveTime::MIN).await.unwrap();
        let status = register.status(&now_local()).await.unwrap();
        assert_eq!(status.last_receipt_num, 0);
        assert!(!status.signature_active);
        assert!(status.due.is_empty());
        assert_eq!(status.curfew, "00:00");
    }
}
