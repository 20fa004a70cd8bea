//! 集成测试公共工具

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use kassa_core::collaborators::{BackupError, BackupService, DepExporter, LogPrinter};
use kassa_core::db::repository::{receipts, reports};
use kassa_core::signature::{OnlineSignature, RemoteSigner, StandaloneSignature};
use kassa_core::{Collaborators, Config, DbService, FiscalRegister, NewReceipt, SignatureError, SignatureUnit};
use kassa_crypto::SecureBytes;
use rust_decimal::Decimal;
use shared::models::{OrderLine, PayedBy, Receipt};
use shared::util::parse_ts;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

pub const REG: &str = "KASSE-01";

pub fn ts(s: &str) -> NaiveDateTime {
    parse_ts(s).unwrap()
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Melange, 3.80, 10%
pub fn coffee(count: &str, at: &str) -> NewReceipt {
    NewReceipt::sale(
        PayedBy::Cash,
        vec![OrderLine::new("Melange", d(count), d("3.80"), d("10")).with_group("Kaffee")],
    )
    .with_user("anna")
    .at(ts(at))
}

pub fn passphrase() -> SecureBytes {
    SecureBytes::from_slice(b"integration-passphrase")
}

pub fn standalone() -> SignatureUnit {
    SignatureUnit::Standalone(StandaloneSignature::new(REG, &passphrase()).unwrap())
}

/// Remote signer that can be switched offline
#[derive(Default)]
pub struct SwitchSigner {
    pub offline: AtomicBool,
}

#[async_trait]
impl RemoteSigner for SwitchSigner {
    async fn sign(&self, data: &str) -> Result<Vec<u8>, SignatureError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SignatureError::DeviceDamaged("signing service offline".into()));
        }
        Ok(data.as_bytes().iter().rev().take(32).copied().collect())
    }
}

pub fn online(signer: Arc<SwitchSigner>) -> SignatureUnit {
    SignatureUnit::Online(OnlineSignature::new(REG, &passphrase(), signer, 1000).unwrap())
}

/// Backup that fails while `failing` is set
#[derive(Default)]
pub struct SwitchBackup {
    pub failing: AtomicBool,
    pub created: AtomicUsize,
}

#[async_trait]
impl BackupService for SwitchBackup {
    async fn create(&self) -> Result<(), BackupError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackupError::Database("disk full".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Exporter that counts its calls
#[derive(Default)]
pub struct CountingExporter {
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
}

#[async_trait]
impl DepExporter for CountingExporter {
    async fn export_after_month_closing(&self) -> Result<usize, BackupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackupError::Export("usb stick missing".into()));
        }
        Ok(42)
    }
}

pub struct Setup {
    pub curfew: NaiveTime,
    pub auto_day_before_month: bool,
    pub allow_sales_when_damaged: bool,
    pub backup: Arc<SwitchBackup>,
    pub exporter: Arc<CountingExporter>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            curfew: NaiveTime::MIN,
            auto_day_before_month: false,
            allow_sales_when_damaged: false,
            backup: Arc::new(SwitchBackup::default()),
            exporter: Arc::new(CountingExporter::default()),
        }
    }
}

pub struct TestRegister {
    pub register: FiscalRegister,
    pub db: DbService,
    pub backup: Arc<SwitchBackup>,
    pub exporter: Arc<CountingExporter>,
    _dir: TempDir,
}

impl TestRegister {
    pub async fn report_rows(&self) -> i64 {
        let mut conn = self.db.pool.acquire().await.unwrap();
        reports::count(&mut *conn).await.unwrap()
    }

    pub async fn last_receipt(&self) -> Option<Receipt> {
        let mut conn = self.db.pool.acquire().await.unwrap();
        receipts::last_finalized(&mut *conn).await.unwrap()
    }

    pub async fn receipt(&self, receipt_num: i64) -> Receipt {
        let mut conn = self.db.pool.acquire().await.unwrap();
        receipts::find_by_num(&mut *conn, receipt_num).await.unwrap().unwrap()
    }

    pub async fn count_of(&self, payed_by: PayedBy) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM receipts WHERE payedBy = ?")
            .bind(payed_by.code())
            .fetch_one(&self.db.pool)
            .await
            .unwrap();
        row.0
    }
}

/// Register on a fresh SQLite file in a temp dir
pub async fn open(signature: SignatureUnit, setup: Setup) -> TestRegister {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kassa.db");
    let path = path.to_str().unwrap();

    let mut config = Config::with_overrides(path, REG);
    config.curfew = setup.curfew;
    config.auto_day_before_month = setup.auto_day_before_month;
    config.allow_sales_when_damaged = setup.allow_sales_when_damaged;

    let db = DbService::new(path).await.unwrap();
    let collaborators = Collaborators {
        printer: Arc::new(LogPrinter),
        backup: setup.backup.clone(),
        exporter: setup.exporter.clone(),
    };
    let register = FiscalRegister::assemble(config, db.clone(), signature, collaborators)
        .await
        .unwrap();

    TestRegister {
        register,
        db,
        backup: setup.backup,
        exporter: setup.exporter,
        _dir: dir,
    }
}
