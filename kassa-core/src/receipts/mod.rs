//! Receipt Chain Writer (收据链)
//!
//! Every receipt is created in two steps: a pending row is inserted, then
//! [`ChainWriter::finalize_receipt`] allocates the receipt number, computes
//! the tax bracket sums, chains the signature to the most recent receipt and
//! links stornos. All of it happens inside the caller's transaction, so a
//! rollback leaves no half-signed receipt behind.
//!
//! Chain writes are serialized in-process by `chain_lock`; other processes
//! queue on the SQLite write lock taken as the first statement.

use crate::collaborators::{DocumentPrinter, ReceiptDocument};
use crate::db::repository::{globals, orders, receipts};
use crate::db::repository::receipts::FinalizeRow;
use crate::db::{DbError, DbResult, DbService};
use crate::journal::{Journal, ReceiptJournalData};
use crate::reports::due::{business_day, compute_due_closings, day_closed_at};
use crate::signature::{
    ChainReport, PreviousLink, SignatureError, SignatureModule, SignaturePayload, SignatureUnit,
    ocr_code,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use shared::ErrorCode;
use shared::models::{OrderLine, PayedBy, Receipt, StornoState, TaxBracket, TaxBracketSums};
use shared::money::round2;
use shared::util::now_local;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Receipt creation halted after an integrity violation, operator intervention required")]
    Halted,

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Invalid receipt: {0}")]
    Validation(String),

    #[error("Storno rejected: {0}")]
    StornoRejected(String),

    #[error("Receipt time {timestamp} precedes receipt {last_num} at {last_timestamp}")]
    TimestampOutOfOrder {
        timestamp: NaiveDateTime,
        last_num: i64,
        last_timestamp: NaiveDateTime,
    },

    #[error("Closing required: {0}")]
    ClosingRequired(String),

    #[error("Business day {0} is already closed")]
    DayAlreadyClosed(NaiveDate),
}

impl From<sqlx::Error> for ChainError {
    fn from(e: sqlx::Error) -> Self {
        Self::Db(DbError::from(e))
    }
}

impl ChainError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Halted => ErrorCode::ReceiptCreationHalted,
            Self::Signature(e) => e.code(),
            Self::Db(e) => e.code(),
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::StornoRejected(_) => ErrorCode::StornoRejected,
            Self::TimestampOutOfOrder { .. } => ErrorCode::TimestampOutOfOrder,
            Self::ClosingRequired(_) => ErrorCode::ClosingRequired,
            Self::DayAlreadyClosed(_) => ErrorCode::DayAlreadyClosed,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Signature(e) => e.is_retryable(),
            Self::Db(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

/// A sale requested by the register
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub payed_by: PayedBy,
    pub lines: Vec<OrderLine>,
    pub user_id: Option<String>,
    /// Defaults to the current local time
    pub timestamp: Option<NaiveDateTime>,
}

impl NewReceipt {
    pub fn sale(payed_by: PayedBy, lines: Vec<OrderLine>) -> Self {
        Self {
            payed_by,
            lines,
            user_id: None,
            timestamp: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Receipt row inserted but not yet numbered or signed
#[derive(Debug, Clone)]
pub struct PendingReceipt {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub user_id: Option<String>,
    pub lines: Vec<OrderLine>,
}

impl PendingReceipt {
    /// Insert the pending row and its order lines
    pub async fn create(
        conn: &mut SqliteConnection,
        timestamp: NaiveDateTime,
        user_id: Option<String>,
        lines: Vec<OrderLine>,
    ) -> DbResult<Self> {
        let id = receipts::insert_pending(conn, &timestamp, user_id.as_deref()).await?;
        for line in &lines {
            orders::insert(conn, id, line).await?;
        }
        Ok(Self {
            id,
            timestamp,
            user_id,
            lines,
        })
    }
}

/// A numbered and signed receipt
#[derive(Debug, Clone)]
pub struct FinalizedReceipt {
    pub receipt: Receipt,
    pub lines: Vec<OrderLine>,
    pub sums: TaxBracketSums,
    /// Signed with the damaged marker
    pub damaged: bool,
    /// Journal comment, e.g. the voided receipt of a storno
    pub comment: String,
}

/// Gross sums per tax bracket of order lines
fn bracket_sums(lines: &[OrderLine]) -> ChainResult<TaxBracketSums> {
    let mut sums = TaxBracketSums::default();
    for line in lines {
        let bracket = TaxBracket::from_rate(line.tax).ok_or_else(|| {
            ChainError::Validation(format!("unsupported tax rate {} for {}", line.tax, line.product))
        })?;
        sums.add(bracket, line.total());
    }
    Ok(sums)
}

async fn rollback(tx: Transaction<'_, Sqlite>, reason: &ChainError) {
    tracing::warn!(error = %reason, code = %reason.code(), "Rolling back receipt transaction");
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "Rollback failed");
    }
}

#[derive(Clone)]
pub struct ChainWriter {
    db: DbService,
    signature: Arc<SignatureUnit>,
    journal: Journal,
    printer: Arc<dyn DocumentPrinter>,
    cash_register_id: String,
    curfew: NaiveTime,
    allow_sales_when_damaged: bool,
    /// Serializes chain writes of this process
    chain_lock: Arc<Mutex<()>>,
    halted: Arc<AtomicBool>,
}

impl ChainWriter {
    pub fn new(
        db: DbService,
        signature: Arc<SignatureUnit>,
        journal: Journal,
        printer: Arc<dyn DocumentPrinter>,
        cash_register_id: impl Into<String>,
        curfew: NaiveTime,
        allow_sales_when_damaged: bool,
    ) -> Self {
        Self {
            db,
            signature,
            journal,
            printer,
            cash_register_id: cash_register_id.into(),
            curfew,
            allow_sales_when_damaged,
            chain_lock: Arc::new(Mutex::new(())),
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn signature(&self) -> &SignatureUnit {
        &self.signature
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn cash_register_id(&self) -> &str {
        &self.cash_register_id
    }

    /// Hold while writing to the chain
    pub async fn lock_chain(&self) -> MutexGuard<'_, ()> {
        self.chain_lock.lock().await
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn halt(&self, error: &SignatureError) {
        self.halted.store(true, Ordering::SeqCst);
        tracing::error!(
            error = %error,
            code = %error.code(),
            "Signature chain integrity violated, receipt creation halted"
        );
    }

    /// Lift the halt after the operator has inspected the chain
    pub fn resume_after_intervention(&self) {
        if self.halted.swap(false, Ordering::SeqCst) {
            tracing::warn!("Receipt creation resumed after operator intervention");
        }
    }

    /// Refuse receipts of a business day that is closed or whose closing is due
    fn ensure_open(&self, last: Option<&Receipt>, timestamp: &NaiveDateTime) -> ChainResult<()> {
        if let Some(window) = compute_due_closings(last, timestamp, self.curfew).next() {
            return Err(ChainError::ClosingRequired(format!(
                "{} for {}",
                window.kind.title(),
                window.period
            )));
        }
        if day_closed_at(last, timestamp, self.curfew) {
            return Err(ChainError::DayAlreadyClosed(business_day(timestamp, self.curfew)));
        }
        Ok(())
    }

    /// Number, sum up, sign and store a pending receipt
    ///
    /// Runs on the caller's transaction, which must already hold the write
    /// lock. `storno_id` is the row id of the receipt being voided (0 = none).
    /// Reports carry zero sums.
    pub async fn finalize_receipt(
        &self,
        conn: &mut SqliteConnection,
        pending: &PendingReceipt,
        payed_by: PayedBy,
        storno_id: i64,
        is_report: bool,
    ) -> ChainResult<FinalizedReceipt> {
        if self.is_halted() {
            return Err(ChainError::Halted);
        }
        if is_report != payed_by.is_closing() {
            return Err(ChainError::Validation(format!(
                "{payed_by} cannot be finalized with is_report={is_report}"
            )));
        }

        // 1. Chain to the most recent receipt, read inside this transaction
        let last = receipts::last_finalized(conn).await?;
        if let Some(last) = &last
            && pending.timestamp < last.timestamp
        {
            return Err(ChainError::TimestampOutOfOrder {
                timestamp: pending.timestamp,
                last_num: last.receipt_num,
                last_timestamp: last.timestamp,
            });
        }
        if !payed_by.is_closing() && !payed_by.is_null_receipt() {
            self.ensure_open(last.as_ref(), &pending.timestamp)?;
        }
        let previous = match &last {
            Some(last) => PreviousLink::from_receipt(last),
            None => PreviousLink::genesis(&self.cash_register_id),
        };

        // 2. Receipt number
        let receipt_num = globals::next_receipt_num(conn).await?;

        // 3. Sums (only sales carry turnover)
        let sums = if payed_by.is_sale() {
            if pending.lines.is_empty() {
                return Err(ChainError::Validation("sale without order lines".into()));
            }
            bracket_sums(&pending.lines)?
        } else {
            if !pending.lines.is_empty() {
                return Err(ChainError::Validation(format!("{payed_by} cannot carry order lines")));
            }
            TaxBracketSums::default()
        };
        let gross = round2(sums.total());
        // net follows the signed bracket sums, so it can be re-verified
        let net = sums.net();

        let payload = SignaturePayload {
            receipt_num,
            timestamp: pending.timestamp,
            payed_by,
            sums,
        };

        let link = match self.signature.sign(&payload, &previous).await {
            Ok(link) => link,
            Err(e) if e.is_device_failure() && self.allow_sales_when_damaged && payed_by.is_sale() => {
                tracing::warn!(
                    receipt_num = receipt_num,
                    error = %e,
                    "Signature device failed, sale signed with damaged marker"
                );
                self.signature.sign_damaged(&payload, &previous).inspect_err(|e| {
                    if matches!(e, SignatureError::IntegrityViolation { .. }) {
                        self.halt(e);
                    }
                })?
            }
            Err(e) => {
                if matches!(e, SignatureError::IntegrityViolation { .. }) {
                    self.halt(&e);
                }
                return Err(e.into());
            }
        };

        // 4. Sign and store
        receipts::finalize(
            conn,
            pending.id,
            &FinalizeRow {
                receipt_num,
                timestamp: &pending.timestamp,
                payed_by,
                gross,
                net,
                signature: &link.signature,
            },
        )
        .await?;

        // 5. Storno linkage (weak back-references in both directions)
        let storno = if storno_id != 0 {
            receipts::set_storno(conn, storno_id, StornoState::Voided, pending.id).await?;
            receipts::set_storno(conn, pending.id, StornoState::StornoReceipt, storno_id).await?;
            StornoState::StornoReceipt
        } else {
            StornoState::None
        };

        tracing::debug!(
            receipt_num = receipt_num,
            payed_by = %payed_by,
            gross = %gross,
            algorithm = %link.algorithm_id,
            damaged = link.damaged,
            "Receipt finalized"
        );

        Ok(FinalizedReceipt {
            receipt: Receipt {
                id: pending.id,
                receipt_num,
                timestamp: pending.timestamp,
                payed_by,
                gross,
                net,
                storno,
                storno_id,
                user_id: pending.user_id.clone(),
                signature: link.signature,
            },
            lines: pending.lines.clone(),
            sums,
            damaged: link.damaged,
            comment: String::new(),
        })
    }

    /// Runs `pending` + `finalize_receipt` in one transaction, then publishes
    async fn write_receipt(
        &self,
        timestamp: NaiveDateTime,
        user_id: Option<String>,
        lines: Vec<OrderLine>,
        payed_by: PayedBy,
        storno_of: Option<i64>,
    ) -> ChainResult<FinalizedReceipt> {
        let finalized = {
            let _chain = self.lock_chain().await;
            let mut tx = self.db.pool.begin().await?;

            let result = async {
                globals::acquire_write_lock(&mut *tx).await?;

                let (storno_id, comment) = match storno_of {
                    Some(num) => {
                        let original = self.check_storno(&mut *tx, num).await?;
                        (original.id, format!("Storno zu Beleg {num}"))
                    }
                    None => (0, String::new()),
                };
                let lines = match storno_of {
                    Some(_) => orders::for_receipt(&mut *tx, storno_id)
                        .await?
                        .iter()
                        .map(OrderLine::negated)
                        .collect(),
                    None => lines,
                };

                let pending = PendingReceipt::create(&mut *tx, timestamp, user_id, lines).await?;
                let mut finalized = self
                    .finalize_receipt(&mut *tx, &pending, payed_by, storno_id, false)
                    .await?;
                finalized.comment = comment;
                Ok::<_, ChainError>(finalized)
            }
            .await;

            match result {
                Ok(finalized) => {
                    tx.commit().await?;
                    finalized
                }
                Err(e) => {
                    rollback(tx, &e).await;
                    return Err(e);
                }
            }
        };

        tracing::info!(
            receipt_num = finalized.receipt.receipt_num,
            payed_by = %finalized.receipt.payed_by,
            gross = %finalized.receipt.gross,
            "Receipt created"
        );
        self.publish(&finalized).await;
        Ok(finalized)
    }

    async fn check_storno(&self, conn: &mut SqliteConnection, receipt_num: i64) -> ChainResult<Receipt> {
        let original = receipts::find_by_num(conn, receipt_num)
            .await?
            .ok_or_else(|| ChainError::StornoRejected(format!("receipt {receipt_num} not found")))?;
        if !original.payed_by.is_sale() {
            return Err(ChainError::StornoRejected(format!(
                "receipt {receipt_num} is a {} and cannot be voided",
                original.payed_by
            )));
        }
        match original.storno {
            StornoState::None => Ok(original),
            StornoState::Voided => Err(ChainError::StornoRejected(format!(
                "receipt {receipt_num} is already voided"
            ))),
            StornoState::StornoReceipt => Err(ChainError::StornoRejected(format!(
                "receipt {receipt_num} is itself a storno"
            ))),
        }
    }

    /// Create a sale
    pub async fn checkout(&self, receipt: NewReceipt) -> ChainResult<FinalizedReceipt> {
        if !receipt.payed_by.is_sale() {
            return Err(ChainError::Validation(format!(
                "{} is not a payment method",
                receipt.payed_by
            )));
        }
        if receipt.lines.is_empty() {
            return Err(ChainError::Validation("sale without order lines".into()));
        }
        self.write_receipt(
            receipt.timestamp.unwrap_or_else(now_local),
            receipt.user_id,
            receipt.lines,
            receipt.payed_by,
            None,
        )
        .await
    }

    /// Void a sale with a storno receipt carrying its negated lines
    pub async fn storno(
        &self,
        receipt_num: i64,
        user_id: Option<String>,
        timestamp: Option<NaiveDateTime>,
    ) -> ChainResult<FinalizedReceipt> {
        let payed_by = {
            let mut conn = self.db.pool.acquire().await?;
            receipts::find_by_num(&mut *conn, receipt_num)
                .await?
                .map(|r| r.payed_by)
                .ok_or_else(|| ChainError::StornoRejected(format!("receipt {receipt_num} not found")))?
        };
        self.write_receipt(
            timestamp.unwrap_or_else(now_local),
            user_id,
            Vec::new(),
            payed_by,
            Some(receipt_num),
        )
        .await
    }

    /// Start receipt (first receipt of the register) or control receipt
    pub async fn special_receipt(
        &self,
        payed_by: PayedBy,
        user_id: Option<String>,
    ) -> ChainResult<FinalizedReceipt> {
        match payed_by {
            PayedBy::ControlReceipt => {}
            PayedBy::StartReceipt => {
                let mut conn = self.db.pool.acquire().await?;
                if receipts::count_finalized(&mut *conn).await? > 0 {
                    return Err(ChainError::Validation(
                        "start receipt must be the first receipt of the register".into(),
                    ));
                }
            }
            other => {
                return Err(ChainError::Validation(format!("{other} is not a special receipt")));
            }
        }
        self.write_receipt(now_local(), user_id, Vec::new(), payed_by, None)
            .await
    }

    /// Post-commit side effects: journal and print
    ///
    /// Failures are logged; the receipt is already committed.
    pub async fn publish(&self, finalized: &FinalizedReceipt) {
        self.journal_receipt(finalized).await;

        let receipt = &finalized.receipt;
        let doc = ReceiptDocument {
            receipt: receipt.clone(),
            lines: finalized.lines.clone(),
            sums: finalized.sums,
            qr_code: receipt.signature.clone(),
            ocr_code: ocr_code(&receipt.signature).ok(),
            damaged: finalized.damaged,
        };
        if let Err(e) = self.printer.print_receipt(&doc).await {
            tracing::warn!(receipt_num = receipt.receipt_num, error = %e, "Receipt not printed");
        }
    }

    /// Journal lines of a committed receipt, with the year-to-date turnover
    pub async fn journal_receipt(&self, finalized: &FinalizedReceipt) {
        let receipt = &finalized.receipt;
        let year_turnover = match self.year_turnover(&receipt.timestamp).await {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!(error = %e, "Year turnover not available for the journal");
                Decimal::ZERO
            }
        };

        self.journal
            .insert_receipt_lines(&ReceiptJournalData {
                receipt,
                lines: &finalized.lines,
                sums: &finalized.sums,
                comment: finalized.comment.clone(),
                year_turnover,
            })
            .await;
    }

    /// Gross sales of the calendar year up to `until`
    async fn year_turnover(&self, until: &NaiveDateTime) -> DbResult<Decimal> {
        let from = NaiveDate::from_ymd_opt(until.year(), 1, 1)
            .map(|d| d.and_time(chrono::NaiveTime::MIN))
            .ok_or_else(|| DbError::Corrupt(format!("no start of year for {until}")))?;
        let mut conn = self.db.pool.acquire().await?;
        receipts::turnover_in_window(&mut *conn, &from, until).await
    }

    /// Verify the whole stored chain; an integrity violation halts the writer
    pub async fn verify(&self) -> ChainResult<ChainReport> {
        let all = {
            let mut conn = self.db.pool.acquire().await?;
            receipts::all_finalized(&mut *conn).await?
        };
        match self.signature.verify_chain(&self.cash_register_id, &all) {
            Ok(report) => {
                tracing::info!(
                    receipts = report.verified,
                    counters = report.counter_checked,
                    damaged = report.damaged,
                    "Receipt chain verified"
                );
                Ok(report)
            }
            Err(e) => {
                if matches!(e, SignatureError::IntegrityViolation { .. }) {
                    self.halt(&e);
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::LogPrinter;
    use crate::signature::{NullSignature, StandaloneSignature};
    use kassa_crypto::SecureBytes;
    use std::str::FromStr;

    const REG: &str = "KASSE-01";

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn writer_with(unit: SignatureUnit) -> ChainWriter {
        let db = DbService::in_memory().await.unwrap();
        let journal = Journal::new(db.clone(), REG);
        ChainWriter::new(
            db,
            Arc::new(unit),
            journal,
            Arc::new(LogPrinter),
            REG,
            NaiveTime::MIN,
            false,
        )
    }

    async fn standalone_writer() -> ChainWriter {
        let passphrase = SecureBytes::from_slice(b"test-passphrase");
        writer_with(SignatureUnit::Standalone(
            StandaloneSignature::new(REG, &passphrase).unwrap(),
        ))
        .await
    }

    fn coffee(count: &str) -> NewReceipt {
        NewReceipt::sale(
            PayedBy::Cash,
            vec![OrderLine::new("Melange", d(count), d("3.80"), d("10"))],
        )
        .with_user("anna")
    }

    #[tokio::test]
    async fn test_checkout_numbers_and_sums() {
        let writer = standalone_writer().await;

        let first = writer.checkout(coffee("2")).await.unwrap();
        let second = writer
            .checkout(NewReceipt::sale(
                PayedBy::DebitCard,
                vec![
                    OrderLine::new("Spritzer", d("1"), d("3.20"), d("20")),
                    OrderLine::new("Semmel", d("2"), d("0.60"), d("10")),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(first.receipt.receipt_num, 1);
        assert_eq!(second.receipt.receipt_num, 2);
        assert_eq!(first.receipt.gross, d("7.60"));
        assert_eq!(second.receipt.gross, d("4.40"));
        assert_eq!(second.sums.normal, d("3.20"));
        assert_eq!(second.sums.reduced1, d("1.20"));
        // 3.20 / 1.2 + 1.20 / 1.1
        assert_eq!(second.receipt.net, d("3.76"));
        assert!(second.receipt.signature.starts_with("_R1-HS256_KASSE-01_2_"));

        let report = writer.verify().await.unwrap();
        assert_eq!(report.verified, 2);
        assert_eq!(report.counter_checked, 2);
    }

    #[tokio::test]
    async fn test_checkout_rejects_invalid_receipts() {
        let writer = standalone_writer().await;

        let err = writer
            .checkout(NewReceipt::sale(PayedBy::Cash, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Validation(_)));

        let err = writer
            .checkout(NewReceipt::sale(PayedBy::ReportEod, coffee("1").lines))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Validation(_)));

        let err = writer
            .checkout(NewReceipt::sale(
                PayedBy::Cash,
                vec![OrderLine::new("Buch", d("1"), d("12.00"), d("7"))],
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        // rolled back: the receipt number was not consumed
        let ok = writer.checkout(coffee("1")).await.unwrap();
        assert_eq!(ok.receipt.receipt_num, 1);
    }

    #[tokio::test]
    async fn test_storno_links_both_receipts() {
        let writer = standalone_writer().await;
        let original = writer.checkout(coffee("3")).await.unwrap();

        let storno = writer.storno(1, Some("anna".into()), None).await.unwrap();
        assert_eq!(storno.receipt.receipt_num, 2);
        assert_eq!(storno.receipt.gross, d("-11.40"));
        assert_eq!(storno.receipt.payed_by, PayedBy::Cash);
        assert_eq!(storno.receipt.storno, StornoState::StornoReceipt);
        assert_eq!(storno.receipt.storno_id, original.receipt.id);
        assert_eq!(storno.comment, "Storno zu Beleg 1");

        let mut conn = writer.db.pool.acquire().await.unwrap();
        let voided = receipts::find_by_num(&mut *conn, 1).await.unwrap().unwrap();
        drop(conn);
        assert_eq!(voided.storno, StornoState::Voided);
        assert_eq!(voided.storno_id, storno.receipt.id);

        let again = writer.storno(1, None, None).await.unwrap_err();
        assert!(matches!(again, ChainError::StornoRejected(_)));
        let of_storno = writer.storno(2, None, None).await.unwrap_err();
        assert!(matches!(of_storno, ChainError::StornoRejected(_)));
        let missing = writer.storno(99, None, None).await.unwrap_err();
        assert_eq!(missing.code(), ErrorCode::StornoRejected);

        // the counter went back to zero turnover
        let report = writer.verify().await.unwrap();
        assert_eq!(report.verified, 2);
    }

    #[tokio::test]
    async fn test_start_receipt_only_first() {
        let writer = standalone_writer().await;
        let start = writer.special_receipt(PayedBy::StartReceipt, None).await.unwrap();
        assert_eq!(start.receipt.receipt_num, 1);
        assert_eq!(start.receipt.gross, Decimal::ZERO);

        let err = writer.special_receipt(PayedBy::StartReceipt, None).await.unwrap_err();
        assert!(matches!(err, ChainError::Validation(_)));
        let control = writer.special_receipt(PayedBy::ControlReceipt, None).await.unwrap();
        assert_eq!(control.receipt.receipt_num, 2);
        assert!(writer.special_receipt(PayedBy::Cash, None).await.is_err());
    }

    #[tokio::test]
    async fn test_null_signature_chains_without_counter() {
        let writer = writer_with(SignatureUnit::Null(NullSignature::new(REG))).await;
        writer.checkout(coffee("1")).await.unwrap();
        let second = writer.checkout(coffee("1")).await.unwrap();
        assert!(second.receipt.signature.starts_with("_R1-NONE_"));

        let report = writer.verify().await.unwrap();
        assert_eq!(report.unsigned, 2);
        assert_eq!(report.counter_checked, 0);
    }

    #[tokio::test]
    async fn test_tampered_counter_halts_writer() {
        let writer = standalone_writer().await;
        writer.checkout(coffee("1")).await.unwrap();

        let mut conn = writer.db.pool.acquire().await.unwrap();
        let last = receipts::last_finalized(&mut *conn).await.unwrap().unwrap();
        let mut parts: Vec<&str> = last.signature.split('_').collect();
        let forged = "A".repeat(parts[11].len());
        parts[11] = &forged;
        sqlx::query("UPDATE receipts SET signature = ? WHERE id = ?")
            .bind(parts.join("_"))
            .bind(last.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let err = writer.checkout(coffee("1")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ChainMismatch);
        assert!(writer.is_halted());

        let err = writer.checkout(coffee("1")).await.unwrap_err();
        assert!(matches!(err, ChainError::Halted));

        writer.resume_after_intervention();
        assert!(!writer.is_halted());
    }

    #[tokio::test]
    async fn test_finalize_rejects_report_flag_mismatch() {
        let writer = standalone_writer().await;
        let mut tx = writer.db.pool.begin().await.unwrap();
        let pending = PendingReceipt::create(&mut *tx, now_local(), None, Vec::new())
            .await
            .unwrap();
        let err = writer
            .finalize_receipt(&mut *tx, &pending, PayedBy::ReportEod, 0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Validation(_)));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_finalize_keeps_receipts_in_time_order() {
        let writer = standalone_writer().await;
        let at = |s: &str| shared::util::parse_ts(s).unwrap();
        writer.checkout(coffee("1").at(at("2024-03-09T10:00:00"))).await.unwrap();

        let err = writer
            .checkout(coffee("1").at(at("2024-03-09T09:00:00")))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::TimestampOutOfOrder { last_num: 1, .. }));
        assert_eq!(err.code(), ErrorCode::TimestampOutOfOrder);
        assert!(!writer.is_halted());

        // 03-09 still open: the writer itself refuses the next business day
        let err = writer
            .checkout(coffee("1").at(at("2024-03-10T09:00:00")))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::ClosingRequired(_)));

        let mut conn = writer.db.pool.acquire().await.unwrap();
        let last = receipts::last_finalized(&mut *conn).await.unwrap().unwrap();
        assert_eq!(last.receipt_num, 1);
        drop(conn);

        // day closing of 03-09, then a late sale of the closed day
        let mut tx = writer.db.pool.begin().await.unwrap();
        let pending = PendingReceipt::create(&mut *tx, at("2024-03-09T23:59:59"), None, Vec::new())
            .await
            .unwrap();
        writer
            .finalize_receipt(&mut *tx, &pending, PayedBy::ReportEod, 0, true)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let err = writer
            .checkout(coffee("1").at(at("2024-03-09T23:59:59")))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::DayAlreadyClosed(_)));

        let next = writer.checkout(coffee("1").at(at("2024-03-10T09:00:00"))).await.unwrap();
        assert_eq!(next.receipt.receipt_num, 3);
        assert_eq!(writer.verify().await.unwrap().verified, 3);
    }
}
