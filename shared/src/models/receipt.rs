//! Receipt Model

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment / receipt type stored in `receipts.payedBy`
///
/// The type of the most recent receipt doubles as a marker of which closing
/// already exists, so the numeric codes are part of the storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i64)]
pub enum PayedBy {
    Cash = 0,
    DebitCard = 1,
    CreditCard = 2,
    /// End-of-day closing report
    ReportEod = 3,
    /// End-of-month closing report
    ReportEom = 4,
    /// First receipt of a register (initializes the chain)
    StartReceipt = 5,
    ControlReceipt = 6,
    /// Month null receipt, produced after a month closing
    NullMonth = 7,
    /// Year null receipt, produced after the December month closing
    NullYear = 8,
}

impl PayedBy {
    pub fn code(&self) -> i64 {
        *self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Cash),
            1 => Some(Self::DebitCard),
            2 => Some(Self::CreditCard),
            3 => Some(Self::ReportEod),
            4 => Some(Self::ReportEom),
            5 => Some(Self::StartReceipt),
            6 => Some(Self::ControlReceipt),
            7 => Some(Self::NullMonth),
            8 => Some(Self::NullYear),
            _ => None,
        }
    }

    /// Ordinary sale paid with a payment method
    pub fn is_sale(&self) -> bool {
        matches!(self, Self::Cash | Self::DebitCard | Self::CreditCard)
    }

    /// Day or month closing report
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::ReportEod | Self::ReportEom)
    }

    /// Zero-turnover null receipt
    pub fn is_null_receipt(&self) -> bool {
        matches!(self, Self::NullMonth | Self::NullYear)
    }

    /// Receipt types which mark that the month is already closed
    pub fn marks_month_closed(&self) -> bool {
        matches!(self, Self::ReportEom | Self::NullMonth | Self::NullYear)
    }

    /// Human readable action text (printed and journaled)
    pub fn action_text(&self) -> &'static str {
        match self {
            Self::Cash => "Bar",
            Self::DebitCard => "Bankomat",
            Self::CreditCard => "Kreditkarte",
            Self::ReportEod => "Tagesabschluss",
            Self::ReportEom => "Monatsabschluss",
            Self::StartReceipt => "Startbeleg",
            Self::ControlReceipt => "Kontrollbeleg",
            Self::NullMonth => "Monatsbeleg",
            Self::NullYear => "Jahresbeleg",
        }
    }
}

impl fmt::Display for PayedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_text())
    }
}

/// Storno linkage state stored in `receipts.storno`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StornoState {
    #[default]
    None,
    /// Voided by a later storno receipt
    Voided,
    /// This receipt is the storno of an earlier one
    StornoReceipt,
}

impl StornoState {
    pub fn code(&self) -> i64 {
        match self {
            Self::None => 0,
            Self::Voided => 1,
            Self::StornoReceipt => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Voided,
            2 => Self::StornoReceipt,
            _ => Self::None,
        }
    }
}

/// Finalized receipt as stored in `receipts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub receipt_num: i64,
    pub timestamp: NaiveDateTime,
    pub payed_by: PayedBy,
    pub gross: Decimal,
    pub net: Decimal,
    pub storno: StornoState,
    /// Weak back-reference to the voided / voiding receipt id (0 = none)
    pub storno_id: i64,
    pub user_id: Option<String>,
    /// Opaque chained signature string
    pub signature: String,
}

impl Receipt {
    pub fn is_voided(&self) -> bool {
        self.storno == StornoState::Voided
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payed_by_codes_round_trip() {
        for code in 0..=8 {
            let p = PayedBy::from_code(code).unwrap();
            assert_eq!(p.code(), code);
        }
        assert_eq!(PayedBy::from_code(9), None);
        assert_eq!(PayedBy::from_code(-1), None);
    }

    #[test]
    fn test_payed_by_classes() {
        assert!(PayedBy::Cash.is_sale());
        assert!(!PayedBy::ReportEod.is_sale());
        assert!(PayedBy::ReportEom.is_closing());
        assert!(PayedBy::NullYear.is_null_receipt());
        assert!(PayedBy::NullMonth.marks_month_closed());
        assert!(!PayedBy::ReportEod.marks_month_closed());
    }

    #[test]
    fn test_storno_state_codes() {
        assert_eq!(StornoState::from_code(0), StornoState::None);
        assert_eq!(StornoState::from_code(1), StornoState::Voided);
        assert_eq!(StornoState::from_code(2), StornoState::StornoReceipt);
        assert_eq!(StornoState::StornoReceipt.code(), 2);
    }
}
