//! Closing Record Model (Tages- / Monatsabschluss)

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Kind of closing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingKind {
    Day,
    Month,
}

impl ClosingKind {
    pub fn code(&self) -> i64 {
        match self {
            Self::Day => 0,
            Self::Month => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Day),
            1 => Some(Self::Month),
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Day => "Tagesabschluss",
            Self::Month => "Monatsabschluss",
        }
    }
}

/// Section a report line belongs to (`reports.type`)
///
/// Product group and product sections are alternative views; a printed report
/// shows either of them next to the always present summary section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    Summary,
    ProductGroups,
    Products,
}

impl ReportSection {
    pub fn code(&self) -> i64 {
        match self {
            Self::Summary => 0,
            Self::ProductGroups => 1,
            Self::Products => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::ProductGroups,
            2 => Self::Products,
            _ => Self::Summary,
        }
    }
}

/// A persisted closing: header plus its text lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingRecord {
    pub receipt_num: i64,
    /// End of the closed window
    pub timestamp: NaiveDateTime,
    /// Start of the closed window
    pub timestamp_from: NaiveDateTime,
    /// Curfew in effect when the closing was produced ("HH:MM")
    pub curfew: String,
    pub kind: ClosingKind,
    pub lines: Vec<(ReportSection, String)>,
}

impl ClosingRecord {
    /// Text lines of the summary plus one detail section
    pub fn printable_lines(&self, by_product_group: bool) -> Vec<&str> {
        let hidden = if by_product_group {
            ReportSection::Products
        } else {
            ReportSection::ProductGroups
        };
        self.lines
            .iter()
            .filter(|(section, _)| *section != hidden)
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_printable_lines_filters_detail_section() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let record = ClosingRecord {
            receipt_num: 7,
            timestamp: ts,
            timestamp_from: ts,
            curfew: "00:00".into(),
            kind: ClosingKind::Day,
            lines: vec![
                (ReportSection::Summary, "Summe: 1,00".into()),
                (ReportSection::ProductGroups, "Getränke : 1,00".into()),
                (ReportSection::Products, "1: Bier: 1,00: 1,00: 20%".into()),
            ],
        };
        assert_eq!(
            record.printable_lines(true),
            vec!["Summe: 1,00", "Getränke : 1,00"]
        );
        assert_eq!(
            record.printable_lines(false),
            vec!["Summe: 1,00", "1: Bier: 1,00: 1,00: 20%"]
        );
    }
}
