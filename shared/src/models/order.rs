//! Order line and tax bracket model

use crate::money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tax brackets of the machine-readable receipt code
///
/// Normal 20 %, reduced 10 % and 13 %, zero, special 19 %.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaxBracket {
    Normal,
    Reduced1,
    Reduced2,
    Null,
    Special,
}

impl TaxBracket {
    pub const ALL: [TaxBracket; 5] = [
        TaxBracket::Normal,
        TaxBracket::Reduced1,
        TaxBracket::Reduced2,
        TaxBracket::Null,
        TaxBracket::Special,
    ];

    /// Percentage of the bracket
    pub fn rate(&self) -> Decimal {
        match self {
            Self::Normal => Decimal::from(20),
            Self::Reduced1 => Decimal::from(10),
            Self::Reduced2 => Decimal::from(13),
            Self::Null => Decimal::ZERO,
            Self::Special => Decimal::from(19),
        }
    }

    /// Bracket for a tax percentage, `None` for rates the code cannot carry
    pub fn from_rate(rate: Decimal) -> Option<Self> {
        let rate = rate.normalize();
        Self::ALL.into_iter().find(|b| b.rate() == rate)
    }

    /// Label used in the journal summary line
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Satz-Normal",
            Self::Reduced1 => "Satz-Ermaessigt-1",
            Self::Reduced2 => "Satz-Ermaessigt-2",
            Self::Null => "Satz-Null",
            Self::Special => "Satz-Besonders",
        }
    }
}

/// Gross sums per tax bracket of one receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxBracketSums {
    pub normal: Decimal,
    pub reduced1: Decimal,
    pub reduced2: Decimal,
    pub null: Decimal,
    pub special: Decimal,
}

impl TaxBracketSums {
    pub fn add(&mut self, bracket: TaxBracket, amount: Decimal) {
        let slot = match bracket {
            TaxBracket::Normal => &mut self.normal,
            TaxBracket::Reduced1 => &mut self.reduced1,
            TaxBracket::Reduced2 => &mut self.reduced2,
            TaxBracket::Null => &mut self.null,
            TaxBracket::Special => &mut self.special,
        };
        *slot += amount;
    }

    pub fn get(&self, bracket: TaxBracket) -> Decimal {
        match bracket {
            TaxBracket::Normal => self.normal,
            TaxBracket::Reduced1 => self.reduced1,
            TaxBracket::Reduced2 => self.reduced2,
            TaxBracket::Null => self.null,
            TaxBracket::Special => self.special,
        }
    }

    pub fn total(&self) -> Decimal {
        self.normal + self.reduced1 + self.reduced2 + self.null + self.special
    }

    /// Net total, bracket by bracket
    pub fn net(&self) -> Decimal {
        TaxBracket::ALL
            .into_iter()
            .map(|b| money::net_from_gross(self.get(b), b.rate()))
            .sum()
    }

    /// Sums in bracket order, rounded to cents
    pub fn as_array(&self) -> [Decimal; 5] {
        TaxBracket::ALL.map(|b| money::round2(self.get(b)))
    }
}

/// One order line of a receipt (`orders` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product: String,
    #[serde(default)]
    pub product_group: Option<String>,
    pub count: Decimal,
    /// Unit price including tax
    pub gross: Decimal,
    /// Tax percentage
    pub tax: Decimal,
    /// Discount percentage
    #[serde(default)]
    pub discount: Decimal,
}

impl OrderLine {
    pub fn new(product: impl Into<String>, count: Decimal, gross: Decimal, tax: Decimal) -> Self {
        Self {
            product: product.into(),
            product_group: None,
            count,
            gross,
            tax,
            discount: Decimal::ZERO,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.product_group = Some(group.into());
        self
    }

    pub fn with_discount(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    /// Line total after discount, rounded half-up to cents
    pub fn total(&self) -> Decimal {
        let full = self.count * self.gross;
        money::round2(full - full * self.discount / Decimal::ONE_HUNDRED)
    }

    /// Net amount of the line total
    pub fn net(&self) -> Decimal {
        money::net_from_gross(self.total(), self.tax)
    }

    /// The same line with negated quantity (storno)
    pub fn negated(&self) -> Self {
        let mut line = self.clone();
        line.count = -line.count;
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_bracket_from_rate() {
        assert_eq!(TaxBracket::from_rate(d("20")), Some(TaxBracket::Normal));
        assert_eq!(TaxBracket::from_rate(d("20.00")), Some(TaxBracket::Normal));
        assert_eq!(TaxBracket::from_rate(d("13")), Some(TaxBracket::Reduced2));
        assert_eq!(TaxBracket::from_rate(d("0")), Some(TaxBracket::Null));
        assert_eq!(TaxBracket::from_rate(d("7")), None);
    }

    #[test]
    fn test_line_total_with_discount() {
        let line = OrderLine::new("Kaffee", d("3"), d("2.90"), d("20")).with_discount(d("10"));
        // 8.70 - 0.87
        assert_eq!(line.total(), d("7.83"));
    }

    #[test]
    fn test_line_total_rounds_half_up() {
        let line = OrderLine::new("x", d("1"), d("63.985"), d("20"));
        assert_eq!(line.total(), d("63.99"));
    }

    #[test]
    fn test_negated_line() {
        let line = OrderLine::new("Bier", d("2"), d("4.50"), d("20"));
        let neg = line.negated();
        assert_eq!(neg.total(), d("-9.00"));
        assert_eq!(neg.net(), d("-7.50"));
    }

    #[test]
    fn test_bracket_sums() {
        let mut sums = TaxBracketSums::default();
        sums.add(TaxBracket::Normal, d("12.00"));
        sums.add(TaxBracket::Reduced1, d("5.50"));
        sums.add(TaxBracket::Normal, d("1.00"));
        assert_eq!(sums.normal, d("13.00"));
        assert_eq!(sums.total(), d("18.50"));
        assert_eq!(sums.as_array()[1], d("5.50"));
    }
}
