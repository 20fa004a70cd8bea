//! Closing statistics
//!
//! Aggregates the sales of a window into report text lines:
//! summary (counts, payment methods, tax rates, users, total), product
//! groups and products. All sums are `Decimal`, rounded per line.

use crate::db::DbResult;
use crate::db::repository::orders::{self, SaleLine};
use crate::db::repository::receipts;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use shared::models::{Receipt, ReportSection, StornoState};
use shared::money::{format_amount, round2};
use sqlx::SqliteConnection;
use std::collections::BTreeMap;

pub const DAY_TITLE: &str = "Tagesumsatz";
pub const MONTH_TITLE: &str = "Monatsumsatz";
pub const YEAR_TITLE: &str = "Jahresumsatz";

const SEPARATOR: &str = "-";
const NO_GROUP: &str = "Ohne Warengruppe";
const NO_USER: &str = "n/a";

fn format_count(count: Decimal) -> String {
    count.normalize().to_string().replace('.', ",")
}

fn format_rate(rate: Decimal) -> String {
    format!("{}%", rate.normalize().to_string().replace('.', ","))
}

/// Lines for `title` over the given sales
pub fn build_stats(
    title: &str,
    sales: &[Receipt],
    lines: &[SaleLine],
) -> Vec<(ReportSection, String)> {
    let mut out = Vec::new();
    let mut summary = |text: String| out.push((ReportSection::Summary, text));

    let sold: Decimal = lines.iter().map(|l| l.line.count).sum();
    let payments = sales
        .iter()
        .filter(|r| r.storno != StornoState::StornoReceipt)
        .count();
    let stornos = sales.len() - payments;

    summary(format!("Anzahl verkaufter Artikel oder Leistungen: {}", format_count(sold)));
    summary(format!("Anzahl Zahlungen: {payments}"));
    summary(format!("Anzahl Stornos: {stornos}"));
    summary(SEPARATOR.into());

    // payment methods
    let mut by_payment: BTreeMap<&str, Decimal> = BTreeMap::new();
    for r in sales {
        *by_payment.entry(r.payed_by.action_text()).or_default() += round2(r.gross);
    }
    summary("Umsätze nach Zahlungsmittel".into());
    for (method, total) in &by_payment {
        summary(format!("{method}: {}", format_amount(*total)));
    }
    summary(SEPARATOR.into());
    summary(format!("Summe: {}", format_amount(by_payment.values().sum())));
    summary(SEPARATOR.into());

    // tax rates
    let mut by_rate: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    for l in lines {
        *by_rate.entry(l.line.tax.normalize()).or_default() += l.line.total();
    }
    summary("Umsätze nach Steuersätzen".into());
    for (rate, total) in &by_rate {
        summary(format!("{}: {}", format_rate(*rate), format_amount(*total)));
    }
    summary(SEPARATOR.into());
    summary(format!("Summe: {}", format_amount(by_rate.values().sum())));
    summary(SEPARATOR.into());

    // users
    let mut by_user: BTreeMap<&str, BTreeMap<&str, Decimal>> = BTreeMap::new();
    for r in sales {
        let user = r.user_id.as_deref().unwrap_or(NO_USER);
        *by_user
            .entry(user)
            .or_default()
            .entry(r.payed_by.action_text())
            .or_default() += round2(r.gross);
    }
    summary("Umsätze nach Benutzer".into());
    let mut user_total = Decimal::ZERO;
    for (user, methods) in &by_user {
        for (method, total) in methods {
            summary(format!("{user}: {method}: {}", format_amount(*total)));
            user_total += *total;
        }
    }
    summary(SEPARATOR.into());
    summary(format!("Summe: {}", format_amount(user_total)));
    summary(SEPARATOR.into());

    let gross: Decimal = sales.iter().map(|r| round2(r.gross)).sum();
    summary(format!("{title}: {}", format_amount(gross)));

    // product groups: total per group, tax share per rate
    let mut groups: BTreeMap<&str, BTreeMap<Decimal, Decimal>> = BTreeMap::new();
    for l in lines {
        let group = l.line.product_group.as_deref().unwrap_or(NO_GROUP);
        *groups
            .entry(group)
            .or_default()
            .entry(l.line.tax.normalize())
            .or_default() += l.line.total();
    }
    out.push((ReportSection::ProductGroups, "Warengruppen Abrechnung".into()));
    out.push((ReportSection::ProductGroups, SEPARATOR.into()));
    let mut groups_total = Decimal::ZERO;
    for (group, rates) in &groups {
        let total: Decimal = rates.values().sum();
        groups_total += total;
        out.push((
            ReportSection::ProductGroups,
            format!("{group} : {}", format_amount(total)),
        ));
        for (rate, amount) in rates {
            let tax = *amount - round2(*amount * Decimal::ONE_HUNDRED / (Decimal::ONE_HUNDRED + *rate));
            out.push((
                ReportSection::ProductGroups,
                format!("davon MwSt. {}: {}", format_rate(*rate), format_amount(tax)),
            ));
        }
    }
    out.push((ReportSection::ProductGroups, SEPARATOR.into()));
    out.push((
        ReportSection::ProductGroups,
        format!("Warengruppe Summe: {}", format_amount(groups_total)),
    ));

    // products, grouped by product group
    type ProductKey<'a> = (&'a str, Decimal, &'a str, Decimal, Decimal);
    let mut products: BTreeMap<ProductKey<'_>, (Decimal, Decimal)> = BTreeMap::new();
    for l in lines {
        let line = &l.line;
        let key = (
            line.product_group.as_deref().unwrap_or(NO_GROUP),
            line.tax.normalize(),
            line.product.as_str(),
            line.gross,
            line.discount.normalize(),
        );
        let entry = products.entry(key).or_default();
        entry.0 += line.count;
        entry.1 += line.total();
    }
    out.push((
        ReportSection::Products,
        format!("Verkaufte Artikel oder Leistungen (Gruppiert) Gesamt {}", format_count(sold)),
    ));
    let mut current_group = None;
    for ((group, rate, product, gross, discount), (count, total)) in &products {
        if current_group != Some(*group) {
            current_group = Some(*group);
            out.push((ReportSection::Products, group.to_string()));
        }
        let name = if discount.is_zero() {
            product.to_string()
        } else {
            format!("{product} (Rabatt -{}%)", format_count(*discount))
        };
        out.push((
            ReportSection::Products,
            format!(
                "{}: {name}: {}: {}: {}",
                format_count(*count),
                format_amount(*gross),
                format_amount(*total),
                format_rate(*rate)
            ),
        ));
    }

    out
}

/// Statistics of all sales with `from <= timestamp <= to`
pub async fn window_stats(
    conn: &mut SqliteConnection,
    title: &str,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> DbResult<Vec<(ReportSection, String)>> {
    let sales = receipts::sales_in_window(conn, from, to).await?;
    let lines = orders::sale_lines_in_window(conn, from, to).await?;
    Ok(build_stats(title, &sales, &lines))
}

/// Year totals appended to the December month closing (summary section only)
pub async fn year_stats(
    conn: &mut SqliteConnection,
    year: i32,
    curfew: NaiveTime,
    to: &NaiveDateTime,
) -> DbResult<Vec<(ReportSection, String)>> {
    let Some(from) = NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d.and_time(curfew)) else {
        return Ok(Vec::new());
    };
    let mut out = vec![
        (
            ReportSection::Summary,
            format!(
                "Jahressummen {year} ({} - {}) :",
                from.format("%d.%m.%Y %H:%M"),
                to.format("%d.%m.%Y %H:%M")
            ),
        ),
        (ReportSection::Summary, SEPARATOR.into()),
    ];
    out.extend(
        window_stats(conn, YEAR_TITLE, &from, to)
            .await?
            .into_iter()
            .filter(|(section, _)| *section == ReportSection::Summary),
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{OrderLine, PayedBy};
    use shared::util::parse_ts;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sale(num: i64, payed_by: PayedBy, gross: &str, user: &str) -> Receipt {
        Receipt {
            id: num,
            receipt_num: num,
            timestamp: parse_ts("2024-05-02T10:00:00").unwrap(),
            payed_by,
            gross: d(gross),
            net: Decimal::ZERO,
            storno: StornoState::None,
            storno_id: 0,
            user_id: Some(user.into()),
            signature: String::new(),
        }
    }

    fn line(num: i64, line: OrderLine) -> SaleLine {
        SaleLine {
            receipt_num: num,
            timestamp: parse_ts("2024-05-02T10:00:00").unwrap(),
            payed_by: PayedBy::Cash,
            user_id: None,
            line,
        }
    }

    fn texts(lines: &[(ReportSection, String)], section: ReportSection) -> Vec<&str> {
        lines
            .iter()
            .filter(|(s, _)| *s == section)
            .map(|(_, t)| t.as_str())
            .collect()
    }

    #[test]
    fn test_build_stats_sections() {
        let mut storno = sale(3, PayedBy::Cash, "-3.20", "anna");
        storno.storno = StornoState::StornoReceipt;
        let sales = vec![
            sale(1, PayedBy::Cash, "10.80", "anna"),
            sale(2, PayedBy::DebitCard, "3.20", "ben"),
            storno,
        ];
        let lines = vec![
            line(1, OrderLine::new("Melange", d("2"), d("3.80"), d("10")).with_group("Kaffee")),
            line(1, OrderLine::new("Spritzer", d("1"), d("3.20"), d("20")).with_group("Wein")),
            line(2, OrderLine::new("Spritzer", d("1"), d("3.20"), d("20")).with_group("Wein")),
            line(3, OrderLine::new("Spritzer", d("-1"), d("3.20"), d("20")).with_group("Wein")),
        ];

        let stats = build_stats(DAY_TITLE, &sales, &lines);
        let summary = texts(&stats, ReportSection::Summary);
        assert!(summary.contains(&"Anzahl verkaufter Artikel oder Leistungen: 3"));
        assert!(summary.contains(&"Anzahl Zahlungen: 2"));
        assert!(summary.contains(&"Anzahl Stornos: 1"));
        assert!(summary.contains(&"Bar: 7,60"));
        assert!(summary.contains(&"Bankomat: 3,20"));
        assert!(summary.contains(&"10%: 7,60"));
        assert!(summary.contains(&"20%: 3,20"));
        assert!(summary.contains(&"anna: Bar: 7,60"));
        assert_eq!(summary.last(), Some(&"Tagesumsatz: 10,80"));

        let groups = texts(&stats, ReportSection::ProductGroups);
        assert!(groups.contains(&"Kaffee : 7,60"));
        assert!(groups.contains(&"davon MwSt. 10%: 0,69"));
        assert!(groups.contains(&"Wein : 3,20"));
        assert_eq!(groups.last(), Some(&"Warengruppe Summe: 10,80"));

        let products = texts(&stats, ReportSection::Products);
        assert_eq!(products[0], "Verkaufte Artikel oder Leistungen (Gruppiert) Gesamt 3");
        assert!(products.contains(&"2: Melange: 3,80: 7,60: 10%"));
        assert!(products.contains(&"1: Spritzer: 3,20: 3,20: 20%"));
    }

    #[test]
    fn test_build_stats_empty_window() {
        let stats = build_stats(MONTH_TITLE, &[], &[]);
        let summary = texts(&stats, ReportSection::Summary);
        assert!(summary.contains(&"Anzahl Zahlungen: 0"));
        assert_eq!(summary.last(), Some(&"Monatsumsatz: 0,00"));
    }
}
