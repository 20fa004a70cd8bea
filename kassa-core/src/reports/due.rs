//! Business day arithmetic and the due-closing decision
//!
//! With curfew `c` a timestamp `t` belongs to the business day
//! `(t - c).date()`. A timestamp exactly at the curfew starts the new
//! business day; one second earlier still belongs to the previous one.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use shared::models::{ClosingKind, PayedBy, Receipt};

fn curfew_offset(curfew: NaiveTime) -> Duration {
    curfew.signed_duration_since(NaiveTime::MIN)
}

pub fn business_day(timestamp: &NaiveDateTime, curfew: NaiveTime) -> NaiveDate {
    (*timestamp - curfew_offset(curfew)).date()
}

/// First day of the business month of `day`
pub fn month_of(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn next_month(month: NaiveDate) -> NaiveDate {
    month.checked_add_months(Months::new(1)).unwrap_or(month)
}

/// The period one closing covers, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClosingWindow {
    pub kind: ClosingKind,
    /// Business day, or the first day of the month for month closings
    pub period: NaiveDate,
    pub from: NaiveDateTime,
    /// Last closeable timestamp; the closing receipt carries it
    pub to: NaiveDateTime,
}

impl ClosingWindow {
    pub fn day(day: NaiveDate, curfew: NaiveTime) -> Self {
        let from = day.and_time(curfew);
        Self {
            kind: ClosingKind::Day,
            period: day,
            from,
            to: from + Duration::days(1) - Duration::seconds(1),
        }
    }

    pub fn month(day: NaiveDate, curfew: NaiveTime) -> Self {
        let first = month_of(day);
        let from = first.and_time(curfew);
        Self {
            kind: ClosingKind::Month,
            period: first,
            from,
            to: next_month(first).and_time(curfew) - Duration::seconds(1),
        }
    }

    /// December month closings also close the year
    pub fn closes_year(&self) -> bool {
        self.kind == ClosingKind::Month && self.period.month() == 12
    }

    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        self.from <= *timestamp && *timestamp <= self.to
    }
}

/// Closings required before the register may continue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DueClosings {
    pub day: Option<ClosingWindow>,
    pub month: Option<ClosingWindow>,
}

impl DueClosings {
    pub fn is_empty(&self) -> bool {
        self.day.is_none() && self.month.is_none()
    }

    /// Day before month
    pub fn next(&self) -> Option<ClosingWindow> {
        self.day.or(self.month)
    }
}

/// Business day the next day closing would close
///
/// `None` when the last receipt already is a day closing or the month is closed.
pub fn closable_day(last: Option<&Receipt>, curfew: NaiveTime) -> Option<NaiveDate> {
    let last = last?;
    if last.payed_by == PayedBy::ReportEod || last.payed_by.marks_month_closed() {
        return None;
    }
    Some(business_day(&last.timestamp, curfew))
}

/// First day of the month the next month closing would close
///
/// After a month closing (or its null receipt) this is the following month,
/// which may be an empty month without receipts.
pub fn closable_month(last: Option<&Receipt>, curfew: NaiveTime) -> Option<NaiveDate> {
    let last = last?;
    let month = month_of(business_day(&last.timestamp, curfew));
    if last.payed_by.marks_month_closed() {
        Some(next_month(month))
    } else {
        Some(month)
    }
}

/// Which closings are due at `check`, given the most recent receipt
pub fn compute_due_closings(
    last: Option<&Receipt>,
    check: &NaiveDateTime,
    curfew: NaiveTime,
) -> DueClosings {
    let check_day = business_day(check, curfew);
    let check_month = month_of(check_day);

    let day = closable_day(last, curfew)
        .filter(|day| *day < check_day)
        .map(|day| ClosingWindow::day(day, curfew));
    let month = closable_month(last, curfew)
        .filter(|month| *month < check_month)
        .map(|month| ClosingWindow::month(month, curfew));

    DueClosings { day, month }
}

/// Whether the last receipt closed the business day of `check`
pub fn day_closed_at(last: Option<&Receipt>, check: &NaiveDateTime, curfew: NaiveTime) -> bool {
    let Some(last) = last else {
        return false;
    };
    let check_day = business_day(check, curfew);
    match last.payed_by {
        PayedBy::ReportEod => business_day(&last.timestamp, curfew) == check_day,
        p if p.marks_month_closed() => {
            month_of(business_day(&last.timestamp, curfew)) == month_of(check_day)
        }
        _ => false,
    }
}
