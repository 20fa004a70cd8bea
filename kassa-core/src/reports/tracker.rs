//! In-process closing phases
//!
//! `NoClosingDue → ClosingDue → InProgress → Done`, tracked per kind. Only one
//! closing may be in progress at a time; a second attempt is refused with a
//! concurrency conflict instead of waiting.

use super::ClosingError;
use super::due::DueClosings;
use parking_lot::Mutex;
use serde::Serialize;
use shared::models::ClosingKind;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingPhase {
    #[default]
    NoClosingDue,
    ClosingDue,
    InProgress,
    Done,
}

#[derive(Debug, Default)]
struct Phases {
    day: ClosingPhase,
    month: ClosingPhase,
}

impl Phases {
    fn slot(&mut self, kind: ClosingKind) -> &mut ClosingPhase {
        match kind {
            ClosingKind::Day => &mut self.day,
            ClosingKind::Month => &mut self.month,
        }
    }

    fn any_in_progress(&self) -> bool {
        self.day == ClosingPhase::InProgress || self.month == ClosingPhase::InProgress
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClosingTracker {
    phases: Arc<Mutex<Phases>>,
}

impl ClosingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, kind: ClosingKind) -> ClosingPhase {
        let mut phases = self.phases.lock();
        *phases.slot(kind)
    }

    /// Apply a fresh due check; phases in progress are left alone
    pub fn refresh(&self, due: &DueClosings) {
        let mut phases = self.phases.lock();
        for (kind, is_due) in [
            (ClosingKind::Day, due.day.is_some()),
            (ClosingKind::Month, due.month.is_some()),
        ] {
            let slot = phases.slot(kind);
            *slot = match (*slot, is_due) {
                (ClosingPhase::InProgress, _) => ClosingPhase::InProgress,
                (_, true) => ClosingPhase::ClosingDue,
                (ClosingPhase::Done, false) => ClosingPhase::Done,
                (_, false) => ClosingPhase::NoClosingDue,
            };
        }
    }

    /// Enter `InProgress`; the guard falls back to `ClosingDue` unless completed
    pub fn begin(&self, kind: ClosingKind) -> Result<ClosingGuard, ClosingError> {
        let mut phases = self.phases.lock();
        if phases.any_in_progress() {
            return Err(ClosingError::ConcurrencyConflict(format!(
                "{} requested while another closing is in progress",
                kind.title()
            )));
        }
        *phases.slot(kind) = ClosingPhase::InProgress;
        Ok(ClosingGuard {
            phases: self.phases.clone(),
            kind,
            completed: false,
        })
    }
}

pub struct ClosingGuard {
    phases: Arc<Mutex<Phases>>,
    kind: ClosingKind,
    completed: bool,
}

impl ClosingGuard {
    pub fn complete(mut self) {
        self.completed = true;
        *self.phases.lock().slot(self.kind) = ClosingPhase::Done;
    }
}

impl Drop for ClosingGuard {
    fn drop(&mut self) {
        if !self.completed {
            *self.phases.lock().slot(self.kind) = ClosingPhase::ClosingDue;
        }
    }
}
