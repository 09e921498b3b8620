use serde::{Deserialize, Serialize};

use crate::model::Phase;

/// Thresholds (percent) at which a milestone event is emitted.
pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// Typed progress record for a session.
///
/// Always persisted whole; callers go through the setters below rather than
/// patching individual fields in storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub phase: Phase,
    pub units_total: u32,
    pub units_completed: u32,
    pub units_failed: u32,
    pub violations_found: u32,
    pub milestones_fired: Vec<u8>,
    pub automated_sufficient: u32,
    pub manual_required: u32,
    pub false_positive_candidates: u32,
    pub unmapped_violations: u32,
}

impl Default for SessionProgress {
    fn default() -> Self {
        Self {
            phase: Phase::Discovery,
            units_total: 0,
            units_completed: 0,
            units_failed: 0,
            violations_found: 0,
            milestones_fired: vec![],
            automated_sufficient: 0,
            manual_required: 0,
            false_positive_candidates: 0,
            unmapped_violations: 0,
        }
    }
}

impl SessionProgress {
    pub fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn set_units_total(&mut self, total: u32) {
        self.units_total = total;
    }

    /// Count one finished page x tool unit. Failed units still count as completed.
    pub fn record_unit(&mut self, violations: u32, failed: bool) {
        self.units_completed = self.units_completed.saturating_add(1).min(self.units_total.max(1));
        self.violations_found = self.violations_found.saturating_add(violations);
        if failed {
            self.units_failed = self.units_failed.saturating_add(1);
        }
    }

    pub fn record_adjudication(&mut self, automated: u32, manual: u32, false_positive: u32, unmapped: u32) {
        self.automated_sufficient = automated;
        self.manual_required = manual;
        self.false_positive_candidates = false_positive;
        self.unmapped_violations = unmapped;
    }

    /// completed / total x 100. An empty matrix counts as done.
    pub fn percent(&self) -> f64 {
        if self.units_total == 0 {
            return 100.0;
        }
        (self.units_completed as f64 / self.units_total as f64) * 100.0
    }

    /// Milestones reached since the last call; each threshold is returned at most once.
    pub fn take_new_milestones(&mut self) -> Vec<u8> {
        let pct = self.percent();
        let mut reached = vec![];
        for m in MILESTONES {
            if pct >= m as f64 && !self.milestones_fired.contains(&m) {
                self.milestones_fired.push(m);
                reached.push(m);
            }
        }
        reached
    }
}
