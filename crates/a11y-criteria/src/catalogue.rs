use serde::{Deserialize, Serialize};

use a11y_core::{Confidence, CriterionId, ToolName};

/// WCAG conformance level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WcagLevel {
    A,
    AA,
    AAA,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principle {
    Perceivable,
    Operable,
    Understandable,
    Robust,
}

impl Principle {
    /// Principle from the leading digit of a criterion number.
    pub fn of(criterion: &CriterionId) -> Option<Self> {
        match criterion.as_str().split('.').next()? {
            "1" => Some(Self::Perceivable),
            "2" => Some(Self::Operable),
            "3" => Some(Self::Understandable),
            "4" => Some(Self::Robust),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub title: String,
    pub level: WcagLevel,
    pub principle: Principle,
}

/// One row of a tool's rule table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMapping {
    pub tool: ToolName,
    pub rule_id: String,
    pub criteria: Vec<CriterionId>,
    pub confidence: Confidence,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualProcedure {
    pub criterion: CriterionId,
    pub title: String,
    pub steps: Vec<String>,
    pub tools_needed: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestApproach {
    Automated,
    Manual,
    Hybrid,
}

/// How much of a criterion automated rules can decide, best rule first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    None,
    Low,
    Medium,
    High,
}

impl From<Confidence> for Coverage {
    fn from(c: Confidence) -> Self {
        match c {
            Confidence::Low => Coverage::Low,
            Confidence::Medium => Coverage::Medium,
            Confidence::High => Coverage::High,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStrategy {
    pub primary: TestApproach,
    pub automated_coverage: Coverage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffortEstimate {
    pub automated_minutes: u32,
    pub manual_minutes: u32,
}

/// What to do with a violation no table row or tag can place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UnmappedPolicy {
    /// Leave it unmapped; callers count it but derive no verdict from it.
    #[default]
    Sentinel,
    /// Attribute it to a fixed criterion.
    DefaultCriterion { criterion: CriterionId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Table,
    Tags,
    Fallback,
    Unmapped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CriteriaMatch {
    pub criteria: std::collections::BTreeSet<CriterionId>,
    pub source: MatchSource,
}

impl CriteriaMatch {
    pub fn is_unmapped(&self) -> bool {
        self.source == MatchSource::Unmapped
    }
}
