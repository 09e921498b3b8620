use a11y_core::{Confidence, Severity, ToolName, Urgency, WorkflowType};
use a11y_criteria::{Coverage, Criterion, Principle, TestApproach, TestStrategy, WcagLevel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    AutomatedSufficient,
    ManualReviewRequired(Urgency),
    FalsePositiveCheck,
}

impl Decision {
    pub fn urgency(&self) -> Option<Urgency> {
        match self {
            Decision::AutomatedSufficient => None,
            Decision::ManualReviewRequired(u) => Some(*u),
            Decision::FalsePositiveCheck => Some(Urgency::Low),
        }
    }

    /// Task kind for a decision that needs a human; `None` for automated.
    pub fn workflow_type(&self, strategy: &TestStrategy) -> Option<WorkflowType> {
        match self {
            Decision::AutomatedSufficient => None,
            Decision::FalsePositiveCheck => Some(WorkflowType::FalsePositiveCheck),
            Decision::ManualReviewRequired(_) if strategy.primary == TestApproach::Manual => {
                Some(WorkflowType::ManualConfirmation)
            }
            Decision::ManualReviewRequired(_) => Some(WorkflowType::ViolationVerification),
        }
    }
}

/// How far a finding from `tool` can be trusted at `severity`.
pub fn tool_confidence(tool: &ToolName, severity: Severity) -> Confidence {
    let base = match tool.as_str() {
        t if t == ToolName::AXE => Confidence::High,
        t if t == ToolName::PA11Y || t == ToolName::LIGHTHOUSE => Confidence::Medium,
        _ => Confidence::Low,
    };
    match severity {
        Severity::Critical => Confidence::High,
        Severity::Minor => base.downgrade(),
        _ => base,
    }
}

/// First matching rule wins. Critical findings always go to a human.
pub fn classify(severity: Severity, confidence: Confidence, strategy: &TestStrategy) -> Decision {
    if severity == Severity::Critical {
        return Decision::ManualReviewRequired(Urgency::High);
    }
    if severity == Severity::Serious && matches!(strategy.primary, TestApproach::Hybrid | TestApproach::Manual) {
        return Decision::ManualReviewRequired(Urgency::High);
    }
    if confidence == Confidence::Medium && strategy.automated_coverage != Coverage::High {
        return Decision::ManualReviewRequired(Urgency::Medium);
    }
    if confidence == Confidence::Low || severity == Severity::Minor {
        return Decision::FalsePositiveCheck;
    }
    if confidence == Confidence::High && strategy.automated_coverage == Coverage::High {
        return Decision::AutomatedSufficient;
    }
    Decision::ManualReviewRequired(Urgency::Medium)
}

/// 1 (lowest) to 5. Severity sets the base, level A and the first two
/// principles each add one.
pub fn calculate_priority(severity: Severity, criterion: Option<&Criterion>) -> u8 {
    let mut p: u8 = match severity {
        Severity::Critical => 5,
        Severity::Serious => 4,
        _ => 3,
    };
    if let Some(c) = criterion {
        if c.level == WcagLevel::A {
            p = (p + 1).min(5);
        }
        if matches!(c.principle, Principle::Perceivable | Principle::Operable) {
            p = (p + 1).min(5);
        }
    }
    p.clamp(1, 5)
}
