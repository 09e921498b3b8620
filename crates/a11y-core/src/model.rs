use serde::{Deserialize, Serialize};

/// Declares a closed enum that is stored as a snake_case string.
///
/// The literal must match serde's `snake_case` rendering of the variant.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }

            pub fn from_wire(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// Lifecycle of a compliance session.
    SessionStatus {
        Planning => "planning",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
);

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// planning -> in_progress -> {completed | failed | cancelled}.
    /// A session that never left planning may still fail or be cancelled.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        match (self, next) {
            (Self::Planning, Self::InProgress | Self::Failed | Self::Cancelled) => true,
            (Self::InProgress, Self::Completed | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

wire_enum!(
    /// Orchestrator phase a session is currently in.
    Phase {
        Discovery => "discovery",
        ScanMatrix => "scan_matrix",
        Aggregation => "aggregation",
        Adjudication => "adjudication",
        Finalization => "finalization",
        Done => "done",
    }
);

wire_enum!(
    /// Impact reported by a scanning tool, least severe first.
    Severity {
        Minor => "minor",
        Moderate => "moderate",
        Serious => "serious",
        Critical => "critical",
    }
);

wire_enum!(
    Confidence {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

impl Confidence {
    pub fn downgrade(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}

wire_enum!(
    TestStatus {
        Passed => "passed",
        Failed => "failed",
        Pending => "pending",
        NotApplicable => "not_applicable",
    }
);

wire_enum!(
    TestMethod {
        Automated => "automated",
        Manual => "manual",
    }
);

wire_enum!(
    WorkflowType {
        ViolationVerification => "violation_verification",
        FalsePositiveCheck => "false_positive_check",
        ManualConfirmation => "manual_confirmation",
        RemediationValidation => "remediation_validation",
    }
);

wire_enum!(
    Urgency {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

wire_enum!(
    TaskStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
);

impl TaskStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

wire_enum!(
    Resolution {
        ViolationConfirmed => "violation_confirmed",
        FalsePositive => "false_positive",
        Resolved => "resolved",
    }
);

wire_enum!(
    NotificationKind {
        TaskCreated => "task_created",
        TaskAssigned => "task_assigned",
        TaskCompleted => "task_completed",
        SessionMilestone => "session_milestone",
        SessionFinished => "session_finished",
    }
);
