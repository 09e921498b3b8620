use serde::{Deserialize, Serialize};

use crate::{ids::*, model::*, progress::SessionProgress, time::EpochMs};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub project_id: String,
    pub pages: Vec<Page>,
    pub tools: Vec<ToolName>,
    pub status: SessionStatus,
    pub progress: SessionProgress,
    pub failure_reason: Option<String>,
    pub summary: Option<SessionSummary>,
    pub created_at: EpochMs,
    pub updated_at: EpochMs,
    pub completed_at: Option<EpochMs>,
}

impl Session {
    /// New session in `planning`. Requested tools are treated as a set.
    pub fn new(project_id: impl Into<String>, tools: Vec<ToolName>, now: EpochMs) -> Self {
        let mut tools = tools;
        tools.sort();
        tools.dedup();
        Self {
            id: SessionId::new(),
            project_id: project_id.into(),
            pages: vec![],
            tools,
            status: SessionStatus::Planning,
            progress: SessionProgress::default(),
            failure_reason: None,
            summary: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn requests_tool(&self, tool: &ToolName) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// automated_violations + manual_confirmed
    pub total_violations: u64,
    pub automated_violations: u64,
    pub manual_confirmed: u64,
    pub passed_tests: u64,
    pub failed_tests: u64,
    pub not_applicable_tests: u64,
    pub completion_percent: f64,
    pub failed_units: u32,
    pub open_tasks: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: ScanResultId,
    pub session_id: SessionId,
    pub page_id: PageId,
    pub page_url: String,
    pub tool: ToolName,
    pub raw_output: serde_json::Value,
    pub violation_count: u32,
    pub pass_count: u32,
    pub duration_ms: u64,
    /// Set when the tool could not be run or its output could not be read.
    pub error: Option<String>,
    pub scanned_at: EpochMs,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: ViolationId,
    pub scan_result_id: ScanResultId,
    pub session_id: SessionId,
    pub page_id: PageId,
    pub tool: ToolName,
    pub rule_id: String,
    pub severity: Severity,
    pub description: String,
    pub selector: String,
    pub help_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Violation {
        violation_id: ViolationId,
        tool: ToolName,
        rule_id: String,
        selector: String,
    },
    Pass {
        tool: ToolName,
    },
    Review {
        reviewer: Option<String>,
        resolution: Resolution,
        notes: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestInstance {
    pub id: TestInstanceId,
    pub session_id: SessionId,
    pub criterion_id: CriterionId,
    pub page_id: PageId,
    pub status: TestStatus,
    pub method: TestMethod,
    pub confidence: Confidence,
    pub evidence: Vec<Evidence>,
    pub tool_used: Option<ToolName>,
    pub updated_at: EpochMs,
}

impl TestInstance {
    pub fn automated(
        session_id: &SessionId,
        criterion_id: &CriterionId,
        page_id: &PageId,
        status: TestStatus,
        confidence: Confidence,
        tool: &ToolName,
        evidence: Vec<Evidence>,
        now: EpochMs,
    ) -> Self {
        Self {
            id: TestInstanceId::new(),
            session_id: session_id.clone(),
            criterion_id: criterion_id.clone(),
            page_id: page_id.clone(),
            status,
            method: TestMethod::Automated,
            confidence,
            evidence,
            tool_used: Some(tool.clone()),
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    #[serde(default)]
    pub reviewer: Option<String>,
    pub is_violation: bool,
    #[serde(default)]
    pub is_false_positive: bool,
    pub confidence_level: Confidence,
    #[serde(default)]
    pub notes: String,
}

impl ReviewSubmission {
    pub fn resolution(&self) -> Resolution {
        if self.is_violation {
            Resolution::ViolationConfirmed
        } else if self.is_false_positive {
            Resolution::FalsePositive
        } else {
            Resolution::Resolved
        }
    }

    /// Verdict the reviewed criterion takes once the review lands.
    pub fn verdict(&self) -> TestStatus {
        match self.resolution() {
            Resolution::ViolationConfirmed => TestStatus::Failed,
            Resolution::FalsePositive => TestStatus::NotApplicable,
            Resolution::Resolved => TestStatus::Passed,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: WorkflowTaskId,
    pub session_id: SessionId,
    pub criterion_id: CriterionId,
    pub page_id: PageId,
    pub workflow_type: WorkflowType,
    pub priority: u8,
    pub urgency: Urgency,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
    /// Markdown procedure handed to the reviewer.
    pub procedure: String,
    pub resolution: Option<Resolution>,
    pub review: Option<ReviewSubmission>,
    #[serde(default)]
    pub violation_ids: Vec<ViolationId>,
    pub created_at: EpochMs,
    pub updated_at: EpochMs,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    ReviewerPool,
    Reviewer(String),
    SessionWatchers,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub session_id: SessionId,
    pub task_id: Option<WorkflowTaskId>,
    pub kind: NotificationKind,
    pub recipient: Recipient,
    pub message: String,
    pub created_at: EpochMs,
}

impl Notification {
    pub fn new(
        session_id: &SessionId,
        task_id: Option<&WorkflowTaskId>,
        kind: NotificationKind,
        recipient: Recipient,
        message: impl Into<String>,
        now: EpochMs,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            session_id: session_id.clone(),
            task_id: task_id.cloned(),
            kind,
            recipient,
            message: message.into(),
            created_at: now,
        }
    }
}
