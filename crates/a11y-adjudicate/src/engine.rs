use std::collections::BTreeMap;
use std::sync::Arc;

use a11y_core::*;
use a11y_criteria::KnowledgeBase;
use a11y_storage::{with_retryable_transaction, RetryPolicy, Store, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{calculate_priority, classify, render_procedure, tool_confidence, Decision, NotificationSink, ProcedureContext};

#[derive(Debug, Error)]
pub enum TaskActionError {
    #[error("workflow task not found: {0}")]
    NotFound(WorkflowTaskId),
    #[error("workflow task {task} is {current}")]
    InvalidState { task: WorkflowTaskId, current: TaskStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Narrows [`AdjudicationEngine::list_open_tasks`]. Empty matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub workflow_type: Option<WorkflowType>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub min_priority: Option<u8>,
}

impl TaskFilter {
    pub fn matches(&self, t: &WorkflowTask) -> bool {
        self.workflow_type.map_or(true, |w| t.workflow_type == w)
            && self.urgency.map_or(true, |u| t.urgency == u)
            && self.assignee.as_ref().map_or(true, |a| t.assigned_to.as_ref() == Some(a))
            && self.min_priority.map_or(true, |p| t.priority >= p)
    }
}

/// Counts over (violation, criterion) pairs, plus task bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdjudicationReport {
    pub automated_sufficient: u32,
    pub manual_required: u32,
    pub false_positive_candidates: u32,
    /// Violations that map to no criterion.
    pub unmapped: u32,
    pub tasks_created: u32,
    /// Task-worthy keys that already had an open task.
    pub duplicates_skipped: u32,
}

/// A task to open for (session, criterion, page).
#[derive(Clone, Debug)]
pub struct TaskDraft {
    pub session_id: SessionId,
    pub criterion_id: CriterionId,
    pub page_id: PageId,
    pub workflow_type: WorkflowType,
    pub urgency: Urgency,
    pub priority: u8,
    /// The finding that decided the task, rendered into the procedure.
    pub trigger: Option<Violation>,
    pub violation_ids: Vec<ViolationId>,
}

pub struct AdjudicationEngine {
    store: Arc<dyn Store>,
    kb: Arc<KnowledgeBase>,
    sink: Arc<dyn NotificationSink>,
    retry: RetryPolicy,
}

impl AdjudicationEngine {
    pub fn new(store: Arc<dyn Store>, kb: Arc<KnowledgeBase>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, kb, sink, retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Classify every (violation, criterion) pair and open at most one task per
    /// (criterion, page). Most severe findings are looked at first, so they
    /// decide the task's type and priority; later findings for the same key
    /// only add their ids.
    pub fn process_violations(&self, session: &SessionId, violations: &[Violation]) -> Result<AdjudicationReport, StoreError> {
        let mut ordered: Vec<&Violation> = violations.iter().collect();
        ordered.sort_by(|a, b| b.severity.cmp(&a.severity));

        let mut report = AdjudicationReport::default();
        let mut drafts: BTreeMap<(CriterionId, PageId), TaskDraft> = BTreeMap::new();

        for v in ordered {
            let m = self.kb.map_rule_to_criteria(&v.tool, &v.rule_id, &v.tags);
            if m.is_unmapped() {
                report.unmapped += 1;
                continue;
            }
            let confidence = tool_confidence(&v.tool, v.severity);
            for criterion in m.criteria {
                let strategy = self.kb.get_strategy(&criterion);
                let decision = classify(v.severity, confidence, &strategy);
                debug!(rule = %v.rule_id, criterion = %criterion, ?decision, "classified");
                match decision {
                    Decision::AutomatedSufficient => {
                        report.automated_sufficient += 1;
                        continue;
                    }
                    Decision::ManualReviewRequired(_) => report.manual_required += 1,
                    Decision::FalsePositiveCheck => report.false_positive_candidates += 1,
                }
                let (Some(workflow_type), Some(urgency)) = (decision.workflow_type(&strategy), decision.urgency()) else {
                    continue;
                };

                let key = (criterion.clone(), v.page_id.clone());
                if let Some(draft) = drafts.get_mut(&key) {
                    draft.violation_ids.push(v.id.clone());
                    continue;
                }
                drafts.insert(
                    key,
                    TaskDraft {
                        session_id: session.clone(),
                        priority: calculate_priority(v.severity, self.kb.criterion(&criterion)),
                        criterion_id: criterion,
                        page_id: v.page_id.clone(),
                        workflow_type,
                        urgency,
                        trigger: Some(v.clone()),
                        violation_ids: vec![v.id.clone()],
                    },
                );
            }
        }

        for draft in drafts.into_values() {
            match self.create_task_if_absent(draft)? {
                Some(_) => report.tasks_created += 1,
                None => report.duplicates_skipped += 1,
            }
        }
        info!(
            session_id = %session,
            automated = report.automated_sufficient,
            manual = report.manual_required,
            false_positive = report.false_positive_candidates,
            unmapped = report.unmapped,
            tasks = report.tasks_created,
            "adjudication done"
        );
        Ok(report)
    }

    /// Open a task unless one is already open for the draft's key. Returns the
    /// new task, or `None` for a duplicate. A new task notifies the reviewer pool.
    pub fn create_task_if_absent(&self, draft: TaskDraft) -> Result<Option<WorkflowTask>, StoreError> {
        let now = now_ms();
        let procedure = render_procedure(&ProcedureContext {
            criterion_id: &draft.criterion_id,
            criterion: self.kb.criterion(&draft.criterion_id),
            procedure: self.kb.get_manual_procedure(&draft.criterion_id),
            workflow_type: draft.workflow_type,
            violation: draft.trigger.as_ref(),
        });
        let task = WorkflowTask {
            id: WorkflowTaskId::new(),
            session_id: draft.session_id,
            criterion_id: draft.criterion_id,
            page_id: draft.page_id,
            workflow_type: draft.workflow_type,
            priority: draft.priority.clamp(1, 5),
            urgency: draft.urgency,
            status: TaskStatus::Pending,
            assigned_to: None,
            procedure,
            resolution: None,
            review: None,
            violation_ids: draft.violation_ids,
            created_at: now,
            updated_at: now,
        };

        let inserted =
            with_retryable_transaction(&self.retry, "create_task", || self.store.create_task_if_absent(&task))?;
        if !inserted {
            debug!(criterion = %task.criterion_id, page = %task.page_id, "open task exists, skipped");
            return Ok(None);
        }
        self.notify(Notification::new(
            &task.session_id,
            Some(&task.id),
            NotificationKind::TaskCreated,
            Recipient::ReviewerPool,
            format!(
                "{} task for {} (priority {}, {} urgency)",
                task.workflow_type, task.criterion_id, task.priority, task.urgency
            ),
            now,
        ));
        Ok(Some(task))
    }

    /// pending -> in_progress.
    pub fn assign_task(&self, task_id: &WorkflowTaskId, reviewer: &str) -> Result<WorkflowTask, TaskActionError> {
        let mut task = self.load_in_state(task_id, TaskStatus::Pending)?;
        task.status = TaskStatus::InProgress;
        task.assigned_to = Some(reviewer.to_string());
        task.updated_at = now_ms();

        if !with_retryable_transaction(&self.retry, "assign_task", || self.store.update_task(&task, TaskStatus::Pending))? {
            return Err(self.lost_race(task_id));
        }
        info!(task_id = %task.id, reviewer, "task assigned");
        self.notify(Notification::new(
            &task.session_id,
            Some(&task.id),
            NotificationKind::TaskAssigned,
            Recipient::Reviewer(reviewer.to_string()),
            format!("{} on {} assigned to you", task.workflow_type, task.criterion_id),
            task.updated_at,
        ));
        Ok(task)
    }

    /// in_progress -> completed. The reviewer's verdict replaces whatever the
    /// tools decided for the task's criterion and page.
    pub fn complete_task(
        &self,
        task_id: &WorkflowTaskId,
        review: ReviewSubmission,
    ) -> Result<WorkflowTask, TaskActionError> {
        let mut task = self.load_in_state(task_id, TaskStatus::InProgress)?;
        let now = now_ms();
        let resolution = review.resolution();
        let reviewer = review.reviewer.clone().or_else(|| task.assigned_to.clone());

        let verdict = TestInstance {
            id: TestInstanceId::new(),
            session_id: task.session_id.clone(),
            criterion_id: task.criterion_id.clone(),
            page_id: task.page_id.clone(),
            status: review.verdict(),
            method: TestMethod::Manual,
            confidence: review.confidence_level,
            evidence: vec![Evidence::Review { reviewer: reviewer.clone(), resolution, notes: review.notes.clone() }],
            tool_used: None,
            updated_at: now,
        };
        task.status = TaskStatus::Completed;
        task.resolution = Some(resolution);
        task.review = Some(ReviewSubmission { reviewer, ..review });
        task.updated_at = now;

        let written = with_retryable_transaction(&self.retry, "complete_task", || {
            self.store.record_review(&task, TaskStatus::InProgress, verdict.clone())
        })?;
        if !written {
            return Err(self.lost_race(task_id));
        }
        info!(task_id = %task.id, %resolution, "task completed");
        self.notify(Notification::new(
            &task.session_id,
            Some(&task.id),
            NotificationKind::TaskCompleted,
            Recipient::SessionWatchers,
            format!("{} on {}: {}", task.workflow_type, task.criterion_id, resolution),
            now,
        ));
        Ok(task)
    }

    /// Queue a re-check of a confirmed violation once a fix is claimed.
    /// `None` if a task is already open for the same criterion and page.
    pub fn request_remediation_validation(
        &self,
        task_id: &WorkflowTaskId,
    ) -> Result<Option<WorkflowTask>, TaskActionError> {
        let task = self.load_in_state(task_id, TaskStatus::Completed)?;
        if task.resolution != Some(Resolution::ViolationConfirmed) {
            return Err(TaskActionError::InvalidState { task: task.id, current: task.status });
        }
        let draft = TaskDraft {
            session_id: task.session_id,
            criterion_id: task.criterion_id,
            page_id: task.page_id,
            workflow_type: WorkflowType::RemediationValidation,
            urgency: Urgency::Medium,
            priority: task.priority,
            trigger: None,
            violation_ids: task.violation_ids,
        };
        Ok(self.create_task_if_absent(draft)?)
    }

    /// Pending and in-progress tasks, highest priority first.
    pub fn list_open_tasks(&self, session: &SessionId, filter: &TaskFilter) -> Result<Vec<WorkflowTask>, StoreError> {
        let mut tasks: Vec<WorkflowTask> = self
            .store
            .list_tasks(session)?
            .into_iter()
            .filter(|t| t.status.is_open() && filter.matches(t))
            .collect();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(tasks)
    }

    fn load_in_state(&self, task_id: &WorkflowTaskId, expected: TaskStatus) -> Result<WorkflowTask, TaskActionError> {
        let task = self.store.get_task(task_id)?.ok_or_else(|| TaskActionError::NotFound(task_id.clone()))?;
        if task.status != expected {
            return Err(TaskActionError::InvalidState { task: task.id, current: task.status });
        }
        Ok(task)
    }

    /// The stored status moved between our read and our write.
    fn lost_race(&self, task_id: &WorkflowTaskId) -> TaskActionError {
        match self.store.get_task(task_id) {
            Ok(Some(t)) => TaskActionError::InvalidState { task: t.id, current: t.status },
            Ok(None) => TaskActionError::NotFound(task_id.clone()),
            Err(e) => TaskActionError::Store(e),
        }
    }

    /// Persist, then hand to the sink. Delivery is best effort.
    pub fn notify(&self, notification: Notification) {
        if let Err(e) = self.store.append_notification(&notification) {
            warn!(error = %e, kind = %notification.kind, "notification not persisted");
        }
        self.sink.publish(&notification);
    }
}
