use a11y_core::{
    CriterionId, EpochMs, Notification, Page, PageId, Reconciled, ScanResult, ScanResultId, Session, SessionId,
    SessionProgress, SessionStatus, SessionSummary, TaskStatus, TestInstance, ToolName, Violation, WorkflowTask,
    WorkflowTaskId,
};

use crate::StoreResult;

/// Transactional persistence for sessions, scan output, verdicts, tasks and
/// notifications.
///
/// Every method is one transaction. Methods that can lose a race report it as
/// [`crate::StoreError::TransactionAborted`]; wrap them in
/// [`crate::with_retryable_transaction`].
pub trait Store: Send + Sync {
    fn insert_session(&self, session: &Session) -> StoreResult<()>;
    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>>;
    /// Newest first.
    fn list_sessions(&self) -> StoreResult<Vec<Session>>;
    fn set_session_pages(&self, id: &SessionId, pages: &[Page], now: EpochMs) -> StoreResult<()>;
    fn save_progress(&self, id: &SessionId, progress: &SessionProgress, now: EpochMs) -> StoreResult<()>;
    fn save_summary(&self, id: &SessionId, summary: &SessionSummary, now: EpochMs) -> StoreResult<()>;
    /// Move the session to `to` if its current status allows it. Returns false
    /// (and writes nothing) otherwise. Terminal states stamp `completed_at`.
    fn transition_session(
        &self,
        id: &SessionId,
        to: SessionStatus,
        reason: Option<&str>,
        now: EpochMs,
    ) -> StoreResult<bool>;

    /// Insert or update the result for (session, page, tool) and replace its
    /// violations. An existing row keeps its id; that id is returned and is
    /// written into every violation.
    fn upsert_scan_result(&self, result: &ScanResult, violations: &[Violation]) -> StoreResult<ScanResultId>;
    fn get_scan_result(&self, session: &SessionId, page: &PageId, tool: &ToolName) -> StoreResult<Option<ScanResult>>;
    fn list_scan_results(&self, session: &SessionId) -> StoreResult<Vec<ScanResult>>;
    fn list_violations(&self, session: &SessionId) -> StoreResult<Vec<Violation>>;

    fn get_test_instance(
        &self,
        session: &SessionId,
        criterion: &CriterionId,
        page: &PageId,
    ) -> StoreResult<Option<TestInstance>>;
    fn list_test_instances(&self, session: &SessionId) -> StoreResult<Vec<TestInstance>>;
    /// Read the current verdict for the incoming (session, criterion, page),
    /// fold the incoming one in with [`a11y_core::reconcile_automated`] and
    /// write the outcome.
    fn apply_automated_verdict(&self, incoming: TestInstance) -> StoreResult<Reconciled>;

    /// Insert `task` unless an open task exists for its (session, criterion,
    /// page). Returns whether it was inserted.
    fn create_task_if_absent(&self, task: &WorkflowTask) -> StoreResult<bool>;
    fn get_task(&self, id: &WorkflowTaskId) -> StoreResult<Option<WorkflowTask>>;
    /// Oldest first.
    fn list_tasks(&self, session: &SessionId) -> StoreResult<Vec<WorkflowTask>>;
    /// Overwrite the task if its stored status is still `expected`.
    fn update_task(&self, task: &WorkflowTask, expected: TaskStatus) -> StoreResult<bool>;
    /// [`Store::update_task`] plus a manual verdict for the task's criterion
    /// and page, in one transaction. The verdict keeps the id of any
    /// existing row.
    fn record_review(&self, task: &WorkflowTask, expected: TaskStatus, verdict: TestInstance) -> StoreResult<bool>;

    fn append_notification(&self, notification: &Notification) -> StoreResult<()>;
    fn list_notifications(&self, session: &SessionId) -> StoreResult<Vec<Notification>>;
}
