use std::sync::Arc;

use a11y_adjudicate::{AdjudicationEngine, NotificationSink, TaskActionError, TaskFilter};
use a11y_core::*;
use a11y_criteria::KnowledgeBase;
use a11y_scan::{ScanExecutor, ToolRunner};
use a11y_storage::{Store, StoreError};
use serde::{Deserialize, Serialize};

use crate::{summarize, DiscoverySource, Orchestrator, OrchestratorError, RunnerConfig, StartSessionRequest};

/// Point-in-time view of a session for callers polling its state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStatusView {
    pub session_id: SessionId,
    pub project_id: String,
    pub status: SessionStatus,
    pub phase: Phase,
    pub progress_percent: f64,
    pub progress: SessionProgress,
    pub pages: usize,
    pub failure_reason: Option<String>,
    /// Frozen at finalization, then kept current as reviews land.
    pub summary: Option<SessionSummary>,
}

/// The operations the outside world drives: sessions and reviewer tasks.
pub struct ComplianceService {
    store: Arc<dyn Store>,
    engine: Arc<AdjudicationEngine>,
    orchestrator: Arc<Orchestrator>,
}

impl ComplianceService {
    pub fn new(
        store: Arc<dyn Store>,
        kb: Arc<KnowledgeBase>,
        discovery: Arc<dyn DiscoverySource>,
        runner: Arc<dyn ToolRunner>,
        sink: Arc<dyn NotificationSink>,
        cfg: RunnerConfig,
    ) -> Self {
        let executor = ScanExecutor::new(store.clone(), kb.clone(), runner)
            .with_retry(cfg.retry.clone())
            .with_tool_timeout(cfg.tool_timeout)
            .with_tool_attempts(cfg.tool_attempts);
        let engine = Arc::new(AdjudicationEngine::new(store.clone(), kb, sink).with_retry(cfg.retry.clone()));
        let orchestrator =
            Arc::new(Orchestrator::new(store.clone(), discovery, Arc::new(executor), engine.clone(), cfg));
        Self { store, engine, orchestrator }
    }

    pub fn start_session(&self, req: StartSessionRequest) -> Result<SessionId, OrchestratorError> {
        self.orchestrator.start_session(req)
    }

    pub async fn wait_for_session(&self, id: &SessionId) -> Result<(), OrchestratorError> {
        self.orchestrator.wait_for_session(id).await
    }

    pub fn cancel_session(&self, id: &SessionId) -> Result<bool, OrchestratorError> {
        self.orchestrator.cancel_session(id)
    }

    pub fn get_session_status(&self, id: &SessionId) -> Result<Option<SessionStatusView>, StoreError> {
        let Some(s) = self.store.get_session(id)? else {
            return Ok(None);
        };
        // reviews completed after finalization move the totals
        let summary = match s.summary {
            Some(_) => Some(summarize(self.store.as_ref(), id, &s.progress)?),
            None => None,
        };
        Ok(Some(SessionStatusView {
            session_id: s.id,
            project_id: s.project_id,
            status: s.status,
            phase: s.progress.phase,
            progress_percent: s.progress.percent(),
            pages: s.pages.len(),
            failure_reason: s.failure_reason,
            summary,
            progress: s.progress,
        }))
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.store.list_sessions()
    }

    pub fn list_open_tasks(&self, session: &SessionId, filter: &TaskFilter) -> Result<Vec<WorkflowTask>, StoreError> {
        self.engine.list_open_tasks(session, filter)
    }

    pub fn assign_task(&self, task: &WorkflowTaskId, reviewer: &str) -> Result<WorkflowTask, TaskActionError> {
        self.engine.assign_task(task, reviewer)
    }

    pub fn complete_task(
        &self,
        task: &WorkflowTaskId,
        review: ReviewSubmission,
    ) -> Result<WorkflowTask, TaskActionError> {
        self.engine.complete_task(task, review)
    }

    pub fn request_remediation_validation(
        &self,
        task: &WorkflowTaskId,
    ) -> Result<Option<WorkflowTask>, TaskActionError> {
        self.engine.request_remediation_validation(task)
    }

    pub fn notifications(&self, session: &SessionId) -> Result<Vec<Notification>, StoreError> {
        self.store.list_notifications(session)
    }
}
