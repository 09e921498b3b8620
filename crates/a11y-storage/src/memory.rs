use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use a11y_core::{
    reconcile_automated, withdraw_violations, CriterionId, EpochMs, Notification, Page, PageId, Reconciled, ScanResult,
    ScanResultId, Session, SessionId, SessionProgress, SessionStatus, SessionSummary, TaskStatus, TestInstance,
    ToolName, Violation, ViolationId, WorkflowTask, WorkflowTaskId,
};

use crate::{Store, StoreError, StoreResult};

type VerdictKey = (SessionId, CriterionId, PageId);

/// In-memory store for tests and dry runs. One mutex covers every
/// operation, so each call is trivially atomic.
///
/// Supports injected transaction aborts so retry paths can be exercised.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    scan_results: HashMap<(SessionId, PageId, ToolName), ScanResult>,
    violations: Vec<Violation>,
    verdicts: HashMap<VerdictKey, TestInstance>,
    tasks: Vec<WorkflowTask>,
    notifications: Vec<Notification>,
    faults: Faults,
}

#[derive(Default)]
struct Faults {
    scan_aborts: u32,
    verdict_aborts: HashMap<CriterionId, u32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` scan result writes abort.
    pub fn abort_scan_writes(&self, times: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faults.scan_aborts = times;
        }
    }

    /// The next `times` automated verdict writes for `criterion` abort.
    pub fn abort_verdict_writes(&self, criterion: &CriterionId, times: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faults.verdict_aborts.insert(criterion.clone(), times);
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Backend("in-memory store mutex poisoned".into()))
    }
}

fn take_fault(counter: &mut u32, what: &str) -> StoreResult<()> {
    if *counter > 0 {
        *counter -= 1;
        return Err(StoreError::TransactionAborted(format!("injected abort: {what}")));
    }
    Ok(())
}

fn session_mut<'a>(inner: &'a mut Inner, id: &SessionId) -> StoreResult<&'a mut Session> {
    inner.sessions.get_mut(id).ok_or_else(|| StoreError::not_found("session", id))
}

fn upsert_manual(inner: &mut Inner, mut verdict: TestInstance) {
    let key = (verdict.session_id.clone(), verdict.criterion_id.clone(), verdict.page_id.clone());
    if let Some(existing) = inner.verdicts.get(&key) {
        verdict.id = existing.id.clone();
    }
    inner.verdicts.insert(key, verdict);
}

impl Store for InMemoryStore {
    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        Ok(self.lock()?.sessions.get(id).cloned())
    }

    fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        let inner = self.lock()?;
        let mut out: Vec<Session> = inner.sessions.values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    fn set_session_pages(&self, id: &SessionId, pages: &[Page], now: EpochMs) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let s = session_mut(&mut inner, id)?;
        s.pages = pages.to_vec();
        s.updated_at = now;
        Ok(())
    }

    fn save_progress(&self, id: &SessionId, progress: &SessionProgress, now: EpochMs) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let s = session_mut(&mut inner, id)?;
        s.progress = progress.clone();
        s.updated_at = now;
        Ok(())
    }

    fn save_summary(&self, id: &SessionId, summary: &SessionSummary, now: EpochMs) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let s = session_mut(&mut inner, id)?;
        s.summary = Some(summary.clone());
        s.updated_at = now;
        Ok(())
    }

    fn transition_session(
        &self,
        id: &SessionId,
        to: SessionStatus,
        reason: Option<&str>,
        now: EpochMs,
    ) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let s = session_mut(&mut inner, id)?;
        if !s.status.can_transition_to(to) {
            return Ok(false);
        }
        s.status = to;
        if let Some(r) = reason {
            s.failure_reason = Some(r.to_string());
        }
        if to.is_terminal() {
            s.completed_at = Some(now);
        }
        s.updated_at = now;
        Ok(true)
    }

    fn upsert_scan_result(&self, result: &ScanResult, violations: &[Violation]) -> StoreResult<ScanResultId> {
        let mut inner = self.lock()?;
        take_fault(&mut inner.faults.scan_aborts, "scan result write")?;

        let key = (result.session_id.clone(), result.page_id.clone(), result.tool.clone());
        let mut row = result.clone();
        if let Some(existing) = inner.scan_results.get(&key) {
            row.id = existing.id.clone();
        }
        let id = row.id.clone();

        let withdrawn: Vec<ViolationId> =
            inner.violations.iter().filter(|v| v.scan_result_id == id).map(|v| v.id.clone()).collect();
        inner.violations.retain(|v| v.scan_result_id != id);
        if !withdrawn.is_empty() {
            for ti in inner.verdicts.values_mut() {
                if ti.session_id == result.session_id && ti.page_id == result.page_id {
                    withdraw_violations(ti, &withdrawn);
                }
            }
        }
        inner.violations.extend(violations.iter().cloned().map(|mut v| {
            v.scan_result_id = id.clone();
            v
        }));
        inner.scan_results.insert(key, row);
        Ok(id)
    }

    fn get_scan_result(&self, session: &SessionId, page: &PageId, tool: &ToolName) -> StoreResult<Option<ScanResult>> {
        let key = (session.clone(), page.clone(), tool.clone());
        Ok(self.lock()?.scan_results.get(&key).cloned())
    }

    fn list_scan_results(&self, session: &SessionId) -> StoreResult<Vec<ScanResult>> {
        let inner = self.lock()?;
        let mut out: Vec<ScanResult> =
            inner.scan_results.values().filter(|r| &r.session_id == session).cloned().collect();
        out.sort_by(|a, b| a.page_url.cmp(&b.page_url).then_with(|| a.tool.cmp(&b.tool)));
        Ok(out)
    }

    fn list_violations(&self, session: &SessionId) -> StoreResult<Vec<Violation>> {
        let inner = self.lock()?;
        Ok(inner.violations.iter().filter(|v| &v.session_id == session).cloned().collect())
    }

    fn get_test_instance(
        &self,
        session: &SessionId,
        criterion: &CriterionId,
        page: &PageId,
    ) -> StoreResult<Option<TestInstance>> {
        let key = (session.clone(), criterion.clone(), page.clone());
        Ok(self.lock()?.verdicts.get(&key).cloned())
    }

    fn list_test_instances(&self, session: &SessionId) -> StoreResult<Vec<TestInstance>> {
        let inner = self.lock()?;
        let mut out: Vec<TestInstance> =
            inner.verdicts.values().filter(|t| &t.session_id == session).cloned().collect();
        out.sort_by(|a, b| a.criterion_id.cmp(&b.criterion_id).then_with(|| a.page_id.cmp(&b.page_id)));
        Ok(out)
    }

    fn apply_automated_verdict(&self, incoming: TestInstance) -> StoreResult<Reconciled> {
        let mut inner = self.lock()?;
        if let Some(n) = inner.faults.verdict_aborts.get_mut(&incoming.criterion_id) {
            take_fault(n, incoming.criterion_id.as_str())?;
        }

        let key = (incoming.session_id.clone(), incoming.criterion_id.clone(), incoming.page_id.clone());
        let outcome = reconcile_automated(inner.verdicts.get(&key), incoming);
        match &outcome {
            Reconciled::Insert(ti) | Reconciled::Replace(ti) => {
                inner.verdicts.insert(key, ti.clone());
            }
            Reconciled::Keep => {}
        }
        Ok(outcome)
    }

    fn create_task_if_absent(&self, task: &WorkflowTask) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let open = inner.tasks.iter().any(|t| {
            t.status.is_open()
                && t.session_id == task.session_id
                && t.criterion_id == task.criterion_id
                && t.page_id == task.page_id
        });
        if open {
            return Ok(false);
        }
        inner.tasks.push(task.clone());
        Ok(true)
    }

    fn get_task(&self, id: &WorkflowTaskId) -> StoreResult<Option<WorkflowTask>> {
        Ok(self.lock()?.tasks.iter().find(|t| &t.id == id).cloned())
    }

    fn list_tasks(&self, session: &SessionId) -> StoreResult<Vec<WorkflowTask>> {
        let inner = self.lock()?;
        Ok(inner.tasks.iter().filter(|t| &t.session_id == session).cloned().collect())
    }

    fn update_task(&self, task: &WorkflowTask, expected: TaskStatus) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let Some(slot) = inner.tasks.iter_mut().find(|t| t.id == task.id) else {
            return Err(StoreError::not_found("workflow task", &task.id));
        };
        if slot.status != expected {
            return Ok(false);
        }
        *slot = task.clone();
        Ok(true)
    }

    fn record_review(&self, task: &WorkflowTask, expected: TaskStatus, verdict: TestInstance) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let Some(slot) = inner.tasks.iter_mut().find(|t| t.id == task.id) else {
            return Err(StoreError::not_found("workflow task", &task.id));
        };
        if slot.status != expected {
            return Ok(false);
        }
        *slot = task.clone();
        upsert_manual(&mut inner, verdict);
        Ok(true)
    }

    fn append_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.lock()?.notifications.push(notification.clone());
        Ok(())
    }

    fn list_notifications(&self, session: &SessionId) -> StoreResult<Vec<Notification>> {
        let inner = self.lock()?;
        Ok(inner.notifications.iter().filter(|n| &n.session_id == session).cloned().collect())
    }
}
