use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use a11y_adjudicate::AdjudicationEngine;
use a11y_core::*;
use a11y_scan::{ScanError, ScanExecutor, ScanOutcome};
use a11y_storage::{with_retryable_transaction, Store, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{DiscoveredPage, DiscoverySource, DiscoveryStatus, RunnerConfig};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("a session needs at least one tool")]
    NoTools,
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("page discovery did not complete within {waited_ms} ms")]
    DiscoveryTimeout { waited_ms: u64 },
    #[error("page discovery failed: {0}")]
    DiscoveryFailed(String),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("orchestrator internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub project_id: String,
    pub tools: Vec<ToolName>,
}

enum Finish {
    Completed,
    Cancelled,
}

type UnitResult = (Page, ToolName, Result<ScanOutcome, ScanError>);

struct SessionHandle {
    cancel: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
}

/// Drives sessions through discovery, the scan matrix, adjudication and
/// finalization. One supervisor task per session.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    discovery: Arc<dyn DiscoverySource>,
    executor: Arc<ScanExecutor>,
    engine: Arc<AdjudicationEngine>,
    cfg: RunnerConfig,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        discovery: Arc<dyn DiscoverySource>,
        executor: Arc<ScanExecutor>,
        engine: Arc<AdjudicationEngine>,
        cfg: RunnerConfig,
    ) -> Self {
        Self { store, discovery, executor, engine, cfg, sessions: Mutex::new(HashMap::new()) }
    }

    /// Persist a new session in `planning` and spawn its supervisor.
    /// Must be called from within a tokio runtime.
    pub fn start_session(self: &Arc<Self>, req: StartSessionRequest) -> Result<SessionId, OrchestratorError> {
        if req.tools.is_empty() {
            return Err(OrchestratorError::NoTools);
        }
        let session = Session::new(req.project_id, req.tools, now_ms());
        let id = session.id.clone();
        self.retry("insert_session", || self.store.insert_session(&session))?;

        let (tx, rx) = watch::channel(false);
        // held across spawn so the supervisor cannot deregister before we register
        let mut sessions = self.sessions();
        let supervisor = tokio::spawn(Arc::clone(self).supervise(session, rx));
        sessions.insert(id.clone(), SessionHandle { cancel: tx, supervisor: Some(supervisor) });
        info!(session_id = %id, "session started");
        Ok(id)
    }

    /// Move the session to `cancelled` and stop scheduling units. In-flight
    /// units finish. `false` if the session had already ended.
    pub fn cancel_session(&self, id: &SessionId) -> Result<bool, OrchestratorError> {
        if self.store.get_session(id)?.is_none() {
            return Err(OrchestratorError::SessionNotFound(id.clone()));
        }
        let now = now_ms();
        let moved = self.retry("cancel_session", || {
            self.store.transition_session(id, SessionStatus::Cancelled, None, now)
        })?;
        if let Some(handle) = self.sessions().get(id) {
            handle.cancel.send_replace(true);
        }
        if moved {
            info!(session_id = %id, "session cancelled");
            self.engine.notify(Notification::new(
                id,
                None,
                NotificationKind::SessionFinished,
                Recipient::SessionWatchers,
                "session cancelled",
                now,
            ));
        }
        Ok(moved)
    }

    /// Wait for the session's supervisor to exit. Returns at once for
    /// sessions this orchestrator is not running.
    pub async fn wait_for_session(&self, id: &SessionId) -> Result<(), OrchestratorError> {
        let handle = self.sessions().get_mut(id).and_then(|h| h.supervisor.take());
        if let Some(handle) = handle {
            handle.await.map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        }
        Ok(())
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn retry<T>(&self, label: &str, op: impl FnMut() -> StoreResult<T>) -> Result<T, StoreError> {
        with_retryable_transaction(&self.cfg.retry, label, op)
    }

    async fn supervise(self: Arc<Self>, session: Session, cancel: watch::Receiver<bool>) {
        let id = session.id.clone();
        let this = Arc::clone(&self);
        // a panic in the phases surfaces here as a JoinError instead of killing the supervisor
        let phases = tokio::spawn(async move { this.drive(session, cancel).await });
        let result = match phases.await {
            Ok(r) => r,
            Err(e) => Err(OrchestratorError::Internal(e.to_string())),
        };
        match result {
            Ok(Finish::Completed) => info!(session_id = %id, "session completed"),
            Ok(Finish::Cancelled) => info!(session_id = %id, "session stopped after cancellation"),
            Err(e) => self.fail(&id, &e),
        }
        self.sessions().remove(&id);
    }

    fn fail(&self, id: &SessionId, err: &OrchestratorError) {
        let reason = err.to_string();
        let now = now_ms();
        warn!(session_id = %id, error = %reason, "session failed");
        match self.retry("fail_session", || {
            self.store.transition_session(id, SessionStatus::Failed, Some(&reason), now)
        }) {
            Ok(true) => self.engine.notify(Notification::new(
                id,
                None,
                NotificationKind::SessionFinished,
                Recipient::SessionWatchers,
                format!("session failed: {reason}"),
                now,
            )),
            Ok(false) => debug!(session_id = %id, "session already ended"),
            Err(e) => warn!(session_id = %id, error = %e, "could not record session failure"),
        }
    }

    async fn drive(&self, session: Session, mut cancel: watch::Receiver<bool>) -> Result<Finish, OrchestratorError> {
        let id = session.id.clone();
        if !self.transition(&id, SessionStatus::InProgress)? {
            return Ok(Finish::Cancelled);
        }
        let mut progress = session.progress.clone();

        progress.enter_phase(Phase::Discovery);
        self.save_progress(&id, &progress)?;
        let Some(discovered) = self.await_discovery(&id, &session.project_id, &mut cancel).await? else {
            return Ok(Finish::Cancelled);
        };
        let pages = pages_from(discovered);
        self.retry("set_session_pages", || self.store.set_session_pages(&id, &pages, now_ms()))?;
        info!(session_id = %id, pages = pages.len(), "discovery complete");

        let mut session = session;
        session.pages = pages;
        let session = Arc::new(session);
        if self.run_matrix(&session, &mut progress, &mut cancel).await? {
            return Ok(Finish::Cancelled);
        }

        progress.enter_phase(Phase::Aggregation);
        self.save_progress(&id, &progress)?;
        let violations = self.retry("list_violations", || self.store.list_violations(&id))?;

        if *cancel.borrow() || self.cancelled_in_store(&id) {
            return Ok(Finish::Cancelled);
        }
        progress.enter_phase(Phase::Adjudication);
        self.save_progress(&id, &progress)?;
        let (engine, sid) = (Arc::clone(&self.engine), id.clone());
        let report = off_runtime(move || Ok(engine.process_violations(&sid, &violations)?)).await?;
        progress.record_adjudication(
            report.automated_sufficient,
            report.manual_required,
            report.false_positive_candidates,
            report.unmapped,
        );

        progress.enter_phase(Phase::Finalization);
        self.save_progress(&id, &progress)?;
        let (store, sid, snapshot) = (Arc::clone(&self.store), id.clone(), progress.clone());
        let summary = off_runtime(move || Ok(summarize(store.as_ref(), &sid, &snapshot)?)).await?;
        self.retry("save_summary", || self.store.save_summary(&id, &summary, now_ms()))?;
        progress.enter_phase(Phase::Done);
        self.save_progress(&id, &progress)?;

        if !self.transition(&id, SessionStatus::Completed)? {
            return Ok(Finish::Cancelled);
        }
        self.engine.notify(Notification::new(
            &id,
            None,
            NotificationKind::SessionFinished,
            Recipient::SessionWatchers,
            format!(
                "session completed: {} violations, {} open tasks, {} failed units",
                summary.total_violations, summary.open_tasks, summary.failed_units
            ),
            now_ms(),
        ));
        Ok(Finish::Completed)
    }

    /// Another process (the CLI) may have cancelled the session directly in the store.
    fn cancelled_in_store(&self, id: &SessionId) -> bool {
        matches!(self.store.get_session(id), Ok(Some(s)) if s.status == SessionStatus::Cancelled)
    }

    fn transition(&self, id: &SessionId, to: SessionStatus) -> Result<bool, StoreError> {
        self.retry("transition_session", || self.store.transition_session(id, to, None, now_ms()))
    }

    fn save_progress(&self, id: &SessionId, progress: &SessionProgress) -> Result<(), StoreError> {
        self.retry("save_progress", || self.store.save_progress(id, progress, now_ms()))
    }

    /// Poll until the crawl reports a result. `None` when cancelled while waiting.
    async fn await_discovery(
        &self,
        id: &SessionId,
        project_id: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Option<Vec<DiscoveredPage>>, OrchestratorError> {
        let started = Instant::now();
        let deadline = started + self.cfg.discovery_timeout;
        loop {
            if *cancel.borrow() || self.cancelled_in_store(id) {
                return Ok(None);
            }
            let poll = tokio::time::timeout_at(deadline, self.discovery.list_pages(project_id));
            tokio::pin!(poll);
            let polled = loop {
                tokio::select! {
                    res = &mut poll => break res,
                    Ok(()) = cancel.changed() => {
                        if *cancel.borrow() {
                            return Ok(None);
                        }
                    }
                    _ = tokio::time::sleep(self.cfg.poll_interval) => {
                        if self.cancelled_in_store(id) {
                            return Ok(None);
                        }
                    }
                }
            };
            let Ok(polled) = polled else {
                warn!(project_id, "discovery poll outlived the deadline");
                return Err(OrchestratorError::DiscoveryTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            };
            match polled {
                Ok(snap) => match snap.status {
                    DiscoveryStatus::Completed => return Ok(Some(snap.pages)),
                    DiscoveryStatus::Failed => {
                        let msg = snap.message.unwrap_or_else(|| "crawler reported failure".to_string());
                        return Err(OrchestratorError::DiscoveryFailed(msg));
                    }
                    DiscoveryStatus::Running => debug!(project_id, "discovery still running"),
                },
                Err(e) => warn!(project_id, error = %e, "discovery poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(OrchestratorError::DiscoveryTimeout {
                    waited_ms: now.duration_since(started).as_millis() as u64,
                });
            }
            let nap = self.cfg.poll_interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                Ok(()) = cancel.changed() => {}
            }
        }
    }

    /// Run every page x tool unit with bounded parallelism. Returns `true` if
    /// cancelled. A fatal unit error stops scheduling; running units drain
    /// before it is returned.
    async fn run_matrix(
        &self,
        session: &Arc<Session>,
        progress: &mut SessionProgress,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<bool, OrchestratorError> {
        let units: Vec<(Page, ToolName)> = session
            .pages
            .iter()
            .flat_map(|p| session.tools.iter().map(move |t| (p.clone(), t.clone())))
            .collect();
        progress.enter_phase(Phase::ScanMatrix);
        progress.set_units_total(units.len() as u32);
        self.save_progress(&session.id, progress)?;

        let permits = Arc::new(Semaphore::new(self.cfg.max_parallel_units.max(1)));
        let mut running: JoinSet<UnitResult> = JoinSet::new();
        let mut queue = units.into_iter();
        let mut next = queue.next();
        let mut cancelled = false;
        let mut fatal: Option<OrchestratorError> = None;

        loop {
            if !cancelled && (*cancel.borrow() || self.cancelled_in_store(&session.id)) {
                cancelled = true;
                info!(session_id = %session.id, in_flight = running.len(), "cancelled; draining scan units");
            }
            let unit = if cancelled || fatal.is_some() { None } else { next.take() };
            let Some((page, tool)) = unit else {
                match running.join_next().await {
                    Some(joined) => self.record_unit(&session.id, progress, joined, &mut fatal),
                    None => break,
                }
                continue;
            };

            tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => {
                    match permit {
                        Ok(permit) => {
                            let exec = Arc::clone(&self.executor);
                            let session = Arc::clone(session);
                            debug!(session_id = %session.id, url = %page.url, tool = %tool, "scan unit scheduled");
                            running.spawn(async move {
                                let _permit = permit;
                                let out = exec.execute(&session, &page, &tool).await;
                                (page, tool, out)
                            });
                            next = queue.next();
                        }
                        Err(e) => fatal = Some(OrchestratorError::Internal(e.to_string())),
                    }
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    next = Some((page, tool));
                    self.record_unit(&session.id, progress, joined, &mut fatal);
                }
                Ok(()) = cancel.changed() => {
                    next = Some((page, tool));
                }
            }
        }

        // an empty matrix is complete on arrival
        self.fire_milestones(&session.id, progress);
        if let Err(e) = self.save_progress(&session.id, progress) {
            fatal.get_or_insert(e.into());
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(cancelled),
        }
    }

    fn record_unit(
        &self,
        session_id: &SessionId,
        progress: &mut SessionProgress,
        joined: Result<UnitResult, JoinError>,
        fatal: &mut Option<OrchestratorError>,
    ) {
        let (violations, failed) = match joined {
            Ok((_, _, Ok(out))) => (out.violations, out.tool_failed),
            Ok((page, tool, Err(e))) => {
                warn!(session_id = %session_id, url = %page.url, tool = %tool, error = %e, "scan unit failed");
                if e.is_fatal() && fatal.is_none() {
                    *fatal = Some(e.into());
                }
                (0, true)
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "scan unit panicked");
                (0, true)
            }
        };
        progress.record_unit(violations, failed);
        self.fire_milestones(session_id, progress);
        if let Err(e) = self.save_progress(session_id, progress) {
            fatal.get_or_insert(e.into());
        }
    }

    fn fire_milestones(&self, session_id: &SessionId, progress: &mut SessionProgress) {
        for m in progress.take_new_milestones() {
            self.engine.notify(Notification::new(
                session_id,
                None,
                NotificationKind::SessionMilestone,
                Recipient::SessionWatchers,
                format!(
                    "scan matrix {m}% complete ({}/{} units, {} failed)",
                    progress.units_completed, progress.units_total, progress.units_failed
                ),
                now_ms(),
            ));
        }
    }
}

/// Store-heavy phase work runs on the blocking pool.
async fn off_runtime<T, F>(f: F) -> Result<T, OrchestratorError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, OrchestratorError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| OrchestratorError::Internal(e.to_string()))?
}

/// Crawler pages to session pages, first occurrence of each url wins.
fn pages_from(discovered: Vec<DiscoveredPage>) -> Vec<Page> {
    let mut seen = HashSet::new();
    discovered
        .into_iter()
        .filter(|p| seen.insert(p.url.clone()))
        .map(|p| Page { id: p.id.map(|id| PageId::from_str(id)).unwrap_or_default(), url: p.url })
        .collect()
}

/// Session totals from the verdicts, tasks and progress as they stand now.
pub fn summarize(store: &dyn Store, session: &SessionId, progress: &SessionProgress) -> StoreResult<SessionSummary> {
    let tests = store.list_test_instances(session)?;
    let tasks = store.list_tasks(session)?;
    let count = |s: TestStatus| tests.iter().filter(|t| t.status == s).count() as u64;

    let automated_violations = progress.automated_sufficient as u64;
    let manual_confirmed =
        tasks.iter().filter(|t| t.resolution == Some(Resolution::ViolationConfirmed)).count() as u64;
    Ok(SessionSummary {
        total_violations: automated_violations + manual_confirmed,
        automated_violations,
        manual_confirmed,
        passed_tests: count(TestStatus::Passed),
        failed_tests: count(TestStatus::Failed),
        not_applicable_tests: count(TestStatus::NotApplicable),
        completion_percent: progress.percent(),
        failed_units: progress.units_failed,
        open_tasks: tasks.iter().filter(|t| t.status.is_open()).count() as u32,
    })
}
