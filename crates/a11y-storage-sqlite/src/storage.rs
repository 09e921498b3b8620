use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};

use a11y_core::*;
use a11y_storage::{Store, StoreError, StoreResult};

const SESSION_COLS: &str = "id, project_id, pages_json, tools_json, status, progress_json, failure_reason, \
                            summary_json, created_at, updated_at, completed_at";
const SCAN_COLS: &str = "id, session_id, page_id, page_url, tool, raw_output_json, violation_count, pass_count, \
                         duration_ms, error, scanned_at";
const VIOLATION_COLS: &str =
    "id, scan_result_id, session_id, page_id, tool, rule_id, severity, description, selector, help_url, tags_json";
const VERDICT_COLS: &str =
    "id, session_id, criterion_id, page_id, status, method, confidence, evidence_json, tool_used, updated_at";
const TASK_COLS: &str = "id, session_id, criterion_id, page_id, workflow_type, priority, urgency, status, \
                         assigned_to, procedure_md, resolution, review_json, violation_ids_json, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory sqlite db")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(250))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Backend("sqlite connection mutex poisoned".into()))
    }
}

/// Busy and locked databases are the aborts a retry can fix.
pub fn store_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::TransactionAborted(e.to_string())
        }
        rusqlite::Error::FromSqlConversionFailure(..) => StoreError::corrupt("row", e),
        _ => StoreError::Backend(e.to_string()),
    }
}

fn to_json<T: Serialize + ?Sized>(v: &T) -> rusqlite::Result<String> {
    serde_json::to_string(v).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn from_json<T: DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn wire<T>(r: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let s: String = r.get(idx)?;
    parse(&s).ok_or_else(|| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown value {s}").into()))
}

fn read_session(r: &Row<'_>) -> rusqlite::Result<Session> {
    let summary: Option<String> = r.get(7)?;
    Ok(Session {
        id: SessionId::from_str(r.get::<_, String>(0)?),
        project_id: r.get(1)?,
        pages: from_json(2, &r.get::<_, String>(2)?)?,
        tools: from_json(3, &r.get::<_, String>(3)?)?,
        status: wire(r, 4, SessionStatus::from_wire)?,
        progress: from_json(5, &r.get::<_, String>(5)?)?,
        failure_reason: r.get(6)?,
        summary: summary.map(|s| from_json(7, &s)).transpose()?,
        created_at: r.get(8)?,
        updated_at: r.get(9)?,
        completed_at: r.get(10)?,
    })
}

fn read_scan_result(r: &Row<'_>) -> rusqlite::Result<ScanResult> {
    Ok(ScanResult {
        id: ScanResultId::from_str(r.get::<_, String>(0)?),
        session_id: SessionId::from_str(r.get::<_, String>(1)?),
        page_id: PageId::from_str(r.get::<_, String>(2)?),
        page_url: r.get(3)?,
        tool: ToolName::new(r.get::<_, String>(4)?),
        raw_output: from_json(5, &r.get::<_, String>(5)?)?,
        violation_count: r.get::<_, i64>(6)? as u32,
        pass_count: r.get::<_, i64>(7)? as u32,
        duration_ms: r.get::<_, i64>(8)? as u64,
        error: r.get(9)?,
        scanned_at: r.get(10)?,
    })
}

fn read_violation(r: &Row<'_>) -> rusqlite::Result<Violation> {
    Ok(Violation {
        id: ViolationId::from_str(r.get::<_, String>(0)?),
        scan_result_id: ScanResultId::from_str(r.get::<_, String>(1)?),
        session_id: SessionId::from_str(r.get::<_, String>(2)?),
        page_id: PageId::from_str(r.get::<_, String>(3)?),
        tool: ToolName::new(r.get::<_, String>(4)?),
        rule_id: r.get(5)?,
        severity: wire(r, 6, Severity::from_wire)?,
        description: r.get(7)?,
        selector: r.get(8)?,
        help_url: r.get(9)?,
        tags: from_json(10, &r.get::<_, String>(10)?)?,
    })
}

fn read_verdict(r: &Row<'_>) -> rusqlite::Result<TestInstance> {
    Ok(TestInstance {
        id: TestInstanceId::from_str(r.get::<_, String>(0)?),
        session_id: SessionId::from_str(r.get::<_, String>(1)?),
        criterion_id: CriterionId::new(r.get::<_, String>(2)?),
        page_id: PageId::from_str(r.get::<_, String>(3)?),
        status: wire(r, 4, TestStatus::from_wire)?,
        method: wire(r, 5, TestMethod::from_wire)?,
        confidence: wire(r, 6, Confidence::from_wire)?,
        evidence: from_json(7, &r.get::<_, String>(7)?)?,
        tool_used: r.get::<_, Option<String>>(8)?.map(ToolName::new),
        updated_at: r.get(9)?,
    })
}

fn read_task(r: &Row<'_>) -> rusqlite::Result<WorkflowTask> {
    let resolution: Option<String> = r.get(10)?;
    let review: Option<String> = r.get(11)?;
    Ok(WorkflowTask {
        id: WorkflowTaskId::from_str(r.get::<_, String>(0)?),
        session_id: SessionId::from_str(r.get::<_, String>(1)?),
        criterion_id: CriterionId::new(r.get::<_, String>(2)?),
        page_id: PageId::from_str(r.get::<_, String>(3)?),
        workflow_type: wire(r, 4, WorkflowType::from_wire)?,
        priority: r.get::<_, i64>(5)?.clamp(1, 5) as u8,
        urgency: wire(r, 6, Urgency::from_wire)?,
        status: wire(r, 7, TaskStatus::from_wire)?,
        assigned_to: r.get(8)?,
        procedure: r.get(9)?,
        resolution: match resolution {
            Some(s) => Some(Resolution::from_wire(&s).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(10, Type::Text, format!("unknown resolution {s}").into())
            })?),
            None => None,
        },
        review: review.map(|s| from_json(11, &s)).transpose()?,
        violation_ids: from_json(12, &r.get::<_, String>(12)?)?,
        created_at: r.get(13)?,
        updated_at: r.get(14)?,
    })
}

fn read_notification(r: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: NotificationId::from_str(r.get::<_, String>(0)?),
        session_id: SessionId::from_str(r.get::<_, String>(1)?),
        task_id: r.get::<_, Option<String>>(2)?.map(WorkflowTaskId::from_str),
        kind: wire(r, 3, NotificationKind::from_wire)?,
        recipient: from_json(4, &r.get::<_, String>(4)?)?,
        message: r.get(5)?,
        created_at: r.get(6)?,
    })
}

/// Upsert keyed by (session, criterion, page); an existing row keeps its id.
fn write_verdict(conn: &Connection, ti: &TestInstance) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO test_instances(id, session_id, criterion_id, page_id, status, method, confidence, evidence_json, tool_used, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(session_id, criterion_id, page_id) DO UPDATE SET
           status=excluded.status, method=excluded.method, confidence=excluded.confidence,
           evidence_json=excluded.evidence_json, tool_used=excluded.tool_used, updated_at=excluded.updated_at",
        params![
            ti.id.as_str(),
            ti.session_id.as_str(),
            ti.criterion_id.as_str(),
            ti.page_id.as_str(),
            ti.status.as_str(),
            ti.method.as_str(),
            ti.confidence.as_str(),
            to_json(&ti.evidence)?,
            ti.tool_used.as_ref().map(|t| t.as_str()),
            ti.updated_at,
        ],
    )?;
    Ok(())
}

/// Compare-and-set on the stored status. `None` when the task does not exist.
fn write_task_if(conn: &Connection, task: &WorkflowTask, expected: TaskStatus) -> rusqlite::Result<Option<bool>> {
    let review = task.review.as_ref().map(to_json).transpose()?;
    let n = conn.execute(
        "UPDATE workflow_tasks SET workflow_type=?2, priority=?3, urgency=?4, status=?5, assigned_to=?6,
           procedure_md=?7, resolution=?8, review_json=?9, violation_ids_json=?10, updated_at=?11
         WHERE id=?1 AND status=?12",
        params![
            task.id.as_str(),
            task.workflow_type.as_str(),
            task.priority as i64,
            task.urgency.as_str(),
            task.status.as_str(),
            task.assigned_to,
            task.procedure,
            task.resolution.map(|r| r.as_str()),
            review,
            to_json(&task.violation_ids)?,
            task.updated_at,
            expected.as_str(),
        ],
    )?;
    if n == 1 {
        return Ok(Some(true));
    }
    let exists = conn
        .query_row("SELECT 1 FROM workflow_tasks WHERE id=?1", params![task.id.as_str()], |_| Ok(()))
        .optional()?
        .is_some();
    Ok(exists.then_some(false))
}

fn session_update(conn: &Connection, id: &SessionId, sql: &str, value: String, now: EpochMs) -> StoreResult<()> {
    let n = conn.execute(sql, params![id.as_str(), value, now]).map_err(store_err)?;
    if n == 0 {
        return Err(StoreError::not_found("session", id));
    }
    Ok(())
}

fn json_arg<T: Serialize + ?Sized>(v: &T) -> StoreResult<String> {
    to_json(v).map_err(store_err)
}

impl Store for SqliteStore {
    fn insert_session(&self, s: &Session) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO sessions({SESSION_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                s.id.as_str(),
                s.project_id,
                json_arg(&s.pages)?,
                json_arg(&s.tools)?,
                s.status.as_str(),
                json_arg(&s.progress)?,
                s.failure_reason,
                s.summary.as_ref().map(json_arg).transpose()?,
                s.created_at,
                s.updated_at,
                s.completed_at,
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SESSION_COLS} FROM sessions WHERE id=?1"),
            params![id.as_str()],
            read_session,
        )
        .optional()
        .map_err(store_err)
    }

    fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SESSION_COLS} FROM sessions ORDER BY created_at DESC, id"))
            .map_err(store_err)?;
        let rows = stmt.query_map([], read_session).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    fn set_session_pages(&self, id: &SessionId, pages: &[Page], now: EpochMs) -> StoreResult<()> {
        let conn = self.lock()?;
        session_update(&conn, id, "UPDATE sessions SET pages_json=?2, updated_at=?3 WHERE id=?1", json_arg(pages)?, now)
    }

    fn save_progress(&self, id: &SessionId, progress: &SessionProgress, now: EpochMs) -> StoreResult<()> {
        let conn = self.lock()?;
        session_update(
            &conn,
            id,
            "UPDATE sessions SET progress_json=?2, updated_at=?3 WHERE id=?1",
            json_arg(progress)?,
            now,
        )
    }

    fn save_summary(&self, id: &SessionId, summary: &SessionSummary, now: EpochMs) -> StoreResult<()> {
        let conn = self.lock()?;
        session_update(
            &conn,
            id,
            "UPDATE sessions SET summary_json=?2, updated_at=?3 WHERE id=?1",
            json_arg(summary)?,
            now,
        )
    }

    fn transition_session(
        &self,
        id: &SessionId,
        to: SessionStatus,
        reason: Option<&str>,
        now: EpochMs,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(store_err)?;
        let current = tx
            .query_row("SELECT status FROM sessions WHERE id=?1", params![id.as_str()], |r| {
                wire(r, 0, SessionStatus::from_wire)
            })
            .optional()
            .map_err(store_err)?
            .ok_or_else(|| StoreError::not_found("session", id))?;
        if !current.can_transition_to(to) {
            return Ok(false);
        }
        let completed_at = to.is_terminal().then_some(now);
        tx.execute(
            "UPDATE sessions SET status=?2, failure_reason=COALESCE(?3, failure_reason),
               completed_at=COALESCE(?4, completed_at), updated_at=?5
             WHERE id=?1",
            params![id.as_str(), to.as_str(), reason, completed_at, now],
        )
        .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(true)
    }

    fn upsert_scan_result(&self, res: &ScanResult, violations: &[Violation]) -> StoreResult<ScanResultId> {
        let conn = self.lock()?;
        let run = || -> rusqlite::Result<ScanResultId> {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO scan_results({SCAN_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(session_id, page_id, tool) DO UPDATE SET
                       page_url=excluded.page_url, raw_output_json=excluded.raw_output_json,
                       violation_count=excluded.violation_count, pass_count=excluded.pass_count,
                       duration_ms=excluded.duration_ms, error=excluded.error, scanned_at=excluded.scanned_at"
                ),
                params![
                    res.id.as_str(),
                    res.session_id.as_str(),
                    res.page_id.as_str(),
                    res.page_url,
                    res.tool.as_str(),
                    to_json(&res.raw_output)?,
                    res.violation_count as i64,
                    res.pass_count as i64,
                    res.duration_ms as i64,
                    res.error,
                    res.scanned_at,
                ],
            )?;
            let id: String = tx.query_row(
                "SELECT id FROM scan_results WHERE session_id=?1 AND page_id=?2 AND tool=?3",
                params![res.session_id.as_str(), res.page_id.as_str(), res.tool.as_str()],
                |r| r.get(0),
            )?;

            let withdrawn: Vec<ViolationId> = {
                let mut stmt = tx.prepare("SELECT id FROM violations WHERE scan_result_id=?1")?;
                let rows = stmt.query_map(params![id], |r| Ok(ViolationId::from_str(r.get::<_, String>(0)?)))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            if !withdrawn.is_empty() {
                let verdicts: Vec<TestInstance> = {
                    let mut stmt = tx.prepare(&format!(
                        "SELECT {VERDICT_COLS} FROM test_instances WHERE session_id=?1 AND page_id=?2"
                    ))?;
                    let rows = stmt.query_map(params![res.session_id.as_str(), res.page_id.as_str()], read_verdict)?;
                    rows.collect::<rusqlite::Result<_>>()?
                };
                for mut ti in verdicts {
                    if withdraw_violations(&mut ti, &withdrawn) {
                        write_verdict(&tx, &ti)?;
                    }
                }
            }
            tx.execute("DELETE FROM violations WHERE scan_result_id=?1", params![id])?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO violations({VIOLATION_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ))?;
                for v in violations {
                    stmt.execute(params![
                        v.id.as_str(),
                        id,
                        v.session_id.as_str(),
                        v.page_id.as_str(),
                        v.tool.as_str(),
                        v.rule_id,
                        v.severity.as_str(),
                        v.description,
                        v.selector,
                        v.help_url,
                        to_json(&v.tags)?,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(ScanResultId::from_str(id))
        };
        run().map_err(store_err)
    }

    fn get_scan_result(&self, session: &SessionId, page: &PageId, tool: &ToolName) -> StoreResult<Option<ScanResult>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SCAN_COLS} FROM scan_results WHERE session_id=?1 AND page_id=?2 AND tool=?3"),
            params![session.as_str(), page.as_str(), tool.as_str()],
            read_scan_result,
        )
        .optional()
        .map_err(store_err)
    }

    fn list_scan_results(&self, session: &SessionId) -> StoreResult<Vec<ScanResult>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SCAN_COLS} FROM scan_results WHERE session_id=?1 ORDER BY page_url, tool"))
            .map_err(store_err)?;
        let rows = stmt.query_map(params![session.as_str()], read_scan_result).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    fn list_violations(&self, session: &SessionId) -> StoreResult<Vec<Violation>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {VIOLATION_COLS} FROM violations WHERE session_id=?1 ORDER BY rowid"))
            .map_err(store_err)?;
        let rows = stmt.query_map(params![session.as_str()], read_violation).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    fn get_test_instance(
        &self,
        session: &SessionId,
        criterion: &CriterionId,
        page: &PageId,
    ) -> StoreResult<Option<TestInstance>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {VERDICT_COLS} FROM test_instances WHERE session_id=?1 AND criterion_id=?2 AND page_id=?3"),
            params![session.as_str(), criterion.as_str(), page.as_str()],
            read_verdict,
        )
        .optional()
        .map_err(store_err)
    }

    fn list_test_instances(&self, session: &SessionId) -> StoreResult<Vec<TestInstance>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {VERDICT_COLS} FROM test_instances WHERE session_id=?1 ORDER BY criterion_id, page_id"
            ))
            .map_err(store_err)?;
        let rows = stmt.query_map(params![session.as_str()], read_verdict).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    fn apply_automated_verdict(&self, incoming: TestInstance) -> StoreResult<Reconciled> {
        let conn = self.lock()?;
        let run = || -> rusqlite::Result<Reconciled> {
            let tx = conn.unchecked_transaction()?;
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {VERDICT_COLS} FROM test_instances WHERE session_id=?1 AND criterion_id=?2 AND page_id=?3"
                    ),
                    params![incoming.session_id.as_str(), incoming.criterion_id.as_str(), incoming.page_id.as_str()],
                    read_verdict,
                )
                .optional()?;
            let outcome = reconcile_automated(existing.as_ref(), incoming);
            if let Reconciled::Insert(ti) | Reconciled::Replace(ti) = &outcome {
                write_verdict(&tx, ti)?;
            }
            tx.commit()?;
            Ok(outcome)
        };
        run().map_err(store_err)
    }

    fn create_task_if_absent(&self, t: &WorkflowTask) -> StoreResult<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                &format!(
                    "INSERT INTO workflow_tasks({TASK_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                     ON CONFLICT(session_id, criterion_id, page_id) WHERE status IN ('pending', 'in_progress')
                     DO NOTHING"
                ),
                params![
                    t.id.as_str(),
                    t.session_id.as_str(),
                    t.criterion_id.as_str(),
                    t.page_id.as_str(),
                    t.workflow_type.as_str(),
                    t.priority as i64,
                    t.urgency.as_str(),
                    t.status.as_str(),
                    t.assigned_to,
                    t.procedure,
                    t.resolution.map(|r| r.as_str()),
                    t.review.as_ref().map(json_arg).transpose()?,
                    json_arg(&t.violation_ids)?,
                    t.created_at,
                    t.updated_at,
                ],
            )
            .map_err(store_err)?;
        Ok(n == 1)
    }

    fn get_task(&self, id: &WorkflowTaskId) -> StoreResult<Option<WorkflowTask>> {
        let conn = self.lock()?;
        conn.query_row(&format!("SELECT {TASK_COLS} FROM workflow_tasks WHERE id=?1"), params![id.as_str()], read_task)
            .optional()
            .map_err(store_err)
    }

    fn list_tasks(&self, session: &SessionId) -> StoreResult<Vec<WorkflowTask>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TASK_COLS} FROM workflow_tasks WHERE session_id=?1 ORDER BY created_at, rowid"
            ))
            .map_err(store_err)?;
        let rows = stmt.query_map(params![session.as_str()], read_task).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    fn update_task(&self, task: &WorkflowTask, expected: TaskStatus) -> StoreResult<bool> {
        let conn = self.lock()?;
        write_task_if(&conn, task, expected)
            .map_err(store_err)?
            .ok_or_else(|| StoreError::not_found("workflow task", &task.id))
    }

    fn record_review(&self, task: &WorkflowTask, expected: TaskStatus, verdict: TestInstance) -> StoreResult<bool> {
        let conn = self.lock()?;
        let run = || -> rusqlite::Result<Option<bool>> {
            let tx = conn.unchecked_transaction()?;
            let written = write_task_if(&tx, task, expected)?;
            if written == Some(true) {
                write_verdict(&tx, &verdict)?;
            }
            tx.commit()?;
            Ok(written)
        };
        run().map_err(store_err)?.ok_or_else(|| StoreError::not_found("workflow task", &task.id))
    }

    fn append_notification(&self, n: &Notification) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notifications(id, session_id, task_id, kind, recipient_json, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                n.id.as_str(),
                n.session_id.as_str(),
                n.task_id.as_ref().map(|t| t.as_str()),
                n.kind.as_str(),
                json_arg(&n.recipient)?,
                n.message,
                n.created_at,
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn list_notifications(&self, session: &SessionId) -> StoreResult<Vec<Notification>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, task_id, kind, recipient_json, message, created_at
                 FROM notifications WHERE session_id=?1 ORDER BY rowid",
            )
            .map_err(store_err)?;
        let rows = stmt.query_map(params![session.as_str()], read_notification).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with_session() -> (SqliteStore, Session) {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = Session::new("proj", vec![ToolName::new(ToolName::AXE), ToolName::new(ToolName::PA11Y)], 1);
        store.insert_session(&s).unwrap();
        (store, s)
    }

    fn result(s: &Session, page: &PageId, tool: &str) -> ScanResult {
        ScanResult {
            id: ScanResultId::new(),
            session_id: s.id.clone(),
            page_id: page.clone(),
            page_url: "https://example.test/a".into(),
            tool: ToolName::new(tool),
            raw_output: serde_json::json!({"violations": []}),
            violation_count: 0,
            pass_count: 0,
            duration_ms: 12,
            error: None,
            scanned_at: 2,
        }
    }

    fn violation(r: &ScanResult, rule: &str) -> Violation {
        Violation {
            id: ViolationId::new(),
            scan_result_id: r.id.clone(),
            session_id: r.session_id.clone(),
            page_id: r.page_id.clone(),
            tool: r.tool.clone(),
            rule_id: rule.into(),
            severity: Severity::Critical,
            description: "d".into(),
            selector: "#x".into(),
            help_url: Some("https://help.test".into()),
            tags: vec!["wcag2a".into()],
        }
    }

    fn task(s: &Session, page: &PageId) -> WorkflowTask {
        WorkflowTask {
            id: WorkflowTaskId::new(),
            session_id: s.id.clone(),
            criterion_id: CriterionId::new("4.1.2"),
            page_id: page.clone(),
            workflow_type: WorkflowType::ViolationVerification,
            priority: 5,
            urgency: Urgency::High,
            status: TaskStatus::Pending,
            assigned_to: None,
            procedure: "# check".into(),
            resolution: None,
            review: None,
            violation_ids: vec![ViolationId::new()],
            created_at: 3,
            updated_at: 3,
        }
    }

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join(".a11y").join("a11y.db");
        let _ = SqliteStore::open(&db_path).unwrap();
        // schema statements are idempotent
        let _ = SqliteStore::open(&db_path).unwrap();
    }

    #[test]
    fn session_round_trip_and_transitions() {
        let (store, s) = store_with_session();
        let mut progress = SessionProgress::default();
        progress.set_units_total(4);
        progress.record_unit(2, false);
        store.save_progress(&s.id, &progress, 5).unwrap();

        assert!(store.transition_session(&s.id, SessionStatus::InProgress, None, 6).unwrap());
        assert!(store.transition_session(&s.id, SessionStatus::Failed, Some("discovery timed out"), 7).unwrap());
        assert!(!store.transition_session(&s.id, SessionStatus::Completed, None, 8).unwrap());

        let got = store.get_session(&s.id).unwrap().unwrap();
        assert_eq!(got.status, SessionStatus::Failed);
        assert_eq!(got.failure_reason.as_deref(), Some("discovery timed out"));
        assert_eq!(got.completed_at, Some(7));
        assert_eq!(got.progress, progress);
        assert_eq!(got.tools, s.tools);
    }

    #[test]
    fn scan_upsert_is_idempotent() {
        let (store, s) = store_with_session();
        let page = PageId::new();

        let first = result(&s, &page, ToolName::AXE);
        let id1 = store.upsert_scan_result(&first, &[violation(&first, "image-alt")]).unwrap();

        let mut second = result(&s, &page, ToolName::AXE);
        second.violation_count = 2;
        let id2 = store
            .upsert_scan_result(&second, &[violation(&second, "label"), violation(&second, "list")])
            .unwrap();

        assert_eq!(id1, id2);
        let results = store.list_scan_results(&s.id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].violation_count, 2);

        let vs = store.list_violations(&s.id).unwrap();
        assert_eq!(vs.iter().map(|v| v.rule_id.as_str()).collect::<Vec<_>>(), vec!["label", "list"]);
        assert!(vs.iter().all(|v| v.scan_result_id == id1));

        // a different tool is a different unit
        store.upsert_scan_result(&result(&s, &page, ToolName::PA11Y), &[]).unwrap();
        assert_eq!(store.list_scan_results(&s.id).unwrap().len(), 2);
    }

    #[test]
    fn rescan_withdraws_evidence_of_replaced_violations() {
        let (store, s) = store_with_session();
        let page = PageId::new();
        let c = CriterionId::new("4.1.2");
        let axe = ToolName::new(ToolName::AXE);

        let first = result(&s, &page, ToolName::AXE);
        let old = violation(&first, "image-alt");
        store.upsert_scan_result(&first, &[old.clone()]).unwrap();
        let evidence = vec![Evidence::Violation {
            violation_id: old.id.clone(),
            tool: axe.clone(),
            rule_id: old.rule_id.clone(),
            selector: old.selector.clone(),
        }];
        let failed = TestInstance::automated(&s.id, &c, &page, TestStatus::Failed, Confidence::High, &axe, evidence, 3);
        store.apply_automated_verdict(failed).unwrap();

        let second = result(&s, &page, ToolName::AXE);
        store.upsert_scan_result(&second, &[violation(&second, "image-alt")]).unwrap();

        let ti = store.get_test_instance(&s.id, &c, &page).unwrap().unwrap();
        assert_eq!(ti.status, TestStatus::Failed);
        assert!(ti.evidence.is_empty());
    }

    #[test]
    fn one_verdict_per_criterion_and_page() {
        let (store, s) = store_with_session();
        let page = PageId::new();
        let c = CriterionId::new("1.4.3");
        let axe = ToolName::new(ToolName::AXE);

        let passed = TestInstance::automated(&s.id, &c, &page, TestStatus::Passed, Confidence::High, &axe, vec![], 2);
        assert!(matches!(store.apply_automated_verdict(passed.clone()).unwrap(), Reconciled::Insert(_)));

        let failed = TestInstance::automated(&s.id, &c, &page, TestStatus::Failed, Confidence::Medium, &axe, vec![], 3);
        assert!(matches!(store.apply_automated_verdict(failed).unwrap(), Reconciled::Replace(_)));

        // a later pass never overwrites the failure
        assert_eq!(store.apply_automated_verdict(passed.clone()).unwrap(), Reconciled::Keep);

        let all = store.list_test_instances(&s.id).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, TestStatus::Failed);
        assert_eq!(all[0].id, passed.id);
    }

    #[test]
    fn open_task_unique_and_state_guarded() {
        let (store, s) = store_with_session();
        let page = PageId::new();

        let first = task(&s, &page);
        assert!(store.create_task_if_absent(&first).unwrap());
        assert!(!store.create_task_if_absent(&task(&s, &page)).unwrap());
        assert_eq!(store.list_tasks(&s.id).unwrap().len(), 1);

        // only the open-task key counts as a duplicate
        let mut reused_id = task(&s, &PageId::new());
        reused_id.id = first.id.clone();
        assert!(store.create_task_if_absent(&reused_id).is_err());
        assert_eq!(store.list_tasks(&s.id).unwrap().len(), 1);

        let mut assigned = first.clone();
        assigned.status = TaskStatus::InProgress;
        assigned.assigned_to = Some("rev-1".into());
        assert!(store.update_task(&assigned, TaskStatus::Pending).unwrap());
        assert!(!store.update_task(&assigned, TaskStatus::Pending).unwrap());

        let review = ReviewSubmission {
            reviewer: Some("rev-1".into()),
            is_violation: false,
            is_false_positive: true,
            confidence_level: Confidence::High,
            notes: "decorative".into(),
        };
        let mut done = assigned.clone();
        done.status = TaskStatus::Completed;
        done.resolution = Some(review.resolution());
        done.review = Some(review.clone());
        let verdict = TestInstance {
            id: TestInstanceId::new(),
            session_id: s.id.clone(),
            criterion_id: done.criterion_id.clone(),
            page_id: page.clone(),
            status: review.verdict(),
            method: TestMethod::Manual,
            confidence: Confidence::High,
            evidence: vec![],
            tool_used: None,
            updated_at: 9,
        };
        assert!(store.record_review(&done, TaskStatus::InProgress, verdict).unwrap());

        let stored = store.get_task(&first.id).unwrap().unwrap();
        assert_eq!(stored.resolution, Some(Resolution::FalsePositive));
        assert_eq!(stored.review, Some(review));
        let ti = store.get_test_instance(&s.id, &done.criterion_id, &page).unwrap().unwrap();
        assert_eq!(ti.status, TestStatus::NotApplicable);
        assert_eq!(ti.method, TestMethod::Manual);

        // closed task frees the key
        assert!(store.create_task_if_absent(&task(&s, &page)).unwrap());

        let missing = task(&s, &page);
        assert!(matches!(
            store.update_task(&missing, TaskStatus::Pending),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn notifications_append_in_order() {
        let (store, s) = store_with_session();
        let t = WorkflowTaskId::new();
        for (i, kind) in [NotificationKind::TaskCreated, NotificationKind::TaskAssigned].into_iter().enumerate() {
            let n = Notification::new(&s.id, Some(&t), kind, Recipient::Reviewer("rev-1".into()), "m", i as i64);
            store.append_notification(&n).unwrap();
        }
        let got = store.list_notifications(&s.id).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].kind, NotificationKind::TaskCreated);
        assert_eq!(got[1].recipient, Recipient::Reviewer("rev-1".into()));
        assert_eq!(got[1].task_id, Some(t));
    }

    #[test]
    fn busy_maps_to_transaction_aborted() {
        let busy = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY), None);
        assert!(store_err(busy).is_transient());
        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(!store_err(other).is_transient());
    }
}
