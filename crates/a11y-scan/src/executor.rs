use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use a11y_core::*;
use a11y_criteria::{KnowledgeBase, MatchSource};
use a11y_storage::{with_retryable_transaction, RetryPolicy, Store};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{NormalizedResult, NormalizerRegistry, ScanError, ToolError, ToolRunner};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TOOL_ATTEMPTS: u32 = 2;

/// What one (page, tool) unit produced.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanOutcome {
    pub scan_result_id: ScanResultId,
    pub violations: u32,
    pub passes: u32,
    /// The tool could not be run or its output could not be read.
    pub tool_failed: bool,
    pub error: Option<String>,
    /// Verdicts inserted or changed.
    pub verdicts_written: u32,
    /// Criteria whose verdict write kept aborting.
    pub criteria_failed: u32,
    /// Violations no criterion could be attributed to.
    pub unmapped: u32,
}

pub struct ScanExecutor {
    store: Arc<dyn Store>,
    kb: Arc<KnowledgeBase>,
    runner: Arc<dyn ToolRunner>,
    normalizers: Arc<NormalizerRegistry>,
    retry: RetryPolicy,
    tool_timeout: Duration,
    tool_attempts: u32,
}

impl ScanExecutor {
    pub fn new(store: Arc<dyn Store>, kb: Arc<KnowledgeBase>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            store,
            kb,
            runner,
            normalizers: Arc::new(NormalizerRegistry::builtin()),
            retry: RetryPolicy::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            tool_attempts: DEFAULT_TOOL_ATTEMPTS,
        }
    }

    pub fn with_normalizers(mut self, normalizers: NormalizerRegistry) -> Self {
        self.normalizers = Arc::new(normalizers);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Runs allowed per invocation when the tool times out, first try included.
    pub fn with_tool_attempts(mut self, attempts: u32) -> Self {
        self.tool_attempts = attempts.max(1);
        self
    }

    /// Run `tool` against `page`, persist the raw result with its violations,
    /// then fold the findings into automated verdicts one criterion at a time.
    ///
    /// Tool failures come back as `Ok` with `tool_failed` set. `Err` means the
    /// request was invalid or the store refused the scan result.
    pub async fn execute(&self, session: &Session, page: &Page, tool: &ToolName) -> Result<ScanOutcome, ScanError> {
        if !session.requests_tool(tool) {
            return Err(ScanError::ToolNotRequested { tool: tool.clone() });
        }

        let mut attempt = 1;
        let (started, run) = loop {
            let started = Instant::now();
            let run = tokio::time::timeout(self.tool_timeout, self.runner.run(tool, &page.url, self.tool_timeout)).await;
            let run = run.unwrap_or_else(|_| Err(ToolError::Timeout(self.tool_timeout.as_millis() as u64)));
            match run {
                Err(ToolError::Timeout(ms)) if attempt < self.tool_attempts => {
                    warn!(
                        session_id = %session.id,
                        url = %page.url,
                        tool = %tool,
                        attempt,
                        timeout_ms = ms,
                        "tool timed out; retrying"
                    );
                    attempt += 1;
                }
                run => break (started, run),
            }
        };

        let (raw_output, normalized, error, duration_ms) = match run {
            Ok(out) => {
                let duration = if out.duration_ms > 0 { out.duration_ms } else { started.elapsed().as_millis() as u64 };
                match self.normalizers.normalize(tool, &out.output) {
                    Ok(n) => (out.output, n, None, duration),
                    Err(e) => (out.output, NormalizedResult::default(), Some(e.to_string()), duration),
                }
            }
            Err(e) => (Value::Null, NormalizedResult::default(), Some(e.to_string()), started.elapsed().as_millis() as u64),
        };

        let now = now_ms();
        let result = ScanResult {
            id: ScanResultId::new(),
            session_id: session.id.clone(),
            page_id: page.id.clone(),
            page_url: page.url.clone(),
            tool: tool.clone(),
            raw_output,
            violation_count: normalized.violations.len() as u32,
            pass_count: normalized.passes.len() as u32,
            duration_ms,
            error: error.clone(),
            scanned_at: now,
        };
        let violations: Vec<Violation> = normalized
            .violations
            .into_iter()
            .map(|v| Violation {
                id: ViolationId::new(),
                scan_result_id: result.id.clone(),
                session_id: session.id.clone(),
                page_id: page.id.clone(),
                tool: tool.clone(),
                rule_id: v.rule_id,
                severity: v.severity,
                description: v.description,
                selector: v.selector,
                help_url: v.help_url,
                tags: v.tags,
            })
            .collect();

        let writer = VerdictWriter {
            store: Arc::clone(&self.store),
            kb: Arc::clone(&self.kb),
            retry: self.retry.clone(),
        };
        let (session_id, page, tool) = (session.id.clone(), page.clone(), tool.clone());
        // rusqlite and the retry backoff block; keep them off the runtime workers
        tokio::task::spawn_blocking(move || {
            writer.record(&session_id, &page, &tool, &result, &violations, error, now)
        })
        .await
        .map_err(|e| ScanError::Internal(e.to_string()))?
    }
}

/// The store half of a unit: the raw result, then the verdicts it implies.
struct VerdictWriter {
    store: Arc<dyn Store>,
    kb: Arc<KnowledgeBase>,
    retry: RetryPolicy,
}

impl VerdictWriter {
    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        session_id: &SessionId,
        page: &Page,
        tool: &ToolName,
        result: &ScanResult,
        violations: &[Violation],
        error: Option<String>,
        now: EpochMs,
    ) -> Result<ScanOutcome, ScanError> {
        let scan_result_id = with_retryable_transaction(&self.retry, "scan_result", || {
            self.store.upsert_scan_result(result, violations)
        })?;

        let mut outcome = ScanOutcome {
            scan_result_id,
            violations: result.violation_count,
            passes: result.pass_count,
            tool_failed: error.is_some(),
            error,
            verdicts_written: 0,
            criteria_failed: 0,
            unmapped: 0,
        };
        if let Some(reason) = &outcome.error {
            warn!(session_id = %session_id, url = %page.url, tool = %tool, error = %reason, "tool run failed");
            return Ok(outcome);
        }

        // criterion -> (best rule confidence, evidence)
        let mut failed: BTreeMap<CriterionId, (Confidence, Vec<Evidence>)> = BTreeMap::new();
        for v in violations {
            let m = self.kb.map_rule_to_criteria(tool, &v.rule_id, &v.tags);
            if m.is_unmapped() {
                debug!(tool = %tool, rule = %v.rule_id, "violation maps to no criterion");
                outcome.unmapped += 1;
                continue;
            }
            let confidence = match m.source {
                MatchSource::Table => self.kb.rule(tool, &v.rule_id).map(|r| r.confidence).unwrap_or(Confidence::Low),
                _ => Confidence::Low,
            };
            for criterion in m.criteria {
                let entry = failed.entry(criterion).or_insert((confidence, vec![]));
                entry.0 = entry.0.max(confidence);
                entry.1.push(Evidence::Violation {
                    violation_id: v.id.clone(),
                    tool: tool.clone(),
                    rule_id: v.rule_id.clone(),
                    selector: v.selector.clone(),
                });
            }
        }

        let covered = self.kb.tool_wcag_mappings(tool);
        for (criterion, (confidence, evidence)) in &failed {
            let incoming = TestInstance::automated(
                session_id,
                criterion,
                &page.id,
                TestStatus::Failed,
                *confidence,
                tool,
                evidence.clone(),
                now,
            );
            self.apply(incoming, &mut outcome)?;
        }
        for criterion in covered.iter().filter(|c| !failed.contains_key(*c)) {
            let confidence = self.kb.tool_coverage(tool, criterion).unwrap_or(Confidence::Medium);
            let incoming = TestInstance::automated(
                session_id,
                criterion,
                &page.id,
                TestStatus::Passed,
                confidence,
                tool,
                vec![Evidence::Pass { tool: tool.clone() }],
                now,
            );
            self.apply(incoming, &mut outcome)?;
        }

        info!(
            session_id = %session_id,
            url = %page.url,
            tool = %tool,
            violations = outcome.violations,
            verdicts = outcome.verdicts_written,
            criteria_failed = outcome.criteria_failed,
            "scan unit done"
        );
        Ok(outcome)
    }

    /// One transaction per criterion; an exhausted abort skips only that criterion.
    fn apply(&self, incoming: TestInstance, outcome: &mut ScanOutcome) -> Result<(), ScanError> {
        let criterion = incoming.criterion_id.clone();
        let res = with_retryable_transaction(&self.retry, "test_instance", || {
            self.store.apply_automated_verdict(incoming.clone())
        });
        match res {
            Ok(Reconciled::Keep) => {}
            Ok(_) => outcome.verdicts_written += 1,
            Err(e) if e.is_transient() => {
                warn!(criterion = %criterion, error = %e, "verdict write abandoned");
                outcome.criteria_failed += 1;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
