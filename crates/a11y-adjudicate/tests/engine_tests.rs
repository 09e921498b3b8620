use std::sync::Arc;

use a11y_adjudicate::*;
use a11y_core::*;
use a11y_criteria::{KnowledgeBase, UnmappedPolicy};
use a11y_storage::{InMemoryStore, RetryPolicy, Store};

struct Harness {
    store: Arc<InMemoryStore>,
    sink: Arc<MemorySink>,
    engine: AdjudicationEngine,
    session: SessionId,
    page: PageId,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let kb = Arc::new(KnowledgeBase::builtin(UnmappedPolicy::Sentinel));
    let engine = AdjudicationEngine::new(store.clone(), kb, sink.clone()).with_retry(RetryPolicy::immediate(3));
    Harness { store, sink, engine, session: SessionId::new(), page: PageId::new() }
}

fn violation(h: &Harness, tool: &str, rule: &str, severity: Severity) -> Violation {
    Violation {
        id: ViolationId::new(),
        scan_result_id: ScanResultId::new(),
        session_id: h.session.clone(),
        page_id: h.page.clone(),
        tool: ToolName::new(tool),
        rule_id: rule.into(),
        severity,
        description: format!("{rule} failed"),
        selector: "main > img".into(),
        help_url: None,
        tags: vec![],
    }
}

fn review(is_violation: bool, is_false_positive: bool) -> ReviewSubmission {
    ReviewSubmission {
        reviewer: None,
        is_violation,
        is_false_positive,
        confidence_level: Confidence::High,
        notes: "checked with NVDA".into(),
    }
}

#[test]
fn critical_finding_on_hybrid_criterion_opens_urgent_task() {
    let h = harness();
    let vs = vec![violation(&h, ToolName::AXE, "image-alt", Severity::Critical)];

    let report = h.engine.process_violations(&h.session, &vs).unwrap();
    assert_eq!(report.manual_required, 1);
    assert_eq!(report.tasks_created, 1);

    let tasks = h.store.list_tasks(&h.session).unwrap();
    assert_eq!(tasks.len(), 1);
    let t = &tasks[0];
    assert_eq!(t.criterion_id, CriterionId::new("1.1.1"));
    assert_eq!(t.workflow_type, WorkflowType::ViolationVerification);
    assert_eq!(t.urgency, Urgency::High);
    assert_eq!(t.priority, 5);
    assert_eq!(t.status, TaskStatus::Pending);
    assert!(t.procedure.contains("image-alt"));

    let sent = h.sink.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::TaskCreated);
    assert_eq!(sent[0].recipient, Recipient::ReviewerPool);
    assert_eq!(h.store.list_notifications(&h.session).unwrap().len(), 1);
}

#[test]
fn low_confidence_minor_finding_becomes_false_positive_check() {
    let h = harness();
    let vs = vec![violation(&h, ToolName::PA11Y, "WCAG2AA.Principle3.Guideline3_1.3_1_2.H58", Severity::Minor)];

    let report = h.engine.process_violations(&h.session, &vs).unwrap();
    assert_eq!(report.false_positive_candidates, 1);

    let tasks = h.store.list_tasks(&h.session).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].criterion_id, CriterionId::new("3.1.2"));
    assert_eq!(tasks[0].workflow_type, WorkflowType::FalsePositiveCheck);
    assert_eq!(tasks[0].urgency, Urgency::Low);
    assert_eq!(tasks[0].priority, 3);
}

#[test]
fn trusted_finding_needs_no_task() {
    let h = harness();
    let vs = vec![violation(&h, ToolName::AXE, "color-contrast", Severity::Serious)];
    let report = h.engine.process_violations(&h.session, &vs).unwrap();
    assert_eq!(report.automated_sufficient, 1);
    assert_eq!(report.tasks_created, 0);
    assert!(h.store.list_tasks(&h.session).unwrap().is_empty());
    assert!(h.sink.notifications().is_empty());
}

#[test]
fn critical_finding_is_escalated_even_on_automated_criteria() {
    let h = harness();
    // 1.4.3 is fully automatable, but critical still goes to a human
    let vs = vec![violation(&h, ToolName::AXE, "color-contrast", Severity::Critical)];
    let report = h.engine.process_violations(&h.session, &vs).unwrap();
    assert_eq!(report.automated_sufficient, 0);
    assert_eq!(report.manual_required, 1);
    assert_eq!(h.store.list_tasks(&h.session).unwrap()[0].urgency, Urgency::High);
}

#[test]
fn reprocessing_creates_no_duplicates() {
    let h = harness();
    let vs = vec![
        violation(&h, ToolName::AXE, "image-alt", Severity::Critical),
        violation(&h, ToolName::PA11Y, "WCAG2AA.Principle1.Guideline1_1.1_1_1.H37", Severity::Serious),
        violation(&h, ToolName::AXE, "link-name", Severity::Serious),
    ];

    let first = h.engine.process_violations(&h.session, &vs).unwrap();
    let tasks_after_first = h.store.list_tasks(&h.session).unwrap();
    let second = h.engine.process_violations(&h.session, &vs).unwrap();

    assert_eq!(second.tasks_created, 0);
    assert_eq!(second.duplicates_skipped, first.tasks_created);
    assert_eq!(h.store.list_tasks(&h.session).unwrap().len(), tasks_after_first.len());

    // both 1.1.1 findings landed on one task, decided by the critical one
    let alt: Vec<_> = tasks_after_first
        .iter()
        .filter(|t| t.criterion_id == CriterionId::new("1.1.1"))
        .collect();
    assert_eq!(alt.len(), 1);
    assert_eq!(alt[0].violation_ids.len(), 2);
    assert_eq!(alt[0].priority, 5);
    assert_eq!(alt[0].violation_ids[0], vs[0].id);
}

#[test]
fn unmapped_findings_are_counted_not_tasked() {
    let h = harness();
    let vs = vec![violation(&h, "wave", "mystery-rule", Severity::Serious)];
    let report = h.engine.process_violations(&h.session, &vs).unwrap();
    assert_eq!(report.unmapped, 1);
    assert!(h.store.list_tasks(&h.session).unwrap().is_empty());
}

#[test]
fn reviewer_marks_false_positive() {
    let h = harness();
    let vs = vec![violation(&h, ToolName::AXE, "image-alt", Severity::Critical)];
    h.engine.process_violations(&h.session, &vs).unwrap();
    let task = h.store.list_tasks(&h.session).unwrap().remove(0);

    let assigned = h.engine.assign_task(&task.id, "rev-7").unwrap();
    assert_eq!(assigned.status, TaskStatus::InProgress);
    assert_eq!(assigned.assigned_to.as_deref(), Some("rev-7"));

    let done = h.engine.complete_task(&task.id, review(false, true)).unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.resolution, Some(Resolution::FalsePositive));
    assert_eq!(done.review.as_ref().and_then(|r| r.reviewer.as_deref()), Some("rev-7"));

    let ti = h
        .store
        .get_test_instance(&h.session, &task.criterion_id, &h.page)
        .unwrap()
        .unwrap();
    assert_eq!(ti.status, TestStatus::NotApplicable);
    assert_eq!(ti.method, TestMethod::Manual);
    assert_eq!(ti.confidence, Confidence::High);
    assert!(matches!(&ti.evidence[0], Evidence::Review { resolution: Resolution::FalsePositive, .. }));

    let kinds: Vec<_> = h.sink.notifications().iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::TaskCreated, NotificationKind::TaskAssigned, NotificationKind::TaskCompleted]
    );
    assert_eq!(h.sink.notifications()[1].recipient, Recipient::Reviewer("rev-7".into()));
}

#[test]
fn manual_verdict_outranks_later_tool_runs() {
    let h = harness();
    let vs = vec![violation(&h, ToolName::AXE, "image-alt", Severity::Critical)];
    h.engine.process_violations(&h.session, &vs).unwrap();
    let task = h.store.list_tasks(&h.session).unwrap().remove(0);
    h.engine.assign_task(&task.id, "rev-1").unwrap();
    h.engine.complete_task(&task.id, review(false, false)).unwrap();

    let tool_says = TestInstance::automated(
        &h.session,
        &task.criterion_id,
        &h.page,
        TestStatus::Failed,
        Confidence::High,
        &ToolName::new(ToolName::AXE),
        vec![],
        now_ms(),
    );
    assert_eq!(h.store.apply_automated_verdict(tool_says).unwrap(), Reconciled::Keep);
    let ti = h.store.get_test_instance(&h.session, &task.criterion_id, &h.page).unwrap().unwrap();
    assert_eq!(ti.status, TestStatus::Passed);
}

#[test]
fn task_state_machine_rejects_out_of_order_actions() {
    let h = harness();
    let vs = vec![violation(&h, ToolName::AXE, "image-alt", Severity::Critical)];
    h.engine.process_violations(&h.session, &vs).unwrap();
    let task = h.store.list_tasks(&h.session).unwrap().remove(0);

    let err = h.engine.complete_task(&task.id, review(true, false)).unwrap_err();
    assert!(matches!(err, TaskActionError::InvalidState { current: TaskStatus::Pending, .. }));

    h.engine.assign_task(&task.id, "rev-1").unwrap();
    let err = h.engine.assign_task(&task.id, "rev-2").unwrap_err();
    assert!(matches!(err, TaskActionError::InvalidState { current: TaskStatus::InProgress, .. }));

    let err = h.engine.assign_task(&WorkflowTaskId::new(), "rev-1").unwrap_err();
    assert!(matches!(err, TaskActionError::NotFound(_)));

    h.engine.complete_task(&task.id, review(true, false)).unwrap();
    let err = h.engine.complete_task(&task.id, review(true, false)).unwrap_err();
    assert!(matches!(err, TaskActionError::InvalidState { current: TaskStatus::Completed, .. }));
}

#[test]
fn remediation_follows_a_confirmed_violation() {
    let h = harness();
    let vs = vec![
        violation(&h, ToolName::AXE, "image-alt", Severity::Critical),
        violation(&h, ToolName::AXE, "label", Severity::Critical),
    ];
    h.engine.process_violations(&h.session, &vs).unwrap();
    let tasks = h.store.list_tasks(&h.session).unwrap();
    let (confirmed, dismissed) = (&tasks[0], &tasks[1]);

    for (t, r) in [(confirmed, review(true, false)), (dismissed, review(false, true))] {
        h.engine.assign_task(&t.id, "rev-1").unwrap();
        h.engine.complete_task(&t.id, r).unwrap();
    }

    let err = h.engine.request_remediation_validation(&dismissed.id).unwrap_err();
    assert!(matches!(err, TaskActionError::InvalidState { .. }));

    let follow_up = h.engine.request_remediation_validation(&confirmed.id).unwrap().unwrap();
    assert_eq!(follow_up.workflow_type, WorkflowType::RemediationValidation);
    assert_eq!(follow_up.criterion_id, confirmed.criterion_id);
    assert_eq!(follow_up.status, TaskStatus::Pending);
    // a second request while the first is open is a no-op
    assert!(h.engine.request_remediation_validation(&confirmed.id).unwrap().is_none());
}

#[test]
fn open_tasks_are_filtered_and_ranked() {
    let h = harness();
    let vs = vec![
        violation(&h, ToolName::PA11Y, "WCAG2AA.Principle3.Guideline3_1.3_1_2.H58", Severity::Minor),
        violation(&h, ToolName::AXE, "image-alt", Severity::Critical),
        violation(&h, ToolName::LIGHTHOUSE, "tabindex", Severity::Moderate),
    ];
    h.engine.process_violations(&h.session, &vs).unwrap();

    let all = h.engine.list_open_tasks(&h.session, &TaskFilter::default()).unwrap();
    assert!(all.len() >= 3);
    assert!(all.windows(2).all(|w| w[0].priority >= w[1].priority));

    let low = h
        .engine
        .list_open_tasks(&h.session, &TaskFilter { urgency: Some(Urgency::Low), ..Default::default() })
        .unwrap();
    assert!(low.iter().all(|t| t.urgency == Urgency::Low));
    assert!(!low.is_empty());

    let urgent = h
        .engine
        .list_open_tasks(&h.session, &TaskFilter { min_priority: Some(5), ..Default::default() })
        .unwrap();
    assert!(urgent.iter().all(|t| t.priority == 5));

    h.engine.assign_task(&urgent[0].id, "rev-3").unwrap();
    let mine = h
        .engine
        .list_open_tasks(&h.session, &TaskFilter { assignee: Some("rev-3".into()), ..Default::default() })
        .unwrap();
    assert_eq!(mine.len(), 1);
}
