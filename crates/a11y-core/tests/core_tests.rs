use a11y_core::{
    Confidence, ReviewSubmission, Resolution, Session, SessionId, SessionStatus, TestStatus, ToolName,
};

#[test]
fn test_session_creation() {
    let session = Session::new(
        "proj-1",
        vec![ToolName::new("pa11y"), ToolName::new("axe-core"), ToolName::new("pa11y")],
        42,
    );
    assert_eq!(session.status, SessionStatus::Planning);
    assert_eq!(session.tools.len(), 2);
    assert!(session.requests_tool(&ToolName::new("axe-core")));
    assert!(!session.requests_tool(&ToolName::new("lighthouse")));
    assert_eq!(session.created_at, 42);
}

#[test]
fn test_session_id_new() {
    assert_ne!(SessionId::new(), SessionId::new());
}

#[test]
fn test_review_resolution_mapping() {
    let mut review = ReviewSubmission {
        reviewer: Some("rev-1".into()),
        is_violation: true,
        is_false_positive: true,
        confidence_level: Confidence::High,
        notes: String::new(),
    };
    assert_eq!(review.resolution(), Resolution::ViolationConfirmed);
    assert_eq!(review.verdict(), TestStatus::Failed);

    review.is_violation = false;
    assert_eq!(review.resolution(), Resolution::FalsePositive);
    assert_eq!(review.verdict(), TestStatus::NotApplicable);

    review.is_false_positive = false;
    assert_eq!(review.resolution(), Resolution::Resolved);
    assert_eq!(review.verdict(), TestStatus::Passed);
}

#[test]
fn test_review_submission_defaults() {
    let review: ReviewSubmission =
        serde_json::from_str(r#"{"is_violation": false, "confidence_level": "medium"}"#).unwrap();
    assert!(!review.is_false_positive);
    assert_eq!(review.reviewer, None);
    assert_eq!(review.resolution(), Resolution::Resolved);
}
