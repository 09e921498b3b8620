use a11y_core::Severity;
use serde_json::Value;

use super::{str_field, NormalizedResult, NormalizedViolation, ResultNormalizer};
use crate::NormalizeError;

/// pa11y: a flat list of issues, either bare (json reporter) or under
/// `issues`. pa11y reports no passes.
pub struct IssueListNormalizer;

fn severity_of(issue_type: &str) -> Severity {
    match issue_type {
        "error" => Severity::Serious,
        "warning" => Severity::Moderate,
        _ => Severity::Minor,
    }
}

impl ResultNormalizer for IssueListNormalizer {
    fn normalize(&self, raw: &Value) -> Result<NormalizedResult, NormalizeError> {
        let issues = match raw {
            Value::Array(items) => items,
            other => other
                .get("issues")
                .and_then(Value::as_array)
                .ok_or(NormalizeError::MissingField("issues"))?,
        };

        let mut out = NormalizedResult::default();
        for issue in issues {
            let code = str_field(issue, "code");
            if code.is_empty() {
                return Err(NormalizeError::Malformed("issue without code".into()));
            }
            out.violations.push(NormalizedViolation {
                rule_id: code,
                severity: severity_of(issue.get("type").and_then(Value::as_str).unwrap_or("notice")),
                description: str_field(issue, "message"),
                selector: str_field(issue, "selector"),
                help_url: None,
                tags: issue
                    .get("runner")
                    .and_then(Value::as_str)
                    .map(|r| vec![format!("runner:{r}")])
                    .unwrap_or_default(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn issue_type_sets_severity() {
        let raw = json!({"issues": [
            {"code": "WCAG2AA.Principle1.Guideline1_4.1_4_3.G18.Fail", "type": "error", "message": "m", "selector": "p"},
            {"code": "WCAG2AA.Principle3.Guideline3_1.3_1_2.H58", "type": "notice", "message": "m", "selector": "span"},
            {"code": "WCAG2AA.Principle2.Guideline2_4.2_4_6.G130", "type": "warning", "message": "m", "selector": "h2"}
        ]});
        let out = IssueListNormalizer.normalize(&raw).unwrap();
        let sev: Vec<_> = out.violations.iter().map(|v| v.severity).collect();
        assert_eq!(sev, vec![Severity::Serious, Severity::Minor, Severity::Moderate]);
        assert!(out.passes.is_empty());
    }

    #[test]
    fn bare_array_is_accepted() {
        let raw = json!([{"code": "x", "type": "error", "runner": "htmlcs"}]);
        let out = IssueListNormalizer.normalize(&raw).unwrap();
        assert_eq!(out.violations[0].tags, vec!["runner:htmlcs"]);
    }
}
