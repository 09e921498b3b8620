use a11y_core::Severity;
use serde_json::Value;

use super::{str_field, NormalizedResult, NormalizedViolation, ResultNormalizer};
use crate::NormalizeError;

/// lighthouse: `audits` is a map of audit id to a scored audit. Score 1
/// passes; informative, manual and not-applicable audits carry no score and
/// are skipped.
pub struct AuditMapNormalizer;

fn severity_of(score: f64) -> Severity {
    if score <= 0.0 {
        Severity::Serious
    } else if score < 0.5 {
        Severity::Moderate
    } else {
        Severity::Minor
    }
}

/// `[Learn more](https://...)` at the end of an audit description.
fn learn_more_link(description: &str) -> Option<String> {
    let start = description.rfind("](")? + 2;
    let end = description[start..].find(')')? + start;
    let url = &description[start..end];
    url.starts_with("http").then(|| url.to_string())
}

impl ResultNormalizer for AuditMapNormalizer {
    fn normalize(&self, raw: &Value) -> Result<NormalizedResult, NormalizeError> {
        let audits = raw
            .get("audits")
            .and_then(Value::as_object)
            .ok_or(NormalizeError::MissingField("audits"))?;

        let mut out = NormalizedResult::default();
        for (id, audit) in audits {
            let Some(score) = audit.get("score").and_then(Value::as_f64) else {
                continue;
            };
            if score >= 1.0 {
                out.passes.push(id.clone());
                continue;
            }

            let description = str_field(audit, "title");
            let help_url = learn_more_link(&str_field(audit, "description"));
            let items = audit
                .pointer("/details/items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let selectors: Vec<String> = if items.is_empty() {
                vec![String::new()]
            } else {
                items
                    .iter()
                    .map(|i| i.pointer("/node/selector").and_then(Value::as_str).unwrap_or_default().to_string())
                    .collect()
            };
            for selector in selectors {
                out.violations.push(NormalizedViolation {
                    rule_id: id.clone(),
                    severity: severity_of(score),
                    description: description.clone(),
                    selector,
                    help_url: help_url.clone(),
                    tags: vec![],
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scored_audits_split_into_passes_and_violations() {
        let raw = json!({"audits": {
            "color-contrast": {
                "score": 0,
                "title": "Background and foreground colors do not have a sufficient contrast ratio.",
                "description": "Low-contrast text is difficult to read. [Learn more](https://dequeuniversity.com/rules/axe/4.8/color-contrast).",
                "details": {"items": [{"node": {"selector": "p.muted"}}, {"node": {"selector": "a.footer"}}]}
            },
            "document-title": {"score": 1, "title": "Document has a title"},
            "tabindex": {"score": 0.4, "title": "Some elements have a tabindex value greater than 0"},
            "accesskeys": {"score": null, "scoreDisplayMode": "notApplicable"}
        }});
        let out = AuditMapNormalizer.normalize(&raw).unwrap();
        assert_eq!(out.passes, vec!["document-title"]);
        assert_eq!(out.violations.len(), 3);

        let contrast: Vec<_> = out.violations.iter().filter(|v| v.rule_id == "color-contrast").collect();
        assert_eq!(contrast.len(), 2);
        assert_eq!(contrast[0].severity, Severity::Serious);
        assert_eq!(
            contrast[0].help_url.as_deref(),
            Some("https://dequeuniversity.com/rules/axe/4.8/color-contrast")
        );

        let tab = out.violations.iter().find(|v| v.rule_id == "tabindex").unwrap();
        assert_eq!(tab.severity, Severity::Moderate);
        assert_eq!(tab.selector, "");
    }
}
