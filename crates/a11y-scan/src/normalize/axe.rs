use a11y_core::Severity;
use serde_json::Value;

use super::{single_report, str_field, NormalizedResult, NormalizedViolation, ResultNormalizer};
use crate::NormalizeError;

/// axe-core: `violations` and `passes` are lists of rules, each violated rule
/// carrying the offending `nodes`. One violation per node.
pub struct RuleListNormalizer;

impl ResultNormalizer for RuleListNormalizer {
    fn normalize(&self, raw: &Value) -> Result<NormalizedResult, NormalizeError> {
        let report = single_report(raw);
        let rules = report
            .get("violations")
            .and_then(Value::as_array)
            .ok_or(NormalizeError::MissingField("violations"))?;

        let mut out = NormalizedResult::default();
        for rule in rules {
            let rule_id = str_field(rule, "id");
            if rule_id.is_empty() {
                return Err(NormalizeError::Malformed("violation without id".into()));
            }
            let severity = rule
                .get("impact")
                .and_then(Value::as_str)
                .and_then(Severity::from_wire)
                .unwrap_or(Severity::Moderate);
            let description = match str_field(rule, "help") {
                h if h.is_empty() => str_field(rule, "description"),
                h => h,
            };
            let help_url = rule.get("helpUrl").and_then(Value::as_str).map(str::to_string);
            let tags: Vec<String> = rule
                .get("tags")
                .and_then(Value::as_array)
                .map(|t| t.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();

            let nodes = rule.get("nodes").and_then(Value::as_array).cloned().unwrap_or_default();
            let selectors: Vec<String> = if nodes.is_empty() {
                vec![String::new()]
            } else {
                nodes.iter().map(node_selector).collect()
            };
            for selector in selectors {
                out.violations.push(NormalizedViolation {
                    rule_id: rule_id.clone(),
                    severity,
                    description: description.clone(),
                    selector,
                    help_url: help_url.clone(),
                    tags: tags.clone(),
                });
            }
        }

        if let Some(passes) = report.get("passes").and_then(Value::as_array) {
            out.passes = passes.iter().map(|p| str_field(p, "id")).filter(|id| !id.is_empty()).collect();
        }
        Ok(out)
    }
}

/// `target` is a list of selectors, one per frame level.
fn node_selector(node: &Value) -> String {
    match node.get("target").and_then(Value::as_array) {
        Some(parts) => parts.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" >>> "),
        None => String::new(),
    }
}
