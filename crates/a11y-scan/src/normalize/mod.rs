//! Per-tool output normalizers.
//!
//! Each scanning tool reports in its own shape. A [`ResultNormalizer`] turns
//! one tool's raw JSON into a [`NormalizedResult`]; the [`NormalizerRegistry`]
//! picks the normalizer by tool name.

use std::collections::HashMap;
use std::sync::Arc;

use a11y_core::{Severity, ToolName};
use serde_json::Value;

use crate::NormalizeError;

mod axe;
mod lighthouse;
mod pa11y;

pub use axe::RuleListNormalizer;
pub use lighthouse::AuditMapNormalizer;
pub use pa11y::IssueListNormalizer;

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedViolation {
    pub rule_id: String,
    pub severity: Severity,
    pub description: String,
    pub selector: String,
    pub help_url: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedResult {
    pub violations: Vec<NormalizedViolation>,
    /// Rule ids the tool reported as passing.
    pub passes: Vec<String>,
}

pub trait ResultNormalizer: Send + Sync {
    fn normalize(&self, raw: &Value) -> Result<NormalizedResult, NormalizeError>;
}

#[derive(Clone, Default)]
pub struct NormalizerRegistry {
    by_tool: HashMap<ToolName, Arc<dyn ResultNormalizer>>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// axe-core, pa11y and lighthouse.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register(ToolName::new(ToolName::AXE), Arc::new(RuleListNormalizer));
        reg.register(ToolName::new(ToolName::PA11Y), Arc::new(IssueListNormalizer));
        reg.register(ToolName::new(ToolName::LIGHTHOUSE), Arc::new(AuditMapNormalizer));
        reg
    }

    pub fn register(&mut self, tool: ToolName, normalizer: Arc<dyn ResultNormalizer>) {
        self.by_tool.insert(tool, normalizer);
    }

    pub fn normalize(&self, tool: &ToolName, raw: &Value) -> Result<NormalizedResult, NormalizeError> {
        let n = self.by_tool.get(tool).ok_or_else(|| NormalizeError::UnknownTool(tool.clone()))?;
        n.normalize(raw)
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Some CLIs wrap a single page's report in a one-element array.
fn single_report(raw: &Value) -> &Value {
    match raw {
        Value::Array(items) if items.len() == 1 && items[0].is_object() => &items[0],
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_dispatches_by_tool() {
        let reg = NormalizerRegistry::builtin();
        let raw = json!({"violations": [], "passes": [{"id": "image-alt"}]});
        let out = reg.normalize(&ToolName::new(ToolName::AXE), &raw).unwrap();
        assert_eq!(out.passes, vec!["image-alt".to_string()]);

        let err = reg.normalize(&ToolName::new("wave"), &raw).unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownTool(_)));
    }
}
