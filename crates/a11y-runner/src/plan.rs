use std::path::{Path, PathBuf};
use std::sync::Arc;

use a11y_core::ToolName;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{DiscoverySource, FileDiscovery, StaticDiscovery};

/// What `a11y run` is asked to do, loaded from YAML or JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPlan {
    #[serde(default)]
    pub project_id: Option<String>,
    pub tools: Vec<String>,
    /// Fixed page list; skips waiting on a crawl.
    #[serde(default)]
    pub pages: Vec<String>,
    /// Crawl manifest to poll when `pages` is empty.
    #[serde(default)]
    pub crawl_manifest: Option<String>,
}

impl SessionPlan {
    pub fn tool_names(&self) -> Vec<ToolName> {
        self.tools.iter().map(|t| ToolName::new(t.trim())).collect()
    }

    /// Relative manifest paths resolve against `base`.
    pub fn discovery(&self, base: &Path) -> Arc<dyn DiscoverySource> {
        match &self.crawl_manifest {
            Some(manifest) if self.pages.is_empty() => {
                let p = PathBuf::from(shellexpand::tilde(manifest).to_string());
                Arc::new(FileDiscovery::new(base.join(p)))
            }
            _ => Arc::new(StaticDiscovery::completed(self.pages.as_slice())),
        }
    }
}

pub fn load_session_plan(path: &Path) -> Result<SessionPlan> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read session plan: {}", path.display()))?;
    let plan: SessionPlan = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&s).with_context(|| "parse session plan json")?
    } else {
        serde_yaml::from_str(&s).with_context(|| "parse session plan yaml")?
    };
    validate_session_plan(&plan)?;
    Ok(plan)
}

pub fn validate_session_plan(plan: &SessionPlan) -> Result<()> {
    if plan.tools.iter().all(|t| t.trim().is_empty()) {
        return Err(anyhow!("session plan must name at least one tool"));
    }
    if plan.pages.is_empty() && plan.crawl_manifest.is_none() {
        return Err(anyhow!("session plan needs pages or a crawl_manifest"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, "tools: [axe-core, pa11y]\npages:\n  - https://shop.test/\n").unwrap();
        let plan = load_session_plan(&path).unwrap();
        assert_eq!(plan.tool_names(), vec![ToolName::new(ToolName::AXE), ToolName::new(ToolName::PA11Y)]);
        assert_eq!(plan.pages.len(), 1);
    }

    #[test]
    fn plan_without_targets_is_rejected() {
        let plan = SessionPlan { project_id: None, tools: vec!["axe-core".into()], pages: vec![], crawl_manifest: None };
        assert!(validate_session_plan(&plan).is_err());
        let plan = SessionPlan { tools: vec![" ".into()], pages: vec!["https://a.test/".into()], ..plan };
        assert!(validate_session_plan(&plan).is_err());
    }
}
