use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use a11y_criteria::UnmappedPolicy;
use a11y_scan::{default_tool_commands, ToolCommand};
use a11y_storage::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("orchestrator.{0} must be greater than zero")]
    Zero(&'static str),
    #[error("tools.{0}.program is empty")]
    EmptyProgram(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub criteria: CriteriaConfig,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolCommand>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    /// Relative paths resolve against the project root; `~` is expanded.
    pub db_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Runs per tool invocation when it times out, first try included.
    #[serde(default = "default_tool_attempts")]
    pub tool_attempts: u32,
    #[serde(default = "default_max_parallel_units")]
    pub max_parallel_units: usize,
    /// Attempts per store transaction, first try included.
    #[serde(default = "default_transaction_retries")]
    pub transaction_retries: u32,
}

fn default_discovery_timeout_secs() -> u64 {
    60
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_tool_timeout_secs() -> u64 {
    120
}
fn default_tool_attempts() -> u32 {
    2
}
fn default_max_parallel_units() -> usize {
    4
}
fn default_transaction_retries() -> u32 {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: default_discovery_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            tool_timeout_secs: default_tool_timeout_secs(),
            tool_attempts: default_tool_attempts(),
            max_parallel_units: default_max_parallel_units(),
            transaction_retries: default_transaction_retries(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CriteriaConfig {
    #[serde(default)]
    pub unmapped_policy: UnmappedPolicy,
}

/// Resolved knobs handed to the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
    pub discovery_timeout: Duration,
    pub poll_interval: Duration,
    pub tool_timeout: Duration,
    pub tool_attempts: u32,
    pub max_parallel_units: usize,
    pub retry: RetryPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        OrchestratorConfig::default().runner_config()
    }
}

impl OrchestratorConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
            tool_attempts: self.tool_attempts.max(1),
            max_parallel_units: self.max_parallel_units.max(1),
            retry: RetryPolicy { max_attempts: self.transaction_retries, ..RetryPolicy::default() },
        }
    }
}

impl Config {
    pub fn default_for_project(project_id: &str) -> Self {
        Self {
            project: ProjectConfig { id: project_id.to_string(), db_path: ".a11y/a11y.db".to_string() },
            orchestrator: OrchestratorConfig::default(),
            criteria: CriteriaConfig::default(),
            tools: default_tool_commands().into_iter().collect(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse a11y.toml")?;
        cfg.validate().with_context(|| format!("invalid {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;
        if o.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("poll_interval_ms"));
        }
        if o.tool_timeout_secs == 0 {
            return Err(ConfigError::Zero("tool_timeout_secs"));
        }
        if o.tool_attempts == 0 {
            return Err(ConfigError::Zero("tool_attempts"));
        }
        if o.max_parallel_units == 0 {
            return Err(ConfigError::Zero("max_parallel_units"));
        }
        if o.transaction_retries == 0 {
            return Err(ConfigError::Zero("transaction_retries"));
        }
        if let Some((name, _)) = self.tools.iter().find(|(_, c)| c.program.trim().is_empty()) {
            return Err(ConfigError::EmptyProgram(name.clone()));
        }
        Ok(())
    }

    /// Tool commands keyed by tool name, as the command runner expects them.
    pub fn tool_commands(&self) -> std::collections::HashMap<String, ToolCommand> {
        self.tools.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn db_path(&self, project_root: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&self.project.db_path).to_string();
        project_root.join(expanded)
    }

    pub fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(".a11y").join("a11y.toml")
    }

    /// Load the project config, writing the default one on first use.
    pub fn load_or_init(project_root: &Path) -> Result<Self> {
        let path = Self::config_path(project_root);
        if path.exists() {
            return Self::load_from(&path);
        }
        let project_id = project_root.file_name().and_then(|s| s.to_str()).unwrap_or("project");
        let cfg = Self::default_for_project(project_id);
        cfg.save_to(&path)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a11y_core::{CriterionId, ToolName};

    #[test]
    fn default_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let cfg = Config::default_for_project("shop");
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.project.id, "shop");
        assert_eq!(loaded.orchestrator, OrchestratorConfig::default());
        assert_eq!(loaded.criteria.unmapped_policy, UnmappedPolicy::Sentinel);
        assert_eq!(loaded.tools.len(), 3);
        assert_eq!(loaded.tools[ToolName::PA11Y].ok_exit_codes, vec![0, 2]);
    }

    #[test]
    fn sparse_file_falls_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [project]
            id = "docs"
            db_path = "~/a11y/docs.db"

            [orchestrator]
            max_parallel_units = 8

            [criteria.unmapped_policy]
            mode = "default_criterion"
            criterion = "4.1.2"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.orchestrator.max_parallel_units, 8);
        assert_eq!(cfg.orchestrator.discovery_timeout_secs, 60);
        assert_eq!(cfg.orchestrator.poll_interval_ms, 2_000);
        assert!(cfg.tools.is_empty());
        assert_eq!(
            cfg.criteria.unmapped_policy,
            UnmappedPolicy::DefaultCriterion { criterion: CriterionId::new("4.1.2") }
        );
        assert!(!cfg.db_path(Path::new("/srv/docs")).to_string_lossy().contains('~'));
    }

    #[test]
    fn runner_config_uses_configured_retries() {
        let o = OrchestratorConfig { transaction_retries: 7, poll_interval_ms: 250, ..Default::default() };
        let rc = o.runner_config();
        assert_eq!(rc.retry.max_attempts, 7);
        assert_eq!(rc.poll_interval, Duration::from_millis(250));
        assert_eq!(rc.discovery_timeout, Duration::from_secs(60));
        assert_eq!(rc.tool_attempts, 2);
    }

    #[test]
    fn rejects_zero_parallelism_and_empty_programs() {
        let mut cfg = Config::default_for_project("p");
        cfg.orchestrator.max_parallel_units = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("max_parallel_units")));

        let mut cfg = Config::default_for_project("p");
        cfg.orchestrator.tool_attempts = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("tool_attempts")));

        let mut cfg = Config::default_for_project("p");
        cfg.tools.insert("custom".into(), ToolCommand::new(" ", &[]));
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyProgram("custom".into())));
    }

    #[test]
    fn load_or_init_writes_default_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = Config::load_or_init(dir.path()).unwrap();
        assert!(Config::config_path(dir.path()).exists());
        let second = Config::load_or_init(dir.path()).unwrap();
        assert_eq!(first.project.id, second.project.id);
    }
}
