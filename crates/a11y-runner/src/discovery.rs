use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPage {
    /// Crawler-assigned id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
}

/// One answer from the crawler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    pub status: DiscoveryStatus,
    #[serde(default)]
    pub pages: Vec<DiscoveredPage>,
    #[serde(default)]
    pub message: Option<String>,
}

impl DiscoverySnapshot {
    pub fn running() -> Self {
        Self { status: DiscoveryStatus::Running, pages: vec![], message: None }
    }

    pub fn completed<S: AsRef<str>>(urls: &[S]) -> Self {
        Self {
            status: DiscoveryStatus::Completed,
            pages: urls.iter().map(|u| DiscoveredPage { id: None, url: u.as_ref().to_string() }).collect(),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { status: DiscoveryStatus::Failed, pages: vec![], message: Some(message.into()) }
    }
}

/// The page crawler, polled until it reports `completed` or `failed`.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn list_pages(&self, project_id: &str) -> Result<DiscoverySnapshot>;
}

/// Answers from a fixed script: each poll takes the next snapshot and the last
/// one repeats forever.
pub struct StaticDiscovery {
    script: Mutex<VecDeque<DiscoverySnapshot>>,
}

impl StaticDiscovery {
    pub fn new(first: DiscoverySnapshot) -> Self {
        Self { script: Mutex::new(VecDeque::from([first])) }
    }

    pub fn completed<S: AsRef<str>>(urls: &[S]) -> Self {
        Self::new(DiscoverySnapshot::completed(urls))
    }

    pub fn then(self, next: DiscoverySnapshot) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(next);
        }
        self
    }
}

#[async_trait]
impl DiscoverySource for StaticDiscovery {
    async fn list_pages(&self, _project_id: &str) -> Result<DiscoverySnapshot> {
        let mut script = self.script.lock().map_err(|_| anyhow::anyhow!("discovery script poisoned"))?;
        let snap = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };
        Ok(snap.unwrap_or_else(DiscoverySnapshot::running))
    }
}

/// Reads a crawl manifest (YAML or JSON, by extension) on every poll. A
/// missing file means the crawl has not written its result yet.
pub struct FileDiscovery {
    path: PathBuf,
}

impl FileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub fn load_manifest(path: &Path) -> Result<DiscoverySnapshot> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read crawl manifest: {}", path.display()))?;
    let yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
    let snap = if yaml {
        serde_yaml::from_str(&s).with_context(|| "parse crawl manifest yaml")?
    } else {
        serde_json::from_str(&s).with_context(|| "parse crawl manifest json")?
    };
    Ok(snap)
}

#[async_trait]
impl DiscoverySource for FileDiscovery {
    async fn list_pages(&self, _project_id: &str) -> Result<DiscoverySnapshot> {
        if !self.path.exists() {
            return Ok(DiscoverySnapshot::running());
        }
        load_manifest(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_script_advances_then_repeats() {
        let d = StaticDiscovery::new(DiscoverySnapshot::running()).then(DiscoverySnapshot::completed(&["https://a.test/"]));
        assert_eq!(d.list_pages("p").await.unwrap().status, DiscoveryStatus::Running);
        let done = d.list_pages("p").await.unwrap();
        assert_eq!(done.status, DiscoveryStatus::Completed);
        assert_eq!(done.pages[0].url, "https://a.test/");
        assert_eq!(d.list_pages("p").await.unwrap(), done);
    }

    #[tokio::test]
    async fn file_discovery_waits_for_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.yaml");
        let d = FileDiscovery::new(&path);
        assert_eq!(d.list_pages("p").await.unwrap().status, DiscoveryStatus::Running);

        std::fs::write(
            &path,
            "status: completed\npages:\n  - id: home\n    url: https://a.test/\n  - url: https://a.test/cart\n",
        )
        .unwrap();
        let snap = d.list_pages("p").await.unwrap();
        assert_eq!(snap.status, DiscoveryStatus::Completed);
        assert_eq!(snap.pages.len(), 2);
        assert_eq!(snap.pages[0].id.as_deref(), Some("home"));
        assert_eq!(snap.pages[1].id, None);
    }

    #[test]
    fn json_manifest_carries_failure_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.json");
        std::fs::write(&path, r#"{"status": "failed", "message": "robots.txt disallows /"}"#).unwrap();
        let snap = load_manifest(&path).unwrap();
        assert_eq!(snap.status, DiscoveryStatus::Failed);
        assert_eq!(snap.message.as_deref(), Some("robots.txt disallows /"));
    }
}
