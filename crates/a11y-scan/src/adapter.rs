use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use a11y_core::ToolName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::ToolError;

#[derive(Clone, Debug, PartialEq)]
pub struct RawToolOutput {
    pub output: Value,
    pub duration_ms: u64,
}

/// Runs one scanning tool against one page. Implementations are black boxes
/// to the executor; only the JSON they return is interpreted.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, tool: &ToolName, page_url: &str, timeout: Duration) -> Result<RawToolOutput, ToolError>;
}

/// External program invocation for one tool. `{url}` in `args` is replaced
/// with the page url; without a placeholder the url is appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Exit codes that still carry a report on stdout.
    #[serde(default = "default_ok_exit_codes")]
    pub ok_exit_codes: Vec<i32>,
}

fn default_ok_exit_codes() -> Vec<i32> {
    vec![0]
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            ok_exit_codes: default_ok_exit_codes(),
        }
    }

    pub fn args_for(&self, page_url: &str) -> Vec<String> {
        let mut args: Vec<String> = self.args.iter().map(|a| a.replace("{url}", page_url)).collect();
        if !self.args.iter().any(|a| a.contains("{url}")) {
            args.push(page_url.to_string());
        }
        args
    }
}

/// Command lines for the stock CLIs of the three supported tools.
pub fn default_tool_commands() -> HashMap<String, ToolCommand> {
    let mut pa11y = ToolCommand::new("pa11y", &["--reporter", "json", "{url}"]);
    // pa11y exits 2 when it found issues
    pa11y.ok_exit_codes = vec![0, 2];
    HashMap::from([
        (ToolName::AXE.to_string(), ToolCommand::new("axe", &["{url}", "--stdout"])),
        (ToolName::PA11Y.to_string(), pa11y),
        (
            ToolName::LIGHTHOUSE.to_string(),
            ToolCommand::new(
                "lighthouse",
                &[
                    "{url}",
                    "--only-categories=accessibility",
                    "--output=json",
                    "--output-path=stdout",
                    "--quiet",
                    "--chrome-flags=--headless",
                ],
            ),
        ),
    ])
}

/// Runs each tool as a child process and reads its JSON report from stdout.
pub struct CommandToolRunner {
    commands: HashMap<String, ToolCommand>,
}

impl CommandToolRunner {
    pub fn new(commands: HashMap<String, ToolCommand>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl ToolRunner for CommandToolRunner {
    async fn run(&self, tool: &ToolName, page_url: &str, timeout: Duration) -> Result<RawToolOutput, ToolError> {
        let cmd = self.commands.get(tool.as_str()).ok_or_else(|| ToolError::NotConfigured(tool.clone()))?;
        let args = cmd.args_for(page_url);
        debug!(tool = %tool, program = %cmd.program, ?args, "spawning tool");

        let started = Instant::now();
        let child = tokio::process::Command::new(&cmd.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Spawn(format!("{}: {e}", cmd.program)))?;

        // dropping the wait future on timeout kills the child
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(res) => res.map_err(|e| ToolError::Spawn(e.to_string()))?,
            Err(_) => return Err(ToolError::Timeout(timeout.as_millis() as u64)),
        };

        let code = output.status.code();
        if !code.is_some_and(|c| cmd.ok_exit_codes.contains(&c)) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::Exit { code, stderr: stderr.trim().chars().take(2000).collect() });
        }

        let value: Value = serde_json::from_slice(&output.stdout).map_err(|e| ToolError::Output(e.to_string()))?;
        Ok(RawToolOutput { output: value, duration_ms: started.elapsed().as_millis() as u64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_placeholder_or_append() {
        let c = ToolCommand::new("pa11y", &["--reporter", "json", "{url}"]);
        assert_eq!(c.args_for("https://a.test/"), vec!["--reporter", "json", "https://a.test/"]);
        let c = ToolCommand::new("axe", &["--stdout"]);
        assert_eq!(c.args_for("https://a.test/"), vec!["--stdout", "https://a.test/"]);
    }

    #[test]
    fn tool_command_defaults() {
        let c: ToolCommand = serde_json::from_str(r#"{"program": "axe"}"#).unwrap();
        assert_eq!(c.ok_exit_codes, vec![0]);
        assert!(c.args.is_empty());
        assert_eq!(default_tool_commands()["pa11y"].ok_exit_codes, vec![0, 2]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runner_reads_stdout_json() {
        let runner = CommandToolRunner::new(HashMap::from([(
            "echo-tool".to_string(),
            ToolCommand::new("sh", &["-c", "printf '{\"violations\":[],\"url\":\"%s\"}' \"$0\"", "{url}"]),
        )]));
        let out = runner
            .run(&ToolName::new("echo-tool"), "https://a.test/", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.output["url"], "https://a.test/");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runner_enforces_timeout_and_exit_codes() {
        let runner = CommandToolRunner::new(HashMap::from([
            ("slow".to_string(), ToolCommand::new("sh", &["-c", "sleep 5", "{url}"])),
            ("failing".to_string(), ToolCommand::new("sh", &["-c", "echo boom >&2; exit 3"])),
        ]));
        let err = runner.run(&ToolName::new("slow"), "u", Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(50)));

        let err = runner.run(&ToolName::new("failing"), "u", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ToolError::Exit { code: Some(3), .. }));

        let err = runner.run(&ToolName::new("missing"), "u", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }
}
