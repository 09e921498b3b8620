use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use a11y_core::ToolName;
use async_trait::async_trait;
use serde_json::Value;

use crate::{RawToolOutput, ToolError, ToolRunner};

/// Canned response for a tool run.
#[derive(Clone, Debug)]
pub enum Fixture {
    Output(Value),
    Fail(String),
    /// Never returns; exercises timeouts.
    Hang,
}

/// [`ToolRunner`] answering from canned outputs, per unit or per tool.
/// Used for dry runs and tests.
#[derive(Default)]
pub struct FixtureToolRunner {
    by_tool: HashMap<ToolName, Fixture>,
    by_unit: HashMap<(ToolName, String), Fixture>,
    delay: Duration,
    calls: Mutex<Vec<(ToolName, String)>>,
}

impl FixtureToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: &str, fixture: Fixture) -> Self {
        self.by_tool.insert(ToolName::new(tool), fixture);
        self
    }

    pub fn with_unit(mut self, tool: &str, page_url: &str, fixture: Fixture) -> Self {
        self.by_unit.insert((ToolName::new(tool), page_url.to_string()), fixture);
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every (tool, url) run so far, in call order.
    pub fn calls(&self) -> Vec<(ToolName, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ToolRunner for FixtureToolRunner {
    async fn run(&self, tool: &ToolName, page_url: &str, _timeout: Duration) -> Result<RawToolOutput, ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((tool.clone(), page_url.to_string()));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let fixture = self
            .by_unit
            .get(&(tool.clone(), page_url.to_string()))
            .or_else(|| self.by_tool.get(tool))
            .cloned()
            .ok_or_else(|| ToolError::NotConfigured(tool.clone()))?;
        match fixture {
            Fixture::Output(output) => Ok(RawToolOutput { output, duration_ms: self.delay.as_millis() as u64 }),
            Fixture::Fail(reason) => Err(ToolError::Output(reason)),
            Fixture::Hang => std::future::pending().await,
        }
    }
}
