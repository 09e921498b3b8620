use a11y_core::ToolName;
use a11y_storage::StoreError;
use thiserror::Error;

/// Why a tool produced no usable output. Always recorded on the scan result,
/// never propagated out of the executor.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no command configured for tool {0}")]
    NotConfigured(ToolName),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("tool exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("tool timed out after {0} ms")]
    Timeout(u64),
    #[error("unreadable tool output: {0}")]
    Output(String),
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("no normalizer registered for tool {0}")]
    UnknownTool(ToolName),
    #[error("expected `{0}` in tool output")]
    MissingField(&'static str),
    #[error("malformed tool output: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("tool {tool} was not requested for this session")]
    ToolNotRequested { tool: ToolName },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("result writer stopped: {0}")]
    Internal(String),
}

impl ScanError {
    /// Store failures other than exhausted aborts end the session.
    pub fn is_fatal(&self) -> bool {
        match self {
            ScanError::ToolNotRequested { .. } | ScanError::Internal(_) => false,
            ScanError::Store(e) => !e.is_transient(),
        }
    }
}
