//! External agent collaborator boundary
//!
//! The workflow runner never reasons about how an agent produces its work.
//! It issues exactly two kinds of calls across this seam (a streamed
//! primary-agent turn and a named sub-agent spawn) and observes only the
//! results. Timeout enforcement for an individual spawn belongs to the
//! collaborator behind the trait, not to the runner.

use std::process::Stdio;

use async_trait::async_trait;

use crate::config::BackendConfig;

// ============================================================================
// Boundary Types
// ============================================================================

/// Result of a streamed primary-agent turn
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Full response text
    pub content: String,
    /// The turn ended early on a user interrupt
    pub was_interrupted: bool,
    /// The turn was cancelled before producing a usable response
    pub was_cancelled: bool,
}

impl StreamOutcome {
    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            was_interrupted: false,
            was_cancelled: false,
        }
    }
}

/// Parameters for a sub-agent spawn
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Named agent identity ("worker", "reviewer", ...)
    pub name: String,
    /// Full prompt for the sub-agent
    pub prompt: String,
    /// Optional model override for this spawn
    pub model: Option<String>,
}

impl SpawnRequest {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Result of a sub-agent spawn
#[derive(Debug, Clone)]
pub struct SpawnResult {
    /// Whether the sub-agent concluded successfully
    pub success: bool,
    /// The sub-agent's output text
    pub output: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to launch agent process `{command}`: {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    #[error("agent process i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque agent collaborator consumed by the workflow runner
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Stream a turn to the primary agent and wait for the full response.
    async fn stream_and_wait(&self, prompt: &str) -> Result<StreamOutcome, BackendError>;

    /// Spawn a named sub-agent for one unit of work.
    async fn spawn_subagent(&self, request: SpawnRequest) -> Result<SpawnResult, BackendError>;
}

// ============================================================================
// CLI Backend
// ============================================================================

/// Backend that shells out to an agent CLI once per call.
///
/// The prompt is passed as the final argument; stdout is the response, and
/// a nonzero exit status maps to an unsuccessful spawn rather than an error
/// (the process ran, the agent failed).
pub struct CliBackend {
    command: String,
    args: Vec<String>,
    model: Option<String>,
}

impl CliBackend {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            model: None,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            model: config.model.clone(),
        }
    }

    async fn run(
        &self,
        agent: Option<&str>,
        model: Option<&str>,
        prompt: &str,
    ) -> Result<(bool, String), BackendError> {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args);

        if let Some(agent) = agent {
            cmd.arg("--agent").arg(agent);
        }
        if let Some(model) = model.or(self.model.as_deref()) {
            cmd.arg("--model").arg(model);
        }

        cmd.arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(command = %self.command, agent = ?agent, "launching agent process");

        let output = cmd.output().await.map_err(|source| BackendError::Launch {
            command: self.command.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                status = %output.status,
                stderr = %stderr.trim(),
                "agent process exited unsuccessfully"
            );
        }

        Ok((output.status.success(), stdout))
    }
}

#[async_trait]
impl AgentBackend for CliBackend {
    async fn stream_and_wait(&self, prompt: &str) -> Result<StreamOutcome, BackendError> {
        let (success, content) = self.run(None, None, prompt).await?;
        Ok(StreamOutcome {
            content,
            was_interrupted: false,
            was_cancelled: !success,
        })
    }

    async fn spawn_subagent(&self, request: SpawnRequest) -> Result<SpawnResult, BackendError> {
        let (success, output) = self
            .run(Some(&request.name), request.model.as_deref(), &request.prompt)
            .await?;
        Ok(SpawnResult { success, output })
    }
}

// ============================================================================
// Tests
// ============================================================================
