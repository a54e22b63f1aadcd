//! Language model seam
//!
//! The model is an opaque service: it receives `{instructions, input}` and
//! answers with text that should contain one JSON object. Everything about
//! reaching it lives behind [`LanguageModel`].

pub mod parse;

pub use parse::{
    decode_brief_and_bible, decode_chapter, decode_outline, parse_json_object, strip_code_fences,
    ChapterDraft, DEFAULT_SALVAGE_ATTEMPTS,
};

use serde::Serialize;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::config::ModelConfig;
use crate::error::{Error, Result};

/// One call to the model
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    #[serde(skip)]
    pub stage: &'static str,
    pub instructions: String,
    pub input: String,
}

/// External text-generation service.
///
/// Each call is the single suspend point of a generation stage. No retry is
/// done here or by the caller; timeouts belong to the implementation.
pub trait LanguageModel: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    fn complete(&self, request: &ModelRequest) -> impl Future<Output = Result<String>> + Send;
}

/// Model reached through a local program: the request is written to its
/// stdin as JSON and its stdout is taken as the response text.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandModel {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            shellexpand::tilde(&config.command).to_string(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl LanguageModel for CommandModel {
    fn name(&self) -> &str {
        &self.program
    }

    #[instrument(skip(self, request), fields(stage = request.stage, input_len = request.input.len()))]
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        let payload = serde_json::to_vec(request)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, payload_len = payload.len(), "spawning model command");
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::ModelCall(format!("failed to spawn `{}`: {}", self.program, e)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ModelCall("model command stdin unavailable".to_string()))?;

        // Feed stdin while draining stdout so a chatty child cannot stall on a full pipe
        let write = async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        };
        let exchange = async move { tokio::join!(write, child.wait_with_output()) };
        let (written, output) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                Error::ModelCall(format!(
                    "`{}` timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?;
        let output = output?;
        written.map_err(|e| Error::ModelCall(format!("failed to write request: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ModelCall(format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(Error::ModelCall(format!(
                "`{}` returned an empty response",
                self.program
            )));
        }

        info!(response_len = text.len(), "model responded");
        Ok(text)
    }
}
