use agentmerge_core::config::{AiSettings, ModelBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Bytes of stderr kept for error messages.
const STDERR_LIMIT: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model process exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("Could not run model process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Model output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

/// A single-shot text completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Outcome of one time-boxed model call.
#[derive(Debug)]
pub enum Invocation {
    Completed(String),
    TimedOut(Duration),
    Failed(ModelError),
}

/// Call the model, giving up after `timeout`.
///
/// The in-flight call is dropped on timeout; process backends kill their
/// child when dropped.
pub async fn invoke(model: &dyn LanguageModel, prompt: &str, timeout: Duration) -> Invocation {
    match tokio::time::timeout(timeout, model.complete(prompt)).await {
        Ok(Ok(text)) => Invocation::Completed(text),
        Ok(Err(ModelError::Timeout(after))) => Invocation::TimedOut(after),
        Ok(Err(e)) => Invocation::Failed(e),
        Err(_) => Invocation::TimedOut(timeout),
    }
}

/// Build the backend selected in settings.
pub fn from_settings(settings: &AiSettings) -> Result<Arc<dyn LanguageModel>, ModelError> {
    match settings.backend {
        ModelBackend::Claude => Ok(Arc::new(
            ClaudeCli::new(&settings.claude_binary).with_max_output(settings.max_output_bytes),
        )),
        ModelBackend::Http => {
            let url = settings
                .http_url
                .as_deref()
                .ok_or_else(|| ModelError::Transport("ai.http_url is not set".into()))?;
            let model = HttpModel::new(
                url,
                &settings.http_model,
                Duration::from_secs(settings.timeout_secs),
            )?
            .with_max_tokens(settings.max_response_tokens)
            .with_max_output(settings.max_output_bytes);
            Ok(Arc::new(model))
        }
    }
}

/// The `claude` command line client in print mode. The prompt goes in on
/// stdin and the answer comes back on stdout.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    binary: String,
    args: Vec<String>,
    max_output: usize,
}

impl ClaudeCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            args: vec!["--print".into()],
            max_output: 10 * 1024 * 1024,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output = bytes;
        self
    }
}

#[async_trait]
impl LanguageModel for ClaudeCli {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = tokio::spawn(read_capped(child.stderr.take(), STDERR_LIMIT));

        let write = async {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (written, out) = tokio::join!(write, read_capped(stdout, self.max_output));

        let out = out?;
        if out.len() > self.max_output {
            // child is killed when dropped
            stderr.abort();
            return Err(ModelError::OutputTooLarge { limit: self.max_output });
        }
        let status = child.wait().await?;
        let err = stderr.await.ok().and_then(Result::ok).unwrap_or_default();
        if !status.success() {
            return Err(ModelError::Exit {
                code: status.code(),
                stderr: String::from_utf8_lossy(&err).trim().to_string(),
            });
        }
        // A child that exits without reading its input is fine once it succeeded
        if let Err(e) = written {
            tracing::debug!(error = %e, "Model process closed stdin early");
        }

        String::from_utf8(out).map_err(|_| ModelError::InvalidResponse("output is not valid UTF-8".into()))
    }
}

/// Read at most `limit + 1` bytes so callers can tell an overflow apart.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(reader) = reader {
        reader.take((limit as u64).saturating_add(1)).read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// A server speaking the OpenAI-compatible chat completions API.
pub struct HttpModel {
    base_url: String,
    model_id: String,
    max_tokens: u32,
    max_output: usize,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpModel {
    pub fn new(base_url: &str, model_id: &str, timeout: Duration) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model_id: model_id.to_string(),
            max_tokens: 2048,
            max_output: 10 * 1024 * 1024,
            timeout,
            http_client,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output = bytes;
        self
    }

    fn transport(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let messages = [ChatMessage {
            role: Role::User,
            content: prompt.to_string(),
        }];
        let request_body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "stream": false
        });

        let response = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Transport(format!("server returned {}: {}", status, body)));
        }
        if response.content_length().is_some_and(|len| len as usize > self.max_output) {
            return Err(ModelError::OutputTooLarge { limit: self.max_output });
        }

        let bytes = response.bytes().await.map_err(|e| self.transport(e))?;
        if bytes.len() > self.max_output {
            return Err(ModelError::OutputTooLarge { limit: self.max_output });
        }
        parse_chat_completion(&bytes)
    }
}

fn parse_chat_completion(body: &[u8]) -> Result<String, ModelError> {
    let body: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| ModelError::InvalidResponse("missing choices[0].message.content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[async_trait]
    impl LanguageModel for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ModelError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".into())
        }
    }

    struct Broken;

    #[async_trait]
    impl LanguageModel for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ModelError> {
            Err(ModelError::Exit {
                code: Some(2),
                stderr: "bad flag".into(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let outcome = invoke(&Slow, "prompt", Duration::from_secs(1)).await;
        assert!(matches!(outcome, Invocation::TimedOut(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_invoke_reports_failure() {
        match invoke(&Broken, "prompt", Duration::from_secs(1)).await {
            Invocation::Failed(e) => assert_eq!(e.to_string(), "Model process exited with status Some(2): bad flag"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = ClaudeCli::new("definitely-not-a-claude-binary");
        assert!(matches!(cli.complete("hi").await, Err(ModelError::Spawn(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_echoes_stdin() {
        let cli = ClaudeCli::new("cat").with_args(Vec::<String>::new());
        assert_eq!(cli.complete("merged").await.unwrap(), "merged");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_output_cap() {
        let cli = ClaudeCli::new("cat").with_args(Vec::<String>::new()).with_max_output(4);
        assert!(matches!(
            cli.complete("longer than four").await,
            Err(ModelError::OutputTooLarge { limit: 4 })
        ));
    }

    #[test]
    fn test_parse_chat_completion() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"```\nx\n```"}}]}"#;
        assert_eq!(parse_chat_completion(body).unwrap(), "```\nx\n```");
        assert!(matches!(
            parse_chat_completion(br#"{"choices":[]}"#),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_read_capped_limits() {
        assert_eq!(read_capped(Some(&b"abcdef"[..]), 3).await.unwrap(), b"abcd");
        assert_eq!(read_capped(Some(&b"abc"[..]), usize::MAX).await.unwrap(), b"abc");
        assert!(read_capped(None::<&[u8]>, 3).await.unwrap().is_empty());
    }

    #[test]
    fn test_chat_message_role_is_lowercase() {
        let message = ChatMessage { role: Role::User, content: "hi".into() };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
    }
}
