//! Python execution tool: run model-written code in a constrained child process.
//!
//! Limits: a dedicated working directory, a cleared environment (only `PATH`
//! and `HOME` pass through), a wall-clock timeout after which the child is
//! killed, and a cap on captured stdout/stderr. Network and filesystem access
//! outside the working directory are not restricted by the OS.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use toolchat_config::SandboxConfig;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{Tool, ToolResult};
use tracing::{debug, warn};

const TOOL_NAME: &str = "execute_python";

pub struct PythonExecTool {
    work_dir: PathBuf,
    interpreter: String,
    timeout: Duration,
    max_output_bytes: usize,
}

impl PythonExecTool {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        interpreter: impl Into<String>,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            interpreter: interpreter.into(),
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(
            &config.work_dir,
            &config.interpreter,
            Duration::from_secs(config.timeout_secs),
            config.max_output_bytes,
        )
    }

    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script)
            .current_dir(&self.work_dir)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in ["PATH", "HOME"] {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        cmd
    }
}

#[async_trait]
impl Tool for PythonExecTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute a Python script and return its exit code, stdout and stderr. \
         Files written by the script (e.g. plots saved as .png) land in the working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source code. A ```python fenced block is also accepted."
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let code = arguments["code"]
            .as_str()
            .ok_or_else(|| ToolError::invalid_args(TOOL_NAME, "Missing 'code' argument"))?;
        let code = extract_code(code);
        if code.trim().is_empty() {
            return Err(ToolError::invalid_args(TOOL_NAME, "'code' is empty"));
        }

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason,
        };

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| failed(format!("cannot create work dir: {e}")))?;

        let script = format!("tmp_code_{}.py", uuid::Uuid::new_v4().simple());
        let script_path = self.work_dir.join(&script);
        tokio::fs::write(&script_path, code)
            .await
            .map_err(|e| failed(format!("cannot write script: {e}")))?;

        debug!(script = %script_path.display(), interpreter = %self.interpreter, "Running code");
        let mut child = match self.command(&script).spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = tokio::fs::remove_file(&script_path).await;
                return Err(failed(format!("cannot start '{}': {e}", self.interpreter)));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let run = async {
            tokio::try_join!(
                capture(stdout, self.max_output_bytes),
                capture(stderr, self.max_output_bytes),
                child.wait(),
            )
        };
        let outcome = tokio::time::timeout(self.timeout, run).await;

        let (stdout, stderr, status) = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                let _ = tokio::fs::remove_file(&script_path).await;
                return Err(failed(e.to_string()));
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Code execution timed out");
                let _ = child.kill().await;
                let _ = tokio::fs::remove_file(&script_path).await;
                return Err(ToolError::Timeout {
                    tool_name: TOOL_NAME.into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };
        let _ = tokio::fs::remove_file(&script_path).await;

        let code = status.code().unwrap_or(-1);
        let stdout = stdout.text();
        let stderr = stderr.text();

        let mut text = format!("exit code: {code}");
        if !stdout.trim().is_empty() {
            text.push('\n');
            text.push_str(stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            text.push_str("\n[stderr]:\n");
            text.push_str(stderr.trim_end());
        }

        let result = if status.success() {
            ToolResult::ok(text)
        } else {
            warn!(exit_code = code, "Code exited with failure");
            ToolResult::failure(text)
        };
        Ok(result.with_data(serde_json::json!({ "exit_code": code })))
    }
}

/// Pull the body out of the first ``` fenced block, if there is one.
fn extract_code(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

/// One output stream: the kept prefix and a count of what was thrown away.
#[derive(Debug, Default)]
struct Captured {
    kept: Vec<u8>,
    dropped: u64,
}

impl Captured {
    /// Lossy UTF-8 view of the kept bytes, with a marker when cut.
    fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.kept).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n... [truncated {} bytes]", self.dropped));
        }
        text
    }
}

/// Keep at most `max` bytes of `reader` and discard the rest as it arrives,
/// so the child never blocks on a full pipe.
async fn capture<R: AsyncRead + Unpin>(reader: Option<R>, max: usize) -> std::io::Result<Captured> {
    let Some(mut reader) = reader else {
        return Ok(Captured::default());
    };
    let mut kept = Vec::new();
    (&mut reader).take(max as u64).read_to_end(&mut kept).await?;
    let dropped = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(Captured { kept, dropped })
}
