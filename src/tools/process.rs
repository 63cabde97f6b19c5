//! ProcessRegistry: persistent background shell sessions.
//!
//! Unlike a one-shot `ps`/`kill` wrapper around `spawn_blocking` +
//! `std::process::Command`, this keeps live sessions around across turns: it
//! is built on `tokio::process::Command` with the child's stdin/stdout/stderr
//! piped and drained by a background task per session, pairing a
//! `tokio::sync` primitive with a dedicated pump task rather than polling.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Output buffer cap per session; oldest lines are dropped on overflow.
const MAX_BUFFERED_LINES: usize = 2000;

struct Session {
    command: String,
    child: Option<Child>,
    stdin: Option<tokio::process::ChildStdin>,
    output: Arc<AsyncMutex<Vec<String>>>,
    exit_code: Arc<AsyncMutex<Option<i32>>>,
    died_at: Arc<AsyncMutex<Option<DateTime<Utc>>>>,
}

/// Tracks live and recently-exited background shell sessions.
pub struct ProcessRegistry {
    sessions: AsyncMutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl ProcessRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: AsyncMutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Start `command` in a shell under `cwd`, returning its session id.
    pub async fn spawn(&self, command: &str, cwd: Option<&str>) -> Result<String, String> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| format!("failed to spawn process: {e}"))?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let output = Arc::new(AsyncMutex::new(Vec::new()));
        let exit_code = Arc::new(AsyncMutex::new(None));
        let died_at = Arc::new(AsyncMutex::new(None));

        spawn_line_pump(stdout, output.clone());
        spawn_line_pump(stderr, output.clone());

        let id = Uuid::new_v4().to_string();
        let session = Session {
            command: command.to_string(),
            child: Some(child),
            stdin,
            output,
            exit_code,
            died_at,
        };

        self.sessions.lock().await.insert(id.clone(), session);
        Ok(id)
    }

    /// Non-destructive read of accumulated output plus a status line.
    pub async fn poll(&self, session_id: &str) -> Result<String, String> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| format!("no such process session '{session_id}'"))?;

        reap_if_exited(session).await;

        let output = session.output.lock().await.join("\n");
        let status = match *session.exit_code.lock().await {
            Some(code) => format!("exited({code})"),
            None => "running".to_string(),
        };
        Ok(format!("{output}\n[status: {status}]"))
    }

    /// Write `input` to the session's stdin, appending a newline if missing.
    pub async fn write(&self, session_id: &str, input: &str) -> Result<String, String> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| format!("no such process session '{session_id}'"))?;

        reap_if_exited(session).await;
        if session.exit_code.lock().await.is_some() {
            return Err(format!("process '{session_id}' has already exited"));
        }

        let stdin = session
            .stdin
            .as_mut()
            .ok_or_else(|| format!("process '{session_id}' has no stdin"))?;

        let mut payload = input.to_string();
        if !payload.ends_with('\n') {
            payload.push('\n');
        }
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| format!("failed to write to process '{session_id}': {e}"))?;
        Ok(format!("wrote {} bytes to '{session_id}'", payload.len()))
    }

    /// Cooperative termination signal (SIGTERM-equivalent via `Child::kill`).
    pub async fn kill(&self, session_id: &str) -> Result<String, String> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| format!("no such process session '{session_id}'"))?;

        reap_if_exited(session).await;
        if session.exit_code.lock().await.is_some() {
            return Err(format!("process '{session_id}' has already exited"));
        }

        if let Some(child) = session.child.as_mut() {
            child
                .kill()
                .await
                .map_err(|e| format!("failed to kill process '{session_id}': {e}"))?;
        }
        *session.died_at.lock().await = Some(Utc::now());
        Ok(format!("killed '{session_id}'"))
    }

    /// Human-readable table of all tracked sessions.
    pub async fn list(&self) -> String {
        let mut sessions = self.sessions.lock().await;
        if sessions.is_empty() {
            return "no tracked process sessions".to_string();
        }
        let mut lines = vec!["SESSION_ID  STATUS     COMMAND".to_string()];
        for (id, session) in sessions.iter_mut() {
            reap_if_exited(session).await;
            let status = match *session.exit_code.lock().await {
                Some(code) => format!("exited({code})"),
                None => "running".to_string(),
            };
            lines.push(format!("{id}  {status}  {}", session.command));
        }
        lines.join("\n")
    }

    /// Cooperatively terminate everything still running, then forget all
    /// sessions. Idempotent.
    pub async fn dispose(&self) {
        let mut sessions = self.sessions.lock().await;
        for session in sessions.values_mut() {
            if let Some(child) = session.child.as_mut() {
                let _ = child.kill().await;
            }
        }
        sessions.clear();
    }

    /// Remove sessions whose `diedAt` is older than the configured TTL.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let ttl = self.ttl;
        let mut sessions = self.sessions.lock().await;
        let mut doomed = Vec::new();
        for (id, session) in sessions.iter_mut() {
            reap_if_exited(session).await;
            if let Some(died_at) = *session.died_at.lock().await {
                if now.signed_duration_since(died_at)
                    > chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero())
                {
                    doomed.push(id.clone());
                }
            }
        }
        for id in doomed {
            sessions.remove(&id);
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// If the child has exited since the last check, record its exit code and
/// `diedAt` timestamp.
async fn reap_if_exited(session: &mut Session) {
    if session.exit_code.lock().await.is_some() {
        return;
    }
    if let Some(child) = session.child.as_mut() {
        if let Ok(Some(status)) = child.try_wait() {
            *session.exit_code.lock().await = Some(status.code().unwrap_or(-1));
            *session.died_at.lock().await = Some(Utc::now());
        }
    }
}

fn spawn_line_pump<R>(reader: R, output: Arc<AsyncMutex<Vec<String>>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buf = output.lock().await;
            buf.push(line);
            if buf.len() > MAX_BUFFERED_LINES {
                let excess = buf.len() - MAX_BUFFERED_LINES;
                buf.drain(0..excess);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_poll_running_process() {
        let registry = ProcessRegistry::new(Duration::from_secs(600));
        let id = registry.spawn("echo hello", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let output = registry.poll(&id).await.unwrap();
        assert!(output.contains("hello"));
        assert!(output.contains("exited(0)"));
    }

    #[tokio::test]
    async fn write_to_running_process() {
        let registry = ProcessRegistry::new(Duration::from_secs(600));
        let id = registry.spawn("cat", None).await.unwrap();
        registry.write(&id, "ping").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let output = registry.poll(&id).await.unwrap();
        assert!(output.contains("ping"));
        registry.kill(&id).await.unwrap();
    }

    #[tokio::test]
    async fn write_after_exit_fails() {
        let registry = ProcessRegistry::new(Duration::from_secs(600));
        let id = registry.spawn("true", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let result = registry.write(&id, "x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn kill_already_exited_fails() {
        let registry = ProcessRegistry::new(Duration::from_secs(600));
        let id = registry.spawn("true", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let result = registry.kill(&id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn poll_unknown_session_errors() {
        let registry = ProcessRegistry::new(Duration::from_secs(600));
        assert!(registry.poll("nonexistent").await.is_err());
    }

    #[tokio::test]
    async fn list_reports_sessions() {
        let registry = ProcessRegistry::new(Duration::from_secs(600));
        registry.spawn("echo one", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let listing = registry.list().await;
        assert!(listing.contains("echo one"));
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let registry = ProcessRegistry::new(Duration::from_secs(600));
        registry.spawn("sleep 5", None).await.unwrap();
        registry.dispose().await;
        registry.dispose().await;
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn sweep_removes_old_dead_sessions() {
        let registry = ProcessRegistry::new(Duration::from_millis(0));
        let id = registry.spawn("true", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.poll(&id).await.unwrap();
        registry.sweep().await;
        assert_eq!(registry.session_count().await, 0);
    }
}
