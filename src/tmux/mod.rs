//! Multiplexer Driver: the only component that speaks to the terminal
//! multiplexer. See spec §2 and SPEC_FULL §4.2 ("the orchestrator never
//! calls `tmux` directly; it depends on a `MultiplexerDriver` trait
//! object"). The teacher's `TmuxClient` was a concrete, synchronous struct
//! with no trait seam; this is the fix SPEC_FULL calls out explicitly.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;

mod remote;
pub use remote::RemoteTunnel;

/// Errors a driver call can surface. Bubbled per-pane by the Orchestrator;
/// never aborts the outer pass (spec §4.2 "Partial failure is normal").
#[derive(Debug, thiserror::Error)]
pub enum TmuxError {
    #[error("tmux not found or not installed")]
    TmuxNotFound,
    #[error("session '{0}' not found")]
    SessionNotFound(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("invalid session name: {0}")]
    InvalidSessionName(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A multiplexer session as reported by `list sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverSession {
    pub name: String,
    pub window_count: u32,
    pub created_at: DateTime<Utc>,
    pub attached: bool,
}

/// An opaque handle to a created pane, stable for the pane's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PaneId(pub String);

impl std::fmt::Display for PaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical keystroke sequence plus the trailing behavior the driver should
/// apply (spec §6 "send a keystroke sequence with optional trailing Enter
/// and a configurable delay").
#[derive(Debug, Clone)]
pub struct KeySequence {
    pub keys: Vec<String>,
    pub trailing_enter: bool,
    pub post_delay: Duration,
}

impl KeySequence {
    pub fn literal(text: impl Into<String>) -> Self {
        Self { keys: vec![text.into()], trailing_enter: false, post_delay: Duration::ZERO }
    }

    pub fn with_enter(mut self, delay: Duration) -> Self {
        self.trailing_enter = true;
        self.post_delay = delay;
        self
    }
}

/// The driver's capability surface. One real `tmux` implementation, one
/// test fake (`mockall`-generated via `#[cfg_attr(test, automock)]` in
/// callers), matching the "one trait, one real impl, one test fake"
/// philosophy SPEC_FULL calls for.
#[async_trait]
pub trait MultiplexerDriver: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<DriverSession>, TmuxError>;

    /// Create a detached session with a starting pane. Returns that pane's
    /// id.
    async fn create_session(&self, name: &str, start_dir: Option<&str>) -> Result<PaneId, TmuxError>;

    /// Split a window inside an existing session, creating an additional
    /// pane. Returns the new pane's id.
    async fn split_pane(&self, session: &str, start_dir: Option<&str>) -> Result<PaneId, TmuxError>;

    async fn kill_session(&self, name: &str) -> Result<(), TmuxError>;

    async fn set_pane_title(&self, pane: &PaneId, title: &str) -> Result<(), TmuxError>;

    /// Capture the last `lines` lines of a pane's scrollback. Fewer than
    /// `lines` available is not an error (spec §8 boundary behavior).
    async fn capture_pane(&self, pane: &PaneId, lines: usize) -> Result<String, TmuxError>;

    async fn send_keys(&self, pane: &PaneId, sequence: KeySequence) -> Result<(), TmuxError>;

    async fn session_exists(&self, name: &str) -> Result<bool, TmuxError>;
}

/// The one real implementation: shells out to `tmux`. Internally
/// serializes every mutating call through a single `tokio::sync::Mutex`
/// (spec §5 "the Multiplexer Driver is the single serialization point for
/// multiplexer mutations"), while capture-pane (a read) bypasses the lock.
pub struct TmuxDriver {
    lock: Mutex<()>,
    /// When set, every invocation is wrapped in the opaque tunnel (spec §4.2
    /// "Remote mode"); behavior and contract are identical.
    tunnel: Option<Arc<RemoteTunnel>>,
    /// Pane id -> `{session}.{pane_index}` target, since tmux addresses
    /// panes by position, not a stable opaque id; the driver owns this
    /// mapping so callers never see tmux-native command strings.
    targets: Mutex<HashMap<PaneId, String>>,
}

impl TmuxDriver {
    pub fn new() -> Self {
        Self { lock: Mutex::new(()), tunnel: None, targets: Mutex::new(HashMap::new()) }
    }

    pub fn remote(tunnel: RemoteTunnel) -> Self {
        Self { lock: Mutex::new(()), tunnel: Some(Arc::new(tunnel)), targets: Mutex::new(HashMap::new()) }
    }

    async fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        if let Some(tunnel) = &self.tunnel {
            return tunnel.run("tmux", args).await.map_err(|e| TmuxError::CommandFailed(e.to_string()));
        }

        let mut cmd = Command::new("tmux");
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TmuxError::TmuxNotFound
            } else {
                TmuxError::Io(e)
            }
        })?;

        if !output.status.success() {
            return Err(TmuxError::CommandFailed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn validate_session_name(name: &str) -> Result<(), TmuxError> {
        if name.is_empty() || name.contains(':') || name.contains('.') {
            return Err(TmuxError::InvalidSessionName(name.to_string()));
        }
        Ok(())
    }

    async fn register_target(&self, pane: PaneId, target: String) -> PaneId {
        self.targets.lock().await.insert(pane.clone(), target);
        pane
    }

    async fn target_for(&self, pane: &PaneId) -> String {
        self.targets.lock().await.get(pane).cloned().unwrap_or_else(|| pane.0.clone())
    }
}

impl Default for TmuxDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MultiplexerDriver for TmuxDriver {
    async fn list_sessions(&self) -> Result<Vec<DriverSession>, TmuxError> {
        let _guard = self.lock.lock().await;
        let out = self
            .run(&[
                "list-sessions",
                "-F",
                "#{session_name}|#{session_windows}|#{session_created}|#{session_attached}",
            ])
            .await;

        // tmux exits non-zero (and prints "no server running") when there
        // is no server yet; treat that as zero sessions, not an error.
        let out = match out {
            Ok(o) => o,
            Err(TmuxError::CommandFailed(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut sessions = Vec::new();
        for line in out.lines().filter(|l| !l.trim().is_empty()) {
            let parts: Vec<&str> = line.split('|').collect();
            if parts.len() < 4 {
                continue;
            }
            let created_epoch: i64 = parts[2].parse().unwrap_or(0);
            sessions.push(DriverSession {
                name: parts[0].to_string(),
                window_count: parts[1].parse().unwrap_or(0),
                created_at: DateTime::from_timestamp(created_epoch, 0).unwrap_or_else(Utc::now),
                attached: parts[3] == "1",
            });
        }
        Ok(sessions)
    }

    async fn create_session(&self, name: &str, start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
        Self::validate_session_name(name)?;
        let _guard = self.lock.lock().await;

        let mut args = vec!["new-session", "-d", "-s", name, "-P", "-F", "#{pane_id}"];
        if let Some(dir) = start_dir {
            args.push("-c");
            args.push(dir);
        }
        let out = self.run(&args).await?;
        let tmux_pane_id = out.trim().to_string();
        let pane = PaneId(format!("{name}:0.0"));
        Ok(self.register_target(pane, tmux_pane_id).await)
    }

    async fn split_pane(&self, session: &str, start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
        let _guard = self.lock.lock().await;

        let mut args = vec!["split-window", "-d", "-t", session, "-P", "-F", "#{pane_id}"];
        if let Some(dir) = start_dir {
            args.push("-c");
            args.push(dir);
        }
        let out = self.run(&args).await?;
        let tmux_pane_id = out.trim().to_string();
        let pane = PaneId(format!("{session}:{tmux_pane_id}"));
        Ok(self.register_target(pane, tmux_pane_id).await)
    }

    async fn kill_session(&self, name: &str) -> Result<(), TmuxError> {
        let _guard = self.lock.lock().await;
        self.run(&["kill-session", "-t", name]).await?;
        Ok(())
    }

    async fn set_pane_title(&self, pane: &PaneId, title: &str) -> Result<(), TmuxError> {
        let target = self.target_for(pane).await;
        let _guard = self.lock.lock().await;
        self.run(&["select-pane", "-t", &target, "-T", title]).await?;
        Ok(())
    }

    async fn capture_pane(&self, pane: &PaneId, lines: usize) -> Result<String, TmuxError> {
        let target = self.target_for(pane).await;
        let start = format!("-{lines}");
        // Reads may pipeline; only mutations take the serialization lock.
        self.run(&["capture-pane", "-t", &target, "-p", "-S", &start]).await
    }

    async fn send_keys(&self, pane: &PaneId, sequence: KeySequence) -> Result<(), TmuxError> {
        let target = self.target_for(pane).await;
        {
            let _guard = self.lock.lock().await;
            for key in &sequence.keys {
                self.run(&["send-keys", "-t", &target, "-l", key]).await?;
            }
            if sequence.trailing_enter {
                self.run(&["send-keys", "-t", &target, "Enter"]).await?;
            }
        }
        if !sequence.post_delay.is_zero() {
            tokio::time::sleep(sequence.post_delay).await;
        }
        Ok(())
    }

    async fn session_exists(&self, name: &str) -> Result<bool, TmuxError> {
        let _guard = self.lock.lock().await;
        match self.run(&["has-session", "-t", name]).await {
            Ok(_) => Ok(true),
            Err(TmuxError::CommandFailed(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
