//! Shutdown Supervisor: matches session names by glob, sends the dialect's
//! graceful-exit gesture to every pane, waits with timeout, then destroys
//! the sessions. See spec §4.7.

use std::sync::Arc;
use std::time::Duration;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dialect::{DialectTable, ExitGesture, OutputClass};
use crate::tmux::{KeySequence, MultiplexerDriver, PaneId};

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("multiplexer error: {0}")]
    Multiplexer(#[from] crate::tmux::TmuxError),
}

/// A single pane's best-effort exit classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaneShutdownOutcome {
    pub session: String,
    pub pane: String,
    pub signaled: bool,
    pub graceful: bool,
}

/// Report per spec §4.7: "sessions destroyed, panes signaled, graceful
/// exits (best-effort estimate), errors, duration."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub sessions_destroyed: usize,
    pub panes_signaled: usize,
    pub graceful_exits: usize,
    pub errors: Vec<String>,
    pub duration: Duration,
}

/// Which sessions a swarm-wide shutdown should target, and how long to
/// wait for a graceful exit before killing.
pub struct ShutdownSupervisor {
    driver: Arc<dyn MultiplexerDriver>,
    dialects: Arc<DialectTable>,
    graceful_timeout: Duration,
}

impl ShutdownSupervisor {
    pub fn new(driver: Arc<dyn MultiplexerDriver>, dialects: Arc<DialectTable>, graceful_timeout: Duration) -> Self {
        Self { driver, dialects, graceful_timeout }
    }

    /// Session metadata the supervisor needs to address panes: name and the
    /// pane ids + kinds it created, since `list_sessions` alone doesn't
    /// expose per-pane identity. Callers that only know session *names*
    /// (e.g. the CLI after a crash) can pass an empty pane list; the
    /// supervisor will still kill the session, just without a graceful
    /// signal pass.
    pub async fn shutdown(
        &self,
        glob_patterns: &[String],
        known_panes: &[(String, PaneId, crate::dialect::AgentKind)],
        cancel: &CancellationToken,
    ) -> Result<ShutdownReport, ShutdownError> {
        let start = std::time::Instant::now();
        let mut report = ShutdownReport {
            sessions_destroyed: 0,
            panes_signaled: 0,
            graceful_exits: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
        };

        let compiled: Vec<Pattern> = glob_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).map_err(|e| warn!(pattern = %p, error = %e, "invalid shutdown glob")).ok())
            .collect();

        let sessions = self.driver.list_sessions().await?;
        let matched: Vec<String> = sessions
            .into_iter()
            .map(|s| s.name)
            .filter(|name| compiled.iter().any(|p| p.matches(name)))
            .collect();

        for session in matched {
            if cancel.is_cancelled() {
                break;
            }

            let panes: Vec<&(String, PaneId, crate::dialect::AgentKind)> =
                known_panes.iter().filter(|(s, _, _)| s == &session).collect();

            for (_, pane, kind) in &panes {
                let dialect = match self.dialects.get(kind) {
                    Ok(d) => d,
                    Err(e) => {
                        report.errors.push(format!("{session}: {e}"));
                        continue;
                    }
                };

                let sequence = match dialect.exit {
                    ExitGesture::Keystroke(key) => KeySequence::literal(key),
                    ExitGesture::Command(cmd) => KeySequence::literal(cmd).with_enter(Duration::from_millis(50)),
                };

                match self.driver.send_keys(pane, sequence).await {
                    Ok(()) => report.panes_signaled += 1,
                    Err(e) => report.errors.push(format!("{session}/{pane}: {e}")),
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.graceful_timeout) => {}
                _ = cancel.cancelled() => {}
            }

            // Best-effort exit-code probe: capture scrollback once and
            // check whether the dialect classifies the tail as idle
            // (graceful) rather than errored/working (spec §4.7 "there is
            // no real exit code available once a pane's shell is gone").
            for (_, pane, kind) in &panes {
                if let Ok(dialect) = self.dialects.get(kind) {
                    if let Ok(capture) = self.driver.capture_pane(pane, 20).await {
                        if dialect.classify_capture(&capture) == OutputClass::Idle {
                            report.graceful_exits += 1;
                        }
                    }
                }
            }

            match self.driver.kill_session(&session).await {
                Ok(()) => {
                    report.sessions_destroyed += 1;
                    info!(session = %session, "shutdown supervisor destroyed session");
                }
                Err(e) => report.errors.push(format!("{session}: {e}")),
            }
        }

        report.duration = start.elapsed();
        Ok(report)
    }
}

/// Default glob patterns per spec §4.7.
pub fn default_glob_patterns() -> Vec<String> {
    vec!["cc_agents_*".to_string(), "cod_agents_*".to_string(), "gmi_agents_*".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patterns_match_expected_names() {
        let compiled: Vec<Pattern> = default_glob_patterns().iter().map(|p| Pattern::new(p).unwrap()).collect();
        assert!(compiled.iter().any(|p| p.matches("cc_agents_0")));
        assert!(compiled.iter().any(|p| p.matches("cod_agents_3")));
        assert!(compiled.iter().any(|p| p.matches("gmi_agents_1")));
        assert!(!compiled.iter().any(|p| p.matches("ensemble_foo")));
    }
}
