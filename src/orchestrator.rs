//! Session Orchestrator, Pane Launcher and Prompt Injector: materializes a
//! [`SwarmPlan`] against the Multiplexer Driver, then launches the correct
//! agent CLI in each pane and pastes an optional initial prompt. See spec
//! §4.2 and §4.3.
//!
//! Partial failure is the normal case at every stage here (spec §4.2 "one
//! pane's creation error never aborts the remaining work"): every method
//! returns a result struct with per-item outcomes rather than bailing on
//! the first error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::allocation::{PaneSpec, SessionSpec, SwarmPlan};
use crate::config::TimingConfig;
use crate::dialect::{AgentKind, DialectTable, SubmitGesture};
use crate::tmux::{KeySequence, MultiplexerDriver, PaneId, TmuxError};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("multiplexer error: {0}")]
    Multiplexer(#[from] TmuxError),
    #[error("dialect error: {0}")]
    Dialect(#[from] crate::dialect::DialectError),
    #[error("operation cancelled")]
    Cancelled,
}

/// One pane actually created inside a session, carrying enough identity to
/// address it again in later stages (launch, inject, health, shutdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPane {
    pub pane_index: usize,
    pub pane_id: PaneId,
    pub project_name: String,
    pub agent_kind: AgentKind,
}

/// A session the orchestrator successfully created, with whichever panes
/// it managed to create inside it (spec §4.2 "partial failure is normal").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSession {
    pub name: String,
    pub agent_kind: AgentKind,
    pub panes: Vec<CreatedPane>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaneError {
    pub session: String,
    pub pane_index: usize,
    pub message: String,
}

/// Result of materializing a plan, spec §4.2 "ExecutionResult".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub sessions: Vec<CreatedSession>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<PaneError>,
}

/// Executes a [`SwarmPlan`] against the driver with staggered timing. One
/// instance is stateless aside from its driver handle and timing knobs, so
/// it can be shared across concurrent swarm-creation calls.
pub struct SessionOrchestrator {
    driver: Arc<dyn MultiplexerDriver>,
    timing: TimingConfig,
}

impl SessionOrchestrator {
    pub fn new(driver: Arc<dyn MultiplexerDriver>, timing: TimingConfig) -> Self {
        Self { driver, timing }
    }

    /// Materializes every [`SessionSpec`] in `plan` in order. Within one
    /// session pane creation is strictly ordered so pane indices match the
    /// spec's order (spec §5); across sessions the stagger is the only
    /// rate limit. A failed pane creation is recorded and the remaining
    /// panes of that session (and all other sessions) still get attempted.
    pub async fn execute(&self, plan: &SwarmPlan, cancel: &CancellationToken) -> ExecutionResult {
        let mut result = ExecutionResult { sessions: Vec::new(), total: 0, successful: 0, failed: 0, errors: Vec::new() };

        for session_spec in &plan.sessions {
            if cancel.is_cancelled() {
                break;
            }
            let created = self.execute_session(session_spec, &mut result, cancel).await;
            result.sessions.push(created);
        }

        result
    }

    async fn execute_session(&self, spec: &SessionSpec, result: &mut ExecutionResult, cancel: &CancellationToken) -> CreatedSession {
        let mut created = CreatedSession { name: spec.name.clone(), agent_kind: spec.agent_kind.clone(), panes: Vec::new() };

        for (i, pane_spec) in spec.panes.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            result.total += 1;

            let pane_result = if i == 0 {
                self.driver.create_session(&spec.name, None).await
            } else {
                self.driver.split_pane(&spec.name, None).await
            };

            match pane_result {
                Ok(pane_id) => {
                    let title = pane_spec.title(&spec.name);
                    if let Err(e) = self.driver.set_pane_title(&pane_id, &title).await {
                        warn!(session = %spec.name, pane = %pane_id, error = %e, "failed to set pane title");
                    }
                    created.panes.push(CreatedPane {
                        pane_index: pane_spec.index,
                        pane_id,
                        project_name: pane_spec.project_name.clone(),
                        agent_kind: pane_spec.agent_kind.clone(),
                    });
                    result.successful += 1;
                    info!(session = %spec.name, pane_index = pane_spec.index, "pane created");
                }
                Err(e) => {
                    result.failed += 1;
                    result.errors.push(PaneError { session: spec.name.clone(), pane_index: pane_spec.index, message: e.to_string() });
                    warn!(session = %spec.name, pane_index = pane_spec.index, error = %e, "pane creation failed");
                }
            }

            if !self.timing.pane_creation_stagger.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.timing.pane_creation_stagger) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }

        created
    }
}

/// A single pane's launch outcome, spec §4.3 "Launcher ... On send failure,
/// record and continue."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchOutcome {
    pub session: String,
    pub pane_id: PaneId,
    pub launched: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResult {
    pub successful: usize,
    pub failed: usize,
    pub outcomes: Vec<LaunchOutcome>,
}

/// Looks up the agent kind in the Dialect Table and sends its launch
/// command followed by Enter, with a post-Enter settle delay.
pub struct PaneLauncher {
    driver: Arc<dyn MultiplexerDriver>,
    dialects: Arc<DialectTable>,
}

impl PaneLauncher {
    pub fn new(driver: Arc<dyn MultiplexerDriver>, dialects: Arc<DialectTable>) -> Self {
        Self { driver, dialects }
    }

    pub async fn launch(&self, session: &str, pane_id: &PaneId, kind: &AgentKind) -> Result<(), OrchestratorError> {
        let dialect = self.dialects.get(kind)?;
        let sequence = KeySequence::literal(dialect.launch_command).with_enter(dialect.post_launch_delay);
        self.driver.send_keys(pane_id, sequence).await?;
        Ok(())
    }

    /// Launches every pane in `panes`, continuing past individual
    /// failures (spec §4.3). Each tuple is `(session name, pane)`.
    pub async fn launch_all(&self, panes: &[(&str, &CreatedPane)], cancel: &CancellationToken) -> LaunchResult {
        let mut result = LaunchResult { successful: 0, failed: 0, outcomes: Vec::new() };

        for (session, pane) in panes {
            if cancel.is_cancelled() {
                break;
            }
            match self.launch(session, &pane.pane_id, &pane.agent_kind).await {
                Ok(()) => {
                    result.successful += 1;
                    result.outcomes.push(LaunchOutcome {
                        session: session.to_string(),
                        pane_id: pane.pane_id.clone(),
                        launched: true,
                        error: None,
                    });
                }
                Err(e) => {
                    result.failed += 1;
                    result.outcomes.push(LaunchOutcome {
                        session: session.to_string(),
                        pane_id: pane.pane_id.clone(),
                        launched: false,
                        error: Some(e.to_string()),
                    });
                    warn!(session = %session, pane = %pane.pane_id, error = %e, "pane launch failed");
                }
            }
        }

        result
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionOutcome {
    pub pane_id: PaneId,
    pub injected: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionResult {
    pub successful: usize,
    pub failed: usize,
    pub outcomes: Vec<InjectionOutcome>,
}

/// Bracketed-paste start/end sentinels, a standard terminal escape (spec
/// §4.3 "wrap text in start/end sentinels").
const BRACKETED_PASTE_START: &str = "\x1b[200~";
const BRACKETED_PASTE_END: &str = "\x1b[201~";

/// Waits a dialect-specific readiness delay, then pastes the prompt using
/// the dialect's submit gesture. Reused by swarm creation (initial prompt)
/// and by the Ensemble Engine's per-assignment prompt injection (spec
/// §4.6.3), since both are "inject text into a pane, then watch for
/// activity" operations.
pub struct PromptInjector {
    driver: Arc<dyn MultiplexerDriver>,
    dialects: Arc<DialectTable>,
    line_stream_delay: Duration,
}

impl PromptInjector {
    pub fn new(driver: Arc<dyn MultiplexerDriver>, dialects: Arc<DialectTable>, line_stream_delay: Duration) -> Self {
        Self { driver, dialects, line_stream_delay }
    }

    pub async fn inject(&self, pane_id: &PaneId, kind: &AgentKind, prompt: &str, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        let dialect = self.dialects.get(kind)?;

        tokio::select! {
            _ = tokio::time::sleep(dialect.readiness_delay) => {}
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
        }

        match &dialect.submit {
            SubmitGesture::BracketedPaste { submit_key } => {
                let wrapped = format!("{BRACKETED_PASTE_START}{prompt}{BRACKETED_PASTE_END}");
                self.driver.send_keys(pane_id, KeySequence::literal(wrapped)).await?;
                self.driver.send_keys(pane_id, KeySequence::literal(*submit_key).with_enter(Duration::ZERO)).await?;
            }
            SubmitGesture::LineStream { submit_key } => {
                for line in prompt.lines() {
                    self.driver.send_keys(pane_id, KeySequence::literal(line).with_enter(self.line_stream_delay)).await?;
                }
                self.driver.send_keys(pane_id, KeySequence::literal(*submit_key).with_enter(Duration::ZERO)).await?;
            }
        }

        Ok(())
    }

    /// Injects `prompt` into every launched pane, continuing past
    /// individual failures (spec §4.3 "Injection result is {successful,
    /// failed, per-pane errors}").
    pub async fn inject_all(&self, panes: &[&CreatedPane], prompt: &str, cancel: &CancellationToken) -> InjectionResult {
        let mut result = InjectionResult { successful: 0, failed: 0, outcomes: Vec::new() };

        for pane in panes {
            if cancel.is_cancelled() {
                break;
            }
            match self.inject(&pane.pane_id, &pane.agent_kind, prompt, cancel).await {
                Ok(()) => {
                    result.successful += 1;
                    result.outcomes.push(InjectionOutcome { pane_id: pane.pane_id.clone(), injected: true, error: None });
                }
                Err(e) => {
                    result.failed += 1;
                    result.outcomes.push(InjectionOutcome { pane_id: pane.pane_id.clone(), injected: false, error: Some(e.to_string()) });
                    warn!(pane = %pane.pane_id, error = %e, "prompt injection failed");
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::plan;
    use crate::config::SwarmConfig;
    use crate::dialect::DialectTable;
    use crate::project::{Project, Tier};
    use crate::tmux::DriverSession;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A driver fake whose Nth pane creation call fails, matching spec §8
    /// scenario 2 ("driver stub succeeds for the first 3 of 4 panes ...
    /// and fails the 4th").
    struct FlakyDriver {
        fail_on_pane_number: Option<usize>,
        pane_counter: AtomicUsize,
        created: Mutex<Vec<String>>,
    }

    impl FlakyDriver {
        fn new(fail_on_pane_number: Option<usize>) -> Self {
            Self { fail_on_pane_number, pane_counter: AtomicUsize::new(0), created: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl MultiplexerDriver for FlakyDriver {
        async fn list_sessions(&self) -> Result<Vec<DriverSession>, TmuxError> {
            Ok(Vec::new())
        }

        async fn create_session(&self, name: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
            let n = self.pane_counter.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_on_pane_number {
                return Err(TmuxError::CommandFailed("synthetic failure".to_string()));
            }
            self.created.lock().unwrap().push(name.to_string());
            Ok(PaneId(format!("{name}:0.0")))
        }

        async fn split_pane(&self, session: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
            let n = self.pane_counter.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_on_pane_number {
                return Err(TmuxError::CommandFailed("synthetic failure".to_string()));
            }
            Ok(PaneId(format!("{session}:0.{n}")))
        }

        async fn kill_session(&self, _name: &str) -> Result<(), TmuxError> {
            Ok(())
        }

        async fn set_pane_title(&self, _pane: &PaneId, _title: &str) -> Result<(), TmuxError> {
            Ok(())
        }

        async fn capture_pane(&self, _pane: &PaneId, _lines: usize) -> Result<String, TmuxError> {
            Ok(String::new())
        }

        async fn send_keys(&self, _pane: &PaneId, _sequence: KeySequence) -> Result<(), TmuxError> {
            Ok(())
        }

        async fn session_exists(&self, _name: &str) -> Result<bool, TmuxError> {
            Ok(true)
        }
    }

    fn scenario_plan() -> SwarmPlan {
        let thresholds = crate::config::TierThresholds::default();
        let projects = vec![Project::new("A", std::path::PathBuf::from("/a"), 500, &thresholds)];
        let mut cfg = SwarmConfig::default();
        cfg.sessions_per_type = 1;
        cfg.panes_per_session = 4;
        let dialects = DialectTable::built_in().unwrap();
        plan(std::path::Path::new("/scan"), &projects, &cfg, &dialects, Utc::now())
    }

    #[tokio::test]
    async fn partial_failure_does_not_abort_remaining_panes() {
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FlakyDriver::new(Some(4)));
        let orchestrator = SessionOrchestrator::new(driver, TimingConfig { pane_creation_stagger: Duration::ZERO, ..TimingConfig::default() });
        let plan = scenario_plan();

        let cancel = CancellationToken::new();
        let result = orchestrator.execute(&plan, &cancel).await;

        // cc_agents_0 has 4 panes; pane #4 overall (the cc session's 4th
        // creation call) fails, the rest of the plan keeps going.
        assert_eq!(result.total, result.successful + result.failed);
        assert!(result.failed >= 1);
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn every_reported_pane_id_is_unique() {
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FlakyDriver::new(None));
        let orchestrator = SessionOrchestrator::new(driver, TimingConfig { pane_creation_stagger: Duration::ZERO, ..TimingConfig::default() });
        let plan = scenario_plan();

        let cancel = CancellationToken::new();
        let result = orchestrator.execute(&plan, &cancel).await;

        let mut ids: Vec<String> = result.sessions.iter().flat_map(|s| s.panes.iter().map(|p| p.pane_id.0.clone())).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(result.successful + result.failed, result.total);
    }

    #[tokio::test]
    async fn launcher_continues_past_a_failed_send() {
        struct FailSendDriver;
        #[async_trait]
        impl MultiplexerDriver for FailSendDriver {
            async fn list_sessions(&self) -> Result<Vec<DriverSession>, TmuxError> {
                Ok(Vec::new())
            }
            async fn create_session(&self, name: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
                Ok(PaneId(format!("{name}:0.0")))
            }
            async fn split_pane(&self, session: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
                Ok(PaneId(format!("{session}:0.1")))
            }
            async fn kill_session(&self, _name: &str) -> Result<(), TmuxError> {
                Ok(())
            }
            async fn set_pane_title(&self, _pane: &PaneId, _title: &str) -> Result<(), TmuxError> {
                Ok(())
            }
            async fn capture_pane(&self, _pane: &PaneId, _lines: usize) -> Result<String, TmuxError> {
                Ok(String::new())
            }
            async fn send_keys(&self, pane: &PaneId, _sequence: KeySequence) -> Result<(), TmuxError> {
                if pane.0.ends_with("0.1") {
                    return Err(TmuxError::CommandFailed("no such pane".to_string()));
                }
                Ok(())
            }
            async fn session_exists(&self, _name: &str) -> Result<bool, TmuxError> {
                Ok(true)
            }
        }

        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FailSendDriver);
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let launcher = PaneLauncher::new(driver, dialects);

        let good = CreatedPane { pane_index: 0, pane_id: PaneId("s:0.0".into()), project_name: "A".into(), agent_kind: AgentKind::ClaudeCode };
        let bad = CreatedPane { pane_index: 1, pane_id: PaneId("s:0.1".into()), project_name: "A".into(), agent_kind: AgentKind::ClaudeCode };
        let panes = [("s", &good), ("s", &bad)];

        let cancel = CancellationToken::new();
        let result = launcher.launch_all(&panes, &cancel).await;
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn bracketed_paste_dialect_wraps_text_in_sentinels() {
        let captured: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));

        struct CapturingDriver {
            captured: Arc<Mutex<Vec<Vec<String>>>>,
        }
        #[async_trait]
        impl MultiplexerDriver for CapturingDriver {
            async fn list_sessions(&self) -> Result<Vec<DriverSession>, TmuxError> {
                Ok(Vec::new())
            }
            async fn create_session(&self, name: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
                Ok(PaneId(format!("{name}:0.0")))
            }
            async fn split_pane(&self, session: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
                Ok(PaneId(format!("{session}:0.1")))
            }
            async fn kill_session(&self, _name: &str) -> Result<(), TmuxError> {
                Ok(())
            }
            async fn set_pane_title(&self, _pane: &PaneId, _title: &str) -> Result<(), TmuxError> {
                Ok(())
            }
            async fn capture_pane(&self, _pane: &PaneId, _lines: usize) -> Result<String, TmuxError> {
                Ok(String::new())
            }
            async fn send_keys(&self, _pane: &PaneId, sequence: KeySequence) -> Result<(), TmuxError> {
                self.captured.lock().unwrap().push(sequence.keys);
                Ok(())
            }
            async fn session_exists(&self, _name: &str) -> Result<bool, TmuxError> {
                Ok(true)
            }
        }

        let driver: Arc<dyn MultiplexerDriver> = Arc::new(CapturingDriver { captured: captured.clone() });
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let injector = PromptInjector::new(driver, dialects, Duration::ZERO);

        let cancel = CancellationToken::new();
        injector.inject(&PaneId("s:0.0".into()), &AgentKind::ClaudeCode, "hello there", &cancel).await.unwrap();

        let calls = captured.lock().unwrap();
        assert!(calls[0][0].starts_with(BRACKETED_PASTE_START));
        assert!(calls[0][0].ends_with(BRACKETED_PASTE_END));
        assert!(calls[0][0].contains("hello there"));
    }

    #[tokio::test]
    async fn line_stream_dialect_sends_one_call_per_line() {
        let captured: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));

        struct CapturingDriver {
            captured: Arc<Mutex<Vec<Vec<String>>>>,
        }
        #[async_trait]
        impl MultiplexerDriver for CapturingDriver {
            async fn list_sessions(&self) -> Result<Vec<DriverSession>, TmuxError> {
                Ok(Vec::new())
            }
            async fn create_session(&self, name: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
                Ok(PaneId(format!("{name}:0.0")))
            }
            async fn split_pane(&self, session: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
                Ok(PaneId(format!("{session}:0.1")))
            }
            async fn kill_session(&self, _name: &str) -> Result<(), TmuxError> {
                Ok(())
            }
            async fn set_pane_title(&self, _pane: &PaneId, _title: &str) -> Result<(), TmuxError> {
                Ok(())
            }
            async fn capture_pane(&self, _pane: &PaneId, _lines: usize) -> Result<String, TmuxError> {
                Ok(String::new())
            }
            async fn send_keys(&self, _pane: &PaneId, sequence: KeySequence) -> Result<(), TmuxError> {
                self.captured.lock().unwrap().push(sequence.keys);
                Ok(())
            }
            async fn session_exists(&self, _name: &str) -> Result<bool, TmuxError> {
                Ok(true)
            }
        }

        let driver: Arc<dyn MultiplexerDriver> = Arc::new(CapturingDriver { captured: captured.clone() });
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let injector = PromptInjector::new(driver, dialects, Duration::ZERO);

        let cancel = CancellationToken::new();
        injector.inject(&PaneId("s:0.0".into()), &AgentKind::Gemini, "line one\nline two", &cancel).await.unwrap();

        let calls = captured.lock().unwrap();
        // two lines + final submit keystroke
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0][0], "line one");
        assert_eq!(calls[1][0], "line two");
    }

    #[tokio::test]
    async fn injection_result_reports_partial_failure_not_total() {
        struct HalfFailDriver;
        #[async_trait]
        impl MultiplexerDriver for HalfFailDriver {
            async fn list_sessions(&self) -> Result<Vec<DriverSession>, TmuxError> {
                Ok(Vec::new())
            }
            async fn create_session(&self, name: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
                Ok(PaneId(format!("{name}:0.0")))
            }
            async fn split_pane(&self, session: &str, _start_dir: Option<&str>) -> Result<PaneId, TmuxError> {
                Ok(PaneId(format!("{session}:0.1")))
            }
            async fn kill_session(&self, _name: &str) -> Result<(), TmuxError> {
                Ok(())
            }
            async fn set_pane_title(&self, _pane: &PaneId, _title: &str) -> Result<(), TmuxError> {
                Ok(())
            }
            async fn capture_pane(&self, _pane: &PaneId, _lines: usize) -> Result<String, TmuxError> {
                Ok(String::new())
            }
            async fn send_keys(&self, pane: &PaneId, _sequence: KeySequence) -> Result<(), TmuxError> {
                if pane.0.contains("bad") {
                    return Err(TmuxError::CommandFailed("gone".to_string()));
                }
                Ok(())
            }
            async fn session_exists(&self, _name: &str) -> Result<bool, TmuxError> {
                Ok(true)
            }
        }

        let driver: Arc<dyn MultiplexerDriver> = Arc::new(HalfFailDriver);
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let injector = PromptInjector::new(driver, dialects, Duration::ZERO);

        let good = CreatedPane { pane_index: 0, pane_id: PaneId("good:0.0".into()), project_name: "A".into(), agent_kind: AgentKind::ClaudeCode };
        let bad = CreatedPane { pane_index: 1, pane_id: PaneId("bad:0.1".into()), project_name: "A".into(), agent_kind: AgentKind::ClaudeCode };

        let cancel = CancellationToken::new();
        let result = injector.inject_all(&[&good, &bad], "hello", &cancel).await;
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
    }
}
