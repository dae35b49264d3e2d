//! Ensemble Engine: ties assignment, injection, polling and persistence
//! together into one run. See spec §3 `EnsembleSession`, §4.6.2 (assign +
//! persist), §4.6.3 (execution), §4.6.9 (stop).
//!
//! Cross-component references are kept as stable strings (session name +
//! pane title), never driver handles held across an await point, per spec
//! §9's note on avoiding reference cycles between the Orchestrator and the
//! Ensemble Engine. `PaneRegistry` is the lookup that bridges the two.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dialect::{AgentKind, DialectTable, ExitGesture, OutputClass};
use crate::ensemble::assignment::{self, Assignment, AssignmentStatus, AssignmentStrategy, AvailablePane};
use crate::ensemble::capture::{self, ModeOutput};
use crate::ensemble::checkpoint::{atomic_write_json, read_json, CheckpointError, CheckpointMetadata, CheckpointStore, RunStatus, StreamingCheckpoint};
use crate::ensemble::merge::{merge_with_provenance, MergeResult};
use crate::ensemble::preset::Preset;
use crate::ensemble::synthesis::{stream_result, synthesize, ChunkKind, ChunkSequencer, StreamChunk, SynthesisResult, SynthesisStrategy};
use crate::orchestrator::PromptInjector;
use crate::tmux::{KeySequence, MultiplexerDriver, PaneId, TmuxError};

#[derive(Debug, thiserror::Error)]
pub enum EnsembleError {
    #[error("assignment failed: {0}")]
    Assignment(#[from] assignment::AssignmentError),
    #[error("multiplexer error: {0}")]
    Multiplexer(#[from] TmuxError),
    #[error("dialect error: {0}")]
    Dialect(#[from] crate::dialect::DialectError),
    #[error("persistence error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("pane '{0}' is not in the registry for this session")]
    UnknownPane(String),
    #[error("session '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleStatus {
    Pending,
    Running,
    Synthesizing,
    Done,
    Stopped,
    Errored,
}

/// Maps an assignment's stable `pane_name` to the driver handle and agent
/// kind actually backing it. Built by the caller (from a freshly-created
/// swarm plan or an existing session) and handed in, never stored inside
/// the persisted `EnsembleSession` itself.
pub type PaneRegistry = HashMap<String, (PaneId, AgentKind)>;

/// The full persisted state of one ensemble run (spec §3 `EnsembleSession`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleSession {
    pub session_name: String,
    pub preset_name: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub status: EnsembleStatus,
    pub synthesis_strategy: SynthesisStrategy,
    pub merge_similarity_threshold: f64,
    pub assignments: Vec<Assignment>,
    pub synthesis: Option<SynthesisResult>,
}

impl EnsembleSession {
    fn state_path(state_dir: &std::path::Path, session_name: &str) -> PathBuf {
        state_dir.join("ensembles").join(session_name).join("state.json")
    }

    fn output_path(state_dir: &std::path::Path, session_name: &str, mode_id: &str) -> PathBuf {
        state_dir.join("ensembles").join(session_name).join("assignments").join(format!("{mode_id}.json"))
    }
}

/// Orchestrates one ensemble run end to end: assignment, prompt injection,
/// polling and stop, persisting state after every transition so a crashed
/// run can be inspected or resumed (spec §4.6.2 "persist the EnsembleSession
/// immediately").
pub struct EnsembleEngine {
    driver: Arc<dyn MultiplexerDriver>,
    dialects: Arc<DialectTable>,
    state_dir: PathBuf,
    poll_interval: Duration,
    stop_timeout: Duration,
}

impl EnsembleEngine {
    pub fn new(driver: Arc<dyn MultiplexerDriver>, dialects: Arc<DialectTable>, state_dir: PathBuf, poll_interval: Duration, stop_timeout: Duration) -> Self {
        Self { driver, dialects, state_dir, poll_interval, stop_timeout }
    }

    /// Assigns every mode in `preset` to a pane from `pool`, persists the
    /// resulting session immediately, then injects each mode's prompt
    /// (substituting `{question}` into its `prompt_template`). Injection
    /// failures mark that assignment `Errored` rather than aborting the run
    /// (spec §4.2/§4.3's "partial failure is normal" philosophy carries into
    /// the Ensemble Engine).
    pub async fn start(
        &self,
        session_name: &str,
        preset: &Preset,
        question: &str,
        pool: &[AvailablePane],
        registry: &PaneRegistry,
        strategy: AssignmentStrategy,
        cancel: &CancellationToken,
    ) -> Result<EnsembleSession, EnsembleError> {
        let assignments = assignment::assign(preset, pool, strategy)?;

        let synthesis_strategy = SynthesisStrategy::parse(&preset.synthesis_strategy).unwrap_or(SynthesisStrategy::Consensus);

        let mut session = EnsembleSession {
            session_name: session_name.to_string(),
            preset_name: preset.name.clone(),
            question: question.to_string(),
            created_at: Utc::now(),
            status: EnsembleStatus::Pending,
            synthesis_strategy,
            merge_similarity_threshold: preset.merge_similarity_threshold,
            assignments,
            synthesis: None,
        };
        self.save(&session).await?;

        let line_stream_delay = Duration::from_millis(30);
        let injector = PromptInjector::new(self.driver.clone(), self.dialects.clone(), line_stream_delay);

        for assignment in session.assignments.iter_mut() {
            if cancel.is_cancelled() {
                break;
            }
            let Some((pane_id, kind)) = registry.get(&assignment.pane_name) else {
                assignment.status = AssignmentStatus::Errored;
                warn!(pane = %assignment.pane_name, "pane missing from registry, marking assignment errored");
                continue;
            };

            let Some(mode) = preset.modes.iter().find(|m| m.id == assignment.mode_id) else {
                assignment.status = AssignmentStatus::Errored;
                continue;
            };
            let prompt = mode.prompt_template.replace("{question}", question);

            assignment.status = AssignmentStatus::Injecting;
            match injector.inject(pane_id, kind, &prompt, cancel).await {
                Ok(()) => {
                    assignment.status = AssignmentStatus::Active;
                    info!(mode = %assignment.mode_id, pane = %assignment.pane_name, "mode injected");
                }
                Err(e) => {
                    assignment.status = AssignmentStatus::Errored;
                    warn!(mode = %assignment.mode_id, pane = %assignment.pane_name, error = %e, "mode injection failed");
                }
            }
        }

        session.status = EnsembleStatus::Running;
        self.save(&session).await?;
        Ok(session)
    }

    /// One polling pass: captures every `Active` assignment's pane, classifies
    /// the tail, and transitions it. `Idle` parses the captured output and
    /// moves the assignment to `Done`; `Errored` moves it to `Errored`;
    /// `Working`/`RateLimited` leave it `Active` for the next pass (spec
    /// §4.6.3).
    pub async fn poll_once(&self, session: &mut EnsembleSession, registry: &PaneRegistry) -> Result<(), EnsembleError> {
        for assignment in session.assignments.iter_mut() {
            if assignment.status != AssignmentStatus::Active {
                continue;
            }
            let Some((pane_id, kind)) = registry.get(&assignment.pane_name) else {
                assignment.status = AssignmentStatus::Errored;
                continue;
            };
            let dialect = self.dialects.get(kind)?;
            let capture = self.driver.capture_pane(pane_id, 500).await?;

            match dialect.classify_capture(&capture) {
                OutputClass::Idle => {
                    let output = capture::parse_mode_output(&assignment.mode_id, &capture);
                    atomic_write_json(&EnsembleSession::output_path(&self.state_dir, &session.session_name, &assignment.mode_id), &output).await?;
                    assignment.status = AssignmentStatus::Done;
                    info!(mode = %assignment.mode_id, usable = output.usable(), "mode finished");
                }
                OutputClass::Errored => {
                    assignment.status = AssignmentStatus::Errored;
                    warn!(mode = %assignment.mode_id, "pane reported an error state");
                }
                OutputClass::Working | OutputClass::RateLimited => {}
            }
        }

        if session.assignments.iter().all(|a| matches!(a.status, AssignmentStatus::Done | AssignmentStatus::Errored)) {
            session.status = EnsembleStatus::Synthesizing;
        }
        self.save(session).await
    }

    /// Polls repeatedly at `poll_interval` until every assignment reaches a
    /// terminal status or `cancel` fires.
    pub async fn run_until_terminal(&self, session: &mut EnsembleSession, registry: &PaneRegistry, cancel: &CancellationToken) -> Result<(), EnsembleError> {
        loop {
            self.poll_once(session, registry).await?;
            if session.status == EnsembleStatus::Synthesizing || cancel.is_cancelled() {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// Loads every completed mode's output, merges near-duplicates, and
    /// synthesizes a final result, persisting it on the session (spec
    /// §4.6.5/§4.6.6).
    pub async fn synthesize(&self, session: &mut EnsembleSession) -> Result<(), EnsembleError> {
        let mut outputs: Vec<ModeOutput> = Vec::new();
        for assignment in &session.assignments {
            if assignment.status != AssignmentStatus::Done {
                continue;
            }
            let path = EnsembleSession::output_path(&self.state_dir, &session.session_name, &assignment.mode_id);
            if let Ok(output) = read_json::<ModeOutput>(&path).await {
                outputs.push(output);
            }
        }

        let merge: MergeResult = merge_with_provenance(&outputs, session.merge_similarity_threshold, Utc::now());
        let result = synthesize(&merge, session.synthesis_strategy);
        session.synthesis = Some(result);
        session.status = EnsembleStatus::Done;
        self.save(session).await
    }

    /// Recomputes the merged findings for a `Done`/`Synthesizing`/`Done`
    /// session without mutating it, for `ensemble export-findings` runs that
    /// happen in a later CLI invocation than the one that called
    /// `synthesize` (spec §4.6.6 / §4.6.10).
    pub async fn load_merge(&self, session: &EnsembleSession) -> Result<MergeResult, EnsembleError> {
        let mut outputs: Vec<ModeOutput> = Vec::new();
        for assignment in &session.assignments {
            if assignment.status != AssignmentStatus::Done {
                continue;
            }
            let path = EnsembleSession::output_path(&self.state_dir, &session.session_name, &assignment.mode_id);
            if let Ok(output) = read_json::<ModeOutput>(&path).await {
                outputs.push(output);
            }
        }
        Ok(merge_with_provenance(&outputs, session.merge_similarity_threshold, Utc::now()))
    }

    /// Streaming counterpart to [`synthesize`]: emits the synthesis as an
    /// ordered sequence of typed chunks, persisting the highest index
    /// written after every chunk to `checkpoints` keyed by `run_id` (spec
    /// §4.6.6/§4.6.7). A resumed run reads its last-persisted index first
    /// and the sequencer drops every replayed chunk at or below it, so
    /// calling this twice with the same `run_id` only emits the tail the
    /// first call didn't reach. Cancellation stops the loop early without
    /// marking the session `Done` - the next call resumes from the last
    /// flushed index.
    pub async fn synthesize_streaming(
        &self,
        session: &mut EnsembleSession,
        checkpoints: &CheckpointStore,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<StreamChunk>, EnsembleError> {
        let merge = self.load_merge(session).await?;
        let result = synthesize(&merge, session.synthesis_strategy);

        let last_persisted = checkpoints.read_streaming_checkpoint(run_id).await.map(|cp| cp.last_chunk_index).unwrap_or(0);
        // Seed from 0, not `last_persisted`: the synthesis is regenerated in the
        // same order every call, so numbering from 0 reproduces the original
        // indices and `stream_result`'s `> last_persisted` filter actually drops
        // the already-written prefix instead of renumbering past it.
        let sequencer = ChunkSequencer::new();
        let pending = stream_result(&result, &sequencer, last_persisted);

        let mut emitted = Vec::new();
        for chunk in pending {
            if cancel.is_cancelled() {
                break;
            }
            checkpoints
                .write_streaming_checkpoint(&StreamingCheckpoint {
                    run_id: run_id.to_string(),
                    session_name: session.session_name.clone(),
                    last_chunk_index: chunk.index,
                    error: None,
                })
                .await?;
            let reached_complete = chunk.kind == ChunkKind::Complete;
            emitted.push(chunk);
            if reached_complete {
                break;
            }
        }

        let completed = emitted.iter().any(|c| c.kind == ChunkKind::Complete);
        session.status = if completed { EnsembleStatus::Done } else { EnsembleStatus::Synthesizing };
        if completed {
            session.synthesis = Some(result);
        }
        self.save(session).await?;
        self.write_checkpoint_metadata(session, checkpoints, run_id, completed).await?;

        Ok(emitted)
    }

    async fn write_checkpoint_metadata(
        &self,
        session: &EnsembleSession,
        checkpoints: &CheckpointStore,
        run_id: &str,
        completed: bool,
    ) -> Result<(), EnsembleError> {
        let completed_mode_ids: Vec<String> =
            session.assignments.iter().filter(|a| a.status == AssignmentStatus::Done).map(|a| a.mode_id.clone()).collect();
        let errored_mode_ids: Vec<String> =
            session.assignments.iter().filter(|a| a.status == AssignmentStatus::Errored).map(|a| a.mode_id.clone()).collect();
        let pending_mode_ids: Vec<String> = session
            .assignments
            .iter()
            .filter(|a| matches!(a.status, AssignmentStatus::Pending | AssignmentStatus::Injecting | AssignmentStatus::Active))
            .map(|a| a.mode_id.clone())
            .collect();

        checkpoints
            .write_metadata(&CheckpointMetadata {
                run_id: run_id.to_string(),
                session_name: session.session_name.clone(),
                question: session.question.clone(),
                status: if completed { RunStatus::Done } else { RunStatus::Synthesizing },
                created_at: session.created_at,
                completed_mode_ids,
                pending_mode_ids,
                errored_mode_ids,
                total_modes: session.assignments.len(),
            })
            .await?;
        Ok(())
    }

    /// Sends the dialect's exit gesture to every assignment's pane, waits up
    /// to `stop_timeout`, then kills the session. Unless `collect` is false,
    /// attempts one final capture+parse pass before finalizing, so work
    /// finished right at shutdown isn't silently lost (spec §4.6.9).
    pub async fn stop(&self, session: &mut EnsembleSession, registry: &PaneRegistry, collect: bool) -> Result<(), EnsembleError> {
        for assignment in &session.assignments {
            let Some((pane_id, kind)) = registry.get(&assignment.pane_name) else { continue };
            let Ok(dialect) = self.dialects.get(kind) else { continue };
            let sequence = match &dialect.exit {
                ExitGesture::Keystroke(key) => KeySequence::literal(*key),
                ExitGesture::Command(cmd) => KeySequence::literal(*cmd).with_enter(Duration::ZERO),
            };
            if let Err(e) = self.driver.send_keys(pane_id, sequence).await {
                warn!(pane = %assignment.pane_name, error = %e, "exit gesture failed, proceeding to kill anyway");
            }
        }

        tokio::time::sleep(self.stop_timeout.min(Duration::from_secs(10))).await;

        if collect {
            // best-effort: a pane already gone just returns an error we swallow
            let _ = self.poll_once(session, registry).await;
        }

        if let Err(e) = self.driver.kill_session(&session.session_name).await {
            warn!(session = %session.session_name, error = %e, "kill_session failed during ensemble stop");
        }

        session.status = EnsembleStatus::Stopped;
        self.save(session).await
    }

    pub async fn load(&self, session_name: &str) -> Result<EnsembleSession, EnsembleError> {
        read_json(&EnsembleSession::state_path(&self.state_dir, session_name))
            .await
            .map_err(|_| EnsembleError::NotFound(session_name.to_string()))
    }

    async fn save(&self, session: &EnsembleSession) -> Result<(), EnsembleError> {
        atomic_write_json(&EnsembleSession::state_path(&self.state_dir, &session.session_name), session).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::preset::built_in_presets;
    use crate::tmux::DriverSession;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeDriver {
        captures: Mutex<HashMap<String, String>>,
        sent: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeDriver {
        fn new(captures: HashMap<String, String>) -> Self {
            Self { captures: Mutex::new(captures), sent: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl MultiplexerDriver for FakeDriver {
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
        async fn capture_pane(&self, pane: &PaneId, _lines: usize) -> Result<String, TmuxError> {
            Ok(self.captures.lock().unwrap().get(&pane.0).cloned().unwrap_or_default())
        }
        async fn send_keys(&self, pane: &PaneId, sequence: KeySequence) -> Result<(), TmuxError> {
            self.sent.lock().unwrap().push((pane.0.clone(), sequence.keys));
            Ok(())
        }
        async fn session_exists(&self, _name: &str) -> Result<bool, TmuxError> {
            Ok(true)
        }
    }

    fn registry() -> PaneRegistry {
        let mut map = HashMap::new();
        map.insert("sess__cc_0".to_string(), (PaneId("sess:0.0".to_string()), AgentKind::ClaudeCode));
        map.insert("sess__cod_1".to_string(), (PaneId("sess:0.1".to_string()), AgentKind::Codex));
        map.insert("sess__gmi_2".to_string(), (PaneId("sess:0.2".to_string()), AgentKind::Gemini));
        map
    }

    fn pool() -> Vec<AvailablePane> {
        vec![
            AvailablePane { pane_name: "sess__cc_0".into(), agent_kind: AgentKind::ClaudeCode },
            AvailablePane { pane_name: "sess__cod_1".into(), agent_kind: AgentKind::Codex },
            AvailablePane { pane_name: "sess__gmi_2".into(), agent_kind: AgentKind::Gemini },
        ]
    }

    #[tokio::test]
    async fn start_persists_session_and_injects_every_mode() {
        let tmp = TempDir::new().unwrap();
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeDriver::new(HashMap::new()));
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let engine = EnsembleEngine::new(driver, dialects, tmp.path().to_path_buf(), Duration::from_millis(1), Duration::from_millis(1));

        let preset = built_in_presets().remove(0);
        let cancel = CancellationToken::new();
        let session = engine.start("sess", &preset, "why is login slow", &pool(), &registry(), AssignmentStrategy::Affinity, &cancel).await.unwrap();

        assert_eq!(session.assignments.len(), 3);
        assert!(session.assignments.iter().all(|a| a.status == AssignmentStatus::Active));
        assert_eq!(session.status, EnsembleStatus::Running);

        let reloaded = engine.load("sess").await.unwrap();
        assert_eq!(reloaded.assignments.len(), 3);
    }

    #[tokio::test]
    async fn missing_pane_in_registry_marks_assignment_errored_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeDriver::new(HashMap::new()));
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let engine = EnsembleEngine::new(driver, dialects, tmp.path().to_path_buf(), Duration::from_millis(1), Duration::from_millis(1));

        let preset = built_in_presets().remove(0);
        let mut sparse_registry = registry();
        sparse_registry.remove("sess__gmi_2");

        let cancel = CancellationToken::new();
        let session = engine.start("sess", &preset, "q", &pool(), &sparse_registry, AssignmentStrategy::Affinity, &cancel).await.unwrap();

        let errored = session.assignments.iter().filter(|a| a.status == AssignmentStatus::Errored).count();
        assert_eq!(errored, 1);
        assert_eq!(session.status, EnsembleStatus::Running);
    }

    #[tokio::test]
    async fn poll_transitions_idle_pane_to_done_and_parses_output() {
        let tmp = TempDir::new().unwrap();
        let mut captures = HashMap::new();
        captures.insert(
            "sess:0.0".to_string(),
            "```ensemble\nFindings:\n- SQL injection in login | impact=critical confidence=0.9\n```\n> ".to_string(),
        );
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeDriver::new(captures));
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let engine = EnsembleEngine::new(driver, dialects, tmp.path().to_path_buf(), Duration::from_millis(1), Duration::from_millis(1));

        let preset = built_in_presets().remove(0);
        let cancel = CancellationToken::new();
        let mut session = engine.start("sess", &preset, "q", &pool(), &registry(), AssignmentStrategy::Affinity, &cancel).await.unwrap();

        engine.poll_once(&mut session, &registry()).await.unwrap();

        let security = session.assignments.iter().find(|a| a.mode_id == "security").unwrap();
        assert_eq!(security.status, AssignmentStatus::Done);
    }

    #[tokio::test]
    async fn synthesize_merges_and_produces_a_result() {
        let tmp = TempDir::new().unwrap();
        let mut captures = HashMap::new();
        for pane in ["sess:0.0", "sess:0.1", "sess:0.2"] {
            captures.insert(pane.to_string(), "```ensemble\nFindings:\n- issue found | impact=high confidence=0.8\n```".to_string());
        }
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeDriver::new(captures));
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let engine = EnsembleEngine::new(driver, dialects, tmp.path().to_path_buf(), Duration::from_millis(1), Duration::from_millis(1));

        let preset = built_in_presets().remove(0);
        let cancel = CancellationToken::new();
        let mut session = engine.start("sess", &preset, "q", &pool(), &registry(), AssignmentStrategy::Affinity, &cancel).await.unwrap();

        engine.poll_once(&mut session, &registry()).await.unwrap();
        assert_eq!(session.status, EnsembleStatus::Synthesizing);

        engine.synthesize(&mut session).await.unwrap();
        assert_eq!(session.status, EnsembleStatus::Done);
        assert!(session.synthesis.is_some());
    }

    #[tokio::test]
    async fn stop_sends_exit_gesture_and_kills_session() {
        let tmp = TempDir::new().unwrap();
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeDriver::new(HashMap::new()));
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let engine = EnsembleEngine::new(driver, dialects, tmp.path().to_path_buf(), Duration::from_millis(1), Duration::from_millis(1));

        let preset = built_in_presets().remove(0);
        let cancel = CancellationToken::new();
        let mut session = engine.start("sess", &preset, "q", &pool(), &registry(), AssignmentStrategy::Affinity, &cancel).await.unwrap();

        engine.stop(&mut session, &registry(), false).await.unwrap();
        assert_eq!(session.status, EnsembleStatus::Stopped);
    }

    #[tokio::test]
    async fn streaming_synthesis_resumes_past_last_persisted_chunk() {
        let tmp = TempDir::new().unwrap();
        let mut captures = HashMap::new();
        for pane in ["sess:0.0", "sess:0.1", "sess:0.2"] {
            captures.insert(pane.to_string(), "```ensemble\nFindings:\n- issue found | impact=high confidence=0.8\n```".to_string());
        }
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeDriver::new(captures));
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let engine = EnsembleEngine::new(driver, dialects, tmp.path().to_path_buf(), Duration::from_millis(1), Duration::from_millis(1));
        let checkpoints = CheckpointStore::new(tmp.path().join("checkpoints"));

        let preset = built_in_presets().remove(0);
        let cancel = CancellationToken::new();
        let mut session = engine.start("sess", &preset, "q", &pool(), &registry(), AssignmentStrategy::Affinity, &cancel).await.unwrap();
        engine.poll_once(&mut session, &registry()).await.unwrap();

        let first_pass = engine.synthesize_streaming(&mut session, &checkpoints, "sess", &cancel).await.unwrap();
        assert!(first_pass.windows(2).all(|w| w[0].index < w[1].index));
        assert_eq!(session.status, EnsembleStatus::Done);

        let second_pass = engine.synthesize_streaming(&mut session, &checkpoints, "sess", &cancel).await.unwrap();
        assert!(second_pass.is_empty(), "resume must not replay already-persisted chunks");
    }

    #[tokio::test]
    async fn cancelled_streaming_synthesis_leaves_session_synthesizing_for_later_resume() {
        let tmp = TempDir::new().unwrap();
        let mut captures = HashMap::new();
        for pane in ["sess:0.0", "sess:0.1", "sess:0.2"] {
            captures.insert(pane.to_string(), "```ensemble\nFindings:\n- issue found | impact=high confidence=0.8\n```".to_string());
        }
        let driver: Arc<dyn MultiplexerDriver> = Arc::new(FakeDriver::new(captures));
        let dialects = Arc::new(DialectTable::built_in().unwrap());
        let engine = EnsembleEngine::new(driver, dialects, tmp.path().to_path_buf(), Duration::from_millis(1), Duration::from_millis(1));
        let checkpoints = CheckpointStore::new(tmp.path().join("checkpoints"));

        let preset = built_in_presets().remove(0);
        let cancel = CancellationToken::new();
        let mut session = engine.start("sess", &preset, "q", &pool(), &registry(), AssignmentStrategy::Affinity, &cancel).await.unwrap();
        engine.poll_once(&mut session, &registry()).await.unwrap();

        cancel.cancel();
        let chunks = engine.synthesize_streaming(&mut session, &checkpoints, "sess", &cancel).await.unwrap();
        assert!(chunks.is_empty());
        assert_eq!(session.status, EnsembleStatus::Synthesizing);
    }
}
