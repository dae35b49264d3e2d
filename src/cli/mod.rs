//! The narrow CLI surface wired on top of the four core subsystems (spec
//! §6 "CLI surface"). Argument parsing itself is an external-collaborator
//! concern per spec §1; this module is the thinnest possible glue between
//! `clap`'s derive output and the library's public API - one subcommand
//! per operation, one `CliRunner` method per subcommand, exactly as the
//! teacher's `Commands` / `CliRunner` pair does it.

#![allow(clippy::too_many_arguments)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod output;
pub use output::{create_formatter, OutputFormatter};

use crate::allocation::{self, SwarmPlan};
use crate::collaborators::bead::BeadCli;
use crate::collaborators::mail::{HttpMailClient, MailClient};
use crate::config::SwarmConfig;
use crate::dialect::DialectTable;
use crate::ensemble::checkpoint::CheckpointStore;
use crate::ensemble::export;
use crate::ensemble::preset::{self, PresetRegistry, PresetSource};
use crate::ensemble::{assignment::AssignmentStrategy, EnsembleEngine, EnsembleSession, PaneRegistry};
use crate::health::{HealthTracker, Status};
use crate::orchestrator::{PaneLauncher, PromptInjector, SessionOrchestrator};
use crate::project;
use crate::reservation::ReservationCoordinator;
use crate::shutdown::ShutdownSupervisor;
use crate::tmux::{MultiplexerDriver, PaneId, RemoteTunnel, TmuxDriver};

/// paneswarm - multi-agent terminal orchestrator
#[derive(Parser)]
#[command(name = "paneswarm")]
#[command(about = "Plans, launches and supervises fleets of LLM coding agents across tmux panes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// User-layer config file (TOML); defaults stand in when absent
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit exactly one JSON document and no ANSI (spec §6)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose (debug-level) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run every multiplexer call through `ssh <host> -- ...` instead of locally
    #[arg(long, global = true)]
    pub remote: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory of projects and print the weighted, tiered list
    Scan {
        root: PathBuf,
    },

    /// Scan, then compute a deterministic swarm allocation plan
    Plan {
        root: PathBuf,
        /// Write the plan to this file in addition to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Scan, plan, and materialize the plan as live tmux sessions/panes
    Create {
        root: PathBuf,
        /// Initial prompt pasted into every launched pane
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Health snapshot for one swarm session (spec §4.4)
    Health {
        session: String,
        #[arg(long)]
        pane: Option<usize>,
        #[arg(long, value_parser = ["ok", "warning", "error", "unknown"])]
        status: Option<String>,
    },

    /// Advisory file-path reservations (spec §4.5)
    Reserve {
        #[command(subcommand)]
        action: ReserveAction,
    },

    /// Ensemble Engine: parallel reasoning over one question (spec §4.6)
    Ensemble {
        #[command(subcommand)]
        action: EnsembleAction,
    },

    /// Graceful-then-forced teardown of matching swarm sessions (spec §4.7)
    Shutdown {
        #[arg(long = "pattern")]
        patterns: Vec<String>,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ReserveAction {
    /// Acquire a shared or exclusive lock on one or more path glob patterns
    Acquire {
        agent: String,
        patterns: Vec<String>,
        #[arg(long)]
        exclusive: bool,
        #[arg(long, default_value = "3600")]
        ttl_secs: u64,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// List active reservations, optionally narrowed to one agent
    List {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Extend an existing reservation's expiry
    Renew {
        agent: String,
        id: i64,
        #[arg(long, default_value = "3600")]
        extend_secs: u64,
    },
    /// Force-release a reservation, subject to the staleness window
    Release {
        id: i64,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long)]
        notify: bool,
        /// Most recent activity timestamp for the reservation's owner,
        /// RFC 3339 (normally supplied by the live Health Tracker; a
        /// one-shot CLI invocation has no persisted history of its own -
        /// see DESIGN.md).
        #[arg(long)]
        last_activity: Option<DateTime<Utc>>,
        /// Base URL of the optional mail collaborator for notifications
        #[arg(long)]
        mail_url: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum EnsembleAction {
    /// List every preset visible across the three layered sources
    Presets,
    /// Import a preset TOML file into a layer
    ImportPreset {
        file: PathBuf,
        #[arg(long, value_parser = ["user-global", "project-local"])]
        into: String,
    },
    /// Export a preset to TOML on stdout (or `--out`)
    ExportPreset {
        name: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Assign modes to fresh panes and inject each mode's prompt
    Start {
        preset: String,
        question: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long, default_value = "affinity", value_parser = ["affinity", "round-robin", "any"])]
        strategy: String,
    },
    /// Poll an in-flight run once and report assignment statuses
    Poll {
        session: String,
    },
    /// Poll until every assignment reaches a terminal status, then report
    Run {
        session: String,
    },
    /// Merge completed outputs and stream the synthesized answer
    Synthesize {
        session: String,
    },
    /// Stop a run: graceful exit, timeout, kill, one partial-capture pass
    Stop {
        session: String,
        #[arg(long)]
        no_collect: bool,
    },
    /// Export selected merged findings as work items via the bead collaborator
    Export {
        session: String,
        selection: String,
        project: PathBuf,
    },
    /// Remove checkpoint run folders older than a retention window
    CleanCheckpoints {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        older_than_days: Option<u64>,
    },
}

pub struct CliRunner {
    config: SwarmConfig,
    json_output: bool,
    formatter: OutputFormatter,
    driver: Arc<dyn MultiplexerDriver>,
    dialects: Arc<DialectTable>,
    cancel: CancellationToken,
}

impl CliRunner {
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = SwarmConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
        let dialects = Arc::new(DialectTable::built_in().context("failed to compile built-in dialects")?);

        let driver: Arc<dyn MultiplexerDriver> = match &cli.remote {
            Some(host) => Arc::new(TmuxDriver::remote(RemoteTunnel::new(host.clone()))),
            None => Arc::new(TmuxDriver::new()),
        };

        let cancel = CancellationToken::new();
        let cancel_for_handler = cancel.clone();
        let _ = ctrlc::set_handler(move || cancel_for_handler.cancel());

        Ok(Self { config, json_output: cli.json, formatter: create_formatter(cli.json), driver, dialects, cancel })
    }

    /// Runs one command, returning the process exit code per spec §6:
    /// `0` success, `1` warning-only overall health, `2` error-level
    /// overall health, any other non-zero for usage/I-O errors (surfaced
    /// as an `Err` and mapped to `1` by `main`).
    pub async fn run(&self, command: &Commands) -> Result<i32> {
        match command {
            Commands::Scan { root } => self.scan(root).await,
            Commands::Plan { root, out } => self.plan(root, out.as_deref()).await,
            Commands::Create { root, prompt } => self.create(root, prompt.as_deref()).await,
            Commands::Health { session, pane, status } => self.health(session, *pane, status.as_deref()).await,
            Commands::Reserve { action } => self.reserve(action).await,
            Commands::Ensemble { action } => self.ensemble(action).await,
            Commands::Shutdown { patterns, timeout_secs } => self.shutdown(patterns, *timeout_secs).await,
        }
    }

    fn emit(&self, message: &str, data: Option<serde_json::Value>) {
        println!("{}", self.formatter.format_success(message, data));
    }

    fn state_dir(&self) -> PathBuf {
        self.config.state_dir()
    }

    // -- Swarm Planner / Session Orchestrator ---------------------------

    async fn scan(&self, root: &Path) -> Result<i32> {
        let bead = BeadCli::default();
        let projects = project::scan(root, &project::ScannerConfig::default(), &self.config.tier_thresholds, &bead).await?;
        self.emit("scanned projects", Some(serde_json::to_value(&projects)?));
        Ok(0)
    }

    async fn build_plan(&self, root: &Path) -> Result<SwarmPlan> {
        let bead = BeadCli::default();
        let projects = project::scan(root, &project::ScannerConfig::default(), &self.config.tier_thresholds, &bead).await?;
        Ok(allocation::plan(root, &projects, &self.config, &self.dialects, Utc::now()))
    }

    async fn plan(&self, root: &Path, out: Option<&Path>) -> Result<i32> {
        let plan = self.build_plan(root).await?;
        let text = serde_json::to_string_pretty(&plan)?;
        if let Some(path) = out {
            write_text_atomic(path, &text).await?;
        }
        self.emit("swarm plan computed", Some(serde_json::to_value(&plan)?));
        Ok(0)
    }

    async fn create(&self, root: &Path, prompt: Option<&str>) -> Result<i32> {
        let plan = self.build_plan(root).await?;

        let orchestrator = SessionOrchestrator::new(self.driver.clone(), self.config.timing.clone());
        let execution = orchestrator.execute(&plan, &self.cancel).await;

        let launcher = PaneLauncher::new(self.driver.clone(), self.dialects.clone());
        let mut launch_panes = Vec::new();
        for session in &execution.sessions {
            for pane in &session.panes {
                launch_panes.push((session.name.as_str(), pane));
            }
        }
        let launch = launcher.launch_all(&launch_panes, &self.cancel).await;

        if let Some(prompt) = prompt {
            let injector = PromptInjector::new(self.driver.clone(), self.dialects.clone(), self.config.timing.line_stream_delay);
            for session in &execution.sessions {
                let created_panes: Vec<&crate::orchestrator::CreatedPane> = session.panes.iter().collect();
                injector.inject_all(&created_panes, prompt, &self.cancel).await;
            }
        }

        self.persist_execution(root, &execution).await?;

        self.emit(
            "swarm created",
            Some(json!({
                "execution": execution,
                "launch": launch,
            })),
        );
        Ok(0)
    }

    async fn persist_execution(&self, root: &Path, execution: &crate::orchestrator::ExecutionResult) -> Result<()> {
        let path = self.swarm_state_path(root);
        let text = serde_json::to_string_pretty(execution)?;
        write_text_atomic(&path, &text).await
    }

    fn swarm_state_path(&self, root: &Path) -> PathBuf {
        let slug: String = root.display().to_string().chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect();
        self.state_dir().join("swarm").join(format!("{slug}.json"))
    }

    async fn load_execution(&self, root: &Path) -> Result<crate::orchestrator::ExecutionResult> {
        let path = self.swarm_state_path(root);
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("no recorded swarm creation for '{}'; run `paneswarm create` first", root.display()))?;
        Ok(serde_json::from_str(&text)?)
    }

    // -- Health Tracker ---------------------------------------------------

    /// Builds a point-in-time snapshot by capturing every known pane of
    /// `session` fresh: a one-shot CLI invocation has no access to the
    /// long-lived, in-process `HealthTracker::global()` a real supervisor
    /// daemon would retain across polls (spec §9 "Global mutable state"),
    /// so this records each pane's activity/error state as of *this* call
    /// before snapshotting. See DESIGN.md.
    async fn health(&self, session: &str, pane_filter: Option<usize>, status_filter: Option<&str>) -> Result<i32> {
        let execution = self.load_execution(Path::new(".")).await.or_else(|_| {
            bail!("no swarm state recorded; pass the same root used for `paneswarm create`")
        })?;
        let created = execution
            .sessions
            .iter()
            .find(|s| s.name == session)
            .with_context(|| format!("session '{session}' not found in recorded swarm state"))?;

        let tracker = HealthTracker::new(self.config.health);
        let now = Utc::now();
        for pane in &created.panes {
            tracker.register_pane(session, pane.pane_id.clone(), pane.pane_index, pane.agent_kind.clone()).await;
            let capture = self.driver.capture_pane(&pane.pane_id, 200).await.unwrap_or_default();
            let dialect = self.dialects.get(&pane.agent_kind)?;
            match dialect.classify_capture(&capture) {
                crate::dialect::OutputClass::Errored => {
                    tracker.record_error(session, &pane.pane_id, "classified", "pane output matched an error pattern", now).await;
                }
                crate::dialect::OutputClass::RateLimited => {
                    tracker.record_error(session, &pane.pane_id, "rate_limited", "pane output matched a rate-limit pattern", now).await;
                }
                _ => {
                    tracker.record_activity(session, &pane.pane_id, now).await;
                }
            }
        }

        let mut snapshot = tracker.snapshot(session).await;
        if let Some(index) = pane_filter {
            snapshot = snapshot.filter_by_pane_index(index);
        }
        if let Some(status) = status_filter {
            let parsed = match status {
                "ok" => Status::Ok,
                "warning" => Status::Warning,
                "error" => Status::Error,
                _ => Status::Unknown,
            };
            snapshot = snapshot.filter_by_status(parsed);
        }

        let code = match snapshot.overall {
            Status::Error => 2,
            Status::Warning => 1,
            _ => 0,
        };
        self.emit("health snapshot", Some(serde_json::to_value(&snapshot)?));
        Ok(code)
    }

    // -- Reservation Coordinator ------------------------------------------

    fn reservation_log_path(&self) -> PathBuf {
        self.state_dir().join("reservations.db")
    }

    async fn build_reservation_coordinator(&self, mail_url: Option<&str>) -> Result<(ReservationCoordinator, Vec<Reservation>, i64)> {
        let (reservations, next_id) = load_reservation_log(&self.reservation_log_path()).await?;
        let mail: Option<Arc<dyn MailClient>> = mail_url.map(|url| Arc::new(HttpMailClient::new(url)) as Arc<dyn MailClient>);
        let coordinator = ReservationCoordinator::with_reservations(self.config.staleness, mail, reservations.clone(), next_id);
        Ok((coordinator, reservations, next_id))
    }

    async fn reserve(&self, action: &ReserveAction) -> Result<i32> {
        match action {
            ReserveAction::Acquire { agent, patterns, exclusive, ttl_secs, reason } => {
                let (coordinator, _, _) = self.build_reservation_coordinator(None).await?;
                let reservation = coordinator
                    .acquire(agent, patterns.clone(), *exclusive, Duration::from_secs(*ttl_secs), reason)
                    .await?;
                append_reservation_event(&self.reservation_log_path(), ReservationEventKind::Acquired(reservation.clone())).await?;
                self.emit("reservation acquired", Some(serde_json::to_value(&reservation)?));
                Ok(0)
            }
            ReserveAction::List { agent, all } => {
                let (coordinator, _, _) = self.build_reservation_coordinator(None).await?;
                let list = coordinator.list(None, agent.as_deref(), *all).await;
                self.emit("active reservations", Some(serde_json::to_value(&list)?));
                Ok(0)
            }
            ReserveAction::Renew { agent, id, extend_secs } => {
                let (coordinator, _, _) = self.build_reservation_coordinator(None).await?;
                let renewed = coordinator.renew(agent, *id, Duration::from_secs(*extend_secs)).await?;
                append_reservation_event(
                    &self.reservation_log_path(),
                    ReservationEventKind::Renewed { id: renewed.id, expires_at: renewed.expires_at },
                )
                .await?;
                self.emit("reservation renewed", Some(serde_json::to_value(&renewed)?));
                Ok(0)
            }
            ReserveAction::Release { id, note, notify, last_activity, mail_url } => {
                let (coordinator, _, _) = self.build_reservation_coordinator(mail_url.as_deref()).await?;
                let last_activity = last_activity.unwrap_or_else(Utc::now);
                let outcome = coordinator.force_release(*id, last_activity, note, *notify).await?;
                if outcome.success {
                    append_reservation_event(&self.reservation_log_path(), ReservationEventKind::Released { id: *id }).await?;
                }
                self.emit("force-release result", Some(serde_json::to_value(&outcome)?));
                Ok(if outcome.success { 0 } else { 2 })
            }
        }
    }

    // -- Ensemble Engine ---------------------------------------------------

    fn preset_paths(&self) -> (PathBuf, PathBuf) {
        let user_global = dirs::config_dir().unwrap_or_else(std::env::temp_dir).join("paneswarm").join("ensembles.toml");
        let project_local = self.state_dir().join("ensembles-imported.toml");
        (user_global, project_local)
    }

    fn load_presets(&self) -> Result<PresetRegistry> {
        let (user_global, project_local) = self.preset_paths();
        Ok(PresetRegistry::load_layered(Some(&user_global), Some(&project_local))?)
    }

    fn build_ensemble_engine(&self) -> EnsembleEngine {
        EnsembleEngine::new(
            self.driver.clone(),
            self.dialects.clone(),
            self.state_dir().join("ensembles"),
            self.config.ensemble.poll_interval,
            self.config.ensemble.stop_timeout,
        )
    }

    async fn ensemble(&self, action: &EnsembleAction) -> Result<i32> {
        match action {
            EnsembleAction::Presets => {
                let registry = self.load_presets()?;
                self.emit("available presets", Some(serde_json::to_value(registry.names())?));
                Ok(0)
            }
            EnsembleAction::ImportPreset { file, into } => {
                let text = tokio::fs::read_to_string(file).await?;
                let mut registry = self.load_presets()?;
                let imported: preset::Preset = toml::from_str::<ImportedOne>(&text).map(|w| w.presets.into_iter().next()).ok().flatten().context("preset file has no [[presets]] entries")?;
                let source = if into == "user-global" { PresetSource::UserGlobal } else { PresetSource::ProjectLocal };
                registry.import(imported, source)?;

                let (user_global, project_local) = self.preset_paths();
                let target = if source == PresetSource::UserGlobal { &user_global } else { &project_local };
                let layer_text = preset::write_layer_toml(&registry.layer(source))?;
                write_text_atomic(target, &layer_text).await?;

                self.emit("preset imported", Some(json!({ "into": into })));
                Ok(0)
            }
            EnsembleAction::ExportPreset { name, out } => {
                let registry = self.load_presets()?;
                let preset = registry.get(name)?;
                let text = preset::to_file_toml(&preset)?;
                if let Some(path) = out {
                    write_text_atomic(path, &text).await?;
                } else {
                    println!("{text}");
                }
                Ok(0)
            }
            EnsembleAction::Start { preset, question, session, strategy } => {
                let registry = self.load_presets()?;
                let preset_def = registry.get(preset)?;
                let session_name = session.clone().unwrap_or_else(|| format!("ensemble_{}", Utc::now().timestamp()));

                let (pool, pane_registry) = self.spawn_ensemble_panes(&session_name, &preset_def).await?;
                let strategy = parse_assignment_strategy(strategy);

                let engine = self.build_ensemble_engine();
                let result = engine.start(&session_name, &preset_def, question, &pool, &pane_registry, strategy, &self.cancel).await?;
                self.emit("ensemble started", Some(serde_json::to_value(&result)?));
                Ok(0)
            }
            EnsembleAction::Poll { session } => {
                let engine = self.build_ensemble_engine();
                let mut ensemble_session = engine.load(session).await?;
                let registry = self.rebuild_pane_registry(&ensemble_session);
                engine.poll_once(&mut ensemble_session, &registry).await?;
                self.emit("ensemble polled", Some(serde_json::to_value(&ensemble_session)?));
                Ok(0)
            }
            EnsembleAction::Run { session } => {
                let engine = self.build_ensemble_engine();
                let mut ensemble_session = engine.load(session).await?;
                let registry = self.rebuild_pane_registry(&ensemble_session);
                engine.run_until_terminal(&mut ensemble_session, &registry, &self.cancel).await?;
                self.emit("ensemble run complete", Some(serde_json::to_value(&ensemble_session)?));
                Ok(0)
            }
            EnsembleAction::Synthesize { session } => {
                let engine = self.build_ensemble_engine();
                let mut ensemble_session = engine.load(session).await?;
                let checkpoints = CheckpointStore::new(self.state_dir().join("checkpoints"));
                let chunks = engine.synthesize_streaming(&mut ensemble_session, &checkpoints, session, &self.cancel).await?;
                self.emit(
                    "synthesis streamed",
                    Some(json!({ "chunks": chunks, "status": ensemble_session.status, "synthesis": ensemble_session.synthesis })),
                );
                Ok(0)
            }
            EnsembleAction::Stop { session, no_collect } => {
                let engine = self.build_ensemble_engine();
                let mut ensemble_session = engine.load(session).await?;
                let registry = self.rebuild_pane_registry(&ensemble_session);
                engine.stop(&mut ensemble_session, &registry, !no_collect).await?;
                self.emit("ensemble stopped", Some(serde_json::to_value(&ensemble_session)?));
                Ok(0)
            }
            EnsembleAction::Export { session, selection, project } => {
                let engine = self.build_ensemble_engine();
                let ensemble_session = engine.load(session).await?;
                let merge = engine.load_merge(&ensemble_session).await?;
                let indices = export::parse_selection(selection, &merge.merged)?;
                let bead = BeadCli::default();
                let exported = export::export_findings(&bead, project, &merge.merged, &indices).await?;
                self.emit("findings exported", Some(serde_json::to_value(&exported)?));
                Ok(0)
            }
            EnsembleAction::CleanCheckpoints { all, older_than_days } => {
                let checkpoints = CheckpointStore::new(self.state_dir().join("checkpoints"));
                let max_age = if *all {
                    None
                } else {
                    Some(Duration::from_secs(older_than_days.unwrap_or(7) * 24 * 3600))
                };
                let removed = checkpoints.clean(max_age).await?;
                self.emit("checkpoints cleaned", Some(json!({ "removed": removed })));
                Ok(0)
            }
        }
    }

    /// Creates one fresh tmux session with one pane per preset mode,
    /// launches the mode's preferred agent kind (or a round-robin default)
    /// in each, and returns the assignment pool plus the pane registry the
    /// Ensemble Engine needs (spec §4.6.2 "a fresh session or existing").
    async fn spawn_ensemble_panes(
        &self,
        session_name: &str,
        preset: &preset::Preset,
    ) -> Result<(Vec<crate::ensemble::assignment::AvailablePane>, PaneRegistry)> {
        const FALLBACK_KINDS: [crate::dialect::AgentKind; 3] =
            [crate::dialect::AgentKind::ClaudeCode, crate::dialect::AgentKind::Codex, crate::dialect::AgentKind::Gemini];

        let launcher = PaneLauncher::new(self.driver.clone(), self.dialects.clone());
        let mut pool = Vec::new();
        let mut registry = PaneRegistry::new();

        for (index, mode) in preset.modes.iter().enumerate() {
            let kind = mode.preferred_agent.clone().unwrap_or_else(|| FALLBACK_KINDS[index % FALLBACK_KINDS.len()].clone());
            let pane_id = if index == 0 {
                self.driver.create_session(session_name, None).await?
            } else {
                self.driver.split_pane(session_name, None).await?
            };
            let pane_name = format!("{session_name}__{}_{index}", kind);
            self.driver.set_pane_title(&pane_id, &pane_name).await?;
            launcher.launch(session_name, &pane_id, &kind).await?;

            pool.push(crate::ensemble::assignment::AvailablePane { pane_name: pane_name.clone(), agent_kind: kind.clone() });
            registry.insert(pane_name, (pane_id, kind));
        }

        Ok((pool, registry))
    }

    /// Rebuilds the ensemble's pane registry from its own assignments: the
    /// pane name encodes agent kind (spec §3 title convention) and the
    /// multiplexer's pane id is looked up fresh each invocation since a
    /// one-shot CLI process keeps no driver handle across calls.
    fn rebuild_pane_registry(&self, session: &EnsembleSession) -> PaneRegistry {
        let mut registry = PaneRegistry::new();
        for assignment in &session.assignments {
            registry.insert(assignment.pane_name.clone(), (PaneId(assignment.pane_name.clone()), assignment.agent_kind.clone()));
        }
        registry
    }

    // -- Shutdown Supervisor ------------------------------------------------

    async fn shutdown(&self, patterns: &[String], timeout_secs: Option<u64>) -> Result<i32> {
        let patterns = if patterns.is_empty() { self.config.shutdown.session_glob_patterns.clone() } else { patterns.to_vec() };
        let timeout = timeout_secs.map(Duration::from_secs).unwrap_or(self.config.shutdown.graceful_timeout);

        let supervisor = ShutdownSupervisor::new(self.driver.clone(), self.dialects.clone(), timeout);
        let report = supervisor.shutdown(&patterns, &[], &self.cancel).await?;
        self.emit("shutdown complete", Some(serde_json::to_value(&report)?));
        Ok(if report.errors.is_empty() { 0 } else { 2 })
    }
}

fn parse_assignment_strategy(s: &str) -> AssignmentStrategy {
    match s {
        "round-robin" => AssignmentStrategy::RoundRobin,
        "any" => AssignmentStrategy::Any,
        _ => AssignmentStrategy::Affinity,
    }
}

#[derive(Debug, Deserialize)]
struct ImportedOne {
    presets: Vec<preset::Preset>,
}

// -- reservations.db: an append-only JSON-lines event log -------------------
//
// Each CLI invocation is a fresh process with no in-memory carryover from
// the last one (spec §9); `ReservationCoordinator` itself only holds live
// state for the invocation that created it. This log is what makes
// `reserve acquire`/`list`/`renew`/`release` behave like one continuous
// coordinator across separate command runs (spec §6 "reservations.db:
// append-only log of Reservation events").

use crate::reservation::Reservation;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReservationEvent {
    at: DateTime<Utc>,
    #[serde(flatten)]
    kind: ReservationEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ReservationEventKind {
    Acquired(Reservation),
    Renewed { id: i64, expires_at: DateTime<Utc> },
    Released { id: i64 },
}

async fn load_reservation_log(path: &Path) -> Result<(Vec<Reservation>, i64)> {
    let mut reservations: Vec<Reservation> = Vec::new();
    let mut max_id = 0i64;

    let Ok(text) = tokio::fs::read_to_string(path).await else {
        return Ok((reservations, 1));
    };

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let event: ReservationEvent = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping malformed reservations.db line");
                continue;
            }
        };
        match event.kind {
            ReservationEventKind::Acquired(r) => {
                max_id = max_id.max(r.id);
                reservations.push(r);
            }
            ReservationEventKind::Renewed { id, expires_at } => {
                if let Some(existing) = reservations.iter_mut().find(|r| r.id == id) {
                    existing.expires_at = expires_at;
                }
            }
            ReservationEventKind::Released { id } => {
                reservations.retain(|r| r.id != id);
            }
        }
    }

    Ok((reservations, max_id + 1))
}

async fn append_reservation_event(path: &Path, kind: ReservationEventKind) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let event = ReservationEvent { at: Utc::now(), kind };
    let mut line = serde_json::to_string(&event)?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn write_text_atomic(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, text).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reservation_log_round_trips_acquire_renew_release() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("reservations.db");

        let reservation = Reservation {
            id: 1,
            agent: "alpha".to_string(),
            patterns: vec!["src/**/*.go".to_string()],
            exclusive: true,
            expires_at: Utc::now() + chrono::Duration::hours(1),
            reason: "refactor".to_string(),
        };
        append_reservation_event(&path, ReservationEventKind::Acquired(reservation.clone())).await.unwrap();

        let (loaded, next_id) = load_reservation_log(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(next_id, 2);

        let new_expiry = Utc::now() + chrono::Duration::hours(2);
        append_reservation_event(&path, ReservationEventKind::Renewed { id: 1, expires_at: new_expiry }).await.unwrap();
        let (loaded, _) = load_reservation_log(&path).await.unwrap();
        assert_eq!(loaded[0].expires_at, new_expiry);

        append_reservation_event(&path, ReservationEventKind::Released { id: 1 }).await.unwrap();
        let (loaded, _) = load_reservation_log(&path).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn missing_log_file_yields_empty_state_and_first_id() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("does-not-exist.db");
        let (reservations, next_id) = load_reservation_log(&path).await.unwrap();
        assert!(reservations.is_empty());
        assert_eq!(next_id, 1);
    }
}
