//! Swarm-wide configuration: tier thresholds, per-tier agent counts, timing
//! knobs and the single canonical staleness window.
//!
//! Loading a config *file* (TOML layered with environment overrides) is an
//! external collaborator's job per the design's scope notes; this module
//! only owns the resulting value and its defaults, the way `CcswarmConfig`
//! does in the teacher repo.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dialect::AgentKind;
use crate::project::Tier;

/// Per-tier `{cc, cod, gmi}` agent counts, see spec §4.1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierCounts {
    pub cc: u32,
    pub cod: u32,
    pub gmi: u32,
}

impl TierCounts {
    pub fn total(&self) -> u32 {
        self.cc + self.cod + self.gmi
    }

    pub fn get(&self, kind: &AgentKind) -> u32 {
        match kind {
            AgentKind::ClaudeCode => self.cc,
            AgentKind::Codex => self.cod,
            AgentKind::Gemini => self.gmi,
            AgentKind::Custom(_) => 0,
        }
    }
}

/// The static per-tier knob table referenced by the Allocation Calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTable {
    pub tier1: TierCounts,
    pub tier2: TierCounts,
    pub tier3: TierCounts,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tier1: TierCounts { cc: 4, cod: 4, gmi: 2 },
            tier2: TierCounts { cc: 3, cod: 3, gmi: 2 },
            tier3: TierCounts { cc: 1, cod: 1, gmi: 1 },
        }
    }
}

impl TierTable {
    pub fn for_tier(&self, tier: Tier) -> TierCounts {
        match tier {
            Tier::One => self.tier1,
            Tier::Two => self.tier2,
            Tier::Three => self.tier3,
        }
    }
}

/// Open-work count thresholds that derive a project's tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierThresholds {
    /// open-work count >= this -> Tier::One
    pub tier1_min: u64,
    /// open-work count >= this (and below tier1_min) -> Tier::Two
    pub tier2_min: u64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self { tier1_min: 400, tier2_min: 100 }
    }
}

impl TierThresholds {
    pub fn classify(&self, open_work: u64) -> Tier {
        if open_work >= self.tier1_min {
            Tier::One
        } else if open_work >= self.tier2_min {
            Tier::Two
        } else {
            Tier::Three
        }
    }
}

/// Timing knobs for the Session Orchestrator / Pane Launcher / Injector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub pane_creation_stagger: Duration,
    pub launch_settle_delay: Duration,
    pub injection_readiness_delay: Duration,
    /// micro-delay between lines for line-stream dialects
    pub line_stream_delay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pane_creation_stagger: Duration::from_millis(200),
            launch_settle_delay: Duration::from_millis(400),
            injection_readiness_delay: Duration::from_millis(500),
            line_stream_delay: Duration::from_millis(30),
        }
    }
}

/// Health Tracker thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub idle_threshold_secs: i64,
    pub stale_threshold_secs: i64,
    /// restarts within the trailing window that escalate status to error
    pub max_restarts_in_window: u32,
    pub restart_window: Duration,
    /// an error counts as "recent" for warning severity within this window
    pub recent_error_window: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            idle_threshold_secs: 120,
            stale_threshold_secs: 300,
            max_restarts_in_window: 2,
            restart_window: Duration::from_secs(3600),
            recent_error_window: Duration::from_secs(600),
        }
    }
}

/// Ensemble Engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub merge_similarity_threshold: f64,
    pub checkpoint_retention: Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            merge_similarity_threshold: 0.82,
            checkpoint_retention: Duration::from_secs(7 * 24 * 3600),
            poll_interval: Duration::from_millis(750),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// The canonical staleness window: the single source every staleness check
/// derives from (spec §9 open question resolution).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StalenessPolicy {
    pub window: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self { window: Duration::from_secs(600) }
    }
}

/// Shutdown Supervisor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    pub session_glob_patterns: Vec<String>,
    pub graceful_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            session_glob_patterns: vec![
                "cc_agents_*".to_string(),
                "cod_agents_*".to_string(),
                "gmi_agents_*".to_string(),
            ],
            graceful_timeout: Duration::from_secs(5),
        }
    }
}

/// Top-level configuration for the whole swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub tier_table: TierTable,
    pub tier_thresholds: TierThresholds,
    pub timing: TimingConfig,
    pub health: HealthThresholds,
    pub ensemble: EnsembleConfig,
    pub staleness: StalenessPolicy,
    pub shutdown: ShutdownConfig,
    /// sessions-per-type knob for the Allocation Calculator (§4.1)
    pub sessions_per_type: u32,
    /// panes-per-session; 0 triggers the ceil(total/(3*S)) computation
    pub panes_per_session: u32,
    /// extra environment variables applied to every launched pane
    pub global_env: HashMap<String, String>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            tier_table: TierTable::default(),
            tier_thresholds: TierThresholds::default(),
            timing: TimingConfig::default(),
            health: HealthThresholds::default(),
            ensemble: EnsembleConfig::default(),
            staleness: StalenessPolicy::default(),
            shutdown: ShutdownConfig::default(),
            sessions_per_type: 2,
            panes_per_session: 0,
            global_env: HashMap::new(),
        }
    }
}

impl SwarmConfig {
    /// Layer defaults with a user TOML file and environment overrides, the
    /// way the teacher layers `config::Config` builders. Missing files are
    /// not an error - the defaults above stand in.
    pub fn load(user_file: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&SwarmConfig::default())?);

        if let Some(path) = user_file {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PANESWARM")
                .separator("__")
                .try_parsing(true),
        );

        let settled = builder.build()?;
        Ok(settled.try_deserialize()?)
    }

    /// Directory where persisted state (ensembles, checkpoints, reservation
    /// log, imported presets) lives - see spec §6 "Persisted state layout".
    pub fn state_dir(&self) -> std::path::PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("paneswarm")
    }
}
