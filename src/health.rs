//! Health Tracker: a process-wide, session-keyed registry of rolling pane
//! metrics, plus a filtered snapshot query. See spec §4.4 and §3
//! (`AgentHealth`, `HealthMetrics`).
//!
//! Owned by a single process-scoped registry (spec §9 "Global mutable
//! state") exposed through `HealthTracker::global()` so tests can
//! substitute a fresh instance instead of a shared static.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::HealthThresholds;
use crate::dialect::AgentKind;
use crate::tmux::PaneId;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("no metrics recorded for pane {0}")]
    NotFound(String),
}

/// Overall status bucket for a pane or a session rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Unknown,
    Ok,
    Warning,
    Error,
}

/// Activity bucket derived from idle duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Active,
    Idle,
    Stale,
    Unknown,
}

/// A recorded error, kept as the "last error" for a pane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Per-pane rolling metrics owned by the tracker, spec §3 `HealthMetrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_error: Option<LastError>,
    /// crash timestamps in the trailing restart window, pruned lazily.
    pub restarts: Vec<DateTime<Utc>>,
}

/// A point-in-time derived view of one pane, spec §3 `AgentHealth`.
///
/// The spec's source encodes uptime/idle as a single signed field
/// (negative = uptime seconds). This reimplementation uses two separate
/// fields and a display helper instead - see spec §9 "a faithful
/// reimplementation should use two separate fields ... the encoding is
/// noted only so a reader of the source isn't surprised by it."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub pane_index: usize,
    pub pane_id: PaneId,
    pub agent_kind: AgentKind,
    pub status: Status,
    pub activity: Activity,
    pub uptime_seconds: i64,
    pub idle_seconds: i64,
    pub issues: Vec<String>,
}

/// A session-level rollup, spec §4.4 `snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHealth {
    pub session: String,
    pub panes: Vec<AgentHealth>,
    pub healthy: usize,
    pub warning: usize,
    pub error: usize,
    pub unknown: usize,
    pub overall: Status,
}

impl SessionHealth {
    fn recompute_from(session: String, panes: Vec<AgentHealth>) -> Self {
        let healthy = panes.iter().filter(|p| p.status == Status::Ok).count();
        let warning = panes.iter().filter(|p| p.status == Status::Warning).count();
        let error = panes.iter().filter(|p| p.status == Status::Error).count();
        let unknown = panes.iter().filter(|p| p.status == Status::Unknown).count();
        let overall = max_severity(&panes);
        Self { session, panes, healthy, warning, error, unknown, overall }
    }

    /// Externally composed filters (pane index, status) must recompute
    /// summary counts and overall status from the filtered set (spec
    /// §4.4). Any filter that removes panes cannot increase severity
    /// (spec §8 monotonicity property) because `max_severity` over a
    /// subset is never greater than over the superset.
    pub fn filter_by_status(&self, status: Status) -> SessionHealth {
        let panes: Vec<AgentHealth> = self.panes.iter().filter(|p| p.status == status).cloned().collect();
        SessionHealth::recompute_from(self.session.clone(), panes)
    }

    pub fn filter_by_pane_index(&self, index: usize) -> SessionHealth {
        let panes: Vec<AgentHealth> = self.panes.iter().filter(|p| p.pane_index == index).cloned().collect();
        SessionHealth::recompute_from(self.session.clone(), panes)
    }
}

fn max_severity(panes: &[AgentHealth]) -> Status {
    panes.iter().map(|p| p.status).max().unwrap_or(Status::Unknown)
}

/// The process-wide registry: session name -> pane id -> metrics.
pub struct HealthTracker {
    thresholds: HealthThresholds,
    rows: RwLock<HashMap<String, HashMap<PaneId, HealthMetrics>>>,
    /// kind/index recorded alongside metrics so `snapshot` can rebuild
    /// `AgentHealth` without a second lookup table.
    identity: RwLock<HashMap<(String, PaneId), (usize, AgentKind)>>,
}

static GLOBAL: OnceLock<Arc<HealthTracker>> = OnceLock::new();

impl HealthTracker {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds, rows: RwLock::new(HashMap::new()), identity: RwLock::new(HashMap::new()) }
    }

    /// The process-scoped singleton, initialized on first use. Tests should
    /// prefer `HealthTracker::new` directly over this accessor.
    pub fn global() -> Arc<HealthTracker> {
        GLOBAL.get_or_init(|| Arc::new(HealthTracker::new(HealthThresholds::default()))).clone()
    }

    /// Registers a pane's static identity (kind, index) so later snapshots
    /// can report it; called once by the Pane Launcher right after a pane
    /// is created.
    pub async fn register_pane(&self, session: &str, pane: PaneId, pane_index: usize, kind: AgentKind) {
        self.identity.write().await.insert((session.to_string(), pane.clone()), (pane_index, kind));
        let mut rows = self.rows.write().await;
        let session_rows = rows.entry(session.to_string()).or_default();
        session_rows.entry(pane).or_insert_with(|| HealthMetrics {
            first_seen: Utc::now(),
            last_activity: Utc::now(),
            last_error: None,
            restarts: Vec::new(),
        });
    }

    pub async fn record_activity(&self, session: &str, pane: &PaneId, at: DateTime<Utc>) {
        let mut rows = self.rows.write().await;
        let session_rows = rows.entry(session.to_string()).or_default();
        let row = session_rows.entry(pane.clone()).or_insert_with(|| HealthMetrics {
            first_seen: at,
            last_activity: at,
            last_error: None,
            restarts: Vec::new(),
        });
        row.last_activity = at;
    }

    /// `kind == "crash"` appends to the restart window and prunes entries
    /// older than one hour (spec §4.4).
    pub async fn record_error(&self, session: &str, pane: &PaneId, kind: &str, message: &str, at: DateTime<Utc>) {
        let mut rows = self.rows.write().await;
        let session_rows = rows.entry(session.to_string()).or_default();
        let row = session_rows.entry(pane.clone()).or_insert_with(|| HealthMetrics {
            first_seen: at,
            last_activity: at,
            last_error: None,
            restarts: Vec::new(),
        });
        row.last_error = Some(LastError { kind: kind.to_string(), message: message.to_string(), at });

        if kind == "crash" {
            row.restarts.push(at);
            let cutoff = at - ChronoDuration::from_std(self.thresholds.restart_window).unwrap_or(ChronoDuration::hours(1));
            row.restarts.retain(|t| *t >= cutoff);
        }
    }

    pub async fn get(&self, session: &str, pane: &PaneId) -> Result<HealthMetrics, HealthError> {
        let rows = self.rows.read().await;
        rows.get(session)
            .and_then(|s| s.get(pane))
            .cloned()
            .ok_or_else(|| HealthError::NotFound(pane.to_string()))
    }

    /// Every known row plus its identity, for persisting to `health.json`
    /// between CLI invocations (SPEC_FULL §9; no literal file by this name
    /// appears in spec §6's layout, it's a supplement noted in DESIGN.md).
    pub async fn snapshot_rows(&self) -> Vec<(String, PaneId, AgentKind, usize, HealthMetrics)> {
        let rows = self.rows.read().await;
        let identity = self.identity.read().await;
        let mut out = Vec::new();
        for (session, panes) in rows.iter() {
            for (pane_id, metrics) in panes.iter() {
                let (pane_index, kind) = identity
                    .get(&(session.clone(), pane_id.clone()))
                    .cloned()
                    .unwrap_or((0, AgentKind::Custom("unknown".to_string())));
                out.push((session.clone(), pane_id.clone(), kind, pane_index, metrics.clone()));
            }
        }
        out
    }

    /// Restores one row loaded from `health.json`. `first_seen` is
    /// preserved from the persisted row rather than reset to now, so uptime
    /// stays meaningful across invocations.
    pub async fn restore_row(&self, session: &str, pane: PaneId, kind: AgentKind, pane_index: usize, metrics: HealthMetrics) {
        self.identity.write().await.insert((session.to_string(), pane.clone()), (pane_index, kind));
        let mut rows = self.rows.write().await;
        rows.entry(session.to_string()).or_default().insert(pane, metrics);
    }

    /// Rolls up every known pane in `session` into a `SessionHealth`, per
    /// the status/activity rules in spec §4.4.
    pub async fn snapshot(&self, session: &str) -> SessionHealth {
        self.snapshot_at(session, Utc::now()).await
    }

    async fn snapshot_at(&self, session: &str, now: DateTime<Utc>) -> SessionHealth {
        let rows = self.rows.read().await;
        let identity = self.identity.read().await;

        let panes = match rows.get(session) {
            Some(session_rows) => session_rows
                .iter()
                .map(|(pane_id, metrics)| {
                    let (pane_index, kind) = identity
                        .get(&(session.to_string(), pane_id.clone()))
                        .cloned()
                        .unwrap_or((0, AgentKind::Custom("unknown".to_string())));
                    self.derive(pane_index, pane_id.clone(), kind, metrics, now)
                })
                .collect(),
            None => Vec::new(),
        };

        SessionHealth::recompute_from(session.to_string(), panes)
    }

    fn derive(&self, pane_index: usize, pane_id: PaneId, kind: AgentKind, metrics: &HealthMetrics, now: DateTime<Utc>) -> AgentHealth {
        let uptime_seconds = (now - metrics.first_seen).num_seconds().max(0);
        let idle_seconds = (now - metrics.last_activity).num_seconds().max(0);

        let recent_error = metrics
            .last_error
            .as_ref()
            .map(|e| now - e.at <= ChronoDuration::from_std(self.thresholds.recent_error_window).unwrap_or(ChronoDuration::minutes(10)))
            .unwrap_or(false);

        // "unresolved": nothing has happened since the error was recorded.
        let unresolved_error = metrics.last_error.as_ref().map(|e| metrics.last_activity <= e.at).unwrap_or(false);

        let restarts_exceed = metrics.restarts.len() as u32 > self.thresholds.max_restarts_in_window;

        let status = if (recent_error && unresolved_error) || restarts_exceed {
            Status::Error
        } else if idle_seconds > self.thresholds.idle_threshold_secs || recent_error {
            Status::Warning
        } else {
            Status::Ok
        };

        let activity = if idle_seconds > self.thresholds.stale_threshold_secs {
            Activity::Stale
        } else if idle_seconds > self.thresholds.idle_threshold_secs {
            Activity::Idle
        } else {
            Activity::Active
        };

        let mut issues = Vec::new();
        if let Some(err) = &metrics.last_error {
            issues.push(format!("{}: {}", err.kind, err.message));
        }
        if restarts_exceed {
            issues.push(format!("{} restarts in trailing window", metrics.restarts.len()));
        }

        AgentHealth { pane_index, pane_id, agent_kind: kind, status, activity, uptime_seconds, idle_seconds, issues }
    }
}
