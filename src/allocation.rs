//! Allocation Calculator: the pure, deterministic function that turns a
//! weighted project list into a [`SwarmPlan`]. See spec §4.1.
//!
//! This module never touches the filesystem or the multiplexer - it is a
//! total function over its inputs, matching the "Failure: none" contract
//! in the spec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{SwarmConfig, TierCounts};
use crate::dialect::{AgentKind, DialectTable};
use crate::project::{tier_then_name_order, Project};

/// Per-project agent counts, derived from its tier via the static table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub project: Project,
    pub counts: TierCounts,
}

impl Allocation {
    pub fn total(&self) -> u32 {
        self.counts.total()
    }
}

/// One pane's assignment: which project, which agent kind, which launch
/// command. Index is unique within its owning [`SessionSpec`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaneSpec {
    pub index: usize,
    pub project_name: String,
    pub agent_kind: AgentKind,
    pub variant: Option<String>,
    pub launch_command: String,
}

impl PaneSpec {
    /// The canonical cross-component pane identity (spec §4.2 step 3).
    pub fn title(&self, session_name: &str) -> String {
        match &self.variant {
            Some(v) => format!("{session_name}__{}_{}_{v}", self.agent_kind, self.index),
            None => format!("{session_name}__{}_{}", self.agent_kind, self.index),
        }
    }
}

/// A homogeneous-kind group of panes sharing one multiplexer session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSpec {
    pub name: String,
    pub agent_kind: AgentKind,
    pub pane_count: usize,
    pub panes: Vec<PaneSpec>,
}

impl SessionSpec {
    /// Invariant check: `pane_count == len(panes)` and indices are unique.
    pub fn is_consistent(&self) -> bool {
        if self.pane_count != self.panes.len() {
            return false;
        }
        let mut indices: Vec<usize> = self.panes.iter().map(|p| p.index).collect();
        indices.sort_unstable();
        indices.windows(2).all(|w| w[0] != w[1])
    }
}

/// The full output of a planning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmPlan {
    pub scan_dir: std::path::PathBuf,
    // `BTreeMap`, not `HashMap`: iteration order feeds straight into this
    // plan's `serde_json` output, and the spec requires byte-identical JSON
    // for identical inputs (a `HashMap`'s order is seeded per-instance).
    pub totals: BTreeMap<AgentKind, u32>,
    pub total: u32,
    pub sessions_per_type: u32,
    pub panes_per_session: usize,
    pub allocations: Vec<Allocation>,
    pub sessions: Vec<SessionSpec>,
    pub created_at: DateTime<Utc>,
}

impl SwarmPlan {
    /// `sum_over_sessions(pane_count) == total_agents` (spec §8).
    pub fn pane_total(&self) -> usize {
        self.sessions.iter().map(|s| s.pane_count).sum()
    }
}

const KINDS: [AgentKind; 3] = [AgentKind::ClaudeCode, AgentKind::Codex, AgentKind::Gemini];

/// `plan(scanDir, projects, knobs) -> SwarmPlan` per spec §4.1. Total,
/// deterministic function: same inputs produce byte-identical JSON. The
/// dialect table is a pure lookup (no I/O) consulted only for each pane's
/// static launch command string.
pub fn plan(
    scan_dir: &std::path::Path,
    projects: &[Project],
    config: &SwarmConfig,
    dialects: &DialectTable,
    created_at: DateTime<Utc>,
) -> SwarmPlan {
    let mut ordered: Vec<Project> = projects.to_vec();
    tier_then_name_order(&mut ordered);

    let allocations: Vec<Allocation> = ordered
        .iter()
        .map(|p| Allocation {
            project: p.clone(),
            counts: config.tier_table.for_tier(p.tier),
        })
        .collect();

    let mut totals: BTreeMap<AgentKind, u32> = BTreeMap::new();
    for kind in &KINDS {
        totals.insert(kind.clone(), allocations.iter().map(|a| a.counts.get(kind)).sum());
    }
    let total: u32 = totals.values().sum();

    let sessions_per_type = config.sessions_per_type.max(1);
    let sessions = build_sessions(&allocations, &totals, sessions_per_type, config.panes_per_session, dialects);

    let panes_per_session = resolve_panes_per_session(total, sessions_per_type, config.panes_per_session);

    SwarmPlan {
        scan_dir: scan_dir.to_path_buf(),
        totals,
        total,
        sessions_per_type,
        panes_per_session,
        allocations,
        sessions,
        created_at,
    }
}

/// `panes_per_session=0` triggers `ceil(total/(3*S))` clamped to [1,20]
/// (spec §8 boundary behavior).
fn resolve_panes_per_session(total: u32, sessions_per_type: u32, configured: u32) -> usize {
    if configured > 0 {
        return configured as usize;
    }
    if total == 0 {
        return 1;
    }
    let denom = (3 * sessions_per_type).max(1) as u64;
    let computed = (total as u64).div_ceil(denom);
    computed.clamp(1, 20) as usize
}

/// For each agent kind, build `sessions_per_type` sessions named
/// `{kind}_agents_{k}` and fill panes round-robin over projects in
/// tier-then-alphabetical order, per spec §4.1.
fn build_sessions(
    allocations: &[Allocation],
    totals: &BTreeMap<AgentKind, u32>,
    sessions_per_type: u32,
    configured_panes_per_session: u32,
    dialects: &DialectTable,
) -> Vec<SessionSpec> {
    let mut sessions = Vec::new();

    for kind in &KINDS {
        let launch_command = dialects
            .get(kind)
            .map(|d| d.launch_command.to_string())
            .unwrap_or_default();
        let kind_total = *totals.get(kind).unwrap_or(&0);
        let panes_per_session = resolve_panes_per_session(kind_total, sessions_per_type, configured_panes_per_session);

        // Flatten this kind's agent slots across allocations, preserving
        // tier-then-name order, then round-robin them into S sessions so no
        // single session is saturated with one project (spec §4.1).
        let mut slots: Vec<(&Allocation, u32)> = Vec::new();
        for alloc in allocations {
            let count = alloc.counts.get(kind);
            for variant_index in 0..count {
                slots.push((alloc, variant_index));
            }
        }

        let mut per_session_panes: Vec<Vec<PaneSpec>> = (0..sessions_per_type).map(|_| Vec::new()).collect();
        for (i, (alloc, _variant_index)) in slots.iter().enumerate() {
            let session_idx = i % sessions_per_type as usize;
            let pane_index = per_session_panes[session_idx].len();
            per_session_panes[session_idx].push(PaneSpec {
                index: pane_index,
                project_name: alloc.project.name.clone(),
                agent_kind: kind.clone(),
                variant: None,
                launch_command: launch_command.clone(),
            });
        }

        for (k, panes) in per_session_panes.into_iter().enumerate() {
            let _ = panes_per_session; // panes_per_session informs capacity only; actual fill is driven by slot count
            sessions.push(SessionSpec {
                name: format!("{}_agents_{}", kind.short_code(), k),
                agent_kind: kind.clone(),
                pane_count: panes.len(),
                panes,
            });
        }
    }

    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TierCounts, TierTable, TierThresholds};
    use crate::dialect::DialectTable;
    use crate::project::Tier;

    fn project(name: &str, open_work: u64, thresholds: &TierThresholds) -> Project {
        Project::new(name, std::path::PathBuf::from(format!("/{name}")), open_work, thresholds)
    }

    fn scenario_config() -> SwarmConfig {
        let mut cfg = SwarmConfig::default();
        cfg.tier_table = TierTable {
            tier1: TierCounts { cc: 4, cod: 4, gmi: 2 },
            tier2: TierCounts { cc: 3, cod: 3, gmi: 2 },
            tier3: TierCounts { cc: 1, cod: 1, gmi: 1 },
        };
        cfg.sessions_per_type = 2;
        cfg.panes_per_session = 0;
        cfg
    }

    #[test]
    fn tiered_plan_matches_spec_scenario_one() {
        let thresholds = TierThresholds::default();
        let projects = vec![
            project("A", 500, &thresholds),
            project("B", 150, &thresholds),
            project("C", 20, &thresholds),
        ];
        assert_eq!(projects[0].tier, Tier::One);
        assert_eq!(projects[1].tier, Tier::Two);
        assert_eq!(projects[2].tier, Tier::Three);

        let cfg = scenario_config();
        let dialects = DialectTable::built_in().unwrap();
        let swarm_plan = plan(std::path::Path::new("/scan"), &projects, &cfg, &dialects, Utc::now());

        assert_eq!(*swarm_plan.totals.get(&AgentKind::ClaudeCode).unwrap(), 8);
        assert_eq!(*swarm_plan.totals.get(&AgentKind::Codex).unwrap(), 8);
        assert_eq!(*swarm_plan.totals.get(&AgentKind::Gemini).unwrap(), 5);
        assert_eq!(swarm_plan.total, 21);
        assert_eq!(swarm_plan.panes_per_session, 4);

        let names: Vec<&str> = swarm_plan.sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "cc_agents_0",
                "cc_agents_1",
                "cod_agents_0",
                "cod_agents_1",
                "gmi_agents_0",
                "gmi_agents_1",
            ]
        );

        let pane_counts: Vec<usize> = swarm_plan.sessions.iter().map(|s| s.pane_count).collect();
        assert_eq!(pane_counts, vec![4, 4, 4, 4, 3, 2]);
    }

    #[test]
    fn empty_project_list_yields_zero_totals_not_an_error() {
        let cfg = scenario_config();
        let dialects = DialectTable::built_in().unwrap();
        let swarm_plan = plan(std::path::Path::new("/scan"), &[], &cfg, &dialects, Utc::now());
        assert_eq!(swarm_plan.total, 0);
        assert!(swarm_plan.sessions.iter().all(|s| s.pane_count == 0));
    }

    #[test]
    fn plan_is_deterministic() {
        let thresholds = TierThresholds::default();
        let projects = vec![project("A", 500, &thresholds), project("B", 150, &thresholds)];
        let cfg = scenario_config();
        let dialects = DialectTable::built_in().unwrap();
        let ts = Utc::now();

        let a = plan(std::path::Path::new("/scan"), &projects, &cfg, &dialects, ts);
        let b = plan(std::path::Path::new("/scan"), &projects, &cfg, &dialects, ts);

        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn pane_total_equals_total_agents() {
        let thresholds = TierThresholds::default();
        let projects = vec![
            project("A", 500, &thresholds),
            project("B", 150, &thresholds),
            project("C", 20, &thresholds),
        ];
        let cfg = scenario_config();
        let dialects = DialectTable::built_in().unwrap();
        let swarm_plan = plan(std::path::Path::new("/scan"), &projects, &cfg, &dialects, Utc::now());
        assert_eq!(swarm_plan.pane_total() as u32, swarm_plan.total);
    }

    #[test]
    fn panes_per_session_zero_triggers_ceil_clamped() {
        assert_eq!(resolve_panes_per_session(21, 2, 0), 4);
        assert_eq!(resolve_panes_per_session(0, 2, 0), 1);
        assert_eq!(resolve_panes_per_session(1000, 1, 0), 20);
    }

    #[test]
    fn session_specs_are_internally_consistent() {
        let thresholds = TierThresholds::default();
        let projects = vec![project("A", 500, &thresholds)];
        let cfg = scenario_config();
        let dialects = DialectTable::built_in().unwrap();
        let swarm_plan = plan(std::path::Path::new("/scan"), &projects, &cfg, &dialects, Utc::now());
        for session in &swarm_plan.sessions {
            assert!(session.is_consistent());
        }
    }
}
