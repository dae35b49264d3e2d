//! Assignment planning: pairs each reasoning mode in a preset to exactly
//! one available agent pane. See spec §4.6.2.

use serde::{Deserialize, Serialize};

use crate::dialect::AgentKind;
use crate::ensemble::preset::{ModeDef, Preset};

#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("no available pane for mode '{0}'")]
    NoPaneAvailable(String),
}

/// Strategies for pairing a mode to a pane, spec §4.6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Preferred agent kind per mode.
    Affinity,
    RoundRobin,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Injecting,
    Active,
    Done,
    Errored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub mode_id: String,
    pub mode_code: String,
    pub agent_kind: AgentKind,
    pub pane_name: String,
    pub status: AssignmentStatus,
}

/// An available pane in the pool: its title and agent kind, per spec
/// "available pool of agent panes (either newly spawned ... or existing)".
#[derive(Debug, Clone)]
pub struct AvailablePane {
    pub pane_name: String,
    pub agent_kind: AgentKind,
}

/// Pairs every mode in `preset` to exactly one pane in `pool`, per the
/// chosen strategy. Fails only if the pool runs out before every mode is
/// assigned.
pub fn assign(preset: &Preset, pool: &[AvailablePane], strategy: AssignmentStrategy) -> Result<Vec<Assignment>, AssignmentError> {
    let mut remaining: Vec<AvailablePane> = pool.to_vec();
    let mut assignments = Vec::new();

    for mode in &preset.modes {
        let index = match strategy {
            AssignmentStrategy::Affinity => pick_affinity(mode, &remaining),
            AssignmentStrategy::RoundRobin => {
                if remaining.is_empty() {
                    None
                } else {
                    Some(assignments.len() % remaining.len())
                }
            }
            AssignmentStrategy::Any => remaining.iter().position(|_| true),
        };

        let index = index.ok_or_else(|| AssignmentError::NoPaneAvailable(mode.id.clone()))?;
        let pane = remaining.remove(index);

        assignments.push(Assignment {
            mode_id: mode.id.clone(),
            mode_code: mode.code.clone(),
            agent_kind: pane.agent_kind,
            pane_name: pane.pane_name,
            status: AssignmentStatus::Pending,
        });
    }

    Ok(assignments)
}

fn pick_affinity(mode: &ModeDef, remaining: &[AvailablePane]) -> Option<usize> {
    if let Some(preferred) = &mode.preferred_agent {
        if let Some(idx) = remaining.iter().position(|p| &p.agent_kind == preferred) {
            return Some(idx);
        }
    }
    // fall back to any available pane rather than failing outright
    remaining.iter().position(|_| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::preset::built_in_presets;

    fn pool() -> Vec<AvailablePane> {
        vec![
            AvailablePane { pane_name: "p0".into(), agent_kind: AgentKind::ClaudeCode },
            AvailablePane { pane_name: "p1".into(), agent_kind: AgentKind::Codex },
            AvailablePane { pane_name: "p2".into(), agent_kind: AgentKind::Gemini },
        ]
    }

    #[test]
    fn affinity_matches_preferred_agent_kind() {
        let preset = built_in_presets().remove(0);
        let assignments = assign(&preset, &pool(), AssignmentStrategy::Affinity).unwrap();
        assert_eq!(assignments[0].agent_kind, AgentKind::ClaudeCode);
        assert_eq!(assignments[1].agent_kind, AgentKind::Codex);
        assert_eq!(assignments[2].agent_kind, AgentKind::Gemini);
    }

    #[test]
    fn every_assignment_maps_to_one_distinct_pane() {
        let preset = built_in_presets().remove(0);
        let assignments = assign(&preset, &pool(), AssignmentStrategy::RoundRobin).unwrap();
        let mut panes: Vec<&str> = assignments.iter().map(|a| a.pane_name.as_str()).collect();
        panes.sort();
        panes.dedup();
        assert_eq!(panes.len(), assignments.len());
    }

    #[test]
    fn errors_when_pool_smaller_than_mode_count() {
        let preset = built_in_presets().remove(0);
        let small_pool = vec![AvailablePane { pane_name: "p0".into(), agent_kind: AgentKind::ClaudeCode }];
        let err = assign(&preset, &small_pool, AssignmentStrategy::Any).unwrap_err();
        assert!(matches!(err, AssignmentError::NoPaneAvailable(_)));
    }
}
