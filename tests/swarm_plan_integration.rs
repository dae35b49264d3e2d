//! End-to-end Project Scanner -> Allocation Calculator flow against a real
//! temp-directory tree, exercising spec §8's "Tiered plan" scenario the way
//! a live `paneswarm plan <root>` invocation would.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use paneswarm::allocation;
use paneswarm::collaborators::bead::{BeadClient, BeadError, CreatedIssue};
use paneswarm::config::SwarmConfig;
use paneswarm::dialect::{AgentKind, DialectTable};
use paneswarm::project::{self, ScannerConfig};
use tempfile::TempDir;

/// Fixed open-work counts per project path; the crate's own fake (behind
/// `#[cfg(test)]` in `collaborators::bead::mock`) isn't visible to an
/// external integration-test binary, so this is a standalone equivalent.
struct FakeBead {
    counts: HashMap<PathBuf, u64>,
}

#[async_trait]
impl BeadClient for FakeBead {
    async fn open_work_count(&self, project_root: &Path) -> Result<u64, BeadError> {
        Ok(*self.counts.get(project_root).unwrap_or(&0))
    }

    async fn create_issue(&self, _project_root: &Path, title: &str, _body: &str, _priority: u8) -> Result<CreatedIssue, BeadError> {
        Ok(CreatedIssue { id: format!("ISSUE-{title}") })
    }
}

fn write_project(root: &std::path::Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("Cargo.toml"), "[package]\nname = \"x\"").unwrap();
    dir
}

#[tokio::test]
async fn scan_then_plan_produces_a_consistent_tiered_plan() {
    let tmp = TempDir::new().unwrap();
    let alpha = write_project(tmp.path(), "alpha");
    let beta = write_project(tmp.path(), "beta");
    let gamma = write_project(tmp.path(), "gamma");

    let mut counts = HashMap::new();
    counts.insert(alpha.clone(), 500);
    counts.insert(beta.clone(), 150);
    counts.insert(gamma.clone(), 20);
    let bead = FakeBead { counts };

    let config = SwarmConfig::default();
    let projects = project::scan(tmp.path(), &ScannerConfig::default(), &config.tier_thresholds, &bead).await.unwrap();
    assert_eq!(projects.len(), 3);

    let dialects = DialectTable::built_in().unwrap();
    let swarm_plan = allocation::plan(tmp.path(), &projects, &config, &dialects, Utc::now());

    assert_eq!(swarm_plan.pane_total() as u32, swarm_plan.total);
    for session in &swarm_plan.sessions {
        assert!(session.is_consistent());
    }

    let alpha_alloc = swarm_plan.allocations.iter().find(|a| a.project.name == "alpha").unwrap();
    assert_eq!(alpha_alloc.project.tier, project::Tier::One);
    assert_eq!(alpha_alloc.counts.total(), config.tier_table.tier1.total());

    let a_json = serde_json::to_string(&swarm_plan).unwrap();
    assert!(a_json.contains("alpha"));
}

#[tokio::test]
async fn empty_directory_scans_to_an_empty_zero_pane_plan() {
    let tmp = TempDir::new().unwrap();
    let bead = FakeBead { counts: HashMap::new() };
    let config = SwarmConfig::default();

    let projects = project::scan(tmp.path(), &ScannerConfig::default(), &config.tier_thresholds, &bead).await.unwrap();
    assert!(projects.is_empty());

    let dialects = DialectTable::built_in().unwrap();
    let swarm_plan = allocation::plan(tmp.path(), &projects, &config, &dialects, Utc::now());
    assert_eq!(swarm_plan.total, 0);
    assert!(swarm_plan.sessions.iter().all(|s| s.pane_count == 0));
}

#[test]
fn every_agent_kind_resolves_to_a_known_launch_command() {
    let dialects = DialectTable::built_in().unwrap();
    for kind in [AgentKind::ClaudeCode, AgentKind::Codex, AgentKind::Gemini] {
        let dialect = dialects.get(&kind).unwrap();
        assert!(!dialect.launch_command.is_empty());
    }
}
