//! Project Scanner: walks a root directory, identifies project roots,
//! queries open-work counts via the bead collaborator, and emits a weighted,
//! tiered project list. See spec §2 "Project Scanner" and §4.1.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::collaborators::bead::BeadClient;
use crate::config::TierThresholds;

/// Tier derived from a project's open-work count via two configured
/// thresholds. Immutable after scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    One,
    Two,
    Three,
}

/// A single scanned project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub open_work: u64,
    pub tier: Tier,
}

impl Project {
    pub fn new(name: impl Into<String>, path: PathBuf, open_work: u64, thresholds: &TierThresholds) -> Self {
        let tier = thresholds.classify(open_work);
        Self { name: name.into(), path, open_work, tier }
    }
}

/// A marker file or directory that identifies a directory as a project root.
/// Mirrors the common VCS/manifest markers a real scanner would look for;
/// configurable so callers aren't locked to one ecosystem.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub markers: Vec<String>,
    pub max_depth: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            markers: vec![
                ".git".to_string(),
                "Cargo.toml".to_string(),
                "package.json".to_string(),
                "go.mod".to_string(),
                "pyproject.toml".to_string(),
            ],
            max_depth: 3,
        }
    }
}

/// Walks `root` and identifies immediate project directories: any
/// subdirectory (up to `max_depth`) that contains one of the configured
/// marker files, without descending further into an already-identified
/// project (so a project's own `.git` checkouts of dependencies don't get
/// double-counted).
pub fn discover_project_roots(root: &Path, config: &ScannerConfig) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut walker = WalkDir::new(root).max_depth(config.max_depth).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to read directory entry during scan");
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path() == root {
            continue;
        }

        let is_project = config
            .markers
            .iter()
            .any(|marker| entry.path().join(marker).exists());

        if is_project {
            roots.push(entry.path().to_path_buf());
            // don't recurse into a project we've already identified
            walker.skip_current_dir();
        }
    }

    roots.sort();
    roots
}

/// Scans `root` for projects, queries open-work counts via `bead`, and
/// returns a weighted list. Never touches the multiplexer; pure I/O against
/// the filesystem and the bead collaborator.
pub async fn scan(
    root: &Path,
    scanner_config: &ScannerConfig,
    thresholds: &TierThresholds,
    bead: &dyn BeadClient,
) -> anyhow::Result<Vec<Project>> {
    let mut projects = Vec::new();

    for project_root in discover_project_roots(root, scanner_config) {
        let name = project_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| project_root.display().to_string());

        let open_work = match bead.open_work_count(&project_root).await {
            Ok(count) => count,
            Err(e) => {
                warn!(project = %name, error = %e, "bead open-work query failed, treating as 0");
                0
            }
        };

        debug!(project = %name, open_work, "scanned project");
        projects.push(Project::new(name, project_root, open_work, thresholds));
    }

    Ok(projects)
}

/// Stable ordering used throughout the Allocation Calculator: tier ascending
/// (Tier::One first, i.e. the most active projects), then name ascending.
/// This ordering is load-bearing for plan determinism (spec §8).
pub fn tier_then_name_order(projects: &mut [Project]) {
    projects.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| a.name.cmp(&b.name)));
}
