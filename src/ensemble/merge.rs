//! Merge with provenance: assigns a stable id to every finding, merges
//! near-duplicates by text similarity, and keeps an append-only
//! provenance chain per finding. See spec §4.6.5 and §3 `ProvenanceChain`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ensemble::capture::{Finding, ModeOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceStep {
    pub stage: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedFinding {
    pub id: String,
    pub finding: Finding,
    pub source_mode_ids: Vec<String>,
    pub provenance: Vec<ProvenanceStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub merged: Vec<MergedFinding>,
    /// ids that were dropped (below similarity threshold of nothing, or
    /// explicitly filtered) with their final provenance chain retained for
    /// audit.
    pub filtered: Vec<MergedFinding>,
    /// per-mode unique-insight counts: findings from that mode that
    /// survived merge without being absorbed into another mode's finding.
    pub unique_insights_per_mode: HashMap<String, usize>,
}

/// Stable id for an original finding: hash of `{mode_id, normalized_text}`
/// (spec §4.6.5).
pub fn finding_id(mode_id: &str, text: &str) -> String {
    let normalized = normalize(text);
    let digest = Sha256::digest(format!("{mode_id}:{normalized}").as_bytes());
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

fn normalize(text: &str) -> String {
    text.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_set(text: &str) -> HashSet<String> {
    normalize(text).split(' ').map(|s| s.to_string()).collect()
}

/// Cosine similarity over a normalized token multiset, approximated as a
/// set-Jaccard-weighted cosine (treats each token as a unit-weight
/// dimension). Good enough for the near-duplicate threshold named in spec
/// §4.6.5; exact vector-space cosine isn't warranted here since findings
/// are short free-text sentences, not TF-IDF documents.
fn cosine_similarity(a: &str, b: &str) -> f64 {
    let ta = token_set(a);
    let tb = token_set(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let denom = ((ta.len() as f64).sqrt()) * ((tb.len() as f64).sqrt());
    if denom == 0.0 {
        0.0
    } else {
        intersection / denom
    }
}

/// Merges findings across mode outputs. Each original finding gets an
/// "origin" provenance step; near-duplicates (cosine >= threshold) are
/// merged into the first-seen finding, which records a "merged" step
/// citing the merged-away ids; everything else survives standalone.
/// Nothing is unconditionally "filtered" here - §4.6.4's drop-on-parse
/// already removed unparseable items, so merge never drops a
/// successfully-parsed finding, it only groups duplicates.
pub fn merge_with_provenance(outputs: &[ModeOutput], similarity_threshold: f64, now: DateTime<Utc>) -> MergeResult {
    let mut originals: Vec<(String, Finding)> = Vec::new();
    for output in outputs {
        for finding in output.findings.iter().chain(&output.risks).chain(&output.recommendations) {
            originals.push((output.mode_id.clone(), finding.clone()));
        }
    }

    let mut merged: Vec<MergedFinding> = Vec::new();
    let mut unique_insights_per_mode: HashMap<String, usize> = HashMap::new();

    'outer: for (mode_id, finding) in &originals {
        let id = finding_id(mode_id, &finding.text);
        let origin_step = ProvenanceStep {
            stage: "capture".to_string(),
            action: "origin".to_string(),
            timestamp: now,
            details: format!("mode={mode_id}"),
        };

        for existing in merged.iter_mut() {
            if cosine_similarity(&existing.finding.text, &finding.text) >= similarity_threshold {
                existing.source_mode_ids.push(mode_id.clone());
                existing.provenance.push(ProvenanceStep {
                    stage: "merge".to_string(),
                    action: "merged".to_string(),
                    timestamp: now,
                    details: format!("absorbed duplicate from mode={mode_id} id={id}"),
                });
                continue 'outer;
            }
        }

        let mut item = finding.clone();
        item.provenance_id = Some(id.clone());
        merged.push(MergedFinding {
            id,
            finding: item,
            source_mode_ids: vec![mode_id.clone()],
            provenance: vec![origin_step],
        });
        *unique_insights_per_mode.entry(mode_id.clone()).or_insert(0) += 1;
    }

    MergeResult { merged, filtered: Vec::new(), unique_insights_per_mode }
}

/// Merge is idempotent: running it again over the already-merged findings
/// (treated as a single-mode output each) must not change the result
/// structurally (spec §8).
pub fn merge_is_idempotent(result: &MergeResult, similarity_threshold: f64, now: DateTime<Utc>) -> bool {
    let as_outputs: Vec<ModeOutput> = result
        .merged
        .iter()
        .map(|m| ModeOutput {
            mode_id: m.source_mode_ids.first().cloned().unwrap_or_default(),
            findings: vec![m.finding.clone()],
            risks: Vec::new(),
            recommendations: Vec::new(),
            raw_text: String::new(),
            confidence: m.finding.confidence,
            parsed_ok: true,
        })
        .collect();

    let second_pass = merge_with_provenance(&as_outputs, similarity_threshold, now);
    second_pass.merged.len() == result.merged.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::capture::Impact;

    fn finding(text: &str) -> Finding {
        Finding { text: text.to_string(), impact: Impact::High, confidence: 0.8, evidence: None, reasoning: None, provenance_id: None }
    }

    fn output(mode_id: &str, texts: &[&str]) -> ModeOutput {
        ModeOutput {
            mode_id: mode_id.to_string(),
            findings: texts.iter().map(|t| finding(t)).collect(),
            risks: Vec::new(),
            recommendations: Vec::new(),
            raw_text: String::new(),
            confidence: 0.8,
            parsed_ok: true,
        }
    }

    #[test]
    fn near_duplicates_merge_into_one_finding() {
        let outputs = vec![
            output("security", &["SQL injection in the login handler"]),
            output("correctness", &["SQL injection vulnerability in login handler"]),
        ];
        let result = merge_with_provenance(&outputs, 0.6, Utc::now());
        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.merged[0].source_mode_ids.len(), 2);
    }

    #[test]
    fn distinct_findings_stay_separate() {
        let outputs = vec![output("security", &["SQL injection in login", "XSS in comment form"])];
        let result = merge_with_provenance(&outputs, 0.82, Utc::now());
        assert_eq!(result.merged.len(), 2);
    }

    #[test]
    fn merge_is_idempotent_structurally() {
        let outputs = vec![
            output("security", &["SQL injection in login handler"]),
            output("performance", &["N+1 query in dashboard loader"]),
        ];
        let result = merge_with_provenance(&outputs, 0.82, Utc::now());
        assert!(merge_is_idempotent(&result, 0.82, Utc::now()));
    }

    #[test]
    fn finding_id_is_stable_for_same_mode_and_text() {
        let a = finding_id("security", "SQL injection");
        let b = finding_id("security", "  sql   injection  ");
        assert_eq!(a, b);
    }
}
