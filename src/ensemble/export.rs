//! Export findings: turns selected merged findings into external work
//! items via the bead collaborator. See spec §4.6.8.

use std::path::Path;

use crate::collaborators::bead::{impact_priority, BeadClient, BeadError, CreatedIssue};
use crate::ensemble::merge::MergedFinding;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("selection '{0}' is not a valid id, range, or 'all'")]
    InvalidSelection(String),
    #[error("id prefix '{0}' is ambiguous: matches {1} findings")]
    AmbiguousId(String, usize),
    #[error("no finding matches id or index '{0}'")]
    NoMatch(String),
    #[error(transparent)]
    Bead(#[from] BeadError),
}

#[derive(Debug, Clone)]
pub struct ExportedItem {
    pub finding_id: String,
    pub issue: CreatedIssue,
}

/// Parses a selection expression: `all`, a comma-separated list of 1-based
/// indices or id prefixes, and ranges like `1,3-5` (spec §4.6.8).
pub fn parse_selection(expr: &str, findings: &[MergedFinding]) -> Result<Vec<usize>, ExportError> {
    let expr = expr.trim();
    if expr.eq_ignore_ascii_case("all") {
        return Ok((0..findings.len()).collect());
    }

    let mut indices = Vec::new();
    for token in expr.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((start, end)) = token.split_once('-') {
            let start: usize = start.trim().parse().map_err(|_| ExportError::InvalidSelection(expr.to_string()))?;
            let end: usize = end.trim().parse().map_err(|_| ExportError::InvalidSelection(expr.to_string()))?;
            if start == 0 || end < start {
                return Err(ExportError::InvalidSelection(expr.to_string()));
            }
            for i in start..=end {
                indices.push(resolve_one(&i.to_string(), findings)?);
            }
        } else {
            indices.push(resolve_one(token, findings)?);
        }
    }

    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}

/// Resolves a single token to a 0-based index: either a 1-based position
/// or an unambiguous prefix of a finding's stable id.
fn resolve_one(token: &str, findings: &[MergedFinding]) -> Result<usize, ExportError> {
    if let Ok(position) = token.parse::<usize>() {
        if position >= 1 && position <= findings.len() {
            return Ok(position - 1);
        }
    }

    let matches: Vec<usize> = findings.iter().enumerate().filter(|(_, f)| f.id.starts_with(token)).map(|(i, _)| i).collect();
    match matches.len() {
        0 => Err(ExportError::NoMatch(token.to_string())),
        1 => Ok(matches[0]),
        n => Err(ExportError::AmbiguousId(token.to_string(), n)),
    }
}

/// Exports the selected findings as work items, mapping impact to bead's
/// priority scale (spec §4.6.8).
pub async fn export_findings(
    bead: &dyn BeadClient,
    project_root: &Path,
    findings: &[MergedFinding],
    selection: &[usize],
) -> Result<Vec<ExportedItem>, ExportError> {
    let mut exported = Vec::new();
    for &index in selection {
        let Some(finding) = findings.get(index) else { continue };
        let priority = impact_priority(finding.finding.impact.as_str());
        let body = format!(
            "{}\n\nevidence: {}\nreasoning: {}\nsources: {}",
            finding.finding.text,
            finding.finding.evidence.as_deref().unwrap_or("none"),
            finding.finding.reasoning.as_deref().unwrap_or("none"),
            finding.source_mode_ids.join(", "),
        );
        let issue = bead.create_issue(project_root, &finding.finding.text, &body, priority).await?;
        exported.push(ExportedItem { finding_id: finding.id.clone(), issue });
    }
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::bead::mock::FakeBead;
    use crate::ensemble::capture::{Finding, Impact};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn findings() -> Vec<MergedFinding> {
        ["aaa111", "aab222", "ccc333"]
            .iter()
            .map(|id| MergedFinding {
                id: id.to_string(),
                finding: Finding {
                    text: format!("finding {id}"),
                    impact: Impact::High,
                    confidence: 0.8,
                    evidence: None,
                    reasoning: None,
                    provenance_id: None,
                },
                source_mode_ids: vec!["security".to_string()],
                provenance: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn all_selects_every_finding() {
        let findings = findings();
        let selection = parse_selection("all", &findings).unwrap();
        assert_eq!(selection, vec![0, 1, 2]);
    }

    #[test]
    fn comma_and_range_selection_combine() {
        let findings = findings();
        let selection = parse_selection("1,3", &findings).unwrap();
        assert_eq!(selection, vec![0, 2]);
    }

    #[test]
    fn id_prefix_resolves_to_unique_index() {
        let findings = findings();
        let selection = parse_selection("ccc", &findings).unwrap();
        assert_eq!(selection, vec![2]);
    }

    #[test]
    fn ambiguous_prefix_is_an_error() {
        let findings = findings();
        let err = parse_selection("a", &findings).unwrap_err();
        assert!(matches!(err, ExportError::AmbiguousId(_, 2)));
    }

    #[tokio::test]
    async fn export_creates_one_issue_per_selected_finding() {
        let findings = findings();
        let bead = FakeBead::new(HashMap::new());
        let selection = parse_selection("1,2", &findings).unwrap();
        let exported = export_findings(&bead, &PathBuf::from("/tmp/proj"), &findings, &selection).await.unwrap();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].finding_id, "aaa111");
    }
}
