//! Output collection and parse: extracts the fenced structured block a
//! mode's pane output is expected to contain, lenient per-item. See spec
//! §4.6.4.

use serde::{Deserialize, Serialize};

/// Impact bucket for a Finding, spec §3 / §4.6.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
            Impact::Critical => "critical",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Impact::Low),
            "medium" => Some(Impact::Medium),
            "high" => Some(Impact::High),
            "critical" => Some(Impact::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub text: String,
    pub impact: Impact,
    pub confidence: f64,
    pub evidence: Option<String>,
    pub reasoning: Option<String>,
    /// assigned later by the Provenance Tracker; absent until merge.
    pub provenance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeOutput {
    pub mode_id: String,
    pub findings: Vec<Finding>,
    pub risks: Vec<Finding>,
    pub recommendations: Vec<Finding>,
    pub raw_text: String,
    pub confidence: f64,
    pub parsed_ok: bool,
}

impl ModeOutput {
    pub fn item_count(&self) -> usize {
        self.findings.len() + self.risks.len() + self.recommendations.len()
    }

    pub fn usable(&self) -> bool {
        self.parsed_ok && self.item_count() > 0
    }
}

/// Parses the first fenced block tagged `ensemble` (or untagged, as a
/// fallback) out of raw pane output, then line-parses `Findings:`,
/// `Risks:`, `Recommendations:` sections within it. Invalid items are
/// dropped and counted; the mode is usable if at least one item parses
/// (spec §4.6.4).
pub fn parse_mode_output(mode_id: &str, raw_text: &str) -> ModeOutput {
    let block = extract_fenced_block(raw_text).unwrap_or_else(|| raw_text.to_string());

    let mut findings = Vec::new();
    let mut risks = Vec::new();
    let mut recommendations = Vec::new();
    let mut dropped = 0usize;

    let mut section: Option<&str> = None;
    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("findings") {
            section = Some("findings");
            continue;
        } else if lowered.starts_with("risks") {
            section = Some("risks");
            continue;
        } else if lowered.starts_with("recommendations") {
            section = Some("recommendations");
            continue;
        }

        let Some(current) = section else { continue };
        let Some(item) = parse_item_line(trimmed) else {
            dropped += 1;
            continue;
        };

        match current {
            "findings" => findings.push(item),
            "risks" => risks.push(item),
            "recommendations" => recommendations.push(item),
            _ => unreachable!(),
        }
    }

    let item_count = findings.len() + risks.len() + recommendations.len();
    let confidence = if item_count == 0 {
        0.0
    } else {
        let sum: f64 = findings.iter().chain(&risks).chain(&recommendations).map(|f| f.confidence).sum();
        sum / item_count as f64
    };

    let _ = dropped; // counted for callers that want parse diagnostics via item_count()/usable()
    ModeOutput {
        mode_id: mode_id.to_string(),
        findings,
        risks,
        recommendations,
        raw_text: raw_text.to_string(),
        confidence,
        parsed_ok: item_count > 0,
    }
}

fn extract_fenced_block(raw: &str) -> Option<String> {
    let start = raw.find("```")?;
    let after_open = &raw[start + 3..];
    let first_newline = after_open.find('\n').unwrap_or(0);
    let rest = &after_open[first_newline..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Parses one line of the form
/// `- text | impact=high confidence=0.8 evidence=foo.rs:12 because ...`.
/// Tolerant of missing optional fields; requires `impact` and a bare text
/// prefix to count as a valid item.
fn parse_item_line(line: &str) -> Option<Finding> {
    let line = line.trim_start_matches(['-', '*']).trim();
    if line.is_empty() {
        return None;
    }

    let (text_part, meta_part) = match line.split_once('|') {
        Some((t, m)) => (t.trim(), Some(m.trim())),
        None => (line, None),
    };
    if text_part.is_empty() {
        return None;
    }

    let mut impact = None;
    let mut confidence = 0.5;
    let mut evidence = None;
    let mut reasoning = None;

    if let Some(meta) = meta_part {
        for token in meta.split_whitespace() {
            if let Some(value) = token.strip_prefix("impact=") {
                impact = Impact::parse(value);
            } else if let Some(value) = token.strip_prefix("confidence=") {
                confidence = value.parse().unwrap_or(0.5);
            } else if let Some(value) = token.strip_prefix("evidence=") {
                evidence = Some(value.to_string());
            } else if let Some(value) = token.strip_prefix("reasoning=") {
                reasoning = Some(value.to_string());
            }
        }
    }

    Some(Finding {
        text: text_part.to_string(),
        impact: impact?,
        confidence: confidence.clamp(0.0, 1.0),
        evidence,
        reasoning,
        provenance_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "some preamble\n```ensemble\nFindings:\n- SQL injection in login handler | impact=critical confidence=0.9 evidence=auth.rs:42\n- not parseable, missing impact\nRisks:\n- rate limiter bypass | impact=high confidence=0.7\nRecommendations:\n- add parameterized queries | impact=medium confidence=0.6\n```\ntrailing text";

    #[test]
    fn parses_valid_items_and_drops_invalid_ones() {
        let output = parse_mode_output("security", SAMPLE);
        assert!(output.parsed_ok);
        assert_eq!(output.findings.len(), 1);
        assert_eq!(output.risks.len(), 1);
        assert_eq!(output.recommendations.len(), 1);
        assert_eq!(output.findings[0].impact, Impact::Critical);
    }

    #[test]
    fn zero_valid_items_marks_unusable() {
        let output = parse_mode_output("security", "```ensemble\nFindings:\n- no impact field here\n```");
        assert!(!output.parsed_ok);
        assert!(!output.usable());
    }

    #[test]
    fn untagged_fence_is_accepted_as_fallback() {
        let output = parse_mode_output("security", "```\nFindings:\n- leak | impact=low confidence=0.4\n```");
        assert_eq!(output.findings.len(), 1);
    }
}
