//! Agent Dialect Table: the per-agent-kind record telling the Pane Launcher
//! and Prompt Injector how to start an agent, how to submit a pasted
//! prompt, how to ask it to exit gracefully, and how to classify its
//! output lines. See spec §2 "Agent Dialect Table" and §9 "Polymorphic
//! agent behavior is encoded as an explicit Agent Dialect record ... rather
//! than subclassing."
//!
//! New agents are added by extending [`built_in_dialects`] (or, for
//! operator-defined agents, the `custom` config layer) - never by adding a
//! new enum variant and chasing match arms through the crate.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of coding agent running inside a pane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[serde(rename = "cc")]
    ClaudeCode,
    #[serde(rename = "cod")]
    Codex,
    #[serde(rename = "gmi")]
    Gemini,
    Custom(String),
}

impl AgentKind {
    /// The short code used in session names (`cc_agents_0`, ...) per spec §3.
    pub fn short_code(&self) -> &str {
        match self {
            AgentKind::ClaudeCode => "cc",
            AgentKind::Codex => "cod",
            AgentKind::Gemini => "gmi",
            AgentKind::Custom(name) => name.as_str(),
        }
    }

    pub fn from_short_code(code: &str) -> Self {
        match code {
            "cc" => AgentKind::ClaudeCode,
            "cod" => AgentKind::Codex,
            "gmi" => AgentKind::Gemini,
            other => AgentKind::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_code())
    }
}

/// How a pasted prompt gets submitted into a pane, per spec §4.3.
#[derive(Debug, Clone)]
pub enum SubmitGesture {
    /// Wrap the text in bracketed-paste start/end sentinels, send as one
    /// chunk, then send the submit keystroke.
    BracketedPaste { submit_key: &'static str },
    /// Split on newlines, send each line as keystrokes with a micro-delay,
    /// then send the submit keystroke.
    LineStream { submit_key: &'static str },
}

/// How a pane is asked to exit gracefully, per §4.7 / §6.
#[derive(Debug, Clone)]
pub enum ExitGesture {
    /// A single control keystroke (e.g. Ctrl-C).
    Keystroke(&'static str),
    /// A line of text followed by Enter (e.g. `/exit`).
    Command(&'static str),
}

/// Output classification buckets per spec §2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputClass {
    Idle,
    Working,
    Errored,
    RateLimited,
}

/// The full per-agent-kind dialect record.
#[derive(Clone)]
pub struct AgentDialect {
    pub kind: AgentKind,
    pub launch_command: &'static str,
    pub submit: SubmitGesture,
    pub exit: ExitGesture,
    pub post_launch_delay: Duration,
    pub readiness_delay: Duration,
    classifiers: Vec<(OutputClass, Regex)>,
}

impl std::fmt::Debug for AgentDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDialect")
            .field("kind", &self.kind)
            .field("launch_command", &self.launch_command)
            .finish_non_exhaustive()
    }
}

impl AgentDialect {
    /// Classify a single line of captured pane output. Patterns are
    /// evaluated in declaration order; the first match wins. Lines that
    /// match nothing are treated as `Working` (an agent mid-thought).
    pub fn classify_line(&self, line: &str) -> OutputClass {
        for (class, pattern) in &self.classifiers {
            if pattern.is_match(line) {
                return *class;
            }
        }
        OutputClass::Working
    }

    /// Classify a full capture: the *worst* (last, most specific) class
    /// seen across the tail of the buffer, matching how a human skims
    /// scrollback bottom-up for the agent's current state.
    pub fn classify_capture(&self, capture: &str) -> OutputClass {
        for line in capture.lines().rev() {
            if line.trim().is_empty() {
                continue;
            }
            let class = self.classify_line(line);
            if class != OutputClass::Working {
                return class;
            }
        }
        OutputClass::Idle
    }
}

#[derive(Debug, Error)]
pub enum DialectError {
    #[error("unknown agent kind: {0}")]
    UnknownKind(String),
    #[error("invalid classifier pattern for {kind}: {source}")]
    InvalidPattern {
        kind: String,
        #[source]
        source: regex::Error,
    },
}

fn compile(kind: &AgentKind, pairs: &[(OutputClass, &str)]) -> Result<Vec<(OutputClass, Regex)>, DialectError> {
    pairs
        .iter()
        .map(|(class, pattern)| {
            Regex::new(pattern)
                .map(|re| (*class, re))
                .map_err(|source| DialectError::InvalidPattern {
                    kind: kind.short_code().to_string(),
                    source,
                })
        })
        .collect()
}

/// The table of built-in dialects. A table lookup, not a trait hierarchy.
pub fn built_in_dialects() -> Result<Vec<AgentDialect>, DialectError> {
    let claude_kind = AgentKind::ClaudeCode;
    let claude = AgentDialect {
        kind: claude_kind.clone(),
        launch_command: "claude",
        submit: SubmitGesture::BracketedPaste { submit_key: "Enter" },
        exit: ExitGesture::Keystroke("C-c"),
        post_launch_delay: Duration::from_millis(400),
        readiness_delay: Duration::from_millis(500),
        classifiers: compile(
            &claude_kind,
            &[
                (OutputClass::RateLimited, r"(?i)rate.?limit|usage limit reached"),
                (OutputClass::Errored, r"(?i)error:|panicked|traceback|exception"),
                (OutputClass::Idle, r"(?i)^\s*>\s*$|waiting for input|Human:"),
            ],
        )?,
    };

    let codex_kind = AgentKind::Codex;
    let codex = AgentDialect {
        kind: codex_kind.clone(),
        launch_command: "codex",
        submit: SubmitGesture::BracketedPaste { submit_key: "Enter" },
        exit: ExitGesture::Command("/exit"),
        post_launch_delay: Duration::from_millis(500),
        readiness_delay: Duration::from_millis(500),
        classifiers: compile(
            &codex_kind,
            &[
                (OutputClass::RateLimited, r"(?i)rate.?limit|429"),
                (OutputClass::Errored, r"(?i)error:|failed to|traceback"),
                (OutputClass::Idle, r"(?i)^\s*›\s*$|^\s*>\s*$|ready\b"),
            ],
        )?,
    };

    let gemini_kind = AgentKind::Gemini;
    let gemini = AgentDialect {
        kind: gemini_kind.clone(),
        launch_command: "gemini",
        submit: SubmitGesture::LineStream { submit_key: "Enter" },
        exit: ExitGesture::Keystroke("C-c"),
        post_launch_delay: Duration::from_millis(300),
        readiness_delay: Duration::from_millis(500),
        classifiers: compile(
            &gemini_kind,
            &[
                (OutputClass::RateLimited, r"(?i)quota exceeded|rate.?limit"),
                (OutputClass::Errored, r"(?i)error:|stack trace"),
                (OutputClass::Idle, r"(?i)^\s*>\s*$|type your message"),
            ],
        )?,
    };

    Ok(vec![claude, codex, gemini])
}

/// A runtime lookup table. Built once (from `built_in_dialects` plus any
/// operator-defined custom dialects) and handed to the Launcher, Injector,
/// Ensemble poller and Shutdown Supervisor - all table consumers, never
/// dialect-specific branches.
pub struct DialectTable {
    dialects: Vec<AgentDialect>,
}

impl DialectTable {
    pub fn new(dialects: Vec<AgentDialect>) -> Self {
        Self { dialects }
    }

    pub fn built_in() -> Result<Self, DialectError> {
        Ok(Self::new(built_in_dialects()?))
    }

    pub fn get(&self, kind: &AgentKind) -> Result<&AgentDialect, DialectError> {
        self.dialects
            .iter()
            .find(|d| &d.kind == kind)
            .ok_or_else(|| DialectError::UnknownKind(kind.short_code().to_string()))
    }

    /// Register or replace a custom dialect - the one extension point per
    /// spec §9.
    pub fn register(&mut self, dialect: AgentDialect) {
        self.dialects.retain(|d| d.kind != dialect.kind);
        self.dialects.push(dialect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_table_covers_three_kinds() {
        let table = DialectTable::built_in().unwrap();
        assert!(table.get(&AgentKind::ClaudeCode).is_ok());
        assert!(table.get(&AgentKind::Codex).is_ok());
        assert!(table.get(&AgentKind::Gemini).is_ok());
    }

    #[test]
    fn unknown_kind_is_dialect_error() {
        let table = DialectTable::built_in().unwrap();
        let err = table.get(&AgentKind::Custom("nope".into())).unwrap_err();
        assert!(matches!(err, DialectError::UnknownKind(_)));
    }

    #[test]
    fn classify_line_detects_rate_limit_before_error() {
        let table = DialectTable::built_in().unwrap();
        let claude = table.get(&AgentKind::ClaudeCode).unwrap();
        assert_eq!(
            claude.classify_line("Error: usage limit reached, please retry later"),
            OutputClass::RateLimited
        );
    }

    #[test]
    fn classify_capture_skips_blank_tail_lines() {
        let table = DialectTable::built_in().unwrap();
        let codex = table.get(&AgentKind::Codex).unwrap();
        let capture = "some output\nerror: failed to compile\n\n\n";
        assert_eq!(codex.classify_capture(capture), OutputClass::Errored);
    }

    #[test]
    fn short_code_round_trips() {
        assert_eq!(AgentKind::from_short_code("cc"), AgentKind::ClaudeCode);
        assert_eq!(AgentKind::from_short_code("cod"), AgentKind::Codex);
        assert_eq!(AgentKind::from_short_code("gmi"), AgentKind::Gemini);
        assert_eq!(
            AgentKind::from_short_code("aider"),
            AgentKind::Custom("aider".to_string())
        );
    }
}
