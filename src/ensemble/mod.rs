//! Ensemble Engine: runs a preset's reasoning modes across a pool of agent
//! panes, merges their findings with provenance, and synthesizes a final
//! answer. See spec §4.6.

pub mod assignment;
pub mod capture;
pub mod checkpoint;
mod engine;
pub mod export;
pub mod merge;
pub mod preset;
pub mod synthesis;

pub use engine::{EnsembleEngine, EnsembleError, EnsembleSession, EnsembleStatus, PaneRegistry};
