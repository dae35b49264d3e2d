//! paneswarm - multi-agent terminal orchestrator
//!
//! Plans, launches and supervises fleets of LLM-backed coding agents running
//! inside terminal-multiplexer panes across many projects. See `SPEC_FULL.md`
//! at the repository root for the full design.

#![allow(clippy::too_many_arguments)]

pub mod allocation;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod dialect;
pub mod ensemble;
pub mod health;
pub mod orchestrator;
pub mod project;
pub mod reservation;
pub mod shutdown;
pub mod tmux;
pub mod utils;

pub use allocation::{Allocation, PaneSpec, SessionSpec, SwarmPlan};
pub use config::SwarmConfig;
pub use dialect::AgentKind;
pub use project::Project;
