//! Reservation Coordinator: advisory file-path locks shared across agents.
//! See spec §4.5 and §3 (`Reservation`).
//!
//! Glob intersection is computed by expanding each pattern against a shared
//! candidate-path universe (the literal path fragments seen across active
//! reservations plus the new request) and checking whether any candidate
//! matches both patterns. This is the simplest correct approximation of
//! "pattern sets intersect" without a full glob-automata library - recorded
//! as an Open Question decision in DESIGN.md (SPEC_FULL §4.5).

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::collaborators::mail::MailClient;
use crate::config::StalenessPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("reservation {0} not found")]
    NotFound(i64),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: i64,
    pub agent: String,
    pub patterns: Vec<String>,
    pub exclusive: bool,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}

impl Reservation {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceReleaseOutcome {
    pub success: bool,
    pub reason: Option<String>,
    pub previous_holder: Option<String>,
    pub notified: bool,
}

/// The coordinator. `reservations.db` (spec §6) is an append-only log this
/// type's owner is responsible for writing to; this type holds the live,
/// swept-on-read view.
pub struct ReservationCoordinator {
    next_id: AtomicI64,
    reservations: RwLock<Vec<Reservation>>,
    staleness: StalenessPolicy,
    mail: Option<std::sync::Arc<dyn MailClient>>,
}

impl ReservationCoordinator {
    pub fn new(staleness: StalenessPolicy, mail: Option<std::sync::Arc<dyn MailClient>>) -> Self {
        Self { next_id: AtomicI64::new(1), reservations: RwLock::new(Vec::new()), staleness, mail }
    }

    /// Rebuilds a coordinator from a replayed `reservations.db` event log
    /// (spec §6); the CLI binary is the only caller, since each invocation
    /// is a fresh process with no in-memory carryover (SPEC_FULL §9).
    pub fn with_reservations(
        staleness: StalenessPolicy,
        mail: Option<std::sync::Arc<dyn MailClient>>,
        reservations: Vec<Reservation>,
        next_id: i64,
    ) -> Self {
        Self { next_id: AtomicI64::new(next_id), reservations: RwLock::new(reservations), staleness, mail }
    }

    /// Full, unswept view of the live reservation set, for persisting back
    /// to disk between invocations.
    pub async fn snapshot(&self) -> Vec<Reservation> {
        self.reservations.read().await.clone()
    }

    pub fn next_id_value(&self) -> i64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Lazily sweeps expired entries on every read, matching "TTL is soft"
    /// (spec §4.5).
    async fn sweep(&self) {
        let now = Utc::now();
        let mut guard = self.reservations.write().await;
        guard.retain(|r| r.is_active(now));
    }

    pub async fn acquire(
        &self,
        agent: &str,
        patterns: Vec<String>,
        exclusive: bool,
        ttl: std::time::Duration,
        reason: &str,
    ) -> Result<Reservation, ReservationError> {
        self.sweep().await;
        let now = Utc::now();
        let guard = self.reservations.read().await;

        if exclusive {
            for existing in guard.iter().filter(|r| r.is_active(now)) {
                if existing.exclusive && patterns_intersect(&existing.patterns, &patterns) {
                    return Err(ReservationError::Conflict(format!(
                        "exclusive reservation {} by {} overlaps requested patterns",
                        existing.id, existing.agent
                    )));
                }
                if !existing.exclusive && patterns_intersect(&existing.patterns, &patterns) {
                    return Err(ReservationError::Conflict(format!(
                        "shared reservation {} by {} overlaps requested exclusive patterns",
                        existing.id, existing.agent
                    )));
                }
            }
        } else {
            // A new shared request only conflicts with an active exclusive
            // reservation; shared-shared overlaps are permitted (spec §4.5).
            for existing in guard.iter().filter(|r| r.is_active(now)) {
                if existing.exclusive && patterns_intersect(&existing.patterns, &patterns) {
                    return Err(ReservationError::Conflict(format!(
                        "exclusive reservation {} by {} overlaps requested shared patterns",
                        existing.id, existing.agent
                    )));
                }
            }
        }
        drop(guard);

        let reservation = Reservation {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            agent: agent.to_string(),
            patterns,
            exclusive,
            expires_at: now + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::hours(1)),
            reason: reason.to_string(),
        };

        self.reservations.write().await.push(reservation.clone());
        Ok(reservation)
    }

    /// Lists active reservations, optionally narrowed to one agent. `project`
    /// is accepted for interface parity with the CLI surface (spec §4.5)
    /// but reservations here are not project-scoped; pattern matching is
    /// the caller's responsibility.
    pub async fn list(&self, _project: Option<&str>, agent: Option<&str>, all_agents: bool) -> Vec<Reservation> {
        self.sweep().await;
        let now = Utc::now();
        let guard = self.reservations.read().await;
        guard
            .iter()
            .filter(|r| r.is_active(now))
            .filter(|r| all_agents || agent.map(|a| a == r.agent).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub async fn renew(&self, agent: &str, id: i64, extend: std::time::Duration) -> Result<Reservation, ReservationError> {
        self.sweep().await;
        let mut guard = self.reservations.write().await;
        let reservation = guard
            .iter_mut()
            .find(|r| r.id == id && r.agent == agent)
            .ok_or(ReservationError::NotFound(id))?;
        reservation.expires_at += ChronoDuration::from_std(extend).unwrap_or(ChronoDuration::zero());
        Ok(reservation.clone())
    }

    /// Force-release validates staleness: the target's agent must have been
    /// inactive for at least `staleness.window` (spec §4.5). Staleness is
    /// checked against the Health Tracker's last-activity for *any* pane
    /// owned by that agent name - the caller passes the most recent
    /// activity timestamp it has for the agent.
    pub async fn force_release(
        &self,
        id: i64,
        agent_last_activity: DateTime<Utc>,
        note: &str,
        notify: bool,
    ) -> Result<ForceReleaseOutcome, ReservationError> {
        let now = Utc::now();
        let inactive_for = now - agent_last_activity;
        let window = ChronoDuration::from_std(self.staleness.window).unwrap_or(ChronoDuration::minutes(10));

        if inactive_for < window {
            return Ok(ForceReleaseOutcome {
                success: false,
                reason: Some("not stale".to_string()),
                previous_holder: None,
                notified: false,
            });
        }

        let mut guard = self.reservations.write().await;
        let position = guard.iter().position(|r| r.id == id).ok_or(ReservationError::NotFound(id))?;
        let released = guard.remove(position);
        drop(guard);

        let mut notified = false;
        if notify {
            if let Some(mail) = &self.mail {
                if mail.is_available().await {
                    notified = mail
                        .notify(&released.agent, &format!("reservation {} force-released: {}", id, note))
                        .await
                        .is_ok();
                }
            }
        }

        Ok(ForceReleaseOutcome {
            success: true,
            reason: None,
            previous_holder: Some(released.agent),
            notified,
        })
    }
}

/// Whether two glob pattern sets could ever overlap. See module docs for
/// the candidate-universe approach.
fn patterns_intersect(a: &[String], b: &[String]) -> bool {
    let mut candidates: HashSet<String> = HashSet::new();
    for pattern in a.iter().chain(b.iter()) {
        candidates.insert(literal_seed(pattern));
    }

    for candidate in &candidates {
        let matches_a = a.iter().any(|p| Pattern::new(p).map(|g| g.matches(candidate)).unwrap_or(false));
        let matches_b = b.iter().any(|p| Pattern::new(p).map(|g| g.matches(candidate)).unwrap_or(false));
        if matches_a && matches_b {
            return true;
        }
    }

    // Fall back to literal-prefix overlap: if one pattern's non-glob prefix
    // is a prefix of the other's, they can reach the same subtree even
    // though neither pattern alone is a valid candidate path.
    for pa in a {
        for pb in b {
            let prefix_a = literal_prefix(pa);
            let prefix_b = literal_prefix(pb);
            if prefix_a.starts_with(&prefix_b) || prefix_b.starts_with(&prefix_a) {
                return true;
            }
        }
    }

    false
}

/// The portion of a glob pattern before its first wildcard character.
fn literal_prefix(pattern: &str) -> String {
    pattern.chars().take_while(|c| !"*?[{".contains(*c)).collect()
}

/// A concrete path derived from a pattern by stripping wildcard segments,
/// used to seed the candidate universe so patterns with no literal overlap
/// at all (e.g. two disjoint trees) still get a fair `Pattern::matches`
/// check against something plausible.
fn literal_seed(pattern: &str) -> String {
    pattern.replace("**", "x").replace('*', "x").replace(['?', '[', ']', '{', '}'], "")
}
