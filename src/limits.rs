use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::media_sets::MediaSet;
use crate::models::phases::Phase;

/// Which rows count against a limit. A set-level limit only counts
/// selections inside that set; a phase-level limit counts the whole phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    Set,
    Phase,
}

/// The limit that actually applies to a selection attempt, after the
/// set-over-phase precedence has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub limit: i32,
    pub scope: LimitScope,
    /// Selections stamped before this instant were forgiven by a limit
    /// reset and no longer count.
    pub counts_since: Option<DateTime<Utc>>,
}

/// Picks the governing limit for a selection inside `set`. The set's own
/// limit wins over the phase-wide one; neither configured means unlimited.
pub fn resolve_policy(phase: &Phase, set: &MediaSet) -> Option<LimitPolicy> {
    if let Some(limit) = set.media_limit {
        return Some(LimitPolicy {
            limit,
            scope: LimitScope::Set,
            counts_since: phase.reset_limit_at,
        });
    }
    phase_policy(phase)
}

/// The phase-wide policy alone, for contexts with no set in hand.
pub fn phase_policy(phase: &Phase) -> Option<LimitPolicy> {
    phase.media_limit.map(|limit| LimitPolicy {
        limit,
        scope: LimitScope::Phase,
        counts_since: phase.reset_limit_at,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed,
    Reached { limit: i32 },
}

/// Decides whether one more selection fits under the policy given how many
/// countable selections already exist in the policy's scope.
pub fn check(policy: Option<&LimitPolicy>, used: i64) -> LimitDecision {
    match policy {
        None => LimitDecision::Allowed,
        Some(p) if used < i64::from(p.limit) => LimitDecision::Allowed,
        Some(p) => LimitDecision::Reached { limit: p.limit },
    }
}

/// Usage summary surfaced to guests alongside phase details.
#[derive(Debug, Clone, Serialize)]
pub struct LimitUsage {
    pub limit: Option<i32>,
    pub scope: Option<LimitScope>,
    pub used: i64,
    pub remaining: Option<i64>,
}

impl LimitUsage {
    pub fn unlimited(used: i64) -> Self {
        LimitUsage {
            limit: None,
            scope: None,
            used,
            remaining: None,
        }
    }

    pub fn from_policy(policy: &LimitPolicy, used: i64) -> Self {
        LimitUsage {
            limit: Some(policy.limit),
            scope: Some(policy.scope),
            used,
            remaining: Some((i64::from(policy.limit) - used).max(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn phase(media_limit: Option<i32>, reset_limit_at: Option<DateTime<Utc>>) -> Phase {
        Phase {
            id: 1,
            uuid: Uuid::new_v4(),
            project_id: 1,
            kind: "selection".to_string(),
            name: "Picks".to_string(),
            status: "active".to_string(),
            password_hash: None,
            download_pin_hash: None,
            allowed_emails: None,
            media_limit,
            reset_limit_at,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn set(media_limit: Option<i32>) -> MediaSet {
        MediaSet {
            id: 10,
            uuid: Uuid::new_v4(),
            phase_id: 1,
            name: "Ceremony".to_string(),
            position: 0,
            media_limit,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn set_limit_wins_over_phase_limit() {
        let policy = resolve_policy(&phase(Some(10), None), &set(Some(5))).unwrap();
        assert_eq!(policy.limit, 5);
        assert_eq!(policy.scope, LimitScope::Set);
    }

    #[test]
    fn phase_limit_applies_when_set_has_none() {
        let policy = resolve_policy(&phase(Some(10), None), &set(None)).unwrap();
        assert_eq!(policy.limit, 10);
        assert_eq!(policy.scope, LimitScope::Phase);
    }

    #[test]
    fn no_limits_means_unlimited() {
        assert!(resolve_policy(&phase(None, None), &set(None)).is_none());
    }

    #[test]
    fn reset_cutoff_rides_along() {
        let cutoff = Utc::now();
        let policy = resolve_policy(&phase(Some(3), Some(cutoff)), &set(None)).unwrap();
        assert_eq!(policy.counts_since, Some(cutoff));
    }

    #[test]
    fn check_allows_under_the_limit() {
        let policy = LimitPolicy {
            limit: 5,
            scope: LimitScope::Set,
            counts_since: None,
        };
        assert_eq!(check(Some(&policy), 4), LimitDecision::Allowed);
    }

    #[test]
    fn check_refuses_at_the_limit() {
        let policy = LimitPolicy {
            limit: 5,
            scope: LimitScope::Set,
            counts_since: None,
        };
        assert_eq!(check(Some(&policy), 5), LimitDecision::Reached { limit: 5 });
        assert_eq!(check(Some(&policy), 6), LimitDecision::Reached { limit: 5 });
    }

    #[test]
    fn check_without_policy_always_allows() {
        assert_eq!(check(None, 1_000_000), LimitDecision::Allowed);
    }

    #[test]
    fn reset_reopens_a_full_window() {
        let phase = phase(Some(2), None);
        let policy = resolve_policy(&phase, &set(None)).unwrap();

        // Two selections fill the window, the third is refused.
        assert_eq!(check(Some(&policy), 0), LimitDecision::Allowed);
        assert_eq!(check(Some(&policy), 1), LimitDecision::Allowed);
        assert_eq!(check(Some(&policy), 2), LimitDecision::Reached { limit: 2 });

        // A reset stamps the cutoff; only selections after it count, so the
        // same attempt now sees an empty window.
        let reset_phase = phase_with_reset(&phase);
        let policy = resolve_policy(&reset_phase, &set(None)).unwrap();
        assert_eq!(policy.counts_since, reset_phase.reset_limit_at);
        assert_eq!(check(Some(&policy), 0), LimitDecision::Allowed);
    }

    fn phase_with_reset(phase: &Phase) -> Phase {
        Phase {
            reset_limit_at: Some(Utc::now()),
            ..phase.clone()
        }
    }

    #[test]
    fn usage_remaining_never_goes_negative() {
        let policy = LimitPolicy {
            limit: 5,
            scope: LimitScope::Phase,
            counts_since: None,
        };
        let usage = LimitUsage::from_policy(&policy, 7);
        assert_eq!(usage.remaining, Some(0));
    }
}
