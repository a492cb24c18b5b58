//! Phone identity resolution
//!
//! Decides, for every canonical phone number, which contact record owns it
//! as its unique-identity property. Two passes over the dataset:
//!
//! 1. Seed an [`OwnershipMap`] from every record whose unique-identity
//!    property already holds a canonical (`+`-prefixed) value. Those owners
//!    are never displaced.
//! 2. Group the remaining records by their target canonical phone and
//!    resolve each group: an existing global owner leaves the group's
//!    unique claims untouched (display phone only); a singleton claims the
//!    phone outright; a collision picks one deterministic winner and
//!    reports the cluster.
//!
//! Ownership is claimed in the map the moment a winner is chosen, so two
//! groups processed later in the same pass can never both claim one phone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tcb_common::phone;

/// `canonical phone → record id` for the current resolution pass.
///
/// Process-scoped explicit state; built per run and threaded through the
/// pass, never persisted.
#[derive(Debug, Default, Clone)]
pub struct OwnershipMap(HashMap<String, String>);

impl OwnershipMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner_of(&self, canonical: &str) -> Option<&str> {
        self.0.get(canonical).map(String::as_str)
    }

    pub fn claim(&mut self, canonical: impl Into<String>, record_id: impl Into<String>) {
        self.0.insert(canonical.into(), record_id.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Canonical phones currently owned.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A contact record under consideration in a resolution pass.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// CRM record id
    pub id: String,
    /// Current value of the unique-identity property (may be raw or empty)
    pub unique_value: String,
    /// Current display phone (may be raw or empty)
    pub raw_phone: String,
    /// CRM creation timestamp, used for tie-breaking
    pub created_at: Option<DateTime<Utc>>,
}

/// One planned property write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpdate {
    pub id: String,
    pub canonical: String,
}

/// A group of ≥2 candidates that collided on one canonical phone.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCluster {
    pub target: String,
    pub winner_id: String,
    pub loser_ids: Vec<String>,
}

/// Output of a resolution pass.
#[derive(Debug, Default, Clone)]
pub struct ResolutionPlan {
    /// Records that become owners: set display phone AND unique identity
    pub set_both: Vec<PlannedUpdate>,
    /// Records that only get their display phone canonicalized
    pub set_phone_only: Vec<PlannedUpdate>,
    /// Collision report for observability
    pub clusters: Vec<DuplicateCluster>,
}

/// Seed ownership from records already holding a canonical unique value.
pub fn seed_ownership(candidates: &[Candidate]) -> OwnershipMap {
    let mut ownership = OwnershipMap::new();
    for c in candidates {
        let value = c.unique_value.trim();
        if !value.is_empty() && value.starts_with('+') {
            ownership.claim(value, c.id.clone());
        }
    }
    ownership
}

/// Target canonical phone for a candidate: unique-property digits win over
/// display-phone digits, then normalize against the country code.
fn target_of(candidate: &Candidate, country_code: &str) -> Option<String> {
    let unique_digits = phone::only_digits(&candidate.unique_value);
    let source = if unique_digits.is_empty() {
        candidate.raw_phone.as_str()
    } else {
        candidate.unique_value.as_str()
    };
    phone::normalize(source, country_code).map(|p| p.e164)
}

/// Records already canonical on both fields need no write at all.
fn needs_normalization(candidate: &Candidate) -> bool {
    !candidate.unique_value.trim().starts_with('+')
        || !candidate.raw_phone.trim().starts_with('+')
}

/// Resolve a batch of candidates against a pre-seeded ownership map.
pub fn resolve(
    candidates: &[Candidate],
    country_code: &str,
    ownership: &mut OwnershipMap,
) -> ResolutionPlan {
    // Group by target canonical phone; BTreeMap keeps the pass order
    // deterministic for a fixed input.
    let mut groups: BTreeMap<String, Vec<&Candidate>> = BTreeMap::new();
    for candidate in candidates {
        if !needs_normalization(candidate) {
            continue;
        }
        let Some(target) = target_of(candidate, country_code) else {
            continue;
        };
        groups.entry(target).or_default().push(candidate);
    }

    let mut plan = ResolutionPlan::default();

    for (target, group) in groups {
        if ownership.owner_of(&target).is_some() {
            // A global owner already holds this identity: never touch the
            // unique property of anyone in the group.
            for member in group {
                plan.set_phone_only.push(PlannedUpdate {
                    id: member.id.clone(),
                    canonical: target.clone(),
                });
            }
            continue;
        }

        if let [only] = group.as_slice() {
            plan.set_both.push(PlannedUpdate {
                id: only.id.clone(),
                canonical: target.clone(),
            });
            ownership.claim(target, only.id.clone());
            continue;
        }

        let winner_id = pick_winner(&group, &target);
        plan.clusters.push(DuplicateCluster {
            target: target.clone(),
            winner_id: winner_id.clone(),
            loser_ids: group
                .iter()
                .filter(|c| c.id != winner_id)
                .map(|c| c.id.clone())
                .collect(),
        });

        for member in group {
            if member.id == winner_id {
                plan.set_both.push(PlannedUpdate {
                    id: member.id.clone(),
                    canonical: target.clone(),
                });
            } else {
                plan.set_phone_only.push(PlannedUpdate {
                    id: member.id.clone(),
                    canonical: target.clone(),
                });
            }
        }
        ownership.claim(target, winner_id);
    }

    plan
}

/// Deterministic tie-break for a collision group: exact unique-value match,
/// then earliest creation timestamp (missing sorts earliest), then input
/// order.
fn pick_winner(group: &[&Candidate], target: &str) -> String {
    if let Some(exact) = group.iter().find(|c| c.unique_value.trim() == target) {
        return exact.id.clone();
    }
    let mut sorted: Vec<&&Candidate> = group.iter().collect();
    sorted.sort_by_key(|c| c.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC));
    sorted
        .first()
        .map(|c| c.id.clone())
        .unwrap_or_default()
}
