//! Sync engine: identity resolution, property mapping, and the
//! association reconciler.

pub mod identity;
pub mod mapper;
pub mod reconciler;

pub use identity::{Candidate, DuplicateCluster, OwnershipMap, ResolutionPlan};
pub use reconciler::{Reconciler, RunPhase, RunSummary};
