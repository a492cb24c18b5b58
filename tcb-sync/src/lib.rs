//! Telecom → CRM bridge
//!
//! Pulls message and contact data from the Claro and Tigo provider APIs,
//! canonicalizes phone identity, upserts into HubSpot, and reconciles
//! message ↔ contact associations. Triggered over HTTP or on a schedule.

pub mod api;
pub mod audit;
pub mod error;
pub mod hubspot;
pub mod jobs;
pub mod providers;
pub mod sync;

pub use api::{build_router, AppState};
pub use hubspot::HubSpotClient;
pub use jobs::JobRegistry;
