//! HubSpot CRM gateway
//!
//! Client, wire types, and the object/association operations the sync
//! engine consumes through the [`CrmGateway`] trait.

pub mod associations;
pub mod client;
pub mod gateway;
pub mod objects;
pub mod types;

pub use client::HubSpotClient;
pub use gateway::{
    AssociationOutcome, AssociationType, CrmGateway, RecordUpdate, UpsertMode, UpsertOutcome,
};
pub use types::HsRecord;
