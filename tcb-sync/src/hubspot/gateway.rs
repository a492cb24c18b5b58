//! CRM gateway contract
//!
//! The reconciler and the jobs consume the CRM through this trait rather
//! than `HubSpotClient` directly, which keeps the sync engine testable
//! against a scripted gateway.

use super::client::HubSpotClient;
use super::types::HsRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tcb_common::{PropertyMap, Result};

/// Update of an existing record by CRM id.
#[derive(Debug, Clone, Serialize)]
pub struct RecordUpdate {
    pub id: String,
    pub properties: PropertyMap,
}

/// How an upsert call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertMode {
    /// Single `batch/upsert` call path
    Batch,
    /// One-record-at-a-time search-then-write (non-unique id property)
    Fallback,
    /// Payload written to the data dir, nothing sent
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    /// Records accepted by the CRM (or captured by the dry run)
    pub sent: usize,
    /// Records that still failed in fallback mode
    pub failed: usize,
    pub mode: UpsertMode,
}

/// Result of an association submission. `remaining > 0` means the retry
/// budget ran out mid-run and the listed pairs were never submitted; the
/// created count is still accurate.
#[derive(Debug, Clone, Serialize)]
pub struct AssociationOutcome {
    pub created: usize,
    pub remaining: usize,
}

impl AssociationOutcome {
    pub fn complete(created: usize) -> Self {
        Self {
            created,
            remaining: 0,
        }
    }
}

/// Resolved association type and the direction the portal accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationType {
    pub type_id: i64,
    pub from_type_id: String,
    pub to_type_id: String,
    /// True when only the `to → from` direction carries a label; callers
    /// must mirror every pair before submission.
    pub reversed: bool,
}

/// The CRM capability surface the sync engine consumes.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// All records of a type with the given properties (paged internally).
    async fn fetch_all(&self, object_type: &str, properties: &[&str]) -> Result<Vec<HsRecord>>;

    /// Map many unique-property values to record ids.
    async fn read_ids_by_unique(
        &self,
        object_type: &str,
        id_property: &str,
        values: &[String],
    ) -> Result<HashMap<String, String>>;

    /// Upsert records keyed by a unique property.
    async fn batch_upsert(
        &self,
        object_type: &str,
        id_property: &str,
        records: &[PropertyMap],
    ) -> Result<UpsertOutcome>;

    /// Update existing records by id.
    async fn batch_update(&self, object_type: &str, updates: &[RecordUpdate]) -> Result<usize>;

    /// Resolve association type id and direction between two object types.
    async fn resolve_association_type(
        &self,
        from_object: &str,
        to_object: &str,
    ) -> Result<AssociationType>;

    /// Create association edges. Rate-limit exhaustion mid-run yields a
    /// partial outcome, not an error; the created count survives.
    async fn create_associations(
        &self,
        assoc: &AssociationType,
        pairs: &[(String, String)],
    ) -> Result<AssociationOutcome>;
}

#[async_trait]
impl CrmGateway for HubSpotClient {
    async fn fetch_all(&self, object_type: &str, properties: &[&str]) -> Result<Vec<HsRecord>> {
        self.fetch_all_records(object_type, properties).await
    }

    async fn read_ids_by_unique(
        &self,
        object_type: &str,
        id_property: &str,
        values: &[String],
    ) -> Result<HashMap<String, String>> {
        match self.config().contact_lookup {
            tcb_common::config::ContactLookup::BatchRead => {
                self.batch_read_ids(object_type, id_property, values).await
            }
            tcb_common::config::ContactLookup::Search => {
                self.search_ids_by_property(object_type, id_property, values)
                    .await
            }
        }
    }

    async fn batch_upsert(
        &self,
        object_type: &str,
        id_property: &str,
        records: &[PropertyMap],
    ) -> Result<UpsertOutcome> {
        self.batch_upsert_records(object_type, id_property, records)
            .await
    }

    async fn batch_update(&self, object_type: &str, updates: &[RecordUpdate]) -> Result<usize> {
        self.batch_update_records(object_type, updates).await
    }

    async fn resolve_association_type(
        &self,
        from_object: &str,
        to_object: &str,
    ) -> Result<AssociationType> {
        self.resolve_association(from_object, to_object).await
    }

    async fn create_associations(
        &self,
        assoc: &AssociationType,
        pairs: &[(String, String)],
    ) -> Result<AssociationOutcome> {
        HubSpotClient::create_associations(self, assoc, pairs).await
    }
}
