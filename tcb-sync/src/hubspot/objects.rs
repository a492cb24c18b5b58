//! CRM object operations: listing, lookup, and upsert
//!
//! Paged reads walk the v3 cursor (`paging.next.after`) until exhaustion.
//! Batched writes chunk to the configured batch size. `batch_upsert` degrades
//! to a one-record-at-a-time search-then-write path when the portal reports
//! that the chosen id property is not actually unique.

use super::client::HubSpotClient;
use super::gateway::{RecordUpdate, UpsertMode, UpsertOutcome};
use super::types::{
    BatchInputs, BatchReadInput, BatchReadRequest, BatchResults, BatchUpdateInput,
    BatchUpsertInput, Filter, FilterGroup, HsRecord, Page, SchemaList, SearchRequest,
};
use crate::audit;
use serde_json::json;
use std::collections::HashMap;
use tcb_common::{Error, PropertyMap, Result};
use tracing::{debug, info, warn};

const SEARCH_CHUNK: usize = 100;

impl HubSpotClient {
    /// Fetch every record of an object type with the requested properties.
    pub async fn fetch_all_records(
        &self,
        object_type: &str,
        properties: &[&str],
    ) -> Result<Vec<HsRecord>> {
        let path = format!("/crm/v3/objects/{object_type}");
        let props = properties.join(",");
        let mut out = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![
                ("limit".to_string(), self.config().batch_size.to_string()),
                ("properties".to_string(), props.clone()),
                ("archived".to_string(), "false".to_string()),
            ];
            if let Some(cursor) = &after {
                query.push(("after".to_string(), cursor.clone()));
            }

            let page: Page<HsRecord> = self.get_json(&path, &query, "fetch-all").await?;
            out.extend(page.results);

            after = page.paging.and_then(|p| p.next).map(|n| n.after);
            if after.is_none() {
                break;
            }
            self.batch_pause().await;
        }

        debug!(object_type, total = out.len(), "Fetched all records");
        Ok(out)
    }

    /// Resolve many unique-property values to record ids via `batch/read`.
    pub async fn batch_read_ids(
        &self,
        object_type: &str,
        id_property: &str,
        values: &[String],
    ) -> Result<HashMap<String, String>> {
        let path = format!("/crm/v3/objects/{object_type}/batch/read");
        let mut out = HashMap::new();

        for chunk in values.chunks(self.config().batch_size.max(1)) {
            let body = BatchReadRequest {
                id_property: id_property.to_string(),
                properties: vec![id_property.to_string()],
                inputs: chunk
                    .iter()
                    .map(|v| BatchReadInput { id: v.clone() })
                    .collect(),
            };
            let results: BatchResults = self.post_json(&path, &body, "batch-read").await?;
            for record in results.results {
                if let Some(value) = record.prop(id_property) {
                    out.insert(value.to_string(), record.id);
                }
            }
            self.throttle().await;
        }

        Ok(out)
    }

    /// Resolve many property values to record ids via the v3 search `IN`
    /// filter. Functionally equivalent to [`Self::batch_read_ids`]; some
    /// portal property configurations only support one of the two.
    pub async fn search_ids_by_property(
        &self,
        object_type: &str,
        property: &str,
        values: &[String],
    ) -> Result<HashMap<String, String>> {
        let path = format!("/crm/v3/objects/{object_type}/search");
        let mut out = HashMap::new();

        for chunk in values.chunks(SEARCH_CHUNK) {
            let body = SearchRequest {
                filter_groups: vec![FilterGroup {
                    filters: vec![Filter::is_in(property, chunk)],
                }],
                properties: vec![property.to_string()],
                limit: SEARCH_CHUNK,
            };
            let page: Page<HsRecord> = self.post_json(&path, &body, "search-in").await?;
            for record in page.results {
                if let Some(value) = record.prop(property) {
                    out.insert(value.to_string(), record.id);
                }
            }
            self.throttle().await;
        }

        Ok(out)
    }

    /// Find a single record id by exact property value.
    pub async fn search_one_id(
        &self,
        object_type: &str,
        property: &str,
        value: &str,
    ) -> Result<Option<String>> {
        let path = format!("/crm/v3/objects/{object_type}/search");
        let body = SearchRequest {
            filter_groups: vec![FilterGroup {
                filters: vec![Filter::eq(property, value)],
            }],
            properties: vec![],
            limit: 1,
        };
        let page: Page<HsRecord> = self.post_json(&path, &body, "search-eq").await?;
        Ok(page.results.into_iter().next().map(|r| r.id))
    }

    /// Batched property updates by record id.
    pub async fn batch_update_records(
        &self,
        object_type: &str,
        updates: &[RecordUpdate],
    ) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        if self.dry_run() {
            audit::write_artifact(
                &self.config().data_dir,
                "update",
                &json!({ "objectType": object_type, "inputs": updates }),
            )?;
            info!(object_type, count = updates.len(), "Dry run: update payload saved");
            return Ok(updates.len());
        }

        let path = format!("/crm/v3/objects/{object_type}/batch/update");
        let mut sent = 0;
        for chunk in updates.chunks(self.config().batch_size.max(1)) {
            let body = BatchInputs {
                inputs: chunk
                    .iter()
                    .map(|u| BatchUpdateInput {
                        id: u.id.clone(),
                        properties: u.properties.clone(),
                    })
                    .collect::<Vec<_>>(),
            };
            let _: serde_json::Value = self.post_json(&path, &body, "batch-update").await?;
            sent += chunk.len();
            debug!(object_type, sent, total = updates.len(), "Updated batch");
            self.batch_pause().await;
        }
        Ok(sent)
    }

    /// Upsert records keyed by a unique property.
    ///
    /// Tries `batch/upsert` first. When the portal answers that the property
    /// is non-unique, the whole call degrades to search-then-create/update,
    /// one record at a time; only records that still fail there are counted
    /// as failures.
    pub async fn batch_upsert_records(
        &self,
        object_type: &str,
        id_property: &str,
        records: &[PropertyMap],
    ) -> Result<UpsertOutcome> {
        if records.is_empty() {
            return Ok(UpsertOutcome {
                sent: 0,
                failed: 0,
                mode: UpsertMode::Batch,
            });
        }

        let inputs: Vec<BatchUpsertInput> = records
            .iter()
            .map(|props| BatchUpsertInput {
                id: props.unique_value(id_property).unwrap_or_default().to_string(),
                id_property: id_property.to_string(),
                properties: props.clone(),
            })
            .collect();

        if self.dry_run() {
            audit::write_artifact(
                &self.config().data_dir,
                "upsert",
                &json!({ "objectType": object_type, "idProperty": id_property, "inputs": inputs }),
            )?;
            info!(object_type, count = inputs.len(), "Dry run: upsert payload saved");
            return Ok(UpsertOutcome {
                sent: inputs.len(),
                failed: 0,
                mode: UpsertMode::DryRun,
            });
        }

        let path = format!("/crm/v3/objects/{object_type}/batch/upsert");
        let mut batch_error = None;
        let mut sent = 0;

        for chunk in inputs.chunks(self.config().batch_size.max(1)) {
            let body = BatchInputs {
                inputs: chunk.to_vec(),
            };
            match self
                .post_json::<serde_json::Value>(&path, &body, "batch-upsert")
                .await
            {
                Ok(_) => {
                    sent += chunk.len();
                    self.batch_pause().await;
                }
                Err(e) if e.is_non_unique_property() => {
                    batch_error = Some(e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let Some(_) = batch_error else {
            return Ok(UpsertOutcome {
                sent,
                failed: 0,
                mode: UpsertMode::Batch,
            });
        };

        warn!(
            object_type,
            id_property, "Id property is non-unique in this portal, switching to one-by-one upsert"
        );

        let mut ok = 0;
        let mut failed = 0;
        for props in records {
            match self.upsert_one(object_type, id_property, props).await {
                Ok(_) => ok += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        object_type,
                        key = props.unique_value(id_property).unwrap_or(""),
                        error = %e,
                        "Fallback upsert failed for record"
                    );
                }
            }
            self.throttle().await;
        }

        Ok(UpsertOutcome {
            sent: ok,
            failed,
            mode: UpsertMode::Fallback,
        })
    }

    async fn upsert_one(
        &self,
        object_type: &str,
        id_property: &str,
        props: &PropertyMap,
    ) -> Result<String> {
        let value = props
            .unique_value(id_property)
            .ok_or_else(|| Error::InvalidInput(format!("record missing {id_property}")))?;

        let existing = self.search_one_id(object_type, id_property, value).await?;
        let body = json!({ "properties": props });

        match existing {
            Some(id) => {
                let path = format!("/crm/v3/objects/{object_type}/{id}");
                let _: serde_json::Value = self.patch_json(&path, &body, "upsert-one").await?;
                Ok(id)
            }
            None => {
                let path = format!("/crm/v3/objects/{object_type}");
                let created: HsRecord = self.post_json(&path, &body, "upsert-one").await?;
                Ok(created.id)
            }
        }
    }

    /// Resolve an object-type name to its `majorId-minorId` identifier.
    ///
    /// Pair-string ids pass through; configured overrides and the contacts
    /// aliases short-circuit; everything else goes through `/crm/v3/schemas`.
    pub async fn resolve_object_type_id(&self, name_or_id: &str) -> Result<String> {
        if is_type_id_pair(name_or_id) {
            return Ok(name_or_id.to_string());
        }

        if let Some(id) = self.config().hubspot.object_type_overrides.get(name_or_id) {
            return Ok(id.clone());
        }

        let lower = name_or_id.trim().to_lowercase();
        if matches!(lower.as_str(), "contacts" | "contact" | "contactos" | "0-1") {
            return Ok("0-1".to_string());
        }

        let schemas: SchemaList = self.get_json("/crm/v3/schemas", &[], "schemas").await?;
        let hit = schemas.results.into_iter().find(|s| {
            s.name.as_deref() == Some(name_or_id)
                || s.fully_qualified_name.as_deref() == Some(name_or_id)
                || s.labels.as_ref().is_some_and(|l| {
                    l.singular.as_deref() == Some(name_or_id)
                        || l.plural.as_deref() == Some(name_or_id)
                })
        });

        hit.and_then(|s| s.object_type_id).ok_or_else(|| {
            Error::NotFound(format!(
                "objectTypeId for {name_or_id:?}; add it to object_type_overrides or check the portal's data model settings"
            ))
        })
    }
}

/// `majorId-minorId` pair strings like `2-50592224`.
fn is_type_id_pair(s: &str) -> bool {
    match s.split_once('-') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
