//! HubSpot wire types
//!
//! Serde shapes for the v3 object/search/batch endpoints and the v4
//! association endpoints. Only the fields the bridge reads are modeled;
//! everything else in the responses is ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tcb_common::PropertyMap;

/// One page of a v3 object listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    pub next: Option<PagingNext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagingNext {
    /// Opaque cursor for the next page
    pub after: String,
}

/// A CRM record with its requested properties.
///
/// HubSpot returns `null` for properties with no value, hence the Option.
#[derive(Debug, Clone, Deserialize)]
pub struct HsRecord {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Option<String>>,
}

impl HsRecord {
    /// Trimmed property value, treating null and blank as absent.
    pub fn prop(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

// ---- search ----

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    pub properties: Vec<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl Filter {
    pub fn eq(property: &str, value: &str) -> Self {
        Self {
            property_name: property.to_string(),
            operator: "EQ".to_string(),
            value: Some(value.to_string()),
            values: None,
        }
    }

    pub fn is_in(property: &str, values: &[String]) -> Self {
        Self {
            property_name: property.to_string(),
            operator: "IN".to_string(),
            value: None,
            values: Some(values.to_vec()),
        }
    }
}

// ---- batch endpoints ----

#[derive(Debug, Clone, Serialize)]
pub struct BatchInputs<T> {
    pub inputs: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReadRequest {
    pub id_property: String,
    pub properties: Vec<String>,
    pub inputs: Vec<BatchReadInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReadInput {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchUpdateInput {
    pub id: String,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpsertInput {
    pub id: String,
    pub id_property: String,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchResults {
    #[serde(default = "Vec::new")]
    pub results: Vec<HsRecord>,
}

// ---- associations (v4) ----

/// Association label entry. Portals disagree on the id field spelling.
#[derive(Debug, Clone, Deserialize)]
pub struct AssociationLabel {
    #[serde(rename = "associationTypeId", alias = "typeId", alias = "id")]
    pub type_id: Option<i64>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl AssociationLabel {
    pub fn display(&self) -> &str {
        self.label
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelList {
    #[serde(default = "Vec::new")]
    pub results: Vec<AssociationLabel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssocEndpoint {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssocCreateInput {
    pub from: AssocEndpoint,
    pub to: AssocEndpoint,
    #[serde(rename = "type")]
    pub type_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssocCreateResults {
    #[serde(default = "Vec::new")]
    pub results: Vec<serde_json::Value>,
}

// ---- schemas ----

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaList {
    #[serde(default = "Vec::new")]
    pub results: Vec<Schema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub name: Option<String>,
    pub object_type_id: Option<String>,
    pub fully_qualified_name: Option<String>,
    #[serde(default)]
    pub labels: Option<SchemaLabels>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaLabels {
    pub singular: Option<String>,
    pub plural: Option<String>,
}

// ---- error bodies ----

/// Fields HubSpot error responses carry; used to classify rate-limit and
/// validation failures.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(rename = "policyName", default)]
    pub policy_name: Option<String>,
}
