//! CRM property bags
//!
//! HubSpot objects are written as string-keyed property maps. Most keys are
//! portal-specific, but two are load-bearing for the bridge: the
//! unique-identity property (canonical phone or message key) and the display
//! phone. `PropertyMap` keeps those explicit while leaving the rest open.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Display phone property name in the CRM.
pub const PROP_PHONE: &str = "phone";
/// Secondary display phone property name in the CRM.
pub const PROP_MOBILE_PHONE: &str = "mobilephone";

/// An open string-keyed property map sent to the CRM.
///
/// BTreeMap keeps serialized payloads in a stable key order, which makes
/// request logs and dry-run artifacts diffable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, String>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Display phone, when present.
    pub fn phone(&self) -> Option<&str> {
        self.get(PROP_PHONE)
    }

    /// Value of the configured unique-identity property, when present.
    pub fn unique_value<'a>(&'a self, unique_property: &str) -> Option<&'a str> {
        self.get(unique_property)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl FromIterator<(String, String)> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
