//! Claro provider adapter
//!
//! Lists outbound messages for a date window. Claro has no contact listing
//! endpoint; contacts are derived from the distinct MSISDNs seen in the
//! message window, which is how the upstream account has always been fed.

use super::{window_from_days, RawContact, RawMessage, SourceSystem};
use reqwest::header;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tcb_common::config::ClaroConfig;
use tcb_common::{phone, Error, Result};
use tracing::debug;

/// Claro answers either a bare array or an `items` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClaroListing {
    Envelope { items: Vec<RawMessage> },
    Plain(Vec<RawMessage>),
}

impl ClaroListing {
    fn into_items(self) -> Vec<RawMessage> {
        match self {
            ClaroListing::Envelope { items } => items,
            ClaroListing::Plain(items) => items,
        }
    }
}

pub struct ClaroClient {
    http: reqwest::Client,
    config: ClaroConfig,
}

impl ClaroClient {
    pub fn new(config: ClaroConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }

    fn headers(&self) -> Result<header::HeaderMap> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("Claro api_key is not configured".to_string()))?;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| Error::Config("Claro api_key contains invalid characters".into()))?,
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Outbound messages in the configured look-back window.
    pub async fn list_messages(&self) -> Result<Vec<RawMessage>> {
        if self.config.base_url.is_empty() {
            return Err(Error::Config("Claro base_url is not configured".to_string()));
        }
        let (start, end) = window_from_days(self.config.days);
        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));
        let params = [
            (
                "start_date".to_string(),
                start.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ),
            (
                "end_date".to_string(),
                end.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ),
            ("direction".to_string(), "MT".to_string()),
            ("limit".to_string(), self.config.limit.to_string()),
        ];

        let response = self
            .http
            .get(&url)
            .headers(self.headers()?)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(120).collect();
            return Err(Error::Internal(format!("Claro {status} on {url}: {snippet}")));
        }

        let listing: ClaroListing = response.json().await?;
        let items = listing.into_items();
        debug!(count = items.len(), "Claro message listing succeeded");
        Ok(items)
    }

    /// Contacts derived from the MSISDNs of the message window, one per
    /// distinct digit string.
    pub async fn list_contacts(&self) -> Result<Vec<RawContact>> {
        let messages = self.list_messages().await?;
        Ok(derive_contacts(&messages))
    }
}

pub(crate) fn derive_contacts(messages: &[RawMessage]) -> Vec<RawContact> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in messages {
        let Some(raw) = m.raw_number() else { continue };
        let digits = phone::only_digits(&raw);
        if digits.is_empty() || !seen.insert(digits.clone()) {
            continue;
        }
        out.push(RawContact {
            msisdn: Some(super::Flex::Str(raw)),
            company: Some(SourceSystem::Claro.as_str().to_string()),
            ..RawContact::default()
        });
    }
    out
}
