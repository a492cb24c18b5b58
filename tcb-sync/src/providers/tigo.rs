//! Tigo B2B provider adapter
//!
//! Lists organization contacts and messages. Besides the paging-scheme
//! differences handled by [`FlexPager`], Tigo deployments also disagree on
//! the date-window parameter format, so message listing walks a fixed set
//! of format variants until one answers.

use super::paging::{FlexPager, PagingScheme};
use super::{window_from_days, RawContact, RawMessage};
use chrono::{DateTime, Utc};
use reqwest::header;
use std::time::Duration;
use tcb_common::config::TigoConfig;
use tcb_common::{Error, Result};
use tracing::{debug, warn};

const MAX_PAGES: usize = 200;

/// Date-window parameter variants, tried in order.
#[derive(Debug, Clone, Copy)]
enum DateVariant {
    NoDates,
    RfcSnakeCase,
    IsoCamelCase,
    YmdHmsCamelCase,
    IsoFromTo,
}

impl DateVariant {
    const ALL: [DateVariant; 5] = [
        DateVariant::NoDates,
        DateVariant::RfcSnakeCase,
        DateVariant::IsoCamelCase,
        DateVariant::YmdHmsCamelCase,
        DateVariant::IsoFromTo,
    ];

    fn name(&self) -> &'static str {
        match self {
            DateVariant::NoDates => "no_dates",
            DateVariant::RfcSnakeCase => "rfc_start_date",
            DateVariant::IsoCamelCase => "iso_startDate",
            DateVariant::YmdHmsCamelCase => "ymdhms_startDate",
            DateVariant::IsoFromTo => "iso_from_to",
        }
    }

    fn params(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(String, String)> {
        match self {
            DateVariant::NoDates => vec![],
            DateVariant::RfcSnakeCase => vec![
                ("start_date".into(), rfc1123(start)),
                ("end_date".into(), rfc1123(end)),
            ],
            DateVariant::IsoCamelCase => vec![
                ("startDate".into(), iso(start)),
                ("endDate".into(), iso(end)),
            ],
            DateVariant::YmdHmsCamelCase => vec![
                ("startDate".into(), ymd_hms(start)),
                ("endDate".into(), ymd_hms(end)),
            ],
            DateVariant::IsoFromTo => vec![
                ("from".into(), iso(start)),
                ("to".into(), iso(end)),
            ],
        }
    }
}

fn rfc1123(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn iso(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn ymd_hms(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub struct TigoClient {
    http: reqwest::Client,
    config: TigoConfig,
}

impl TigoClient {
    pub fn new(config: TigoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, config })
    }

    fn org_id(&self) -> Result<&str> {
        self.config
            .org_id
            .as_deref()
            .ok_or_else(|| Error::Config("Tigo org_id is not configured".to_string()))
    }

    fn headers(&self) -> Result<header::HeaderMap> {
        let token = self
            .config
            .token
            .as_deref()
            .ok_or_else(|| Error::Config("Tigo token is not configured".to_string()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::Config("Tigo token contains invalid characters".into()))?,
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
        if let Some(key) = &self.config.api_key {
            if let Ok(v) = header::HeaderValue::from_str(key) {
                headers.insert("APIKey", v);
            }
        }
        if let Some(secret) = &self.config.api_secret {
            if let Ok(v) = header::HeaderValue::from_str(secret) {
                headers.insert("APISecret", v);
            }
        }
        Ok(headers)
    }

    fn pager(&self) -> FlexPager {
        FlexPager {
            page_size: self.config.page_size.max(1),
            max_pages: MAX_PAGES,
            forced_scheme: self
                .config
                .paging_scheme
                .as_deref()
                .and_then(PagingScheme::from_name),
        }
    }

    /// All contacts of the configured organization.
    pub async fn list_contacts(&self) -> Result<Vec<RawContact>> {
        let url = format!(
            "{}/tigo/b2b/gt/comcorp/contacts/organizations/{}",
            self.config.base_url,
            self.org_id()?
        );
        let items = self
            .pager()
            .fetch_all(&self.http, &url, &self.headers()?, &[])
            .await?;
        Ok(decode_items(items, "contact"))
    }

    /// Messages in the configured look-back window, optionally filtered by
    /// direction (`MT`/`MO`).
    pub async fn list_messages(&self, direction: Option<&str>) -> Result<Vec<RawMessage>> {
        let url = format!(
            "{}/tigo/b2b/gt/comcorp/messages/organizations/{}",
            self.config.base_url,
            self.org_id()?
        );
        let headers = self.headers()?;
        let (start, end) = window_from_days(self.config.days);

        let direction_param: Vec<(String, String)> = match direction {
            Some(d) if d != "ALL" => vec![("direction".into(), d.to_string())],
            _ => vec![],
        };

        let mut last_error: Option<Error> = None;
        for variant in DateVariant::ALL {
            let mut params = direction_param.clone();
            params.extend(variant.params(start, end));

            match self
                .pager()
                .fetch_all(&self.http, &url, &headers, &params)
                .await
            {
                Ok(items) => {
                    debug!(
                        variant = variant.name(),
                        count = items.len(),
                        "Tigo message listing succeeded"
                    );
                    return Ok(decode_items(items, "message"));
                }
                Err(e @ Error::InvalidInput(_)) => return Err(e),
                Err(e) => {
                    debug!(variant = variant.name(), error = %e, "Tigo date variant failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Internal("no Tigo date variants to try".to_string())))
    }
}

fn decode_items<T: serde::de::DeserializeOwned>(
    items: Vec<serde_json::Value>,
    kind: &str,
) -> Vec<T> {
    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if decoded.len() < total {
        warn!(
            kind,
            dropped = total - decoded.len(),
            "Some provider records did not match the expected shape"
        );
    }
    decoded
}
