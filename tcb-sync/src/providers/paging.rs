//! Flexible provider pagination
//!
//! Provider deployments disagree on both the paging query parameters and
//! the end-of-data signal. The pager probes the known parameter schemes on
//! the first page (unless one is forced by configuration) and then walks
//! pages until a termination signal: an explicit `last` flag, a total-page
//! count, or a short page, in that priority order.

use serde::Deserialize;
use tcb_common::{Error, Result};
use tracing::{debug, warn};

/// Known paging parameter schemes, probed in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingScheme {
    /// `page` + `size`
    PageSize,
    /// `pageNumber` + `pageSize`
    PageNumberPageSize,
    /// `number` + `size`
    NumberSize,
    /// `offset` + `size` (offset in records)
    OffsetSize,
}

impl PagingScheme {
    pub const ALL: [PagingScheme; 4] = [
        PagingScheme::PageSize,
        PagingScheme::PageNumberPageSize,
        PagingScheme::NumberSize,
        PagingScheme::OffsetSize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PagingScheme::PageSize => "page_size",
            PagingScheme::PageNumberPageSize => "pageNumber_pageSize",
            PagingScheme::NumberSize => "number_size",
            PagingScheme::OffsetSize => "offset_size",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// Query parameters selecting `page_index` with `page_size` items.
    pub fn params(&self, page_index: usize, page_size: usize) -> Vec<(String, String)> {
        match self {
            PagingScheme::PageSize => vec![
                ("page".into(), page_index.to_string()),
                ("size".into(), page_size.to_string()),
            ],
            PagingScheme::PageNumberPageSize => vec![
                ("pageNumber".into(), page_index.to_string()),
                ("pageSize".into(), page_size.to_string()),
            ],
            PagingScheme::NumberSize => vec![
                ("number".into(), page_index.to_string()),
                ("size".into(), page_size.to_string()),
            ],
            PagingScheme::OffsetSize => vec![
                ("offset".into(), (page_index * page_size).to_string()),
                ("size".into(), page_size.to_string()),
            ],
        }
    }
}

/// Provider page envelope; every field is optional because deployments
/// disagree on which they send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageEnvelope {
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
    #[serde(default)]
    pub last: Option<bool>,
    #[serde(default, rename = "totalPages")]
    pub total_pages: Option<usize>,
    #[serde(default, rename = "numberOfElements")]
    pub number_of_elements: Option<usize>,
}

/// Termination priority: explicit `last` flag, total-page count, element
/// count under the page size, short page.
pub fn is_last_page(envelope: &PageEnvelope, page_index: usize, page_size: usize) -> bool {
    if let Some(last) = envelope.last {
        return last;
    }
    if let Some(total) = envelope.total_pages {
        return page_index + 1 >= total;
    }
    if let Some(n) = envelope.number_of_elements {
        return n < page_size;
    }
    envelope.content.len() < page_size
}

/// Paged fetcher over a provider listing endpoint.
pub struct FlexPager {
    pub page_size: usize,
    pub max_pages: usize,
    pub forced_scheme: Option<PagingScheme>,
}

impl FlexPager {
    /// Fetch all pages of `url`, detecting the paging scheme on the first
    /// request. `base_params` are repeated on every page. Auth failures
    /// (401/403) abort immediately; other failures move detection to the
    /// next candidate scheme.
    pub async fn fetch_all(
        &self,
        http: &reqwest::Client,
        url: &str,
        headers: &reqwest::header::HeaderMap,
        base_params: &[(String, String)],
    ) -> Result<Vec<serde_json::Value>> {
        let (scheme, first) = self
            .detect_scheme(http, url, headers, base_params)
            .await?;

        let mut out = first.content.clone();
        if is_last_page(&first, 0, self.page_size) {
            return Ok(out);
        }

        let mut page_index = 1;
        while page_index < self.max_pages {
            let envelope = self
                .get_page(http, url, headers, base_params, scheme, page_index)
                .await?;
            let count = envelope.content.len();
            out.extend(envelope.content.iter().cloned());
            if count == 0 || is_last_page(&envelope, page_index, self.page_size) {
                break;
            }
            page_index += 1;
        }

        if page_index >= self.max_pages {
            warn!(url, max_pages = self.max_pages, "Stopped listing at page cap");
        }
        Ok(out)
    }

    async fn detect_scheme(
        &self,
        http: &reqwest::Client,
        url: &str,
        headers: &reqwest::header::HeaderMap,
        base_params: &[(String, String)],
    ) -> Result<(PagingScheme, PageEnvelope)> {
        if let Some(forced) = self.forced_scheme {
            debug!(scheme = forced.name(), "Using forced paging scheme");
            let first = self
                .get_page(http, url, headers, base_params, forced, 0)
                .await?;
            return Ok((forced, first));
        }

        let mut last_error: Option<Error> = None;
        for candidate in PagingScheme::ALL {
            match self
                .get_page(http, url, headers, base_params, candidate, 0)
                .await
            {
                Ok(envelope) => {
                    debug!(
                        scheme = candidate.name(),
                        items = envelope.content.len(),
                        "Paging scheme detected"
                    );
                    return Ok((candidate, envelope));
                }
                Err(e) => {
                    if is_auth_failure(&e) {
                        return Err(e);
                    }
                    debug!(scheme = candidate.name(), error = %e, "Paging scheme probe failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::Internal("no paging scheme candidates".to_string())))
    }

    async fn get_page(
        &self,
        http: &reqwest::Client,
        url: &str,
        headers: &reqwest::header::HeaderMap,
        base_params: &[(String, String)],
        scheme: PagingScheme,
        page_index: usize,
    ) -> Result<PageEnvelope> {
        let mut params = base_params.to_vec();
        params.extend(scheme.params(page_index, self.page_size));

        let response = http
            .get(url)
            .headers(headers.clone())
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(120).collect();
            return Err(match status.as_u16() {
                401 | 403 => Error::InvalidInput(format!("provider auth rejected ({status}): {snippet}")),
                _ => Error::Internal(format!("provider {status} on {url}: {snippet}")),
            });
        }

        Ok(response.json().await?)
    }
}

fn is_auth_failure(error: &Error) -> bool {
    matches!(error, Error::InvalidInput(msg) if msg.starts_with("provider auth rejected"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_params_cover_all_variants() {
        assert_eq!(
            PagingScheme::PageSize.params(2, 25),
            vec![("page".to_string(), "2".into()), ("size".to_string(), "25".into())]
        );
        assert_eq!(
            PagingScheme::PageNumberPageSize.params(0, 100),
            vec![
                ("pageNumber".to_string(), "0".into()),
                ("pageSize".to_string(), "100".into())
            ]
        );
        assert_eq!(
            PagingScheme::OffsetSize.params(3, 25),
            vec![("offset".to_string(), "75".into()), ("size".to_string(), "25".into())]
        );
    }

    #[test]
    fn scheme_names_round_trip() {
        for scheme in PagingScheme::ALL {
            assert_eq!(PagingScheme::from_name(scheme.name()), Some(scheme));
        }
        assert_eq!(PagingScheme::from_name("bogus"), None);
    }

    #[test]
    fn last_flag_beats_everything() {
        let envelope = PageEnvelope {
            content: vec![serde_json::Value::Null; 25],
            last: Some(false),
            total_pages: Some(1),
            number_of_elements: Some(3),
        };
        assert!(!is_last_page(&envelope, 0, 25));

        let done = PageEnvelope {
            last: Some(true),
            ..PageEnvelope::default()
        };
        assert!(is_last_page(&done, 0, 25));
    }

    #[test]
    fn total_pages_checked_before_element_count() {
        let envelope = PageEnvelope {
            content: vec![serde_json::Value::Null; 25],
            last: None,
            total_pages: Some(3),
            number_of_elements: Some(25),
        };
        assert!(!is_last_page(&envelope, 0, 25));
        assert!(is_last_page(&envelope, 2, 25));
    }

    #[test]
    fn short_page_terminates_without_metadata() {
        let envelope = PageEnvelope {
            content: vec![serde_json::Value::Null; 7],
            ..PageEnvelope::default()
        };
        assert!(is_last_page(&envelope, 4, 25));

        let full = PageEnvelope {
            content: vec![serde_json::Value::Null; 25],
            ..PageEnvelope::default()
        };
        assert!(!is_last_page(&full, 4, 25));
    }
}
