//! Configuration loading
//!
//! Settings resolve in priority order: environment variable → TOML config
//! file → compiled default. The environment names match what operators
//! already export for the node-based deployment tooling, so both can share
//! one `.env`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// How the reconciler resolves contact ids for canonical phones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactLookup {
    /// `batch/read` by unique property value (fewer round trips)
    #[default]
    BatchRead,
    /// v3 search with an `IN` filter (works when batch-read is unavailable
    /// for the portal's property configuration)
    Search,
}

/// HubSpot portal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSpotConfig {
    pub base_url: String,
    /// Private app token. When absent, writes run in dry-run mode.
    pub token: Option<String>,
    /// Custom object holding inbound/outbound messages
    pub messages_object: String,
    pub contacts_object: String,
    /// Unique-identity property on contacts (canonical phone)
    pub contact_unique_prop: String,
    /// Unique-identity property on messages (derived key)
    pub message_unique_prop: String,
    /// Property the portal requires on every message record
    pub message_required_prop: String,
    /// Preferred association label between messages and contacts; first
    /// label wins when unset
    pub preferred_assoc_label: Option<String>,
    /// Skip label resolution entirely and submit with this type id
    pub forced_assoc_type_id: Option<i64>,
    /// Object name → objectTypeId overrides (`2-XXXXX` pair strings)
    pub object_type_overrides: BTreeMap<String, String>,
    /// When false, write payloads land in the data dir instead of the CRM
    pub send_enabled: bool,
}

impl Default for HubSpotConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.hubapi.com".to_string(),
            token: None,
            messages_object: "p_mensajes".to_string(),
            contacts_object: "contacts".to_string(),
            contact_unique_prop: "numero_telefono_id_unico".to_string(),
            message_unique_prop: "id_mensaje_unico".to_string(),
            message_required_prop: "id_mensaje".to_string(),
            preferred_assoc_label: None,
            forced_assoc_type_id: None,
            object_type_overrides: BTreeMap::new(),
            send_enabled: true,
        }
    }
}

/// Pacing and retry settings shared by all CRM calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Maximum retry attempts after a rate-limit response
    pub retry_max: u32,
    /// Base delay for exponential backoff (doubled each attempt)
    pub retry_base_ms: u64,
    /// Pause between successive batch submissions
    pub batch_delay_ms: u64,
    /// Pause between single-record search calls in fallback paths
    pub search_throttle_ms: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            retry_max: 8,
            retry_base_ms: 700,
            batch_delay_ms: 250,
            search_throttle_ms: 120,
        }
    }
}

/// Tigo B2B provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TigoConfig {
    pub base_url: String,
    pub org_id: Option<String>,
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Look-back window for message listing
    pub days: u32,
    pub page_size: usize,
    /// Force a paging scheme instead of auto-detecting
    pub paging_scheme: Option<String>,
}

/// Claro provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaroConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub days: u32,
    pub limit: usize,
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Target country code for phone canonicalization
    pub country_code: String,
    /// Chunk size for batched CRM calls
    pub batch_size: usize,
    /// Company tag applied to synthesized contacts with no source hint
    pub default_company: Option<String>,
    pub contact_lookup: ContactLookup,
    /// Directory for dry-run payloads and duplicate-cluster reports
    pub data_dir: PathBuf,
    /// HTTP trigger port
    pub port: u16,
    /// Scheduled run period; disabled when None
    pub schedule_minutes: Option<u64>,
    pub hubspot: HubSpotConfig,
    pub rate: RateConfig,
    pub tigo: TigoConfig,
    pub claro: ClaroConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            country_code: "502".to_string(),
            batch_size: 100,
            default_company: None,
            contact_lookup: ContactLookup::default(),
            data_dir: PathBuf::from("data"),
            port: 3000,
            schedule_minutes: None,
            hubspot: HubSpotConfig::default(),
            rate: RateConfig::default(),
            tigo: TigoConfig {
                base_url: "https://prod.api.tigo.com/v1".to_string(),
                days: 7,
                page_size: 100,
                ..TigoConfig::default()
            },
            claro: ClaroConfig {
                days: 30,
                limit: 500,
                ..ClaroConfig::default()
            },
        }
    }
}

impl SyncConfig {
    /// Load configuration: TOML file (if present) overlaid with environment
    /// variables. The file path comes from `TCB_CONFIG`, defaulting to
    /// `tcb.toml` in the working directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var("TCB_CONFIG").unwrap_or_else(|_| "tcb.toml".to_string());
        let mut config = if std::path::Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path)?;
            let parsed: SyncConfig = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("parse {path}: {e}")))?;
            info!(path = %path, "Loaded TOML configuration");
            parsed
        } else {
            SyncConfig::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables on top of the current values.
    pub fn apply_env(&mut self) {
        env_string("HUBSPOT_TOKEN", |v| self.hubspot.token = Some(v));
        env_string("HUBSPOT_BASE_URL", |v| self.hubspot.base_url = v);
        env_string("HUBSPOT_MESSAGES_OBJECT", |v| self.hubspot.messages_object = v);
        env_string("HUBSPOT_CONTACTS_OBJECT", |v| self.hubspot.contacts_object = v);
        env_string("HUBSPOT_ID_PROPERTY", |v| self.hubspot.contact_unique_prop = v);
        env_string("HUBSPOT_MESSAGES_ID_PROPERTY", |v| {
            self.hubspot.message_unique_prop = v
        });
        env_string("HUBSPOT_MSG_REQUIRED_PROP", |v| {
            self.hubspot.message_required_prop = v
        });
        env_string("HUBSPOT_ASSOC_LABEL_MSG_TO_CONTACT", |v| {
            self.hubspot.preferred_assoc_label = Some(v)
        });
        env_parse("HUBSPOT_ASSOC_TYPE_ID", |v| {
            self.hubspot.forced_assoc_type_id = Some(v)
        });
        env_bool("SEND_TO_HUBSPOT", |v| self.hubspot.send_enabled = v);

        env_string("SYNC_COUNTRY_CODE", |v| self.country_code = v);
        env_parse("SYNC_BATCH_SIZE", |v| self.batch_size = v);
        env_parse("SYNC_RATE_DELAY_MS", |v| self.rate.batch_delay_ms = v);
        env_parse("HS_RETRY_MAX", |v| self.rate.retry_max = v);
        env_parse("HS_RETRY_BASE_MS", |v| self.rate.retry_base_ms = v);
        env_parse("HS_BATCH_READ_DELAY_MS", |v| self.rate.search_throttle_ms = v);
        env_string("ORPHAN_DEFAULT_COMPANIA", |v| self.default_company = Some(v));
        env_parse("PORT", |v| self.port = v);
        env_parse("SYNC_SCHEDULE_MINUTES", |v| self.schedule_minutes = Some(v));

        env_string("TIGO_B2B_BASE", |v| self.tigo.base_url = v);
        env_string("TIGO_B2B_ORG_ID", |v| self.tigo.org_id = Some(v));
        env_string("TIGO_B2B_TOKEN", |v| self.tigo.token = Some(v));
        env_string("TIGO_B2B_API_KEY", |v| self.tigo.api_key = Some(v));
        env_string("TIGO_B2B_API_SECRET", |v| self.tigo.api_secret = Some(v));
        env_parse("TIGO_B2B_DAYS", |v| self.tigo.days = v);
        env_parse("TIGO_PAGE_SIZE", |v| self.tigo.page_size = v);
        env_string("TIGO_PAGING_SCHEME", |v| self.tigo.paging_scheme = Some(v));

        env_string("CLARO_BASE_URL", |v| self.claro.base_url = v);
        env_string("CLARO_API_KEY", |v| self.claro.api_key = Some(v));
        env_string("CLARO_API_SECRET", |v| self.claro.api_secret = Some(v));
        env_parse("CLARO_MESSAGES_DAYS", |v| self.claro.days = v);
    }

    fn validate(&self) -> Result<()> {
        if self.country_code.is_empty() || !self.country_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Config(format!(
                "country_code must be digits, got {:?}",
                self.country_code
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        if self.hubspot.token.is_none() {
            warn!("No HubSpot token configured; CRM writes will run in dry-run mode");
        }
        Ok(())
    }
}

fn env_string(name: &str, mut set: impl FnMut(String)) {
    if let Ok(v) = std::env::var(name) {
        let v = v.trim().to_string();
        if !v.is_empty() {
            set(v);
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, mut set: impl FnMut(T)) {
    if let Ok(v) = std::env::var(name) {
        match v.trim().parse::<T>() {
            Ok(parsed) => set(parsed),
            Err(_) => warn!(var = name, value = %v, "Ignoring unparseable environment value"),
        }
    }
}

fn env_bool(name: &str, mut set: impl FnMut(bool)) {
    if let Ok(v) = std::env::var(name) {
        match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => set(true),
            "0" | "false" | "no" => set(false),
            _ => warn!(var = name, value = %v, "Ignoring unparseable boolean"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_portal_conventions() {
        let config = SyncConfig::default();
        assert_eq!(config.country_code, "502");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.hubspot.messages_object, "p_mensajes");
        assert_eq!(config.hubspot.contact_unique_prop, "numero_telefono_id_unico");
        assert_eq!(config.hubspot.message_unique_prop, "id_mensaje_unico");
        assert_eq!(config.rate.retry_max, 8);
        assert_eq!(config.contact_lookup, ContactLookup::BatchRead);
    }

    #[test]
    fn toml_round_trip() {
        let config = SyncConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: SyncConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.batch_size, config.batch_size);
        assert_eq!(parsed.hubspot.messages_object, config.hubspot.messages_object);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let parsed: SyncConfig = toml::from_str(
            r#"
            batch_size = 50

            [hubspot]
            messages_object = "p_sms"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.batch_size, 50);
        assert_eq!(parsed.hubspot.messages_object, "p_sms");
        assert_eq!(parsed.hubspot.contacts_object, "contacts");
        assert_eq!(parsed.country_code, "502");
    }

    #[test]
    fn validate_rejects_bad_country_code() {
        let config = SyncConfig {
            country_code: "GT".to_string(),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
