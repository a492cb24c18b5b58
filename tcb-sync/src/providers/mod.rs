//! Telecom provider adapters
//!
//! Claro and Tigo expose paginated message/contact listings with loosely
//! specified JSON: field names, id types, and paging parameters differ
//! between deployments. The raw record types here absorb that looseness;
//! mapping to CRM property bags happens in `sync::mapper`.

pub mod claro;
pub mod paging;
pub mod tigo;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

pub use claro::ClaroClient;
pub use tigo::TigoClient;

/// Upstream system a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSystem {
    Claro,
    Tigo,
}

impl SourceSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::Claro => "Claro",
            SourceSystem::Tigo => "Tigo",
        }
    }
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claro" => Ok(SourceSystem::Claro),
            "tigo" => Ok(SourceSystem::Tigo),
            other => Err(format!("unknown source system {other:?}")),
        }
    }
}

/// Scalar that may arrive as string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Flex {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Flex {
    pub fn to_text(&self) -> String {
        match self {
            Flex::Str(s) => s.trim().to_string(),
            Flex::Int(n) => n.to_string(),
            Flex::Float(f) => f.to_string(),
            Flex::Bool(b) => b.to_string(),
        }
    }
}

fn text(v: &Option<Flex>) -> Option<String> {
    v.as_ref().map(Flex::to_text).filter(|s| !s.is_empty())
}

/// A raw provider message event, tolerating both providers' field spellings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<Flex>,
    #[serde(default, rename = "messageId")]
    pub message_id: Option<Flex>,
    #[serde(default)]
    pub uuid: Option<Flex>,

    #[serde(default)]
    pub msisdn: Option<Flex>,
    #[serde(default, rename = "msisdnTo")]
    pub msisdn_to: Option<Flex>,
    #[serde(default, rename = "msisdnFrom")]
    pub msisdn_from: Option<Flex>,

    #[serde(default, rename = "sentAt")]
    pub sent_at: Option<Flex>,
    #[serde(default, rename = "createdDate")]
    pub created_date: Option<Flex>,
    #[serde(default)]
    pub timestamp: Option<Flex>,

    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default, rename = "shortCode")]
    pub short_code: Option<Flex>,
    #[serde(default)]
    pub status: Option<Flex>,
}

impl RawMessage {
    /// Provider-side id, when any of the spellings carries one.
    pub fn provider_id(&self) -> Option<String> {
        text(&self.id)
            .or_else(|| text(&self.message_id))
            .or_else(|| text(&self.uuid))
    }

    /// Raw phone value, preferring the direct msisdn.
    pub fn raw_number(&self) -> Option<String> {
        text(&self.msisdn)
            .or_else(|| text(&self.msisdn_to))
            .or_else(|| text(&self.msisdn_from))
    }

    /// Raw timestamp value as the provider sent it.
    pub fn raw_date(&self) -> Option<String> {
        text(&self.sent_at)
            .or_else(|| text(&self.created_date))
            .or_else(|| text(&self.timestamp))
    }

    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .or(self.message.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn direction_text(&self) -> String {
        self.direction.as_deref().unwrap_or("").trim().to_string()
    }

    /// Channel identifier; falls back to the short code.
    pub fn channel_text(&self) -> String {
        self.channel
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| text(&self.short_code))
            .unwrap_or_default()
    }

    pub fn status_text(&self) -> String {
        text(&self.status).unwrap_or_default()
    }
}

/// A raw provider contact record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawContact {
    #[serde(default)]
    pub msisdn: Option<Flex>,
    #[serde(default)]
    pub phone: Option<Flex>,
    #[serde(default)]
    pub number: Option<Flex>,

    #[serde(default, rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl RawContact {
    pub fn raw_number(&self) -> Option<String> {
        text(&self.msisdn)
            .or_else(|| text(&self.phone))
            .or_else(|| text(&self.number))
    }

    pub fn first_name(&self) -> Option<&str> {
        self.first_name
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn last_name(&self) -> Option<&str> {
        self.last_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Time window for provider listings: `days` back from now.
pub fn window_from_days(days: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = Utc::now();
    let start = end - Duration::days(i64::from(days));
    (start, end)
}
