//! Provider record → CRM property mapping
//!
//! Messages get a derived unique key so re-running a sync window upserts
//! instead of duplicating: the canonical phone, the event's epoch
//! milliseconds, the direction, and a short content hash. Providers resend
//! the same events with drifting ids, so provider ids alone are not stable
//! enough to key on.

use crate::providers::{RawContact, RawMessage, SourceSystem};
use tcb_common::config::HubSpotConfig;
use tcb_common::{phone, props, PropertyMap};

/// CRM property holding the message's phone number.
pub const PROP_NUMERO: &str = "numero";
/// CRM property holding the message body.
pub const PROP_CONTENIDO: &str = "contenido";
/// CRM property holding the delivery status.
pub const PROP_ESTADO: &str = "estado";
/// CRM property holding the event timestamp (epoch ms).
pub const PROP_FECHA: &str = "fecha";
/// CRM property holding the source company tag.
pub const PROP_COMPANIA: &str = "compania";

const BODY_HASH_PREFIX: usize = 64;

/// djb2 over the input, rendered base-36.
fn content_hash(input: &str) -> String {
    let mut h: u32 = 5381;
    for b in input.bytes() {
        h = h.wrapping_mul(33).wrapping_add(u32::from(b));
    }
    to_base36(h)
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(char::from(DIGITS[(n % 36) as usize]));
        n /= 36;
    }
    out.reverse();
    out.into_iter().collect()
}

/// Coerce a provider timestamp to epoch milliseconds.
///
/// Accepts numeric strings (seconds vs milliseconds decided at 1e12),
/// RFC 3339, and the `Y-m-d H:M:S` spelling (assumed UTC).
pub fn to_epoch_ms(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        let n: i64 = s.parse().ok()?;
        return Some(if n < 1_000_000_000_000 { n * 1000 } else { n });
    }

    if let Ok(t) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(t.timestamp_millis());
    }

    let candidate = if s.contains(' ') {
        format!("{}Z", s.replacen(' ', "T", 1))
    } else {
        format!("{s}Z")
    };
    chrono::DateTime::parse_from_rfc3339(&candidate)
        .ok()
        .map(|t| t.timestamp_millis())
}

/// Derived unique key for a message event.
pub fn message_unique_key(raw: &RawMessage, country_code: &str) -> String {
    let e164 = raw
        .raw_number()
        .and_then(|n| phone::normalize(&n, country_code))
        .map(|p| p.e164)
        .unwrap_or_default();
    let raw_date = raw.raw_date().unwrap_or_default();
    let when_ms = to_epoch_ms(&raw_date).unwrap_or(0);
    let direction = raw.direction_text();
    let channel = raw.channel_text();
    let body: String = raw
        .body_text()
        .unwrap_or_default()
        .chars()
        .take(BODY_HASH_PREFIX)
        .collect();

    let base = format!("{e164}|{raw_date}|{direction}|{channel}|{body}");
    format!("{e164}_{when_ms}_{direction}_{}", content_hash(&base))
}

/// Placeholder names for synthesized contacts: visibly not a real name,
/// but identifiable by the digit string.
pub fn placeholder_name(digits: &str) -> String {
    if digits.is_empty() {
        "nombre_vacio_sinnum".to_string()
    } else {
        format!("nombre_vacio_{digits}")
    }
}

/// Map a provider message to its CRM property bag.
pub fn map_message(
    raw: &RawMessage,
    source: SourceSystem,
    hubspot: &HubSpotConfig,
    country_code: &str,
) -> PropertyMap {
    let unique = message_unique_key(raw, country_code);
    let e164 = raw
        .raw_number()
        .and_then(|n| phone::normalize(&n, country_code))
        .map(|p| p.e164)
        .unwrap_or_default();
    let fecha = raw
        .raw_date()
        .and_then(|d| to_epoch_ms(&d))
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    PropertyMap::new()
        .with(&hubspot.message_unique_prop, &unique)
        .with(
            &hubspot.message_required_prop,
            raw.provider_id().unwrap_or_else(|| unique.clone()),
        )
        .with(PROP_NUMERO, e164)
        .with(
            PROP_CONTENIDO,
            raw.body_text().unwrap_or("(sin_contenido)"),
        )
        .with(PROP_ESTADO, raw.status_text())
        .with(PROP_FECHA, fecha.to_string())
        .with(PROP_COMPANIA, source.as_str())
}

/// Map a provider contact to its CRM property bag; `None` when the record
/// carries no usable phone.
pub fn map_contact(
    raw: &RawContact,
    source: SourceSystem,
    hubspot: &HubSpotConfig,
    country_code: &str,
) -> Option<PropertyMap> {
    let canonical = phone::normalize(&raw.raw_number()?, country_code)?;
    let digits = canonical.digits().to_string();

    let firstname = raw
        .first_name()
        .map(str::to_string)
        .unwrap_or_else(|| placeholder_name(&digits));
    let lastname = raw
        .last_name()
        .map(str::to_string)
        .unwrap_or_else(|| placeholder_name(&digits));
    let company = raw
        .company
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(source.as_str());

    Some(
        PropertyMap::new()
            .with(&hubspot.contact_unique_prop, canonical.as_str())
            .with(props::PROP_PHONE, canonical.as_str())
            .with(props::PROP_MOBILE_PHONE, canonical.as_str())
            .with("firstname", firstname)
            .with("lastname", lastname)
            .with(PROP_COMPANIA, company),
    )
}

/// Drop records repeating a unique value within the batch, preserving the
/// first occurrence. Returns the survivors and the dropped count.
pub fn dedupe_by_unique(
    records: Vec<PropertyMap>,
    unique_property: &str,
) -> (Vec<PropertyMap>, usize) {
    let mut seen = std::collections::HashSet::new();
    let total = records.len();
    let kept: Vec<PropertyMap> = records
        .into_iter()
        .filter(|r| match r.unique_value(unique_property) {
            Some(v) if !v.is_empty() => seen.insert(v.to_string()),
            _ => false,
        })
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Flex;

    fn raw_message() -> RawMessage {
        RawMessage {
            id: Some(Flex::Int(991)),
            msisdn: Some(Flex::Str("59515736".into())),
            sent_at: Some(Flex::Str("2024-05-01T10:00:00Z".into())),
            body: Some("Su codigo es 1234".into()),
            direction: Some("MT".into()),
            channel: Some("1717".into()),
            status: Some(Flex::Str("DELIVERED".into())),
            ..RawMessage::default()
        }
    }

    #[test]
    fn epoch_coercion_handles_all_spellings() {
        assert_eq!(to_epoch_ms("1714557600"), Some(1_714_557_600_000));
        assert_eq!(to_epoch_ms("1714557600000"), Some(1_714_557_600_000));
        assert_eq!(to_epoch_ms("2024-05-01T10:00:00Z"), Some(1_714_557_600_000));
        assert_eq!(to_epoch_ms("2024-05-01 10:00:00"), Some(1_714_557_600_000));
        assert_eq!(to_epoch_ms(""), None);
        assert_eq!(to_epoch_ms("not a date"), None);
    }

    #[test]
    fn unique_key_is_stable_and_carries_identity_parts() {
        let m = raw_message();
        let a = message_unique_key(&m, "502");
        let b = message_unique_key(&m, "502");
        assert_eq!(a, b);
        assert!(a.starts_with("+50259515736_1714557600000_MT_"));
    }

    #[test]
    fn unique_key_changes_with_content() {
        let m = raw_message();
        let mut other = raw_message();
        other.body = Some("Otro contenido".into());
        assert_ne!(
            message_unique_key(&m, "502"),
            message_unique_key(&other, "502")
        );
    }

    #[test]
    fn message_mapping_fills_portal_properties() {
        let hubspot = HubSpotConfig::default();
        let props = map_message(&raw_message(), SourceSystem::Tigo, &hubspot, "502");
        assert_eq!(props.get("numero"), Some("+50259515736"));
        assert_eq!(props.get("contenido"), Some("Su codigo es 1234"));
        assert_eq!(props.get("estado"), Some("DELIVERED"));
        assert_eq!(props.get("fecha"), Some("1714557600000"));
        assert_eq!(props.get("compania"), Some("Tigo"));
        assert_eq!(props.get("id_mensaje"), Some("991"));
        assert!(props.get("id_mensaje_unico").is_some());
    }

    #[test]
    fn contact_mapping_synthesizes_placeholder_names() {
        let hubspot = HubSpotConfig::default();
        let raw = RawContact {
            msisdn: Some(Flex::Str("42183669".into())),
            ..RawContact::default()
        };
        let props = map_contact(&raw, SourceSystem::Claro, &hubspot, "502").unwrap();
        assert_eq!(
            props.get("numero_telefono_id_unico"),
            Some("+50242183669")
        );
        assert_eq!(props.phone(), Some("+50242183669"));
        assert_eq!(props.get("firstname"), Some("nombre_vacio_50242183669"));
        assert_eq!(props.get("compania"), Some("Claro"));

        let empty = RawContact::default();
        assert!(map_contact(&empty, SourceSystem::Claro, &hubspot, "502").is_none());
    }

    #[test]
    fn in_batch_dedupe_keeps_first_occurrence() {
        let unique = "id_mensaje_unico";
        let records = vec![
            PropertyMap::new().with(unique, "k1").with("v", "first"),
            PropertyMap::new().with(unique, "k1").with("v", "second"),
            PropertyMap::new().with(unique, "k2"),
            PropertyMap::new(), // no key at all
        ];
        let (kept, dropped) = dedupe_by_unique(records, unique);
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped, 2);
        assert_eq!(kept[0].get("v"), Some("first"));
    }
}
