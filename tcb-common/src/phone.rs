//! Phone number normalization
//!
//! Converts the heterogeneous phone formats coming from the telecom providers
//! (bare national numbers, country-prefixed digits, already-formatted E.164)
//! into one canonical `+<countrycode><national>` form used as the matching
//! identity everywhere else in the bridge.
//!
//! Normalization is pure and idempotent: feeding a canonical value back in
//! returns it unchanged.

/// National significant number length for the target market.
pub const NATIONAL_NUMBER_LEN: usize = 8;

/// A canonicalized phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPhone {
    /// E.164-style value, e.g. `+50259515736`
    pub e164: String,
    /// False when the input had an irregular digit length and the canonical
    /// value is a lossy best-effort guess. Such values still participate in
    /// matching but should not be trusted as verified identities.
    pub verified: bool,
}

impl CanonicalPhone {
    pub fn as_str(&self) -> &str {
        &self.e164
    }

    /// Digits only, without the leading `+`.
    pub fn digits(&self) -> &str {
        self.e164.trim_start_matches('+')
    }
}

impl std::fmt::Display for CanonicalPhone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.e164)
    }
}

/// Strip everything that is not an ASCII digit.
pub fn only_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a raw phone representation against the configured country code.
///
/// The digit shape decides first, regardless of how the input was
/// punctuated; a `+` prefix alone is only trusted when the digits match no
/// known shape. Precedence:
/// 1. `<countrycode>` + expected national length → `+digits`.
/// 2. Bare national number → `+<countrycode><digits>`.
/// 3. Other `+`-prefixed input → `+digits` (punctuation stripped).
/// 4. Anything else with digits → lossy `+digits`, flagged unverified.
///
/// Returns `None` when the input carries no digits at all; callers must
/// exclude such records from phone-based matching.
pub fn normalize(raw: &str, country_code: &str) -> Option<CanonicalPhone> {
    let trimmed = raw.trim();
    let digits = only_digits(trimmed);
    if digits.is_empty() {
        return None;
    }

    if digits.starts_with(country_code) && digits.len() == country_code.len() + NATIONAL_NUMBER_LEN
    {
        return Some(CanonicalPhone {
            e164: format!("+{digits}"),
            verified: true,
        });
    }

    if digits.len() == NATIONAL_NUMBER_LEN {
        return Some(CanonicalPhone {
            e164: format!("+{country_code}{digits}"),
            verified: true,
        });
    }

    if trimmed.starts_with('+') {
        return Some(CanonicalPhone {
            e164: format!("+{digits}"),
            verified: true,
        });
    }

    // Irregular length: keep the digits but mark the value unverified
    Some(CanonicalPhone {
        e164: format!("+{digits}"),
        verified: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CC: &str = "502";

    #[test]
    fn bare_national_number_gets_country_code() {
        let p = normalize("59515736", CC).unwrap();
        assert_eq!(p.e164, "+50259515736");
        assert!(p.verified);
    }

    #[test]
    fn already_canonical_passes_through() {
        let p = normalize("+50259515736", CC).unwrap();
        assert_eq!(p.e164, "+50259515736");
        assert!(p.verified);
    }

    #[test]
    fn country_prefixed_digits_gain_plus() {
        let p = normalize("50242183669", CC).unwrap();
        assert_eq!(p.e164, "+50242183669");
        assert!(p.verified);
    }

    #[test]
    fn punctuation_and_spacing_are_stripped() {
        let p = normalize(" 5951-5736 ", CC).unwrap();
        assert_eq!(p.e164, "+50259515736");
        let p = normalize("(502) 4218-3669", CC).unwrap();
        assert_eq!(p.e164, "+50242183669");
    }

    #[test]
    fn plus_prefixed_inputs_still_canonicalize_by_digit_shape() {
        // A + prefix does not exempt the value from reformatting: the same
        // subscriber must land on one identity key.
        let p = normalize("+502 5951-5736", CC).unwrap();
        assert_eq!(p.e164, "+50259515736");
        assert!(p.verified);

        let p = normalize("+59515736", CC).unwrap();
        assert_eq!(p.e164, "+50259515736");
        assert!(p.verified);
    }

    #[test]
    fn foreign_plus_numbers_pass_through_stripped() {
        let p = normalize("+1 (415) 555-0123", CC).unwrap();
        assert_eq!(p.e164, "+14155550123");
        assert!(p.verified);
    }

    #[test]
    fn irregular_length_is_lossy_and_flagged() {
        let p = normalize("1234567", CC).unwrap();
        assert_eq!(p.e164, "+1234567");
        assert!(!p.verified);

        let p = normalize("502123456789", CC).unwrap();
        assert_eq!(p.e164, "+502123456789");
        assert!(!p.verified);
    }

    #[test]
    fn empty_and_digitless_inputs_yield_none() {
        assert!(normalize("", CC).is_none());
        assert!(normalize("   ", CC).is_none());
        assert!(normalize("n/a", CC).is_none());
        assert!(normalize("+", CC).is_none());
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "59515736",
            "+50259515736",
            "50242183669",
            "1234567",
            " 5951-5736 ",
            "502123456789",
        ] {
            let once = normalize(raw, CC).unwrap();
            let twice = normalize(&once.e164, CC).unwrap();
            assert_eq!(once.e164, twice.e164, "raw input: {raw:?}");
        }
    }
}
