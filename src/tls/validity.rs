//! Certificate date validity policy.

use chrono::{DateTime, SecondsFormat, Utc};

use super::extract::Validity;
use crate::error_handling::CertificateError;

const SECONDS_PER_DAY: i64 = 86_400;

/// Formats a Unix timestamp as RFC 3339, falling back to the raw number.
pub fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

/// Checks a certificate validity window against `now` and a grace period.
///
/// A certificate fails when it is not valid yet (`not_before > now`) and when it
/// expires within the grace period, both findings are reported. The boundary
/// counts as a failure: a certificate whose `not_after` equals
/// `now + grace_days` is rejected.
///
/// # Arguments
///
/// * `kind` - Chain position, used in the error message
/// * `subject` - Certificate subject, used in the error message
/// * `validity` - Validity window
/// * `now` - Current Unix time
/// * `grace_days` - Days the certificate must still be valid for
///
/// # Returns
///
/// `CertificateError::NotYetValid` and/or `CertificateError::Expiring`, empty
/// when the window is acceptable.
pub fn check_validity(
    kind: &str,
    subject: &str,
    validity: Validity,
    now: i64,
    grace_days: u64,
) -> Vec<CertificateError> {
    let mut errors = Vec::new();
    if validity.not_before > now {
        errors.push(CertificateError::NotYetValid {
            kind: kind.to_string(),
            subject: subject.to_string(),
            not_before: format_timestamp(validity.not_before),
        });
    }
    let grace = i64::try_from(grace_days)
        .unwrap_or(i64::MAX)
        .saturating_mul(SECONDS_PER_DAY);
    if validity.not_after <= now.saturating_add(grace) {
        errors.push(CertificateError::Expiring {
            kind: kind.to_string(),
            subject: subject.to_string(),
            not_after: format_timestamp(validity.not_after),
        });
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn window(before: i64, after: i64) -> Validity {
        Validity {
            not_before: NOW + before,
            not_after: NOW + after,
        }
    }

    #[test]
    fn test_valid_certificate_passes() {
        assert!(check_validity("server certificate", "CN=a", window(-10, 10), NOW, 0).is_empty());
    }

    #[test]
    fn test_not_yet_valid() {
        let errors = check_validity("server certificate", "CN=a", window(1, 100), NOW, 0);
        assert!(matches!(errors.as_slice(), [CertificateError::NotYetValid { .. }]));
    }

    #[test]
    fn test_valid_from_exactly_now() {
        assert!(check_validity("server certificate", "CN=a", window(0, 100), NOW, 0).is_empty());
    }

    #[test]
    fn test_expiry_boundary_is_failure() {
        let grace_days = 3;
        let boundary = 3 * SECONDS_PER_DAY;
        let at_boundary = check_validity("root certificate", "CN=r", window(-1, boundary), NOW, grace_days);
        assert!(matches!(at_boundary.as_slice(), [CertificateError::Expiring { .. }]));
        let after_boundary =
            check_validity("root certificate", "CN=r", window(-1, boundary + 1), NOW, grace_days);
        assert!(after_boundary.is_empty());
    }

    #[test]
    fn test_both_findings_are_reported() {
        let errors = check_validity("server certificate", "CN=a", window(10, 20), NOW, 1);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_expired_without_grace() {
        assert_eq!(check_validity("server certificate", "CN=a", window(-100, 0), NOW, 0).len(), 1);
        assert_eq!(check_validity("server certificate", "CN=a", window(-100, -1), NOW, 0).len(), 1);
    }

    #[test]
    fn test_error_message_names_kind_and_date() {
        let errors = check_validity("intermediate certificate", "CN=i", window(-100, -1), NOW, 0);
        let message = errors[0].to_string();
        assert!(message.starts_with("intermediate certificate \"CN=i\" expires on "));
        assert!(message.ends_with('Z'));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
    }
}
