//! Target URL validation and normalization.

use url::Url;

use crate::error_handling::ConfigError;

/// Maximum URL length (2048 characters), the common browser and server limit.
const MAX_URL_LENGTH: usize = 2048;

/// Validates and normalizes a request target.
///
/// Adds an `http://` prefix when the input has no scheme, then checks that the
/// URL is syntactically valid, uses the http/https scheme and names a host.
///
/// # Arguments
///
/// * `input` - URL or bare `host[:port][/path]` given by the user
///
/// # Errors
///
/// Returns `ConfigError::InvalidUrl` if the URL is too long or does not parse,
/// `ConfigError::UnsupportedScheme` for anything else than http/https and
/// `ConfigError::MissingHost` when there is no host.
pub fn normalize_url(input: &str) -> Result<Url, ConfigError> {
    let input = input.trim();
    let normalized = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };

    // Checked after normalization, the prefix may push it over the limit
    if normalized.len() > MAX_URL_LENGTH {
        return Err(ConfigError::InvalidUrl {
            url: format!("{}...", input.chars().take(50).collect::<String>()),
            reason: format!("longer than {MAX_URL_LENGTH} characters"),
        });
    }

    let parsed = Url::parse(&normalized).map_err(|e| ConfigError::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(ConfigError::UnsupportedScheme(input.to_string())),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::MissingHost(input.to_string()));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::normalize_url;
    use crate::error_handling::ConfigError;

    #[test]
    fn test_normalize_url_adds_http() {
        let url = normalize_url("example.com").unwrap();
        assert_eq!(url.as_str(), "http://example.com/");
    }

    #[test]
    fn test_normalize_url_preserves_https() {
        let url = normalize_url("https://example.com/path?q=1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/path?q=1");
    }

    #[test]
    fn test_normalize_url_with_port() {
        let url = normalize_url("localhost:8080/status").unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), "/status");
    }

    #[test]
    fn test_normalize_url_ipv6() {
        let url = normalize_url("[2001:db8::1]:8443").unwrap();
        assert_eq!(url.as_str(), "http://[2001:db8::1]:8443/");
    }

    #[test]
    fn test_normalize_url_rejects_unsupported_scheme() {
        assert_eq!(
            normalize_url("ftp://example.com"),
            Err(ConfigError::UnsupportedScheme("ftp://example.com".to_string()))
        );
    }

    #[test]
    fn test_normalize_url_rejects_invalid_url() {
        assert!(matches!(
            normalize_url("not a valid url!!!"),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(normalize_url(""), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_normalize_url_rejects_missing_host() {
        assert!(normalize_url("https://").is_err());
        assert!(normalize_url("http://:80/").is_err());
    }

    #[test]
    fn test_normalize_url_rejects_too_long_url() {
        let long_url = format!("https://example.com/{}", "a".repeat(2100));
        assert!(matches!(
            normalize_url(&long_url),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_normalize_url_accepts_url_at_limit() {
        let url_at_limit = format!("https://example.com/{}", "a".repeat(2028));
        assert_eq!(url_at_limit.len(), 2048);
        assert!(normalize_url(&url_at_limit).is_ok());
    }

    #[test]
    fn test_normalize_url_rejects_too_long_url_after_normalization() {
        // "http://" + "example.com/" + 2030 characters is 2049
        let url = format!("example.com/{}", "a".repeat(2030));
        assert!(normalize_url(&url).is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_url_normalization_idempotent(host in "[a-z]{3,20}\\.[a-z]{2,5}") {
            let first = normalize_url(&host).unwrap();
            let second = normalize_url(first.as_str()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn test_url_port_kept(host in "[a-z]{3,20}\\.[a-z]{2,5}", port in 1u16..=65535) {
            let url = normalize_url(&format!("{host}:{port}")).unwrap();
            // Default port is elided by the parser
            if port != 80 {
                prop_assert_eq!(url.port(), Some(port));
            }
            prop_assert_eq!(url.host_str(), Some(host.as_str()));
        }
    }
}
