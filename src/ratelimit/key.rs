//! Rate limit identifiers and client identity.

use http::HeaderMap;

/// Sentinel returned when no proxy header identifies the client.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// An identifier scoping one counter to a route and a client.
///
/// Different routes never share a budget because the route name is part
/// of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The route or form name
    pub route: String,
    /// The client identity, usually an IP address
    pub client: String,
}

impl RateLimitKey {
    /// Create a new key for `route` and `client`.
    pub fn new(route: &str, client: &str) -> Self {
        Self {
            route: route.to_string(),
            client: client.to_string(),
        }
    }

    /// Convert the key to the identifier string used by the limiter.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.route, self.client)
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.route, self.client)
    }
}

/// Extract the client address from trusted proxy headers.
///
/// Uses the first entry of `x-forwarded-for`, then `x-real-ip`, then
/// [`UNKNOWN_CLIENT`]. Values are not validated: clients behind a
/// misconfigured or hostile proxy can collide on the same identity.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        return forwarded.split(',').next().unwrap_or_default().trim().to_string();
    }

    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }

    UNKNOWN_CLIENT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_key_to_string() {
        let key = RateLimitKey::new("contact", "1.2.3.4");
        assert_eq!(key.to_string_key(), "contact:1.2.3.4");
        assert_eq!(key.to_string(), "contact:1.2.3.4");
    }

    #[test]
    fn test_routes_produce_distinct_keys() {
        let contact = RateLimitKey::new("contact", "1.2.3.4");
        let quote = RateLimitKey::new("quote", "1.2.3.4");
        assert_ne!(contact, quote);
        assert_ne!(contact.to_string_key(), quote.to_string_key());
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 5.6.7.8"));
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));

        assert_eq!(client_ip(&headers), "1.2.3.4");
    }

    #[test]
    fn test_forwarded_for_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  10.0.0.1  "));

        assert_eq!(client_ip(&headers), "10.0.0.1");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));

        assert_eq!(client_ip(&headers), "9.9.9.9");
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));

        assert_eq!(client_ip(&headers), "9.9.9.9");
    }

    #[test]
    fn test_unknown_without_headers() {
        assert_eq!(client_ip(&HeaderMap::new()), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_header_value_not_validated() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip, 1.2.3.4"));

        assert_eq!(client_ip(&headers), "not-an-ip");
    }
}
