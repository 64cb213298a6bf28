//! Client identity extraction.
//!
//! The identity is best effort: `X-Forwarded-For` is taken at face value and
//! can be set by any client. It is a throttling key, not authentication.

use axum::http::HeaderMap;

/// Header consulted before the peer address.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used when the transport supplies no peer address.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Derive the throttling key for a request.
///
/// Prefers the first `X-Forwarded-For` value verbatim, then the peer address
/// without its port, then the raw peer string if it cannot be split.
pub fn client_identity(headers: &HeaderMap, peer: Option<&str>) -> String {
    if let Some(forwarded) = headers.get(X_FORWARDED_FOR) {
        return String::from_utf8_lossy(forwarded.as_bytes()).into_owned();
    }

    match peer {
        Some(addr) => split_host(addr).unwrap_or(addr).to_owned(),
        None => UNKNOWN_IDENTITY.to_owned(),
    }
}

/// Strip the port from `host:port` or `[host]:port`.
///
/// Returns `None` when the address has no port or is otherwise malformed,
/// such as a bare IPv6 address without brackets.
fn split_host(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        if port.contains(['[', ']']) {
            return None;
        }
        return Some(host);
    }

    let (host, port) = addr.rsplit_once(':')?;
    if host.contains([':', '[', ']']) || port.contains(['[', ']']) {
        return None;
    }
    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"));

        assert_eq!(client_identity(&headers, Some("10.0.0.1:5555")), "203.0.113.7");
    }

    #[test]
    fn test_forwarded_for_first_value_taken_verbatim() {
        let mut headers = HeaderMap::new();
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("1.1.1.1, 2.2.2.2"));
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("3.3.3.3"));

        assert_eq!(client_identity(&headers, None), "1.1.1.1, 2.2.2.2");
    }

    #[test]
    fn test_peer_port_stripped() {
        let headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, Some("192.168.1.20:40000")), "192.168.1.20");
        assert_eq!(client_identity(&headers, Some("[::1]:8080")), "::1");
        assert_eq!(client_identity(&headers, Some("example.com:80")), "example.com");
    }

    #[test]
    fn test_unparseable_peer_used_raw() {
        let headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, Some("192.168.1.20")), "192.168.1.20");
        assert_eq!(client_identity(&headers, Some("::1")), "::1");
        assert_eq!(client_identity(&headers, Some("[::1]")), "[::1]");
        assert_eq!(client_identity(&headers, Some("@")), "@");
    }

    #[test]
    fn test_missing_peer() {
        assert_eq!(client_identity(&HeaderMap::new(), None), UNKNOWN_IDENTITY);
    }
}
