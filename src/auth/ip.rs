//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::request::Parts};

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// With `trust_forwarded`, the first entry of `X-Forwarded-For` wins (only
/// safe behind a reverse proxy that sets it). Otherwise, and as a fallback,
/// the peer address from `ConnectInfo` is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_forwarded: bool,
) -> Option<String> {
    if trust_forwarded {
        let forwarded = source
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_forwarded_for_first_entry() {
        let request = Request::builder()
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .body(())
            .unwrap();

        assert_eq!(
            extract_client_ip(&request, true),
            Some("10.0.0.1".to_string())
        );
    }

    #[test]
    fn test_forwarded_for_ignored_when_untrusted() {
        let request = Request::builder()
            .header("x-forwarded-for", "10.0.0.1")
            .body(())
            .unwrap();

        assert_eq!(extract_client_ip(&request, false), None);
    }

    #[test]
    fn test_connect_info_fallback() {
        let mut request = Request::builder().body(()).unwrap();
        let addr: SocketAddr = "192.168.1.5:4000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        assert_eq!(
            extract_client_ip(&request, true),
            Some("192.168.1.5".to_string())
        );
    }
}
