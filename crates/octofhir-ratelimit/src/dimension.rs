//! What a limit is counted per, and how that identity is derived from a request.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use serde::{Deserialize, Serialize};

use crate::limiter::Algorithm;

/// Identity of the caller for per-user limits. Inserted into request
/// extensions by whatever authenticates the request upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSubject(pub String);

/// Used when no client address can be determined.
pub const UNKNOWN_IDENTITY: &str = "unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitDimension {
    /// Per client IP.
    #[default]
    Ip,
    /// Per authenticated user; anonymous requests fall back to their IP.
    User,
    /// Per request path and client IP.
    ApiPath,
}

impl RateLimitDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitDimension::Ip => "ip",
            RateLimitDimension::User => "user",
            RateLimitDimension::ApiPath => "api_path",
        }
    }

    /// `ratelimit:{algorithm}:{dimension}:{identity}`. The algorithm keeps a
    /// token bucket hash and a sliding window set from sharing a key.
    pub fn key(&self, algorithm: Algorithm, identity: &str) -> String {
        format!("ratelimit:{}:{}:{}", algorithm.as_str(), self.as_str(), identity)
    }

    /// Derives the identity this dimension counts `req` under.
    pub fn identity<B>(&self, req: &Request<B>) -> String {
        let ip = || {
            extract_ip_address(req.headers())
                .or_else(|| {
                    req.extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip().to_string())
                })
                .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
        };

        match self {
            RateLimitDimension::Ip => ip(),
            RateLimitDimension::User => match req.extensions().get::<RateLimitSubject>() {
                Some(RateLimitSubject(user)) => format!("u:{user}"),
                None => format!("ip:{}", ip()),
            },
            RateLimitDimension::ApiPath => format!("{}:{}", req.uri().path(), ip()),
        }
    }
}

/// Client IP from proxy headers. `X-Forwarded-For` may list several hops;
/// the first is the original client.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(client_ip) = value.split(',').next()
        && !client_ip.trim().is_empty()
    {
        return Some(client_ip.trim().to_string());
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
    {
        return Some(value.trim().to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            RateLimitDimension::Ip.key(Algorithm::TokenBucket, "10.0.0.1"),
            "ratelimit:token_bucket:ip:10.0.0.1"
        );
        assert_eq!(
            RateLimitDimension::ApiPath.key(Algorithm::SlidingWindow, "/fhir/Patient:10.0.0.1"),
            "ratelimit:sliding_window:api_path:/fhir/Patient:10.0.0.1"
        );
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut req = request("/x");
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7, 10.0.0.2".parse().unwrap());
        assert_eq!(RateLimitDimension::Ip.identity(&req), "203.0.113.7");
    }

    #[test]
    fn test_connect_info_fallback() {
        let mut req = request("/x");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 9], 4000))));
        assert_eq!(RateLimitDimension::Ip.identity(&req), "192.168.1.9");
    }

    #[test]
    fn test_unknown_without_address() {
        assert_eq!(RateLimitDimension::Ip.identity(&request("/x")), UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_user_dimension_prefers_subject() {
        let mut req = request("/x");
        req.headers_mut()
            .insert("x-real-ip", "10.1.1.1".parse().unwrap());
        assert_eq!(RateLimitDimension::User.identity(&req), "ip:10.1.1.1");

        req.extensions_mut()
            .insert(RateLimitSubject("alice".to_string()));
        assert_eq!(RateLimitDimension::User.identity(&req), "u:alice");
    }

    #[test]
    fn test_api_path_combines_path_and_ip() {
        let mut req = request("/fhir/Patient?name=x");
        req.headers_mut()
            .insert("x-real-ip", "10.1.1.1".parse().unwrap());
        assert_eq!(
            RateLimitDimension::ApiPath.identity(&req),
            "/fhir/Patient:10.1.1.1"
        );
    }
}
