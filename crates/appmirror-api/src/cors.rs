//! Cross-origin policy for the browser frontend.
//!
//! Allowed origins: any `http://localhost:<port>`, every configured origin,
//! and ngrok tunnel hosts. A trailing `.` on either side is ignored.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method, header};
use regex::Regex;
use tower_http::cors::{AllowOrigin, CorsLayer};

use appmirror_core::config::CorsConfig;

const LOCALHOST_PREFIX: &str = "http://localhost:";

const TUNNEL_PATTERNS: [&str; 2] = [
    r"^https://[a-z0-9]+\.ngrok-free\.app$",
    r"^https://[a-z0-9]+\.ngrok\.io$",
];

/// Decides which `Origin` values may call the API.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<String>,
    tunnels: Vec<Regex>,
}

impl OriginPolicy {
    pub fn new(config: &CorsConfig) -> Self {
        let allowed = config
            .allowed_origins
            .iter()
            .map(|o| o.trim().trim_end_matches('.').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        let tunnels = TUNNEL_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self { allowed, tunnels }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        if origin.is_empty() {
            return false;
        }
        let origin = origin.strip_suffix('.').unwrap_or(origin);

        origin.starts_with(LOCALHOST_PREFIX)
            || self.allowed.iter().any(|o| o == origin)
            || self.tunnels.iter().any(|re| re.is_match(origin))
    }
}

/// The CORS layer applied to every route.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let policy = Arc::new(OriginPolicy::new(config));

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| policy.is_allowed(o))
                .unwrap_or(false)
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static("ngrok-skip-browser-warning"),
        ])
        .expose_headers([header::CONTENT_LENGTH, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(24 * 60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(origins: &[&str]) -> OriginPolicy {
        OriginPolicy::new(&CorsConfig {
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn localhost_any_port() {
        let p = policy(&[]);
        assert!(p.is_allowed("http://localhost:5173"));
        assert!(p.is_allowed("http://localhost:3000."));
        assert!(!p.is_allowed("https://localhost:5173"));
        assert!(!p.is_allowed("http://localhost"));
        assert!(!p.is_allowed(""));
    }

    #[test]
    fn configured_origins_ignore_trailing_dot() {
        let p = policy(&["https://demo.example.com.", " https://app.example.com "]);
        assert!(p.is_allowed("https://demo.example.com"));
        assert!(p.is_allowed("https://app.example.com."));
        assert!(!p.is_allowed("https://other.example.com"));
    }

    #[test]
    fn ngrok_tunnels() {
        let p = policy(&[]);
        assert!(p.is_allowed("https://abc123.ngrok-free.app"));
        assert!(p.is_allowed("https://abc123.ngrok.io"));
        assert!(!p.is_allowed("http://abc123.ngrok.io"));
        assert!(!p.is_allowed("https://ABC.ngrok.io"));
        assert!(!p.is_allowed("https://a.b.ngrok-free.app"));
    }
}
