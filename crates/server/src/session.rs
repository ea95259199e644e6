//! Per-session API key slot.

use axum::http::HeaderMap;
use axum::http::HeaderName;
use cekura_openapi_tools::dispatch::ApiKey;
use parking_lot::Mutex;

/// Holds the key a session presented. A request carrying the header replaces the stored key;
/// a request without it falls back to the last key this session presented.
#[derive(Debug, Default)]
pub struct SessionApiKey {
    slot: Mutex<Option<ApiKey>>,
}

impl SessionApiKey {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for the current request, if any.
    pub fn resolve(&self, header: &HeaderName, headers: Option<&HeaderMap>) -> Option<ApiKey> {
        let presented = headers
            .and_then(|h| h.get(header))
            .and_then(|v| v.to_str().ok())
            .and_then(ApiKey::new);

        let mut slot = self.slot.lock();
        if let Some(key) = presented {
            *slot = Some(key);
        }
        slot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const HEADER: HeaderName = HeaderName::from_static("x-cekura-api-key");

    fn headers(key: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(HEADER, HeaderValue::from_str(key).unwrap());
        h
    }

    #[test]
    fn remembers_key_for_the_session() {
        let slot = SessionApiKey::new();
        assert!(slot.resolve(&HEADER, None).is_none());

        let key = slot.resolve(&HEADER, Some(&headers("sk-1"))).unwrap();
        assert_eq!(key.expose(), "sk-1");
        assert_eq!(
            slot.resolve(&HEADER, Some(&HeaderMap::new()))
                .unwrap()
                .expose(),
            "sk-1"
        );

        let key = slot.resolve(&HEADER, Some(&headers("sk-2"))).unwrap();
        assert_eq!(key.expose(), "sk-2");
    }

    #[test]
    fn blank_header_is_not_a_key() {
        let slot = SessionApiKey::new();
        assert!(slot.resolve(&HEADER, Some(&headers("   "))).is_none());
    }

    #[test]
    fn sessions_do_not_share_keys() {
        let a = SessionApiKey::new();
        let b = SessionApiKey::new();
        a.resolve(&HEADER, Some(&headers("sk-a")));
        assert!(b.resolve(&HEADER, None).is_none());
    }
}
