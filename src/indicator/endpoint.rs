use std::fmt;

use axum::http::Uri;

use crate::error::ChannelError;

/// A validated `ws://` or `wss://` push-channel URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ChannelError> {
        let invalid = |reason: &str| ChannelError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = raw.trim().parse().map_err(|e: axum::http::uri::InvalidUri| {
            invalid(&e.to_string())
        })?;

        match uri.scheme_str() {
            Some("ws") | Some("wss") => {}
            Some(other) => return Err(invalid(&format!("unsupported scheme '{}'", other))),
            None => return Err(invalid("missing scheme")),
        }

        if uri.authority().is_none() {
            return Err(invalid("missing host"));
        }

        Ok(Self(uri.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_secure(&self) -> bool {
        self.0.starts_with("wss://")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ws_and_wss() {
        let local = Endpoint::parse("ws://localhost:8000/ws/counter").unwrap();
        assert_eq!(local.as_str(), "ws://localhost:8000/ws/counter");
        assert!(!local.is_secure());

        let deployed = Endpoint::parse("wss://counter.example.com/ws/counter").unwrap();
        assert!(deployed.is_secure());
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            Endpoint::parse("https://example.com/ws/counter"),
            Err(ChannelError::InvalidEndpoint { .. })
        ));
        assert!(Endpoint::parse("/ws/counter").is_err());
        assert!(Endpoint::parse("not a url").is_err());
    }
}
