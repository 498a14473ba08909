//! Broker addresses.
//!
//! A broker is configured by a single http(s) base address. The WebSocket
//! address is derived by swapping the scheme (`http`→`ws`, `https`→`wss`).

use url::Url;

use crate::error::ConfigError;

/// WebSocket upgrade route.
pub const WS_ROUTE: &str = "/socketTalk/ws";
/// Payload store write route.
pub const SET_ROUTE: &str = "/socketTalk/set";
/// Payload store read route.
pub const GET_ROUTE: &str = "/socketTalk/get";

/// Base URL the client library uses when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080/";

/// Validated broker base address, always ending in `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    http: String,
    ws: String,
}

impl BaseUrl {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut http = Url::parse(raw)?;
        let ws_scheme = match http.scheme() {
            "http" => "ws",
            "https" => "wss",
            _ => return Err(ConfigError::InvalidScheme(raw.to_owned())),
        };

        if !http.path().ends_with('/') {
            let path = format!("{}/", http.path());
            http.set_path(&path);
        }

        let mut ws = http.clone();
        ws.set_scheme(ws_scheme)
            .map_err(|()| ConfigError::InvalidScheme(raw.to_owned()))?;

        Ok(Self {
            http: http.to_string(),
            ws: ws.to_string(),
        })
    }

    pub fn http(&self) -> &str {
        &self.http
    }

    pub fn ws(&self) -> &str {
        &self.ws
    }

    pub fn ws_endpoint(&self) -> String {
        join(&self.ws, WS_ROUTE)
    }

    pub fn set_endpoint(&self) -> String {
        join(&self.http, SET_ROUTE)
    }

    pub fn get_endpoint(&self) -> String {
        join(&self.http, GET_ROUTE)
    }
}

impl Default for BaseUrl {
    fn default() -> Self {
        Self {
            http: DEFAULT_SERVER_URL.to_owned(),
            ws: "ws://localhost:8080/".to_owned(),
        }
    }
}

fn join(base: &str, route: &str) -> String {
    format!("{base}{}", route.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ws_scheme() {
        let base = BaseUrl::parse("http://localhost:9090").unwrap();
        assert_eq!(base.http(), "http://localhost:9090/");
        assert_eq!(base.ws_endpoint(), "ws://localhost:9090/socketTalk/ws");
        assert_eq!(base.set_endpoint(), "http://localhost:9090/socketTalk/set");

        let secure = BaseUrl::parse("https://talk.example.com/prefix").unwrap();
        assert_eq!(secure.ws(), "wss://talk.example.com/prefix/");
        assert_eq!(secure.get_endpoint(), "https://talk.example.com/prefix/socketTalk/get");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            BaseUrl::parse("ws://localhost:9090"),
            Err(ConfigError::InvalidScheme(_))
        ));
        assert!(matches!(
            BaseUrl::parse("ftp://localhost"),
            Err(ConfigError::InvalidScheme(_))
        ));
        assert!(BaseUrl::parse("not a url").is_err());
    }

    #[test]
    fn default_points_at_localhost() {
        let base = BaseUrl::default();
        assert_eq!(base, BaseUrl::parse(DEFAULT_SERVER_URL).unwrap());
    }
}
