//! Relay configuration: command-line flags with environment fallbacks

use crate::hub::HubSettings;
use clap::Parser;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(name = "couchpad-relay")]
#[command(version)]
#[command(about = "Pairs Couchpad controllers with displays and relays their messages")]
pub struct RelayConfig {
    /// Port to listen on
    #[arg(short, long, env = "COUCHPAD_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, env = "COUCHPAD_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Externally reachable base URL of this relay (http or https)
    #[arg(
        long,
        env = "COUCHPAD_PUBLIC_URL",
        default_value = "http://localhost:8080",
        value_parser = parse_http_url
    )]
    pub public_url: Url,

    /// Base URL of the controller web page (defaults to the public URL)
    #[arg(long, env = "COUCHPAD_CONTROLLER_URL", value_parser = parse_http_url)]
    pub controller_url: Option<Url>,

    /// Seconds an empty room is kept before it is reaped
    #[arg(long, env = "COUCHPAD_REAP_GRACE_SECS", default_value_t = 60)]
    pub reap_grace_secs: u64,

    /// Seconds a created room waits for its first peer
    #[arg(long, env = "COUCHPAD_UNJOINED_TTL_SECS", default_value_t = 600)]
    pub unjoined_ttl_secs: u64,

    /// Session creations allowed per IP per minute
    #[arg(long, env = "COUCHPAD_RATE_LIMIT", default_value_t = 10)]
    pub rate_limit: u32,
}

fn parse_http_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("{}: {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("expected an http or https URL, got {}:", other)),
    }
}

impl RelayConfig {
    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            reap_grace: Duration::from_secs(self.reap_grace_secs),
            unjoined_ttl: Duration::from_secs(self.unjoined_ttl_secs),
        }
    }

    /// `ws(s)://<public>/ws/<code>`, keeping any path prefix of the public URL
    pub fn websocket_url(&self, code: &str) -> String {
        let mut url = self.public_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) to ws(s) stays within the special schemes, which set_scheme allows
        let _ = url.set_scheme(scheme);
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("ws").push(code);
        }
        url.to_string()
    }

    pub fn controller_url(&self, code: &str) -> String {
        let mut url = self
            .controller_url
            .clone()
            .unwrap_or_else(|| self.public_url.clone());
        url.set_fragment(None);
        url.query_pairs_mut().clear().append_pair("room", code);
        url.to_string()
    }
}

#[cfg(test)]
impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "0.0.0.0".to_string(),
            public_url: Url::parse("http://localhost:8080").unwrap(),
            controller_url: None,
            reap_grace_secs: 60,
            unjoined_ttl_secs: 600,
            rate_limit: 10,
        }
    }
}
