//! Site-specific bindings that win over the active profile
//!
//! Matched on the exact (normalized) host of the page the agent opened.

use couchpad_protocol::normalize_host;
use url::{Host, Url};

struct SiteHandler {
    domain: &'static str,
    bindings: &'static [(&'static str, &'static [&'static str])],
}

const HANDLERS: &[SiteHandler] = &[
    SiteHandler {
        domain: "youtube.com",
        bindings: &[
            ("playpause", &["k"]),
            ("seek_forward", &["l"]),
            ("seek_back", &["j"]),
            ("fullscreen", &["f"]),
            ("captions", &["c"]),
            ("mute", &["m"]),
            ("next", &["shift", "n"]),
            ("prev", &["shift", "p"]),
        ],
    },
    SiteHandler {
        domain: "netflix.com",
        bindings: &[
            ("playpause", &["Space"]),
            ("seek_forward", &["ArrowRight"]),
            ("seek_back", &["ArrowLeft"]),
            ("fullscreen", &["f"]),
            ("mute", &["m"]),
            ("skip_intro", &["s"]),
        ],
    },
    SiteHandler {
        domain: "open.spotify.com",
        bindings: &[
            ("playpause", &["Space"]),
            ("next", &["alt", "ArrowRight"]),
            ("prev", &["alt", "ArrowLeft"]),
        ],
    },
];

/// Key names bound to `action` on `host`, if that exact site has a handler
pub fn lookup(host: &str, action: &str) -> Option<&'static [&'static str]> {
    let host = normalize_host(host);
    HANDLERS
        .iter()
        .find(|h| h.domain == host)?
        .bindings
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, keys)| *keys)
}

/// Host and path of a page, the way profile detection reads them
pub fn location(url: &Url) -> Option<(String, String)> {
    let host = match url.host()? {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    };
    Some((host, url.path().to_string()))
}
