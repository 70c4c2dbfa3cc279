//! Cross-platform utilities for Couchpad
//!
//! This module provides platform-agnostic functions for:
//! - Home and config directory paths
//! - Which desktop OS the agent is driving
//! - Checking and opening page URLs in the default browser

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use url::{Host, Url};

/// Get the user's home directory in a cross-platform way.
pub fn home_dir() -> Option<PathBuf> {
    dirs_next::home_dir()
}

/// Get the Couchpad config directory.
///
/// Returns:
/// - Linux/macOS: `~/.couchpad`
/// - Windows: `%USERPROFILE%\.couchpad`
pub fn config_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".couchpad")
}

/// Desktop OS family, which decides key names, `mod` and backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mac,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Mac => "macOS",
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
        }
    }
}

/// Why a page URL from a controller was refused
#[derive(Error, Debug, PartialEq)]
pub enum PageUrlError {
    #[error("not a URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("only http and https pages can be opened, not {0}")]
    Scheme(String),
    #[error("{0:?} is not a host name")]
    Host(String),
}

/// Parse a page address sent by a controller. Bare hosts get `https://`.
pub fn page_url(raw: &str) -> Result<Url, PageUrlError> {
    let raw = raw.trim();
    let url = match Url::parse(raw) {
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{}", raw))?,
        parsed => parsed?,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PageUrlError::Scheme(url.scheme().to_string()));
    }
    match url.host() {
        Some(Host::Domain(domain)) if is_host_name(domain) => Ok(url),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Ok(url),
        _ => Err(PageUrlError::Host(url.host_str().unwrap_or_default().to_string())),
    }
}

/// Letters, digits, `-` and `.` only (after IDNA)
fn is_host_name(domain: &str) -> bool {
    !domain.is_empty()
        && !domain.starts_with('.')
        && domain
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
}

/// Open a page with the desktop's default browser, without waiting for it.
pub fn open_url(url: &Url) -> io::Result<()> {
    open::that_detached(url.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.ends_with(".couchpad"));
    }

    #[test]
    fn test_current_platform_matches_target() {
        let platform = Platform::current();
        #[cfg(target_os = "macos")]
        assert_eq!(platform, Platform::Mac);
        #[cfg(windows)]
        assert_eq!(platform, Platform::Windows);
        #[cfg(all(unix, not(target_os = "macos")))]
        assert_eq!(platform, Platform::Linux);
    }

    #[test]
    fn test_page_url_accepts_web_pages() {
        let url = page_url("https://www.YouTube.com/watch?v=abc&t=10").unwrap();
        assert_eq!(url.host_str(), Some("www.youtube.com"));
        assert_eq!(page_url("netflix.com").unwrap().as_str(), "https://netflix.com/");
        assert!(page_url("http://192.168.1.20:8096/web").is_ok());
        assert!(page_url("http://[::1]/").is_ok());
    }

    #[test]
    fn test_page_url_refuses_local_and_shell_targets() {
        assert_eq!(
            page_url("file:///etc/passwd"),
            Err(PageUrlError::Scheme("file".to_string()))
        );
        assert_eq!(
            page_url("javascript:alert(1)"),
            Err(PageUrlError::Scheme("javascript".to_string()))
        );
        assert!(matches!(page_url("vscode://file/tmp"), Err(PageUrlError::Scheme(_))));
        assert!(page_url("https://x.com&calc").is_err());
        assert!(page_url("https://x.com|calc/").is_err());
        assert!(page_url("https://x.com\"&calc&\"/").is_err());
        assert!(page_url("").is_err());
    }
}
