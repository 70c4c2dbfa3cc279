//! Input profiles
//!
//! A profile maps abstract controller actions (`"up"`, `"playpause"`,
//! `"next"`) onto concrete input descriptors for one class of target
//! application. The table is static and built once per process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Profile used when nothing more specific matches
pub const DEFAULT_PROFILE: &str = "universal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionMode {
    /// Deltas move the pointer from where it is
    Relative,
    /// Normalized 0..1 coordinates place the pointer on screen
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// What an action turns into on the consuming end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputDescriptor {
    Key { code: String },
    Shortcut { keys: Vec<String> },
    Scroll { direction: ScrollDirection, amount: u32 },
    MouseMotion { mode: MotionMode },
    Click { button: MouseButton },
}

impl InputDescriptor {
    pub fn key(code: &str) -> Self {
        InputDescriptor::Key {
            code: code.to_string(),
        }
    }

    pub fn shortcut(keys: &[&str]) -> Self {
        InputDescriptor::Shortcut {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn scroll(direction: ScrollDirection, amount: u32) -> Self {
        InputDescriptor::Scroll { direction, amount }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    /// Controller layout hint (`dpad`, `media`, `trackpad`, ...)
    pub layout: String,
    pub mapping: BTreeMap<String, InputDescriptor>,
}

impl Profile {
    fn new(name: &str, description: &str, layout: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            layout: layout.to_string(),
            mapping: BTreeMap::new(),
        }
    }

    fn map(mut self, action: &str, descriptor: InputDescriptor) -> Self {
        self.mapping.insert(action.to_string(), descriptor);
        self
    }

    pub fn lookup(&self, action: &str) -> Option<&InputDescriptor> {
        self.mapping.get(action)
    }
}

/// The full profile table, keyed by profile name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    profiles: BTreeMap<String, Profile>,
}

impl Catalog {
    /// The process-wide built-in table
    pub fn builtin() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(build_catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(|k| k.as_str())
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    /// The universal profile, which always exists in the built-in table
    pub fn universal(&self) -> Option<&Profile> {
        self.get(DEFAULT_PROFILE)
    }
}

fn build_catalog() -> Catalog {
    use InputDescriptor as D;
    use ScrollDirection::*;

    let universal = Profile::new("universal", "Arrow keys, scroll, select and back", "dpad")
        .map("up", D::key("ArrowUp"))
        .map("down", D::key("ArrowDown"))
        .map("left", D::key("ArrowLeft"))
        .map("right", D::key("ArrowRight"))
        .map("select", D::key("Enter"))
        .map("enter", D::key("Enter"))
        .map("back", D::key("Escape"))
        .map("escape", D::key("Escape"))
        .map("space", D::key("Space"))
        .map("scroll_up", D::scroll(Up, 3))
        .map("scroll_down", D::scroll(Down, 3));

    let presentation = Profile::new(
        "presentation",
        "Slide decks: next/previous slide, start and end the show",
        "presenter",
    )
    .map("next", D::key("ArrowRight"))
    .map("prev", D::key("ArrowLeft"))
    .map("right", D::key("ArrowRight"))
    .map("left", D::key("ArrowLeft"))
    .map("up", D::key("ArrowUp"))
    .map("down", D::key("ArrowDown"))
    .map("first", D::key("Home"))
    .map("last", D::key("End"))
    .map("start", D::shortcut(&["mod", "Enter"]))
    .map("end", D::key("Escape"))
    .map("blank", D::key("b"))
    .map("laser", D::key("l"));

    let video = Profile::new("video", "Video players: play/pause, seek, volume", "media")
        .map("playpause", D::key("Space"))
        .map("select", D::key("Space"))
        .map("seek_forward", D::key("ArrowRight"))
        .map("seek_back", D::key("ArrowLeft"))
        .map("right", D::key("ArrowRight"))
        .map("left", D::key("ArrowLeft"))
        .map("up", D::key("ArrowUp"))
        .map("down", D::key("ArrowDown"))
        .map("fullscreen", D::key("f"))
        .map("mute", D::key("m"))
        .map("captions", D::key("c"))
        .map("back", D::key("Escape"));

    let meeting = Profile::new(
        "meeting",
        "Video calls: microphone, camera, hand raise and chat",
        "meeting",
    )
    .map("mute", D::shortcut(&["mod", "d"]))
    .map("camera", D::shortcut(&["mod", "e"]))
    .map("raise_hand", D::shortcut(&["mod", "alt", "h"]))
    .map("chat", D::shortcut(&["mod", "alt", "c"]))
    .map("fullscreen", D::key("f"))
    .map("back", D::key("Escape"));

    let scroll = Profile::new("scroll", "Reading: smooth scroll and paging", "scroll")
        .map("up", D::scroll(Up, 3))
        .map("down", D::scroll(Down, 3))
        .map("left", D::scroll(Left, 3))
        .map("right", D::scroll(Right, 3))
        .map("scroll_up", D::scroll(Up, 5))
        .map("scroll_down", D::scroll(Down, 5))
        .map("page_up", D::key("PageUp"))
        .map("page_down", D::key("PageDown"))
        .map("top", D::key("Home"))
        .map("bottom", D::key("End"))
        .map("select", D::key("Enter"))
        .map("back", D::shortcut(&["alt", "ArrowLeft"]));

    let mouse = Profile::new("mouse", "Trackpad and air mouse", "trackpad")
        .map("click", D::Click {
            button: MouseButton::Left,
        })
        .map("select", D::Click {
            button: MouseButton::Left,
        })
        .map("right_click", D::Click {
            button: MouseButton::Right,
        })
        .map("middle_click", D::Click {
            button: MouseButton::Middle,
        })
        .map("pointer", D::MouseMotion {
            mode: MotionMode::Relative,
        })
        .map("air", D::MouseMotion {
            mode: MotionMode::Absolute,
        })
        .map("scroll_up", D::scroll(Up, 3))
        .map("scroll_down", D::scroll(Down, 3))
        .map("back", D::key("Escape"));

    let profiles = [universal, presentation, video, meeting, scroll, mouse]
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();

    Catalog { profiles }
}

/// (domain, path prefix, profile)
const SITE_PATTERNS: &[(&str, &str, &str)] = &[
    ("youtube.com", "", "video"),
    ("youtu.be", "", "video"),
    ("netflix.com", "", "video"),
    ("vimeo.com", "", "video"),
    ("twitch.tv", "", "video"),
    ("primevideo.com", "", "video"),
    ("disneyplus.com", "", "video"),
    ("hulu.com", "", "video"),
    ("docs.google.com", "/presentation", "presentation"),
    ("slides.com", "", "presentation"),
    ("pitch.com", "", "presentation"),
    ("prezi.com", "", "presentation"),
    ("canva.com", "/design", "presentation"),
    ("powerpoint.office.com", "", "presentation"),
    ("meet.google.com", "", "meeting"),
    ("zoom.us", "", "meeting"),
    ("teams.microsoft.com", "", "meeting"),
    ("teams.live.com", "", "meeting"),
    ("whereby.com", "", "meeting"),
    ("docs.google.com", "/document", "scroll"),
    ("reddit.com", "", "scroll"),
    ("twitter.com", "", "scroll"),
    ("x.com", "", "scroll"),
    ("news.ycombinator.com", "", "scroll"),
    ("medium.com", "", "scroll"),
    ("wikipedia.org", "", "scroll"),
    ("github.com", "", "scroll"),
    ("figma.com", "", "mouse"),
    ("miro.com", "", "mouse"),
    ("google.com", "/maps", "mouse"),
];

/// Lowercase a hostname and drop a leading `www.` and trailing dot
pub fn normalize_host(hostname: &str) -> String {
    let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

/// Classify a page into a profile name; the longest matching pattern wins
pub fn detect_profile(hostname: &str, path: &str) -> &'static str {
    let host = normalize_host(hostname);
    let path = if path.is_empty() { "/" } else { path };

    SITE_PATTERNS
        .iter()
        .filter(|(domain, prefix, _)| host_matches(&host, domain) && path.starts_with(prefix))
        .max_by_key(|(domain, prefix, _)| domain.len() + prefix.len())
        .map(|(_, _, profile)| *profile)
        .unwrap_or(DEFAULT_PROFILE)
}
