//! WebSocket protocol messages
//!
//! Every frame on a room socket is a JSON object discriminated by `type`.
//! Frames are decoded once at the socket boundary into [`Message`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Which side of a room a connection sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input-originating peer (usually a phone)
    Controller,
    /// Peer that consumes actions (browser tab, TV, desktop agent)
    Display,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Controller => "controller",
            Role::Display => "display",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a room code typed or taken from a URL; `None` when it cannot be one
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = (4..=16).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_alphanumeric());
    valid.then_some(code)
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary frames are not part of the protocol")]
    Binary,
}

/// All frames exchanged over a room socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// First frame a peer sends after connecting
    Join {
        role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
    },
    Ping,
    Pong,
    /// Peer counts, broadcast to the whole room on every join/leave
    Status {
        controllers: usize,
        displays: usize,
    },
    /// Reply to the joining peer only
    Joined {
        #[serde(rename = "roomId")]
        room_id: String,
        role: Role,
        controllers: usize,
        displays: usize,
        #[serde(rename = "activeProfile", default, skip_serializing_if = "Option::is_none")]
        active_profile: Option<String>,
        #[serde(rename = "activeTab", default, skip_serializing_if = "Option::is_none")]
        active_tab: Option<Value>,
        #[serde(rename = "activeApp", default, skip_serializing_if = "Option::is_none")]
        active_app: Option<String>,
    },
    Error {
        message: String,
    },

    // Controller -> display
    Action {
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    Mouse {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
    Keyboard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Scroll {
        #[serde(rename = "deltaX", default)]
        delta_x: f64,
        #[serde(rename = "deltaY", default)]
        delta_y: f64,
    },
    Gesture {
        gesture: String,
        #[serde(default)]
        data: Value,
    },
    Motion {
        x: f64,
        y: f64,
    },
    SwitchTab {
        #[serde(rename = "tabId")]
        tab_id: Value,
    },
    OpenTab {
        url: String,
    },
    GetTabs,
    SetProfile {
        profile: String,
    },
    Dpad {
        direction: String,
    },
    LaunchApp {
        #[serde(rename = "appId")]
        app_id: String,
    },
    Volume {
        action: String,
    },
    Voice {
        query: String,
    },
    Home,

    // Display -> controller
    TabList {
        #[serde(default)]
        tabs: Vec<Value>,
    },
    ActiveTab {
        #[serde(default)]
        tab: Value,
        #[serde(rename = "siteType", default, skip_serializing_if = "Option::is_none")]
        site_type: Option<String>,
    },
    ShowKeyboard,
    SiteDetected {
        site: String,
        profile: String,
    },
    /// Free-form TV state; fields are relayed untouched
    TvState {
        #[serde(flatten)]
        state: Map<String, Value>,
    },
    NowPlaying {
        #[serde(flatten)]
        info: Map<String, Value>,
    },
}

impl Message {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Wire name of the variant, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Join { .. } => "join",
            Message::Ping => "ping",
            Message::Pong => "pong",
            Message::Status { .. } => "status",
            Message::Joined { .. } => "joined",
            Message::Error { .. } => "error",
            Message::Action { .. } => "action",
            Message::Mouse { .. } => "mouse",
            Message::Keyboard { .. } => "keyboard",
            Message::Scroll { .. } => "scroll",
            Message::Gesture { .. } => "gesture",
            Message::Motion { .. } => "motion",
            Message::SwitchTab { .. } => "switchTab",
            Message::OpenTab { .. } => "openTab",
            Message::GetTabs => "getTabs",
            Message::SetProfile { .. } => "setProfile",
            Message::Dpad { .. } => "dpad",
            Message::LaunchApp { .. } => "launchApp",
            Message::Volume { .. } => "volume",
            Message::Voice { .. } => "voice",
            Message::Home => "home",
            Message::TabList { .. } => "tabList",
            Message::ActiveTab { .. } => "activeTab",
            Message::ShowKeyboard => "showKeyboard",
            Message::SiteDetected { .. } => "siteDetected",
            Message::TvState { .. } => "tvState",
            Message::NowPlaying { .. } => "nowPlaying",
        }
    }

    pub fn action(action: impl Into<String>) -> Self {
        Message::Action {
            action: action.into(),
            value: None,
        }
    }
}
