//! Input Execution Engine
//!
//! Resolves abstract actions into backend calls and runs them against the
//! selected backend. The engine is the only writer of the tracked cursor and
//! of the local input context (active profile, active site, motion mode).

use super::backend::{Backend, BackendError};
use super::keymap::{parse_combo, parse_keys, Key, ShortcutIntent};
use super::media::{MediaAction, MediaTarget};
use super::sites;
use crate::config::AgentConfig;
use crate::platform::{self, Platform};
use couchpad_protocol::{
    detect_profile, normalize_host, Catalog, InputDescriptor, MotionMode, MouseButton,
    ScrollDirection, DEFAULT_PROFILE,
};
use serde_json::Value;
use std::io;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

/// Assumed when neither the backend nor the config knows the screen
pub const DEFAULT_SCREEN: (u32, u32) = (1920, 1080);

/// Trackpad scroll pixels per wheel line
const PIXELS_PER_LINE: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub platform: Platform,
    pub natural_scroll: bool,
    pub pointer_sensitivity: f64,
    pub screen_override: Option<(u32, u32)>,
}

impl EngineSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            platform: Platform::current(),
            natural_scroll: config.natural_scroll,
            pointer_sensitivity: config.pointer_sensitivity,
            screen_override: config.screen.map(|s| (s.width, s.height)),
        }
    }
}

/// What the local UI shows about input injection
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    Starting,
    Ready { backend: &'static str },
    NoBackend,
    PermissionDenied { backend: &'static str, detail: String },
}

/// A resolved action, ready for the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    PressKey(Key),
    Shortcut(Vec<Key>),
    TypeText(String),
    /// Whole lines; positive `dy` scrolls down
    Scroll { dx: i32, dy: i32 },
    Click(MouseButton),
    SetMotion(MotionMode),
    Media(MediaAction),
    Noop,
}

/// Work handed to the engine by the agent
#[derive(Debug, Clone, PartialEq)]
pub enum InputCommand {
    Action { action: String, value: Option<Value> },
    /// Pointer delta in pixels; coalesced by the worker
    MoveRelative { dx: f64, dy: f64 },
    /// Trackpad or air-mouse sample, interpreted by the motion mode
    Motion { x: f64, y: f64 },
    Click(MouseButton),
    DoubleClick(MouseButton),
    /// Trackpad scroll in pixels
    Scroll { dx: f64, dy: f64 },
    Key(String),
    Text(String),
    Gesture(String),
    Media(MediaAction),
    SetProfile(String),
    OpenUrl(String),
}

/// Pointer movement with sensitivity and motion mode already applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerMove {
    /// Pixels from the tracked cursor
    By { dx: f64, dy: f64 },
    /// Normalized (0..1) screen position
    To { nx: f64, ny: f64 },
}

impl PointerMove {
    /// Fold `next` into this move when one backend call can do both
    pub fn absorb(&mut self, next: PointerMove) -> bool {
        match (*self, next) {
            (PointerMove::By { dx, dy }, PointerMove::By { dx: ndx, dy: ndy }) => {
                *self = PointerMove::By {
                    dx: dx + ndx,
                    dy: dy + ndy,
                };
                true
            }
            (PointerMove::To { .. }, PointerMove::To { .. }) => {
                *self = next;
                true
            }
            _ => false,
        }
    }
}

type Opener = Box<dyn FnMut(&Url) -> io::Result<()>>;

pub struct Engine {
    backend: Box<dyn Backend>,
    settings: EngineSettings,
    cursor: (i32, i32),
    screen: (u32, u32),
    motion: MotionMode,
    profile: String,
    site: Option<String>,
    media: Vec<Box<dyn MediaTarget>>,
    status: watch::Sender<EngineStatus>,
    permission_reported: bool,
    opener: Opener,
}

impl Engine {
    pub fn new(
        mut backend: Box<dyn Backend>,
        settings: EngineSettings,
        media: Vec<Box<dyn MediaTarget>>,
        status: watch::Sender<EngineStatus>,
    ) -> Self {
        let screen = settings
            .screen_override
            .or_else(|| backend.screen_size().ok())
            .filter(|(w, h)| *w > 0 && *h > 0)
            .unwrap_or(DEFAULT_SCREEN);
        let cursor = backend
            .cursor_position()
            .unwrap_or((screen.0 as i32 / 2, screen.1 as i32 / 2));
        let cursor = clamp_point(cursor.0 as f64, cursor.1 as f64, screen);
        debug!(
            "Input engine on {} backend, screen {}x{}",
            backend.name(),
            screen.0,
            screen.1
        );
        Self {
            backend,
            settings,
            cursor,
            screen,
            motion: MotionMode::Relative,
            profile: DEFAULT_PROFILE.to_string(),
            site: None,
            media,
            status,
            permission_reported: false,
            opener: Box::new(platform::open_url),
        }
    }

    /// Out-of-process backends get their pointer moves batched
    pub fn coalesces_moves(&self) -> bool {
        !self.backend.is_in_process()
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    pub fn active_profile(&self) -> &str {
        &self.profile
    }

    /// The pointer move `command` asks for under the current motion mode
    pub fn pointer_move(&self, command: &InputCommand) -> Option<PointerMove> {
        match *command {
            InputCommand::MoveRelative { dx, dy } => Some(PointerMove::By { dx, dy }),
            InputCommand::Motion { x, y } => Some(match self.motion {
                MotionMode::Relative => {
                    let s = self.settings.pointer_sensitivity;
                    PointerMove::By {
                        dx: x * s,
                        dy: y * s,
                    }
                }
                MotionMode::Absolute => PointerMove::To { nx: x, ny: y },
            }),
            _ => None,
        }
    }

    pub fn apply_move(&mut self, movement: PointerMove) {
        match movement {
            PointerMove::By { dx, dy } => self.move_relative(dx, dy),
            PointerMove::To { nx, ny } => self.move_normalized(nx, ny),
        }
    }

    pub fn handle(&mut self, command: InputCommand) {
        if let Some(movement) = self.pointer_move(&command) {
            self.apply_move(movement);
            return;
        }
        match command {
            InputCommand::Action { action, value } => {
                let call = self.resolve(&action, value.as_ref());
                self.execute(call);
            }
            InputCommand::MoveRelative { .. } | InputCommand::Motion { .. } => {}
            InputCommand::Click(button) => {
                if let Err(e) = self.backend.click(button) {
                    self.report("click", e);
                }
            }
            InputCommand::DoubleClick(button) => {
                if let Err(e) = self.backend.double_click(button) {
                    self.report("double click", e);
                }
            }
            InputCommand::Scroll { dx, dy } => {
                let (mut dx, mut dy) = (pixels_to_lines(dx), pixels_to_lines(dy));
                if self.settings.natural_scroll {
                    dx = -dx;
                    dy = -dy;
                }
                self.scroll(dx, dy);
            }
            InputCommand::Key(name) => {
                let call = self.key_call(&name);
                self.execute(call);
            }
            InputCommand::Text(text) => self.execute(BackendCall::TypeText(text)),
            InputCommand::Gesture(gesture) => self.gesture(&gesture),
            InputCommand::Media(action) => self.media_key(action),
            InputCommand::SetProfile(name) => self.set_profile(&name),
            InputCommand::OpenUrl(url) => self.open_url(&url),
        }
    }

    /// Resolve an action: site handler, active profile, universal, then intents
    pub fn resolve(&self, action: &str, value: Option<&Value>) -> BackendCall {
        if action == "type" {
            if let Some(text) = value.and_then(Value::as_str) {
                return BackendCall::TypeText(text.to_string());
            }
        }

        if let Some(site) = &self.site {
            if let Some(keys) = sites::lookup(site, action) {
                let names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                return self.keys_call(&names);
            }
        }

        let catalog = Catalog::builtin();
        let descriptor = catalog
            .get(&self.profile)
            .and_then(|p| p.lookup(action))
            .or_else(|| catalog.universal().and_then(|p| p.lookup(action)));
        if let Some(descriptor) = descriptor {
            return self.descriptor_call(descriptor);
        }

        if let Ok(intent) = action.parse::<ShortcutIntent>() {
            return match intent {
                ShortcutIntent::Mute => BackendCall::Media(MediaAction::Mute),
                ShortcutIntent::PlayPause => BackendCall::Media(MediaAction::PlayPause),
                ShortcutIntent::NextTrack => BackendCall::Media(MediaAction::Next),
                ShortcutIntent::PrevTrack => BackendCall::Media(MediaAction::Previous),
                other => BackendCall::Shortcut(other.keys(self.settings.platform)),
            };
        }
        if let Some(media) = MediaAction::parse(action) {
            return BackendCall::Media(media);
        }

        debug!("No binding for action {:?} in {}", action, self.profile);
        BackendCall::Noop
    }

    fn descriptor_call(&self, descriptor: &InputDescriptor) -> BackendCall {
        match descriptor {
            InputDescriptor::Key { code } => match Key::parse(code, self.settings.platform) {
                Some(key) => BackendCall::PressKey(key),
                None => {
                    debug!("Unknown key {:?}", code);
                    BackendCall::Noop
                }
            },
            InputDescriptor::Shortcut { keys } => self.keys_call(keys),
            InputDescriptor::Scroll { direction, amount } => {
                let amount = (*amount).min(i32::MAX as u32) as i32;
                let (dx, dy) = match direction {
                    ScrollDirection::Up => (0, -amount),
                    ScrollDirection::Down => (0, amount),
                    ScrollDirection::Left => (-amount, 0),
                    ScrollDirection::Right => (amount, 0),
                };
                BackendCall::Scroll { dx, dy }
            }
            InputDescriptor::MouseMotion { mode } => BackendCall::SetMotion(*mode),
            InputDescriptor::Click { button } => BackendCall::Click(*button),
        }
    }

    fn keys_call(&self, names: &[String]) -> BackendCall {
        match parse_keys(names, self.settings.platform) {
            Some(keys) if keys.len() == 1 && !keys[0].is_modifier() => {
                BackendCall::PressKey(keys[0])
            }
            Some(keys) if !keys.is_empty() => BackendCall::Shortcut(keys),
            _ => {
                debug!("Unknown key in {:?}", names);
                BackendCall::Noop
            }
        }
    }

    /// A keyboard message key: a single key name or a `ctrl+c` style combo
    fn key_call(&self, name: &str) -> BackendCall {
        let keys = if name.len() > 1 && name.contains('+') {
            parse_combo(name, self.settings.platform)
        } else {
            Key::parse(name, self.settings.platform).map(|k| vec![k])
        };
        match keys {
            Some(keys) if keys.len() == 1 => BackendCall::PressKey(keys[0]),
            Some(keys) => BackendCall::Shortcut(keys),
            None => {
                debug!("Unknown key {:?}", name);
                BackendCall::Noop
            }
        }
    }

    pub fn execute(&mut self, call: BackendCall) {
        let result = match call {
            BackendCall::PressKey(key) => self.backend.press_key(&key),
            BackendCall::Shortcut(keys) => self.backend.press_shortcut(&keys),
            BackendCall::TypeText(text) => self.backend.type_text(&text),
            BackendCall::Scroll { dx, dy } => {
                self.scroll(dx, dy);
                Ok(())
            }
            BackendCall::Click(button) => self.backend.click(button),
            BackendCall::SetMotion(mode) => {
                debug!("Motion mode {:?}", mode);
                self.motion = mode;
                Ok(())
            }
            BackendCall::Media(action) => {
                self.media_key(action);
                Ok(())
            }
            BackendCall::Noop => Ok(()),
        };
        if let Err(e) = result {
            self.report("input", e);
        }
    }

    /// Move from the tracked cursor, clamped to the screen
    pub fn move_relative(&mut self, dx: f64, dy: f64) {
        let target = clamp_point(
            self.cursor.0 as f64 + dx,
            self.cursor.1 as f64 + dy,
            self.screen,
        );
        self.move_to(target);
    }

    /// Place the pointer at normalized (0..1) screen coordinates
    pub fn move_normalized(&mut self, nx: f64, ny: f64) {
        let nx = nx.clamp(0.0, 1.0);
        let ny = ny.clamp(0.0, 1.0);
        let target = clamp_point(
            nx * (self.screen.0.saturating_sub(1)) as f64,
            ny * (self.screen.1.saturating_sub(1)) as f64,
            self.screen,
        );
        self.move_to(target);
    }

    fn move_to(&mut self, target: (i32, i32)) {
        if target == self.cursor {
            return;
        }
        match self.backend.move_absolute(target.0, target.1) {
            Ok(()) => self.cursor = target,
            Err(e) => self.report("move", e),
        }
    }

    pub fn scroll(&mut self, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        if let Err(e) = self.backend.scroll(dx, dy) {
            self.report("scroll", e);
        }
    }

    /// Try each player app in order, then emulate the media key
    pub fn media_key(&mut self, action: MediaAction) {
        let mut denied = None;
        for target in self.media.iter_mut() {
            match target.send(action) {
                Ok(()) => {
                    debug!("{:?} handled by {}", action, target.name());
                    return;
                }
                Err(e) => {
                    debug!("{} did not take {:?}: {}", target.name(), action, e);
                    if e.is_permission() && denied.is_none() {
                        denied = Some(e);
                    }
                }
            }
        }
        if let Some(e) = denied {
            self.report("media", e);
        }
        if let Err(e) = self.backend.press_key(&Key::Named(action.key())) {
            self.report("media key", e);
        }
    }

    fn gesture(&mut self, gesture: &str) {
        let platform = self.settings.platform;
        let call = match gesture {
            "pinch-out" => BackendCall::Shortcut(ShortcutIntent::ZoomIn.keys(platform)),
            "pinch-in" => BackendCall::Shortcut(ShortcutIntent::ZoomOut.keys(platform)),
            "swipe-left" => self.resolve("left", None),
            "swipe-right" => self.resolve("right", None),
            "two-finger-tap" => BackendCall::Click(MouseButton::Right),
            other => {
                debug!("Ignoring gesture {:?}", other);
                BackendCall::Noop
            }
        };
        self.execute(call);
    }

    pub fn set_profile(&mut self, name: &str) {
        if Catalog::builtin().contains(name) {
            info!("Active profile: {}", name);
            self.profile = name.to_string();
        } else {
            warn!("Ignoring unknown profile {:?}", name);
        }
    }

    /// Open a web page in the default browser and make its site the active
    /// context. Anything but an http(s) page on a plain host is refused.
    pub fn open_url(&mut self, raw: &str) {
        let url = match platform::page_url(raw) {
            Ok(url) => url,
            Err(e) => {
                warn!("Refusing to open {:?}: {}", raw, e);
                return;
            }
        };
        if let Err(e) = (self.opener)(&url) {
            warn!("Failed to open {}: {}", url, e);
            return;
        }
        self.track_site(&url);
    }

    fn track_site(&mut self, url: &Url) {
        if let Some((host, path)) = sites::location(url) {
            let profile = detect_profile(&host, &path);
            info!("Active site: {} ({} profile)", normalize_host(&host), profile);
            self.site = Some(host);
            self.profile = profile.to_string();
        }
    }

    fn report(&mut self, what: &str, err: BackendError) {
        let backend = self.backend.name();
        match err {
            BackendError::PermissionDenied(detail) if !self.permission_reported => {
                self.permission_reported = true;
                warn!("{} on {} was denied by the OS: {}", what, backend, detail);
                self.status
                    .send_replace(EngineStatus::PermissionDenied { backend, detail });
            }
            BackendError::PermissionDenied(_) => debug!("{} on {} denied again", what, backend),
            other => warn!("{} failed on {}: {}", what, backend, other),
        }
    }
}

fn clamp_point(x: f64, y: f64, screen: (u32, u32)) -> (i32, i32) {
    let max_x = screen.0.saturating_sub(1).min(i32::MAX as u32) as f64;
    let max_y = screen.1.saturating_sub(1).min(i32::MAX as u32) as f64;
    let x = if x.is_finite() { x.round().clamp(0.0, max_x) } else { 0.0 };
    let y = if y.is_finite() { y.round().clamp(0.0, max_y) } else { 0.0 };
    (x as i32, y as i32)
}

/// Round pixel deltas to lines, never swallowing a real movement
fn pixels_to_lines(pixels: f64) -> i32 {
    if !pixels.is_finite() || pixels.abs() < 1.0 {
        return 0;
    }
    let lines = (pixels / PIXELS_PER_LINE).round() as i32;
    if lines == 0 {
        pixels.signum() as i32
    } else {
        lines
    }
}
