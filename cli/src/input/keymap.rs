//! Key names, shortcut parsing and per-platform key encodings
//!
//! Every backend consumes [`Key`] values; this module is the single place
//! that knows how a key is spelled for xdotool, cliclick, AppleScript,
//! Win32 virtual keys and enigo.

use crate::platform::Platform;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    /// Command on macOS, Windows/Super elsewhere
    Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Escape,
    Space,
    Tab,
    Backspace,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
    VolumeUp,
    VolumeDown,
    VolumeMute,
    PlayPause,
    NextTrack,
    PrevTrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Named(NamedKey),
    Modifier(Modifier),
    /// A printable character, lower-cased for letters
    Char(char),
}

impl Key {
    /// Parse a key name as it appears in profiles and keyboard messages.
    ///
    /// Accepts DOM-style codes (`ArrowUp`, `PageDown`, `KeyA`), short aliases
    /// (`up`, `esc`, `pgdn`), modifiers (`ctrl`, `alt`, `shift`, `cmd`) and
    /// `mod`, which resolves to Command on macOS and Ctrl elsewhere.
    pub fn parse(name: &str, platform: Platform) -> Option<Key> {
        if name == " " {
            return Some(Key::Named(NamedKey::Space));
        }
        let name = name.trim();
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(Key::Char(c.to_ascii_lowercase()));
        }

        let lower = name.to_ascii_lowercase();
        let key = match lower.as_str() {
            "mod" => Key::Modifier(match platform {
                Platform::Mac => Modifier::Meta,
                _ => Modifier::Ctrl,
            }),
            "ctrl" | "control" => Key::Modifier(Modifier::Ctrl),
            "alt" | "option" | "opt" => Key::Modifier(Modifier::Alt),
            "shift" => Key::Modifier(Modifier::Shift),
            "meta" | "cmd" | "command" | "super" | "win" => Key::Modifier(Modifier::Meta),
            "arrowup" | "up" => Key::Named(NamedKey::Up),
            "arrowdown" | "down" => Key::Named(NamedKey::Down),
            "arrowleft" | "left" => Key::Named(NamedKey::Left),
            "arrowright" | "right" => Key::Named(NamedKey::Right),
            "enter" | "return" => Key::Named(NamedKey::Enter),
            "escape" | "esc" => Key::Named(NamedKey::Escape),
            "space" | "spacebar" => Key::Named(NamedKey::Space),
            "tab" => Key::Named(NamedKey::Tab),
            "backspace" => Key::Named(NamedKey::Backspace),
            "delete" | "del" => Key::Named(NamedKey::Delete),
            "home" => Key::Named(NamedKey::Home),
            "end" => Key::Named(NamedKey::End),
            "pageup" | "pgup" => Key::Named(NamedKey::PageUp),
            "pagedown" | "pgdn" => Key::Named(NamedKey::PageDown),
            "audiovolumeup" | "volumeup" => Key::Named(NamedKey::VolumeUp),
            "audiovolumedown" | "volumedown" => Key::Named(NamedKey::VolumeDown),
            "audiovolumemute" | "volumemute" => Key::Named(NamedKey::VolumeMute),
            "mediaplaypause" => Key::Named(NamedKey::PlayPause),
            "mediatracknext" | "medianexttrack" => Key::Named(NamedKey::NextTrack),
            "mediatrackprevious" | "mediaprevtrack" => Key::Named(NamedKey::PrevTrack),
            "plus" => Key::Char('+'),
            "minus" => Key::Char('-'),
            "equal" => Key::Char('='),
            _ => return parse_code(&lower),
        };
        Some(key)
    }

    pub fn is_modifier(&self) -> bool {
        matches!(self, Key::Modifier(_))
    }
}

/// `KeyA`, `Digit1` and `F5` style codes
fn parse_code(lower: &str) -> Option<Key> {
    if let Some(rest) = lower.strip_prefix("key") {
        return single_char(rest).filter(|c| c.is_ascii_alphabetic()).map(Key::Char);
    }
    if let Some(rest) = lower.strip_prefix("digit") {
        return single_char(rest).filter(|c| c.is_ascii_digit()).map(Key::Char);
    }
    if let Some(rest) = lower.strip_prefix('f') {
        let n: u8 = rest.parse().ok()?;
        if (1..=24).contains(&n) {
            return Some(Key::Named(NamedKey::F(n)));
        }
    }
    None
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Parse `ctrl+shift+s` into keys; `None` if any part is unknown.
pub fn parse_combo(combo: &str, platform: Platform) -> Option<Vec<Key>> {
    if combo == "+" {
        return Some(vec![Key::Char('+')]);
    }
    // A trailing `++` means the base key is `+`
    let (head, plus_base) = match combo.strip_suffix("++") {
        Some(head) => (head, true),
        None => (combo, false),
    };
    let mut keys = head
        .split('+')
        .filter(|part| !part.is_empty())
        .map(|part| Key::parse(part, platform))
        .collect::<Option<Vec<_>>>()?;
    if plus_base {
        keys.push(Key::Char('+'));
    }
    if keys.is_empty() {
        return None;
    }
    Some(keys)
}

pub fn parse_keys(names: &[String], platform: Platform) -> Option<Vec<Key>> {
    names.iter().map(|n| Key::parse(n, platform)).collect()
}

/// Named shortcuts a controller can ask for without knowing the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutIntent {
    Copy,
    Paste,
    Undo,
    Fullscreen,
    ZoomIn,
    ZoomOut,
    NewTab,
    CloseTab,
    NextTab,
    PrevTab,
    Mute,
    PlayPause,
    NextTrack,
    PrevTrack,
}

impl FromStr for ShortcutIntent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "copy" => ShortcutIntent::Copy,
            "paste" => ShortcutIntent::Paste,
            "undo" => ShortcutIntent::Undo,
            "fullscreen" => ShortcutIntent::Fullscreen,
            "zoom-in" => ShortcutIntent::ZoomIn,
            "zoom-out" => ShortcutIntent::ZoomOut,
            "new-tab" => ShortcutIntent::NewTab,
            "close-tab" => ShortcutIntent::CloseTab,
            "next-tab" => ShortcutIntent::NextTab,
            "prev-tab" => ShortcutIntent::PrevTab,
            "mute" => ShortcutIntent::Mute,
            "play-pause" => ShortcutIntent::PlayPause,
            "next-track" => ShortcutIntent::NextTrack,
            "prev-track" => ShortcutIntent::PrevTrack,
            _ => return Err(()),
        })
    }
}

impl ShortcutIntent {
    /// Key sequence for this intent: modifiers first, base key last.
    pub fn keys(self, platform: Platform) -> Vec<Key> {
        use Key::{Char, Modifier as M, Named as N};
        let primary = match platform {
            Platform::Mac => Modifier::Meta,
            _ => Modifier::Ctrl,
        };
        match self {
            ShortcutIntent::Copy => vec![M(primary), Char('c')],
            ShortcutIntent::Paste => vec![M(primary), Char('v')],
            ShortcutIntent::Undo => vec![M(primary), Char('z')],
            ShortcutIntent::Fullscreen => match platform {
                Platform::Mac => vec![M(Modifier::Meta), M(Modifier::Ctrl), Char('f')],
                _ => vec![N(NamedKey::F(11))],
            },
            ShortcutIntent::ZoomIn => vec![M(primary), Char('=')],
            ShortcutIntent::ZoomOut => vec![M(primary), Char('-')],
            ShortcutIntent::NewTab => vec![M(primary), Char('t')],
            ShortcutIntent::CloseTab => vec![M(primary), Char('w')],
            ShortcutIntent::NextTab => vec![M(Modifier::Ctrl), N(NamedKey::Tab)],
            ShortcutIntent::PrevTab => {
                vec![M(Modifier::Ctrl), M(Modifier::Shift), N(NamedKey::Tab)]
            }
            ShortcutIntent::Mute => vec![N(NamedKey::VolumeMute)],
            ShortcutIntent::PlayPause => vec![N(NamedKey::PlayPause)],
            ShortcutIntent::NextTrack => vec![N(NamedKey::NextTrack)],
            ShortcutIntent::PrevTrack => vec![N(NamedKey::PrevTrack)],
        }
    }
}

/// Key name for `xdotool key/keydown/keyup`
pub fn xdotool_name(key: &Key) -> Option<String> {
    let name = match key {
        Key::Modifier(Modifier::Ctrl) => "ctrl",
        Key::Modifier(Modifier::Alt) => "alt",
        Key::Modifier(Modifier::Shift) => "shift",
        Key::Modifier(Modifier::Meta) => "super",
        Key::Named(named) => match named {
            NamedKey::Up => "Up",
            NamedKey::Down => "Down",
            NamedKey::Left => "Left",
            NamedKey::Right => "Right",
            NamedKey::Enter => "Return",
            NamedKey::Escape => "Escape",
            NamedKey::Space => "space",
            NamedKey::Tab => "Tab",
            NamedKey::Backspace => "BackSpace",
            NamedKey::Delete => "Delete",
            NamedKey::Home => "Home",
            NamedKey::End => "End",
            NamedKey::PageUp => "Prior",
            NamedKey::PageDown => "Next",
            NamedKey::F(n) => return Some(format!("F{}", n)),
            NamedKey::VolumeUp => "XF86AudioRaiseVolume",
            NamedKey::VolumeDown => "XF86AudioLowerVolume",
            NamedKey::VolumeMute => "XF86AudioMute",
            NamedKey::PlayPause => "XF86AudioPlay",
            NamedKey::NextTrack => "XF86AudioNext",
            NamedKey::PrevTrack => "XF86AudioPrev",
        },
        Key::Char(c) if c.is_ascii_alphanumeric() => return Some(c.to_string()),
        Key::Char(c) => match c {
            '+' => "plus",
            '-' => "minus",
            '=' => "equal",
            '.' => "period",
            ',' => "comma",
            '/' => "slash",
            '[' => "bracketleft",
            ']' => "bracketright",
            ';' => "semicolon",
            '\'' => "apostrophe",
            '`' => "grave",
            '\\' => "backslash",
            _ => return None,
        },
    };
    Some(name.to_string())
}

/// How cliclick spells a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliclickKey {
    /// `kp:<name>`
    Press(&'static str),
    /// `kd:<name>` / `ku:<name>`
    Modifier(&'static str),
    /// `t:<text>`
    Text(String),
}

pub fn cliclick_key(key: &Key) -> Option<CliclickKey> {
    Some(match key {
        Key::Modifier(Modifier::Ctrl) => CliclickKey::Modifier("ctrl"),
        Key::Modifier(Modifier::Alt) => CliclickKey::Modifier("alt"),
        Key::Modifier(Modifier::Shift) => CliclickKey::Modifier("shift"),
        Key::Modifier(Modifier::Meta) => CliclickKey::Modifier("cmd"),
        Key::Named(named) => CliclickKey::Press(match named {
            NamedKey::Up => "arrow-up",
            NamedKey::Down => "arrow-down",
            NamedKey::Left => "arrow-left",
            NamedKey::Right => "arrow-right",
            NamedKey::Enter => "return",
            NamedKey::Escape => "esc",
            NamedKey::Space => "space",
            NamedKey::Tab => "tab",
            NamedKey::Backspace => "delete",
            NamedKey::Delete => "fwd-delete",
            NamedKey::Home => "home",
            NamedKey::End => "end",
            NamedKey::PageUp => "page-up",
            NamedKey::PageDown => "page-down",
            NamedKey::F(n) => match n {
                1 => "f1",
                2 => "f2",
                3 => "f3",
                4 => "f4",
                5 => "f5",
                6 => "f6",
                7 => "f7",
                8 => "f8",
                9 => "f9",
                10 => "f10",
                11 => "f11",
                12 => "f12",
                _ => return None,
            },
            NamedKey::VolumeUp => "volume-up",
            NamedKey::VolumeDown => "volume-down",
            NamedKey::VolumeMute => "mute",
            NamedKey::PlayPause => "play-pause",
            NamedKey::NextTrack => "play-next",
            NamedKey::PrevTrack => "play-previous",
        }),
        Key::Char(c) => CliclickKey::Text(c.to_string()),
    })
}

/// AppleScript `using {...}` name for a modifier
pub fn applescript_modifier(modifier: Modifier) -> &'static str {
    match modifier {
        Modifier::Ctrl => "control",
        Modifier::Alt => "option",
        Modifier::Shift => "shift",
        Modifier::Meta => "command",
    }
}

/// macOS virtual key code, for `key code N` in System Events
pub fn mac_key_code(key: &NamedKey) -> Option<u16> {
    Some(match key {
        NamedKey::Up => 126,
        NamedKey::Down => 125,
        NamedKey::Left => 123,
        NamedKey::Right => 124,
        NamedKey::Enter => 36,
        NamedKey::Escape => 53,
        NamedKey::Space => 49,
        NamedKey::Tab => 48,
        NamedKey::Backspace => 51,
        NamedKey::Delete => 117,
        NamedKey::Home => 115,
        NamedKey::End => 119,
        NamedKey::PageUp => 116,
        NamedKey::PageDown => 121,
        NamedKey::F(n) => match n {
            1 => 122,
            2 => 120,
            3 => 99,
            4 => 118,
            5 => 96,
            6 => 97,
            7 => 98,
            8 => 100,
            9 => 101,
            10 => 109,
            11 => 103,
            12 => 111,
            _ => return None,
        },
        // Media keys are system-defined events, not key codes
        _ => return None,
    })
}

/// Win32 virtual-key code for `keybd_event`
pub fn windows_vk(key: &Key) -> Option<u8> {
    Some(match key {
        Key::Modifier(Modifier::Ctrl) => 0x11,
        Key::Modifier(Modifier::Alt) => 0x12,
        Key::Modifier(Modifier::Shift) => 0x10,
        Key::Modifier(Modifier::Meta) => 0x5B,
        Key::Named(named) => match named {
            NamedKey::Up => 0x26,
            NamedKey::Down => 0x28,
            NamedKey::Left => 0x25,
            NamedKey::Right => 0x27,
            NamedKey::Enter => 0x0D,
            NamedKey::Escape => 0x1B,
            NamedKey::Space => 0x20,
            NamedKey::Tab => 0x09,
            NamedKey::Backspace => 0x08,
            NamedKey::Delete => 0x2E,
            NamedKey::Home => 0x24,
            NamedKey::End => 0x23,
            NamedKey::PageUp => 0x21,
            NamedKey::PageDown => 0x22,
            NamedKey::F(n) if (1..=24).contains(n) => 0x6F + n,
            NamedKey::F(_) => return None,
            NamedKey::VolumeMute => 0xAD,
            NamedKey::VolumeDown => 0xAE,
            NamedKey::VolumeUp => 0xAF,
            NamedKey::NextTrack => 0xB0,
            NamedKey::PrevTrack => 0xB1,
            NamedKey::PlayPause => 0xB3,
        },
        Key::Char(c) if c.is_ascii_alphanumeric() => c.to_ascii_uppercase() as u8,
        Key::Char(c) => match c {
            '=' | '+' => 0xBB,
            ',' => 0xBC,
            '-' => 0xBD,
            '.' => 0xBE,
            '/' => 0xBF,
            '[' => 0xDB,
            ']' => 0xDD,
            _ => return None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_codes() {
        let p = Platform::Linux;
        assert_eq!(Key::parse("ArrowUp", p), Some(Key::Named(NamedKey::Up)));
        assert_eq!(Key::parse("Enter", p), Some(Key::Named(NamedKey::Enter)));
        assert_eq!(Key::parse("PageDown", p), Some(Key::Named(NamedKey::PageDown)));
        assert_eq!(Key::parse("Space", p), Some(Key::Named(NamedKey::Space)));
        assert_eq!(Key::parse(" ", p), Some(Key::Named(NamedKey::Space)));
        assert_eq!(Key::parse("B", p), Some(Key::Char('b')));
        assert_eq!(Key::parse("KeyS", p), Some(Key::Char('s')));
        assert_eq!(Key::parse("Digit7", p), Some(Key::Char('7')));
        assert_eq!(Key::parse("F11", p), Some(Key::Named(NamedKey::F(11))));
        assert_eq!(Key::parse("F99", p), None);
        assert_eq!(Key::parse("Hyper", p), None);
    }

    #[test]
    fn test_mod_is_platform_primary() {
        assert_eq!(
            Key::parse("mod", Platform::Mac),
            Some(Key::Modifier(Modifier::Meta))
        );
        assert_eq!(
            Key::parse("mod", Platform::Windows),
            Some(Key::Modifier(Modifier::Ctrl))
        );
    }

    #[test]
    fn test_parse_combo() {
        let keys = parse_combo("ctrl+shift+s", Platform::Linux).unwrap();
        assert_eq!(
            keys,
            vec![
                Key::Modifier(Modifier::Ctrl),
                Key::Modifier(Modifier::Shift),
                Key::Char('s')
            ]
        );
        assert_eq!(
            parse_combo("ctrl++", Platform::Linux).unwrap(),
            vec![Key::Modifier(Modifier::Ctrl), Key::Char('+')]
        );
        assert!(parse_combo("ctrl+nope", Platform::Linux).is_none());
    }

    #[test]
    fn test_intents() {
        assert_eq!("zoom-in".parse(), Ok(ShortcutIntent::ZoomIn));
        assert!("zoom".parse::<ShortcutIntent>().is_err());
        assert_eq!(
            ShortcutIntent::Copy.keys(Platform::Mac),
            vec![Key::Modifier(Modifier::Meta), Key::Char('c')]
        );
        assert_eq!(
            ShortcutIntent::Copy.keys(Platform::Linux),
            vec![Key::Modifier(Modifier::Ctrl), Key::Char('c')]
        );
        assert_eq!(
            ShortcutIntent::Fullscreen.keys(Platform::Windows),
            vec![Key::Named(NamedKey::F(11))]
        );
    }

    #[test]
    fn test_encodings() {
        let up = Key::Named(NamedKey::Up);
        assert_eq!(xdotool_name(&up).as_deref(), Some("Up"));
        assert_eq!(
            xdotool_name(&Key::Named(NamedKey::PageUp)).as_deref(),
            Some("Prior")
        );
        assert_eq!(cliclick_key(&up), Some(CliclickKey::Press("arrow-up")));
        assert_eq!(
            cliclick_key(&Key::Modifier(Modifier::Meta)),
            Some(CliclickKey::Modifier("cmd"))
        );
        assert_eq!(mac_key_code(&NamedKey::Enter), Some(36));
        assert_eq!(mac_key_code(&NamedKey::PlayPause), None);
        assert_eq!(windows_vk(&Key::Char('s')), Some(b'S'));
        assert_eq!(windows_vk(&Key::Named(NamedKey::F(5))), Some(0x74));
    }
}
