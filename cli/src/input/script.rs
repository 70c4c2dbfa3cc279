//! OS scripting bridges: `osascript` on macOS, PowerShell with user32 on Windows

use super::backend::{Backend, BackendError, BackendResult, Direction};
use super::keymap::{applescript_modifier, mac_key_code, windows_vk, Key};
use super::process::{parse_pair, run};
use crate::platform::Platform;
use couchpad_protocol::MouseButton;
use std::path::PathBuf;

/// Windows wheel units per line
const WHEEL_DELTA: i32 = 120;

const USER32_PRELUDE: &str = "Add-Type -Namespace Couchpad -Name User32 -MemberDefinition '\
[DllImport(\"user32.dll\")] public static extern bool SetCursorPos(int x, int y);\
[DllImport(\"user32.dll\")] public static extern void mouse_event(uint flags, uint dx, uint dy, int data, System.UIntPtr extra);\
[DllImport(\"user32.dll\")] public static extern void keybd_event(byte vk, byte scan, uint flags, System.UIntPtr extra);';";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bridge {
    AppleScript,
    PowerShell,
}

pub struct ScriptBackend {
    bridge: Bridge,
    program: PathBuf,
}

impl ScriptBackend {
    pub fn detect(platform: Platform) -> Option<Self> {
        match platform {
            Platform::Mac => which::which("osascript").ok().map(|program| Self {
                bridge: Bridge::AppleScript,
                program,
            }),
            Platform::Windows => which::which("powershell")
                .or_else(|_| which::which("pwsh"))
                .ok()
                .map(|program| Self {
                    bridge: Bridge::PowerShell,
                    program,
                }),
            Platform::Linux => None,
        }
    }

    fn applescript(&self, script: &str) -> BackendResult<String> {
        run(&self.program, &["-e", script])
    }

    fn jxa(&self, script: &str) -> BackendResult<String> {
        run(&self.program, &["-l", "JavaScript", "-e", script])
    }

    fn powershell(&self, script: &str) -> BackendResult<String> {
        run(
            &self.program,
            &["-NoProfile", "-NonInteractive", "-Command", script],
        )
    }

    fn user32(&self, body: &str) -> BackendResult<String> {
        self.powershell(&format!("{} {}", USER32_PRELUDE, body))
    }
}

/// Quote a string for AppleScript
pub fn applescript_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Quote a string for a single-quoted PowerShell literal
fn powershell_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Escape SendKeys metacharacters so text is typed literally
pub fn sendkeys_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
                out.push('{');
                out.push(c);
                out.push('}');
            }
            '\n' => out.push_str("{ENTER}"),
            _ => out.push(c),
        }
    }
    out
}

/// One System Events line for a key, optionally with held modifiers
pub fn mac_keystroke(key: &Key, held: &[&'static str]) -> Option<String> {
    let stroke = match key {
        Key::Named(named) => format!("key code {}", mac_key_code(named)?),
        Key::Char(c) => format!("keystroke {}", applescript_string(&c.to_string())),
        Key::Modifier(_) => return None,
    };
    let using = if held.is_empty() {
        String::new()
    } else {
        let mods: Vec<_> = held.iter().map(|m| format!("{} down", m)).collect();
        format!(" using {{{}}}", mods.join(", "))
    };
    Some(format!(
        "tell application \"System Events\" to {}{}",
        stroke, using
    ))
}

fn mac_mouse_script(events: &[&str], x: &str, y: &str) -> String {
    let posts: String = events
        .iter()
        .map(|event| {
            format!(
                "$.CGEventPost($.kCGHIDEventTap, $.CGEventCreateMouseEvent(null, $.{}, p, b));",
                event
            )
        })
        .collect();
    format!(
        "ObjC.import('CoreGraphics'); var p = $.CGPointMake({}, {}); var b = 0; {}",
        x, y, posts
    )
}

const MAC_CURSOR: &str = "ObjC.import('AppKit'); var p = $.NSEvent.mouseLocation; \
var h = $.NSScreen.mainScreen.frame.size.height; Math.round(p.x) + ',' + Math.round(h - p.y)";

const MAC_SCREEN: &str = "ObjC.import('AppKit'); var f = $.NSScreen.mainScreen.frame; \
Math.round(f.size.width) + ',' + Math.round(f.size.height)";

fn mac_button_events(button: MouseButton) -> (&'static str, &'static str) {
    match button {
        MouseButton::Left => ("kCGEventLeftMouseDown", "kCGEventLeftMouseUp"),
        MouseButton::Right => ("kCGEventRightMouseDown", "kCGEventRightMouseUp"),
        MouseButton::Middle => ("kCGEventOtherMouseDown", "kCGEventOtherMouseUp"),
    }
}

fn windows_button_flags(button: MouseButton) -> (u32, u32) {
    match button {
        MouseButton::Left => (0x0002, 0x0004),
        MouseButton::Right => (0x0008, 0x0010),
        MouseButton::Middle => (0x0020, 0x0040),
    }
}

impl Backend for ScriptBackend {
    fn name(&self) -> &'static str {
        match self.bridge {
            Bridge::AppleScript => "osascript",
            Bridge::PowerShell => "powershell",
        }
    }

    fn probe(&mut self) -> BackendResult {
        match self.bridge {
            // Fails with -1719 when assistive access is missing
            Bridge::AppleScript => self
                .applescript("tell application \"System Events\" to get name of first process")
                .map(|_| ()),
            Bridge::PowerShell => self.user32("exit 0").map(|_| ()),
        }
    }

    fn key(&mut self, key: &Key, direction: Direction) -> BackendResult {
        match self.bridge {
            Bridge::AppleScript => match (key, direction) {
                (Key::Modifier(m), dir) => {
                    let verb = match dir {
                        Direction::Press => "key down",
                        Direction::Release => "key up",
                    };
                    self.applescript(&format!(
                        "tell application \"System Events\" to {} {}",
                        verb,
                        applescript_modifier(*m)
                    ))
                    .map(|_| ())
                }
                // System Events strokes are press+release in one call
                (_, Direction::Release) => Ok(()),
                (key, Direction::Press) => {
                    let script =
                        mac_keystroke(key, &[]).ok_or(BackendError::Unsupported("key on macOS"))?;
                    self.applescript(&script).map(|_| ())
                }
            },
            Bridge::PowerShell => {
                let vk = windows_vk(key).ok_or(BackendError::Unsupported("key on Windows"))?;
                let flags = match direction {
                    Direction::Press => 0,
                    Direction::Release => 2,
                };
                self.user32(&format!(
                    "[Couchpad.User32]::keybd_event({}, 0, {}, [System.UIntPtr]::Zero)",
                    vk, flags
                ))
                .map(|_| ())
            }
        }
    }

    fn press_shortcut(&mut self, keys: &[Key]) -> BackendResult {
        let Some((base, held)) = keys.split_last() else {
            return Ok(());
        };
        match self.bridge {
            Bridge::AppleScript => {
                let mut mods = Vec::with_capacity(held.len());
                for key in held {
                    match key {
                        Key::Modifier(m) => mods.push(applescript_modifier(*m)),
                        _ => return Err(BackendError::Unsupported("multi-key chord")),
                    }
                }
                let script = mac_keystroke(base, &mods)
                    .ok_or(BackendError::Unsupported("key on macOS"))?;
                self.applescript(&script).map(|_| ())
            }
            Bridge::PowerShell => {
                let mut codes = Vec::with_capacity(keys.len());
                for key in keys {
                    codes.push(windows_vk(key).ok_or(BackendError::Unsupported("key on Windows"))?);
                }
                let mut body = String::new();
                for vk in &codes {
                    body.push_str(&format!(
                        "[Couchpad.User32]::keybd_event({}, 0, 0, [System.UIntPtr]::Zero); ",
                        vk
                    ));
                }
                for vk in codes.iter().rev() {
                    body.push_str(&format!(
                        "[Couchpad.User32]::keybd_event({}, 0, 2, [System.UIntPtr]::Zero); ",
                        vk
                    ));
                }
                self.user32(&body).map(|_| ())
            }
        }
    }

    fn type_text(&mut self, text: &str) -> BackendResult {
        if text.is_empty() {
            return Ok(());
        }
        match self.bridge {
            Bridge::AppleScript => self
                .applescript(&format!(
                    "tell application \"System Events\" to keystroke {}",
                    applescript_string(text)
                ))
                .map(|_| ()),
            Bridge::PowerShell => self
                .powershell(&format!(
                    "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait({})",
                    powershell_string(&sendkeys_escape(text))
                ))
                .map(|_| ()),
        }
    }

    fn move_absolute(&mut self, x: i32, y: i32) -> BackendResult {
        match self.bridge {
            Bridge::AppleScript => self
                .jxa(&mac_mouse_script(
                    &["kCGEventMouseMoved"],
                    &x.to_string(),
                    &y.to_string(),
                ))
                .map(|_| ()),
            Bridge::PowerShell => self
                .user32(&format!("[void][Couchpad.User32]::SetCursorPos({}, {})", x, y))
                .map(|_| ()),
        }
    }

    fn click(&mut self, button: MouseButton) -> BackendResult {
        match self.bridge {
            Bridge::AppleScript => {
                let (down, up) = mac_button_events(button);
                let script = format!(
                    "ObjC.import('AppKit'); var h = $.NSScreen.mainScreen.frame.size.height; \
                     var m = $.NSEvent.mouseLocation; {}",
                    mac_mouse_script(&[down, up], "m.x", "h - m.y")
                );
                self.jxa(&script).map(|_| ())
            }
            Bridge::PowerShell => {
                let (down, up) = windows_button_flags(button);
                self.user32(&format!(
                    "[Couchpad.User32]::mouse_event({}, 0, 0, 0, [System.UIntPtr]::Zero); \
                     [Couchpad.User32]::mouse_event({}, 0, 0, 0, [System.UIntPtr]::Zero)",
                    down, up
                ))
                .map(|_| ())
            }
        }
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> BackendResult {
        match self.bridge {
            // Line units; CoreGraphics treats positive as up/left
            Bridge::AppleScript => self
                .jxa(&format!(
                    "ObjC.import('CoreGraphics'); $.CGEventPost($.kCGHIDEventTap, \
                     $.CGEventCreateScrollWheelEvent(null, $.kCGScrollEventUnitLine, 2, {}, {}));",
                    -dy, -dx
                ))
                .map(|_| ()),
            Bridge::PowerShell => {
                let mut body = String::new();
                if dy != 0 {
                    body.push_str(&format!(
                        "[Couchpad.User32]::mouse_event(0x0800, 0, 0, {}, [System.UIntPtr]::Zero); ",
                        -dy * WHEEL_DELTA
                    ));
                }
                if dx != 0 {
                    body.push_str(&format!(
                        "[Couchpad.User32]::mouse_event(0x1000, 0, 0, {}, [System.UIntPtr]::Zero); ",
                        dx * WHEEL_DELTA
                    ));
                }
                if body.is_empty() {
                    return Ok(());
                }
                self.user32(&body).map(|_| ())
            }
        }
    }

    fn cursor_position(&mut self) -> BackendResult<(i32, i32)> {
        let out = match self.bridge {
            Bridge::AppleScript => self.jxa(MAC_CURSOR)?,
            Bridge::PowerShell => self.powershell(
                "Add-Type -AssemblyName System.Windows.Forms; \
                 $p = [System.Windows.Forms.Cursor]::Position; \"$($p.X),$($p.Y)\"",
            )?,
        };
        parse_pair(&out).ok_or(BackendError::Output {
            program: self.name().to_string(),
            output: out,
        })
    }

    fn screen_size(&mut self) -> BackendResult<(u32, u32)> {
        let out = match self.bridge {
            Bridge::AppleScript => self.jxa(MAC_SCREEN)?,
            Bridge::PowerShell => self.powershell(
                "Add-Type -AssemblyName System.Windows.Forms; \
                 $b = [System.Windows.Forms.Screen]::PrimaryScreen.Bounds; \"$($b.Width),$($b.Height)\"",
            )?,
        };
        parse_pair(&out).ok_or(BackendError::Output {
            program: self.name().to_string(),
            output: out,
        })
    }
}
