//! External helper tools, one process per call: xdotool (X11) and cliclick (macOS)
//!
//! cliclick has no wheel events, so on macOS scrolling goes through the
//! osascript bridge when it is installed.

use super::backend::{Backend, BackendError, BackendResult, Direction};
use super::keymap::{cliclick_key, xdotool_name, CliclickKey, Key};
use super::process::{parse_pair, run};
use super::script::ScriptBackend;
use crate::platform::Platform;
use couchpad_protocol::MouseButton;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperTool {
    Xdotool,
    Cliclick,
}

impl HelperTool {
    pub fn for_platform(platform: Platform) -> Option<Self> {
        match platform {
            Platform::Linux => Some(HelperTool::Xdotool),
            Platform::Mac => Some(HelperTool::Cliclick),
            Platform::Windows => None,
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            HelperTool::Xdotool => "xdotool",
            HelperTool::Cliclick => "cliclick",
        }
    }
}

pub struct HelperBackend {
    tool: HelperTool,
    program: PathBuf,
    scroll_via: Option<Box<dyn Backend>>,
}

impl HelperBackend {
    /// Find the platform's helper on `PATH`
    pub fn detect(platform: Platform) -> Option<Self> {
        let tool = HelperTool::for_platform(platform)?;
        let program = which::which(tool.program()).ok()?;
        let scroll_via = match tool {
            HelperTool::Cliclick => {
                ScriptBackend::detect(platform).map(|b| Box::new(b) as Box<dyn Backend>)
            }
            HelperTool::Xdotool => None,
        };
        Some(Self {
            tool,
            program,
            scroll_via,
        })
    }

    fn run(&self, args: &[String]) -> BackendResult<String> {
        run(&self.program, args)
    }

    fn unknown_key(key: &Key) -> BackendError {
        BackendError::Command {
            program: "keymap".to_string(),
            message: format!("no helper spelling for {:?}", key),
        }
    }
}

fn xdotool_button(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

/// xdotool wheel buttons and repeat counts for a line scroll
pub fn xdotool_scroll_args(dx: i32, dy: i32) -> Vec<Vec<String>> {
    let mut calls = Vec::new();
    for (delta, negative, positive) in [(dy, "4", "5"), (dx, "6", "7")] {
        if delta != 0 {
            let button = if delta < 0 { negative } else { positive };
            calls.push(vec![
                "click".to_string(),
                "--repeat".to_string(),
                delta.unsigned_abs().to_string(),
                button.to_string(),
            ]);
        }
    }
    calls
}

/// One cliclick invocation for a whole shortcut
pub fn cliclick_shortcut_args(keys: &[Key]) -> Option<Vec<String>> {
    let (base, held) = keys.split_last()?;
    let mut modifiers = Vec::new();
    for key in held {
        match cliclick_key(key)? {
            CliclickKey::Modifier(name) => modifiers.push(name),
            _ => return None,
        }
    }
    let base = match cliclick_key(base)? {
        CliclickKey::Press(name) => format!("kp:{}", name),
        CliclickKey::Text(text) => format!("t:{}", text),
        CliclickKey::Modifier(_) => return None,
    };
    let mut args = Vec::new();
    if !modifiers.is_empty() {
        args.push(format!("kd:{}", modifiers.join(",")));
    }
    args.push(base);
    if !modifiers.is_empty() {
        let released: Vec<_> = modifiers.iter().rev().copied().collect();
        args.push(format!("ku:{}", released.join(",")));
    }
    Some(args)
}

impl Backend for HelperBackend {
    fn name(&self) -> &'static str {
        self.tool.program()
    }

    fn probe(&mut self) -> BackendResult {
        self.cursor_position().map(|_| ())
    }

    fn key(&mut self, key: &Key, direction: Direction) -> BackendResult {
        match self.tool {
            HelperTool::Xdotool => {
                let name = xdotool_name(key).ok_or_else(|| Self::unknown_key(key))?;
                let verb = match direction {
                    Direction::Press => "keydown",
                    Direction::Release => "keyup",
                };
                self.run(&[verb.to_string(), name]).map(|_| ())
            }
            HelperTool::Cliclick => {
                let spelled = cliclick_key(key).ok_or_else(|| Self::unknown_key(key))?;
                let arg = match (spelled, direction) {
                    (CliclickKey::Modifier(name), Direction::Press) => format!("kd:{}", name),
                    (CliclickKey::Modifier(name), Direction::Release) => format!("ku:{}", name),
                    // cliclick only taps non-modifier keys, so the press does the whole stroke
                    (CliclickKey::Press(name), Direction::Press) => format!("kp:{}", name),
                    (CliclickKey::Text(text), Direction::Press) => format!("t:{}", text),
                    (_, Direction::Release) => return Ok(()),
                };
                self.run(&[arg]).map(|_| ())
            }
        }
    }

    fn press_shortcut(&mut self, keys: &[Key]) -> BackendResult {
        match self.tool {
            HelperTool::Xdotool => {
                let names = keys
                    .iter()
                    .map(|k| xdotool_name(k).ok_or_else(|| Self::unknown_key(k)))
                    .collect::<Result<Vec<_>, _>>()?;
                if names.is_empty() {
                    return Ok(());
                }
                self.run(&["key".to_string(), names.join("+")]).map(|_| ())
            }
            HelperTool::Cliclick => {
                let args =
                    cliclick_shortcut_args(keys).ok_or(BackendError::Unsupported("shortcut"))?;
                self.run(&args).map(|_| ())
            }
        }
    }

    fn type_text(&mut self, text: &str) -> BackendResult {
        if text.is_empty() {
            return Ok(());
        }
        let args = match self.tool {
            HelperTool::Xdotool => vec![
                "type".to_string(),
                "--delay".to_string(),
                "0".to_string(),
                "--".to_string(),
                text.to_string(),
            ],
            HelperTool::Cliclick => vec![format!("t:{}", text)],
        };
        self.run(&args).map(|_| ())
    }

    fn move_absolute(&mut self, x: i32, y: i32) -> BackendResult {
        let args = match self.tool {
            HelperTool::Xdotool => vec!["mousemove".to_string(), x.to_string(), y.to_string()],
            HelperTool::Cliclick => vec![format!("m:{},{}", x, y)],
        };
        self.run(&args).map(|_| ())
    }

    fn click(&mut self, button: MouseButton) -> BackendResult {
        let args = match (self.tool, button) {
            (HelperTool::Xdotool, button) => {
                vec!["click".to_string(), xdotool_button(button).to_string()]
            }
            (HelperTool::Cliclick, MouseButton::Left) => vec!["c:.".to_string()],
            (HelperTool::Cliclick, MouseButton::Right) => vec!["rc:.".to_string()],
            (HelperTool::Cliclick, MouseButton::Middle) => {
                return Err(BackendError::Unsupported("middle click"))
            }
        };
        self.run(&args).map(|_| ())
    }

    fn double_click(&mut self, button: MouseButton) -> BackendResult {
        match (self.tool, button) {
            (HelperTool::Xdotool, button) => self
                .run(&[
                    "click".to_string(),
                    "--repeat".to_string(),
                    "2".to_string(),
                    xdotool_button(button).to_string(),
                ])
                .map(|_| ()),
            (HelperTool::Cliclick, MouseButton::Left) => {
                self.run(&["dc:.".to_string()]).map(|_| ())
            }
            (HelperTool::Cliclick, button) => {
                self.click(button)?;
                self.click(button)
            }
        }
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> BackendResult {
        match self.tool {
            HelperTool::Xdotool => {
                for args in xdotool_scroll_args(dx, dy) {
                    self.run(&args)?;
                }
                Ok(())
            }
            HelperTool::Cliclick => match self.scroll_via.as_mut() {
                Some(bridge) => bridge.scroll(dx, dy),
                None => Err(BackendError::Unsupported("scroll")),
            },
        }
    }

    fn cursor_position(&mut self) -> BackendResult<(i32, i32)> {
        match self.tool {
            HelperTool::Xdotool => {
                let out = self.run(&["getmouselocation".to_string(), "--shell".to_string()])?;
                parse_xdotool_location(&out).ok_or(BackendError::Output {
                    program: "xdotool".to_string(),
                    output: out,
                })
            }
            HelperTool::Cliclick => {
                let out = self.run(&["p".to_string()])?;
                parse_pair(&out).ok_or(BackendError::Output {
                    program: "cliclick".to_string(),
                    output: out,
                })
            }
        }
    }

    fn screen_size(&mut self) -> BackendResult<(u32, u32)> {
        match self.tool {
            HelperTool::Xdotool => {
                let out = self.run(&["getdisplaygeometry".to_string()])?;
                parse_pair(&out).ok_or(BackendError::Output {
                    program: "xdotool".to_string(),
                    output: out,
                })
            }
            HelperTool::Cliclick => Err(BackendError::Unsupported("screen size")),
        }
    }
}

/// `X=12\nY=34\nSCREEN=0\nWINDOW=...` from `getmouselocation --shell`
fn parse_xdotool_location(out: &str) -> Option<(i32, i32)> {
    let mut x = None;
    let mut y = None;
    for line in out.lines() {
        if let Some(v) = line.strip_prefix("X=") {
            x = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("Y=") {
            y = v.trim().parse().ok();
        }
    }
    Some((x?, y?))
}
