//! In-process input injection through enigo

use super::backend::{Backend, BackendError, BackendResult, Direction};
use super::keymap::{Key, Modifier, NamedKey};
use couchpad_protocol::MouseButton;
use enigo::{Axis, Button, Coordinate, Enigo, Keyboard, Mouse, Settings};

pub struct NativeBackend {
    enigo: Option<Enigo>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self { enigo: None }
    }

    fn enigo(&mut self) -> BackendResult<&mut Enigo> {
        self.enigo
            .as_mut()
            .ok_or_else(|| BackendError::Unavailable("enigo".to_string()))
    }
}

fn native_error(e: impl std::fmt::Display) -> BackendError {
    let message = e.to_string();
    if super::process::is_permission_error(&message) {
        BackendError::PermissionDenied(message)
    } else {
        BackendError::Native(message)
    }
}

fn enigo_key(key: &Key) -> enigo::Key {
    use enigo::Key as E;
    match key {
        Key::Modifier(Modifier::Ctrl) => E::Control,
        Key::Modifier(Modifier::Alt) => E::Alt,
        Key::Modifier(Modifier::Shift) => E::Shift,
        Key::Modifier(Modifier::Meta) => E::Meta,
        Key::Named(named) => match named {
            NamedKey::Up => E::UpArrow,
            NamedKey::Down => E::DownArrow,
            NamedKey::Left => E::LeftArrow,
            NamedKey::Right => E::RightArrow,
            NamedKey::Enter => E::Return,
            NamedKey::Escape => E::Escape,
            NamedKey::Space => E::Space,
            NamedKey::Tab => E::Tab,
            NamedKey::Backspace => E::Backspace,
            NamedKey::Delete => E::Delete,
            NamedKey::Home => E::Home,
            NamedKey::End => E::End,
            NamedKey::PageUp => E::PageUp,
            NamedKey::PageDown => E::PageDown,
            NamedKey::F(n) => match n {
                1 => E::F1,
                2 => E::F2,
                3 => E::F3,
                4 => E::F4,
                5 => E::F5,
                6 => E::F6,
                7 => E::F7,
                8 => E::F8,
                9 => E::F9,
                10 => E::F10,
                11 => E::F11,
                _ => E::F12,
            },
            NamedKey::VolumeUp => E::VolumeUp,
            NamedKey::VolumeDown => E::VolumeDown,
            NamedKey::VolumeMute => E::VolumeMute,
            NamedKey::PlayPause => E::MediaPlayPause,
            NamedKey::NextTrack => E::MediaNextTrack,
            NamedKey::PrevTrack => E::MediaPrevTrack,
        },
        Key::Char(c) => E::Unicode(*c),
    }
}

fn enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn probe(&mut self) -> BackendResult {
        let mut enigo = Enigo::new(&Settings::default()).map_err(native_error)?;
        enigo.location().map_err(native_error)?;
        self.enigo = Some(enigo);
        Ok(())
    }

    fn key(&mut self, key: &Key, direction: Direction) -> BackendResult {
        if let Key::Named(NamedKey::F(n)) = key {
            if *n > 12 {
                return Err(BackendError::Unsupported("function keys above F12"));
            }
        }
        let direction = match direction {
            Direction::Press => enigo::Direction::Press,
            Direction::Release => enigo::Direction::Release,
        };
        let key = enigo_key(key);
        self.enigo()?.key(key, direction).map_err(native_error)
    }

    fn type_text(&mut self, text: &str) -> BackendResult {
        if text.is_empty() {
            return Ok(());
        }
        self.enigo()?.text(text).map_err(native_error)
    }

    fn move_absolute(&mut self, x: i32, y: i32) -> BackendResult {
        self.enigo()?
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(native_error)
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> BackendResult {
        self.enigo()?
            .move_mouse(dx, dy, Coordinate::Rel)
            .map_err(native_error)
    }

    fn click(&mut self, button: MouseButton) -> BackendResult {
        self.enigo()?
            .button(enigo_button(button), enigo::Direction::Click)
            .map_err(native_error)
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> BackendResult {
        let enigo = self.enigo()?;
        if dy != 0 {
            enigo.scroll(dy, Axis::Vertical).map_err(native_error)?;
        }
        if dx != 0 {
            enigo.scroll(dx, Axis::Horizontal).map_err(native_error)?;
        }
        Ok(())
    }

    fn cursor_position(&mut self) -> BackendResult<(i32, i32)> {
        self.enigo()?.location().map_err(native_error)
    }

    fn screen_size(&mut self) -> BackendResult<(u32, u32)> {
        let (w, h) = self.enigo()?.main_display().map_err(native_error)?;
        Ok((w.max(0) as u32, h.max(0) as u32))
    }

    fn is_in_process(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_translation() {
        assert_eq!(enigo_key(&Key::Named(NamedKey::Up)), enigo::Key::UpArrow);
        assert_eq!(enigo_key(&Key::Modifier(Modifier::Meta)), enigo::Key::Meta);
        assert_eq!(enigo_key(&Key::Char('s')), enigo::Key::Unicode('s'));
    }

    #[test]
    fn test_calls_before_probe_are_unavailable() {
        let mut backend = NativeBackend::new();
        assert!(matches!(
            backend.type_text("hi"),
            Err(BackendError::Unavailable(_))
        ));
    }
}
