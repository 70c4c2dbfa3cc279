//! The automation backend seam

use super::keymap::Key;
use couchpad_protocol::MouseButton;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{0} is not available")]
    Unavailable(String),
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("{program} failed: {message}")]
    Command { program: String, message: String },
    #[error("Unexpected output from {program}: {output:?}")]
    Output { program: String, output: String },
    #[error("Native input error: {0}")]
    Native(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn is_permission(&self) -> bool {
        matches!(self, BackendError::PermissionDenied(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Press,
    Release,
}

pub type BackendResult<T = ()> = Result<T, BackendError>;

/// One way of injecting input into the desktop.
///
/// Backends live on the input worker thread and are never shared, so they
/// need not be `Send`.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Check once that this backend can drive the desktop
    fn probe(&mut self) -> BackendResult;

    fn key(&mut self, key: &Key, direction: Direction) -> BackendResult;

    fn press_key(&mut self, key: &Key) -> BackendResult {
        self.key(key, Direction::Press)?;
        self.key(key, Direction::Release)
    }

    /// Press held keys in order, tap the last one, release in reverse
    fn press_shortcut(&mut self, keys: &[Key]) -> BackendResult {
        let Some((base, held)) = keys.split_last() else {
            return Ok(());
        };
        let mut pressed = Vec::with_capacity(held.len());
        let mut result = Ok(());
        for key in held {
            if let Err(e) = self.key(key, Direction::Press) {
                result = Err(e);
                break;
            }
            pressed.push(key);
        }
        if result.is_ok() {
            result = self.press_key(base);
        }
        for key in pressed.iter().rev() {
            let released = self.key(key, Direction::Release);
            if result.is_ok() {
                result = released;
            }
        }
        result
    }

    fn type_text(&mut self, text: &str) -> BackendResult;

    fn move_absolute(&mut self, x: i32, y: i32) -> BackendResult;

    fn move_relative(&mut self, dx: i32, dy: i32) -> BackendResult {
        let (x, y) = self.cursor_position()?;
        self.move_absolute(x + dx, y + dy)
    }

    fn click(&mut self, button: MouseButton) -> BackendResult;

    fn double_click(&mut self, button: MouseButton) -> BackendResult {
        self.click(button)?;
        self.click(button)
    }

    /// Scroll by whole lines; positive `dy` scrolls down, positive `dx` right
    fn scroll(&mut self, dx: i32, dy: i32) -> BackendResult;

    fn cursor_position(&mut self) -> BackendResult<(i32, i32)>;

    fn screen_size(&mut self) -> BackendResult<(u32, u32)>;

    /// Whether calls are cheap enough to skip move coalescing
    fn is_in_process(&self) -> bool {
        false
    }
}

/// Used when no backend probes successfully; every call is dropped
pub struct NullBackend;

impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn probe(&mut self) -> BackendResult {
        Ok(())
    }

    fn key(&mut self, key: &Key, direction: Direction) -> BackendResult {
        debug!("No input backend, dropping {:?} {:?}", direction, key);
        Ok(())
    }

    fn type_text(&mut self, _text: &str) -> BackendResult {
        debug!("No input backend, dropping text");
        Ok(())
    }

    fn move_absolute(&mut self, x: i32, y: i32) -> BackendResult {
        debug!("No input backend, dropping move to {},{}", x, y);
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> BackendResult {
        debug!("No input backend, dropping {:?} click", button);
        Ok(())
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> BackendResult {
        debug!("No input backend, dropping scroll {},{}", dx, dy);
        Ok(())
    }

    fn cursor_position(&mut self) -> BackendResult<(i32, i32)> {
        Ok((0, 0))
    }

    fn screen_size(&mut self) -> BackendResult<(u32, u32)> {
        Err(BackendError::Unsupported("screen size"))
    }
}

#[cfg(test)]
pub mod testing {
    //! A backend that records every call

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Key(Key, Direction),
        Text(String),
        Move(i32, i32),
        Click(MouseButton),
        Scroll(i32, i32),
    }

    #[derive(Clone, Default)]
    pub struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Recorder {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    pub struct RecordingBackend {
        pub recorder: Recorder,
        pub screen: (u32, u32),
        pub cursor: (i32, i32),
        /// Every call fails with this permission error when set
        pub deny: Option<String>,
        pub in_process: bool,
    }

    impl RecordingBackend {
        pub fn new() -> (Self, Recorder) {
            let recorder = Recorder::default();
            let backend = Self {
                recorder: recorder.clone(),
                screen: (1920, 1080),
                cursor: (0, 0),
                deny: None,
                in_process: false,
            };
            (backend, recorder)
        }

        fn check(&self) -> BackendResult {
            match &self.deny {
                Some(detail) => Err(BackendError::PermissionDenied(detail.clone())),
                None => Ok(()),
            }
        }
    }

    impl Backend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn probe(&mut self) -> BackendResult {
            self.check()
        }

        fn key(&mut self, key: &Key, direction: Direction) -> BackendResult {
            self.check()?;
            self.recorder.push(Call::Key(*key, direction));
            Ok(())
        }

        fn type_text(&mut self, text: &str) -> BackendResult {
            self.check()?;
            self.recorder.push(Call::Text(text.to_string()));
            Ok(())
        }

        fn move_absolute(&mut self, x: i32, y: i32) -> BackendResult {
            self.check()?;
            self.cursor = (x, y);
            self.recorder.push(Call::Move(x, y));
            Ok(())
        }

        fn click(&mut self, button: MouseButton) -> BackendResult {
            self.check()?;
            self.recorder.push(Call::Click(button));
            Ok(())
        }

        fn scroll(&mut self, dx: i32, dy: i32) -> BackendResult {
            self.check()?;
            self.recorder.push(Call::Scroll(dx, dy));
            Ok(())
        }

        fn cursor_position(&mut self) -> BackendResult<(i32, i32)> {
            Ok(self.cursor)
        }

        fn screen_size(&mut self) -> BackendResult<(u32, u32)> {
            Ok(self.screen)
        }

        fn is_in_process(&self) -> bool {
            self.in_process
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingBackend};
    use super::*;
    use crate::input::keymap::{Modifier, NamedKey};
    use crate::platform::Platform;

    #[test]
    fn test_mac_shortcut_order() {
        let (mut backend, recorder) = RecordingBackend::new();
        let keys = crate::input::keymap::parse_combo("mod+shift+s", Platform::Mac).unwrap();
        backend.press_shortcut(&keys).unwrap();

        let cmd = Key::Modifier(Modifier::Meta);
        let shift = Key::Modifier(Modifier::Shift);
        let s = Key::Char('s');
        assert_eq!(
            recorder.calls(),
            vec![
                Call::Key(cmd, Direction::Press),
                Call::Key(shift, Direction::Press),
                Call::Key(s, Direction::Press),
                Call::Key(s, Direction::Release),
                Call::Key(shift, Direction::Release),
                Call::Key(cmd, Direction::Release),
            ]
        );
    }

    #[test]
    fn test_press_key_is_press_then_release() {
        let (mut backend, recorder) = RecordingBackend::new();
        let enter = Key::Named(NamedKey::Enter);
        backend.press_key(&enter).unwrap();
        assert_eq!(
            recorder.calls(),
            vec![
                Call::Key(enter, Direction::Press),
                Call::Key(enter, Direction::Release)
            ]
        );
    }

    #[test]
    fn test_empty_shortcut_is_noop() {
        let (mut backend, recorder) = RecordingBackend::new();
        backend.press_shortcut(&[]).unwrap();
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_default_relative_move_uses_cursor() {
        let (mut backend, recorder) = RecordingBackend::new();
        backend.cursor = (100, 100);
        backend.move_relative(5, -10).unwrap();
        assert_eq!(recorder.calls(), vec![Call::Move(105, 90)]);
    }
}
