//! Media control: player apps first, media-key emulation last

use super::backend::{BackendError, BackendResult};
use super::keymap::NamedKey;
use super::process::run;
use crate::platform::Platform;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    PlayPause,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    Mute,
}

impl MediaAction {
    /// Names used by `volume{action}` and media-style actions
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "play" | "pause" | "playpause" | "play-pause" | "toggle" => MediaAction::PlayPause,
            "next" | "next-track" | "nexttrack" => MediaAction::Next,
            "prev" | "previous" | "prev-track" | "prevtrack" => MediaAction::Previous,
            "up" | "volume-up" | "volumeup" | "louder" => MediaAction::VolumeUp,
            "down" | "volume-down" | "volumedown" | "quieter" => MediaAction::VolumeDown,
            "mute" | "volume-mute" => MediaAction::Mute,
            _ => return None,
        })
    }

    /// The OS media key that does the same thing
    pub fn key(self) -> NamedKey {
        match self {
            MediaAction::PlayPause => NamedKey::PlayPause,
            MediaAction::Next => NamedKey::NextTrack,
            MediaAction::Previous => NamedKey::PrevTrack,
            MediaAction::VolumeUp => NamedKey::VolumeUp,
            MediaAction::VolumeDown => NamedKey::VolumeDown,
            MediaAction::Mute => NamedKey::VolumeMute,
        }
    }
}

/// A player that can be told what to do directly
pub trait MediaTarget {
    fn name(&self) -> &str;
    fn send(&mut self, action: MediaAction) -> BackendResult;
}

/// Spotify or Music, driven over Apple events
pub struct AppleScriptPlayer {
    app: &'static str,
    osascript: PathBuf,
}

pub fn applescript_player_command(app: &str, action: MediaAction) -> Option<String> {
    let command = match action {
        MediaAction::PlayPause => "playpause",
        MediaAction::Next => "next track",
        MediaAction::Previous => "previous track",
        MediaAction::VolumeUp => "set sound volume to (sound volume + 10)",
        MediaAction::VolumeDown => "set sound volume to (sound volume - 10)",
        MediaAction::Mute => return None,
    };
    Some(format!(
        "if application \"{app}\" is running then\n\
         tell application \"{app}\" to {command}\n\
         else\n\
         error \"{app} is not running\"\n\
         end if"
    ))
}

impl MediaTarget for AppleScriptPlayer {
    fn name(&self) -> &str {
        self.app
    }

    fn send(&mut self, action: MediaAction) -> BackendResult {
        let script =
            applescript_player_command(self.app, action).ok_or(BackendError::Unsupported("mute"))?;
        run(&self.osascript, &["-e", script.as_str()]).map(|_| ())
    }
}

/// An MPRIS player through `playerctl`, optionally pinned to one player
pub struct Playerctl {
    player: Option<&'static str>,
    program: PathBuf,
}

pub fn playerctl_args(player: Option<&str>, action: MediaAction) -> Option<Vec<String>> {
    let mut args = Vec::new();
    if let Some(player) = player {
        args.push("-p".to_string());
        args.push(player.to_string());
    }
    match action {
        MediaAction::PlayPause => args.push("play-pause".to_string()),
        MediaAction::Next => args.push("next".to_string()),
        MediaAction::Previous => args.push("previous".to_string()),
        MediaAction::VolumeUp => args.extend(["volume".to_string(), "0.1+".to_string()]),
        MediaAction::VolumeDown => args.extend(["volume".to_string(), "0.1-".to_string()]),
        MediaAction::Mute => return None,
    }
    Some(args)
}

impl MediaTarget for Playerctl {
    fn name(&self) -> &str {
        self.player.unwrap_or("playerctl")
    }

    fn send(&mut self, action: MediaAction) -> BackendResult {
        let args = playerctl_args(self.player, action).ok_or(BackendError::Unsupported("mute"))?;
        run(&self.program, &args).map(|_| ())
    }
}

/// App targets for this platform, in priority order
pub fn targets_for(platform: Platform) -> Vec<Box<dyn MediaTarget>> {
    let mut targets: Vec<Box<dyn MediaTarget>> = Vec::new();
    match platform {
        Platform::Mac => {
            if let Ok(osascript) = which::which("osascript") {
                for app in ["Spotify", "Music"] {
                    targets.push(Box::new(AppleScriptPlayer {
                        app,
                        osascript: osascript.clone(),
                    }));
                }
            }
        }
        Platform::Linux => {
            if let Ok(program) = which::which("playerctl") {
                targets.push(Box::new(Playerctl {
                    player: Some("spotify"),
                    program: program.clone(),
                }));
                targets.push(Box::new(Playerctl {
                    player: None,
                    program,
                }));
            }
        }
        Platform::Windows => {}
    }
    targets
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_actions() {
        assert_eq!(MediaAction::parse("up"), Some(MediaAction::VolumeUp));
        assert_eq!(MediaAction::parse("play-pause"), Some(MediaAction::PlayPause));
        assert_eq!(MediaAction::parse("mute"), Some(MediaAction::Mute));
        assert_eq!(MediaAction::parse("rewind"), None);
        assert_eq!(MediaAction::Mute.key(), NamedKey::VolumeMute);
    }

    #[test]
    fn test_playerctl_args() {
        assert_eq!(
            playerctl_args(Some("spotify"), MediaAction::PlayPause).unwrap(),
            vec!["-p", "spotify", "play-pause"]
        );
        assert_eq!(
            playerctl_args(None, MediaAction::VolumeUp).unwrap(),
            vec!["volume", "0.1+"]
        );
        assert!(playerctl_args(None, MediaAction::Mute).is_none());
    }

    #[test]
    fn test_applescript_requires_running_app() {
        let script = applescript_player_command("Spotify", MediaAction::Next).unwrap();
        assert!(script.starts_with("if application \"Spotify\" is running then"));
        assert!(script.contains("tell application \"Spotify\" to next track"));
        assert!(applescript_player_command("Music", MediaAction::Mute).is_none());
    }
}
