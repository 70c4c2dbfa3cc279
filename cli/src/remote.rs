//! Terminal remote
//!
//! Joins a room as a controller and sends actions from single keypresses:
//! arrows move, Enter selects, Esc/Backspace go back. Like `screen -x`, the
//! terminal is put in raw mode for the duration and restored on exit.

use crate::config::AgentConfig;
use crate::pairing::websocket_url;
use crate::supervisor::{spawn_link, LinkConfig, LinkState};
use colored::Colorize;
use couchpad_protocol::{Message, Role};
use std::io::{self, Read, Write};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Profiles reachable from the number keys, in key order
const PROFILE_KEYS: [&str; 6] = [
    "universal",
    "presentation",
    "video",
    "meeting",
    "scroll",
    "mouse",
];

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteInput {
    Send(Message),
    Quit,
}

fn volume(action: &str) -> RemoteInput {
    RemoteInput::Send(Message::Volume {
        action: action.to_string(),
    })
}

fn action(name: &str) -> RemoteInput {
    RemoteInput::Send(Message::action(name))
}

/// Turn a chunk of raw terminal input into remote commands
pub fn decode_keys(bytes: &[u8]) -> Vec<RemoteInput> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        let input = match b {
            0x1b => {
                // CSI arrow (ESC [ X) or SS3 arrow (ESC O X)
                if i + 1 < bytes.len() && (bytes[i] == b'[' || bytes[i] == b'O') {
                    let code = bytes[i + 1];
                    i += 2;
                    match code {
                        b'A' => action("up"),
                        b'B' => action("down"),
                        b'C' => action("right"),
                        b'D' => action("left"),
                        _ => continue,
                    }
                } else {
                    action("back")
                }
            }
            b'\r' | b'\n' => action("select"),
            0x7f | 0x08 => action("back"),
            b' ' => action("playpause"),
            b'+' | b'=' => volume("up"),
            b'-' | b'_' => volume("down"),
            b'm' => volume("mute"),
            b'p' => volume("playpause"),
            b'n' => action("next"),
            b'b' => action("prev"),
            b'f' => action("fullscreen"),
            b'h' => RemoteInput::Send(Message::Home),
            b'1'..=b'6' => RemoteInput::Send(Message::SetProfile {
                profile: PROFILE_KEYS[(b - b'1') as usize].to_string(),
            }),
            b'q' | 0x03 | 0x04 => {
                out.push(RemoteInput::Quit);
                return out;
            }
            _ => continue,
        };
        out.push(input);
    }
    out
}

fn print_help() {
    println!("\r{}", "─".repeat(60).dimmed());
    println!(
        "\r  {} move   {} select   {} back   {} play/pause",
        "←↑↓→".cyan(),
        "Enter".cyan(),
        "Esc".cyan(),
        "Space".cyan()
    );
    println!(
        "\r  {} volume   {} mute   {} next/prev   {} home   {} profiles   {} quit",
        "+/-".cyan(),
        "m".cyan(),
        "n/b".cyan(),
        "h".cyan(),
        "1-6".cyan(),
        "q".cyan()
    );
    println!("\r{}", "─".repeat(60).dimmed());
}

fn print_inbound(message: &Message) {
    match message {
        Message::Joined {
            room_id,
            displays,
            active_profile,
            ..
        } => {
            println!(
                "\r{} Joined room {} ({} displays)",
                "✓".green(),
                room_id.bold(),
                displays
            );
            if let Some(profile) = active_profile {
                println!("\r  Profile: {}", profile.yellow());
            }
        }
        Message::Status {
            controllers,
            displays,
        } => {
            println!(
                "\r{} {} controllers, {} displays",
                "●".cyan(),
                controllers,
                displays
            );
        }
        Message::SiteDetected { site, profile } => {
            println!("\r{} {} ({} profile)", "→".cyan(), site, profile.yellow());
        }
        Message::NowPlaying { info } => {
            if let Some(title) = info.get("title").and_then(|t| t.as_str()) {
                println!("\r{} {}", "♪".magenta(), title);
            }
        }
        Message::Error { message } => println!("\r{} {}", "✗".red(), message),
        other => debug!("Ignoring {}", other.kind()),
    }
    let _ = io::stdout().flush();
}

/// Restores the terminal when dropped
#[cfg(unix)]
struct RawMode {
    original: nix::sys::termios::Termios,
}

#[cfg(unix)]
impl RawMode {
    fn enable() -> io::Result<Self> {
        use nix::sys::termios::{self, InputFlags, LocalFlags, SetArg};

        let stdin = io::stdin();
        let original = termios::tcgetattr(&stdin).map_err(io::Error::from)?;
        let mut raw = original.clone();

        raw.local_flags.remove(LocalFlags::ICANON);
        raw.local_flags.remove(LocalFlags::ECHO);
        raw.local_flags.remove(LocalFlags::ISIG);
        raw.input_flags.remove(InputFlags::ICRNL);
        raw.input_flags.remove(InputFlags::IXON);

        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw).map_err(io::Error::from)?;
        Ok(Self { original })
    }
}

#[cfg(unix)]
impl Drop for RawMode {
    fn drop(&mut self) {
        use nix::sys::termios::{self, SetArg};
        let _ = termios::tcsetattr(&io::stdin(), SetArg::TCSANOW, &self.original);
    }
}

fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Vec<u8>>) {
    std::thread::spawn(move || {
        let mut stdin = io::stdin();
        let mut buf = [0u8; 64];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => {
                    debug!("stdin EOF, shutting down input reader");
                    break;
                }
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("stdin read error: {}, shutting down reader", e);
                    break;
                }
            }
        }
    });
}

/// Drive a room from this terminal until `q`
pub async fn run(mut config: AgentConfig, code: String) -> Result<(), Box<dyn std::error::Error>> {
    let url = websocket_url(&config.relay_url, &code)?;

    config.remember_room(&code, Role::Controller);
    if let Err(e) = config.save() {
        warn!("Failed to save config: {}", e);
    }

    let (inbound_tx, mut inbound) = mpsc::channel(64);
    let link = spawn_link(LinkConfig::new(url.as_str(), Role::Controller), inbound_tx);
    let mut link_state = link.state();

    println!("{} Remote for room {}", "▶".green(), code.bold());

    #[cfg(unix)]
    let raw_mode = RawMode::enable()?;

    print_help();

    let (keys_tx, mut keys) = mpsc::unbounded_channel();
    spawn_stdin_reader(keys_tx);

    let mut gave_up = false;
    'outer: loop {
        tokio::select! {
            chunk = keys.recv() => {
                let Some(chunk) = chunk else { break };
                for input in decode_keys(&chunk) {
                    match input {
                        RemoteInput::Quit => break 'outer,
                        RemoteInput::Send(message) => {
                            if !link.send(message) {
                                debug!("Dropped keypress, link queue full");
                            }
                        }
                    }
                }
            }
            message = inbound.recv() => {
                let Some(message) = message else { break };
                print_inbound(&message);
            }
            changed = link_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *link_state.borrow_and_update();
                match state {
                    LinkState::Backoff(n) => {
                        println!("\r{} Relay lost, retry {}", "●".yellow(), n);
                    }
                    LinkState::Disconnected => {
                        gave_up = true;
                        break;
                    }
                    LinkState::Connecting | LinkState::Connected => {}
                }
            }
        }
    }

    #[cfg(unix)]
    drop(raw_mode);

    link.stop().await;
    println!("\r\n{}", "Remote closed.".dimmed());

    if gave_up {
        return Err("Lost the relay and ran out of reconnect attempts".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(inputs: Vec<RemoteInput>) -> Vec<Message> {
        inputs
            .into_iter()
            .filter_map(|i| match i {
                RemoteInput::Send(m) => Some(m),
                RemoteInput::Quit => None,
            })
            .collect()
    }

    #[test]
    fn test_arrows_and_select() {
        assert_eq!(
            sent(decode_keys(b"\x1b[A\x1b[D\x1bOB\r")),
            vec![
                Message::action("up"),
                Message::action("left"),
                Message::action("down"),
                Message::action("select"),
            ]
        );
    }

    #[test]
    fn test_lone_escape_is_back() {
        assert_eq!(decode_keys(b"\x1b"), vec![action("back")]);
        assert_eq!(decode_keys(&[0x7f]), vec![action("back")]);
    }

    #[test]
    fn test_media_and_profiles() {
        assert_eq!(
            sent(decode_keys(b"+m3")),
            vec![
                Message::Volume {
                    action: "up".to_string()
                },
                Message::Volume {
                    action: "mute".to_string()
                },
                Message::SetProfile {
                    profile: "video".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_quit_stops_decoding() {
        assert_eq!(
            decode_keys(b"hq\r"),
            vec![RemoteInput::Send(Message::Home), RemoteInput::Quit]
        );
        assert_eq!(decode_keys(&[0x03]), vec![RemoteInput::Quit]);
    }

    #[test]
    fn test_unknown_bytes_ignored() {
        assert!(decode_keys(b"zZ~").is_empty());
        assert!(decode_keys(b"\x1b[5~").is_empty());
    }

    #[test]
    fn test_profile_keys_exist() {
        for name in PROFILE_KEYS {
            assert!(couchpad_protocol::Catalog::builtin().contains(name));
        }
    }
}
