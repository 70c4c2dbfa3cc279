//! Desktop agent
//!
//! Joins a room as a display and turns every controller message into local
//! input. Socket handling lives in the supervisor; input runs on the worker
//! thread; this module only translates between the two.

use crate::config::AgentConfig;
use crate::input::engine::{EngineSettings, EngineStatus, InputCommand};
use crate::input::media::MediaAction;
use crate::input::sites;
use crate::input::worker::InputWorker;
use crate::input::permission_hint;
use crate::pairing::websocket_url;
use crate::platform::{self, Platform};
use crate::supervisor::{spawn_link, LinkConfig, LinkState};
use colored::Colorize;
use couchpad_protocol::{detect_profile, normalize_host, Message, MouseButton, Role};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Map a controller message onto input commands; anything else is ignored
pub fn translate(message: &Message) -> Vec<InputCommand> {
    match message {
        Message::Action { action, value } => vec![InputCommand::Action {
            action: action.clone(),
            value: value.clone(),
        }],
        Message::Mouse { x, y, action } => {
            let mut commands = Vec::new();
            if *x != 0.0 || *y != 0.0 {
                commands.push(InputCommand::MoveRelative { dx: *x, dy: *y });
            }
            match action.as_deref() {
                Some("click") => commands.push(InputCommand::Click(MouseButton::Left)),
                Some("rightclick") => commands.push(InputCommand::Click(MouseButton::Right)),
                Some("middleclick") => commands.push(InputCommand::Click(MouseButton::Middle)),
                Some("doubleclick") => {
                    commands.push(InputCommand::DoubleClick(MouseButton::Left))
                }
                Some(other) => debug!("Unknown mouse action {:?}", other),
                None => {}
            }
            commands
        }
        Message::Motion { x, y } => vec![InputCommand::Motion { x: *x, y: *y }],
        Message::Keyboard { key, text } => {
            let mut commands = Vec::new();
            if let Some(key) = key.as_ref().filter(|k| !k.is_empty()) {
                commands.push(InputCommand::Key(key.clone()));
            }
            if let Some(text) = text.as_ref().filter(|t| !t.is_empty()) {
                commands.push(InputCommand::Text(text.clone()));
            }
            commands
        }
        Message::Scroll { delta_x, delta_y } => vec![InputCommand::Scroll {
            dx: *delta_x,
            dy: *delta_y,
        }],
        Message::Gesture { gesture, .. } => vec![InputCommand::Gesture(gesture.clone())],
        Message::Volume { action } => match MediaAction::parse(action) {
            Some(media) => vec![InputCommand::Media(media)],
            None => {
                debug!("Unknown volume action {:?}", action);
                Vec::new()
            }
        },
        Message::SetProfile { profile } => vec![InputCommand::SetProfile(profile.clone())],
        Message::OpenTab { url } => vec![InputCommand::OpenUrl(url.clone())],
        Message::Voice { query } if !query.is_empty() => vec![InputCommand::Text(query.clone())],
        _ => Vec::new(),
    }
}

/// What to tell the controller after opening `url`; nothing for refused pages
pub fn site_reply(url: &str) -> Option<Message> {
    let url = platform::page_url(url).ok()?;
    let (host, path) = sites::location(&url)?;
    Some(Message::SiteDetected {
        site: normalize_host(&host),
        profile: detect_profile(&host, &path).to_string(),
    })
}

fn print_status(status: &EngineStatus) {
    match status {
        EngineStatus::Starting => {}
        EngineStatus::Ready { backend } => {
            println!("{} Input backend: {}", "✓".green(), backend.bold());
        }
        EngineStatus::NoBackend => {
            println!(
                "{} No input backend is available; actions will be dropped.",
                "!".yellow().bold()
            );
            println!("  Run {} for details.", "couchpad probe".cyan());
        }
        EngineStatus::PermissionDenied { backend, detail } => {
            println!(
                "{} {} input was blocked by the OS: {}",
                "✗".red().bold(),
                backend,
                detail
            );
            println!("  {}", permission_hint(Platform::current()).dimmed());
        }
    }
}

fn print_link(state: LinkState) {
    match state {
        LinkState::Connected => println!("{} Connected to relay", "●".green()),
        LinkState::Backoff(n) => println!("{} Relay lost, retry {}", "●".yellow(), n),
        LinkState::Connecting | LinkState::Disconnected => {}
    }
}

/// Run the agent until Ctrl+C or until the relay is given up on
pub async fn run(mut config: AgentConfig, code: String) -> Result<(), Box<dyn std::error::Error>> {
    let url = websocket_url(&config.relay_url, &code)?;

    config.remember_room(&code, Role::Display);
    if let Err(e) = config.save() {
        warn!("Failed to save config: {}", e);
    }

    let worker = InputWorker::spawn(EngineSettings::from_config(&config), config.backend)?;
    let mut status = worker.status();

    let (inbound_tx, mut inbound) = mpsc::channel(256);
    let link = spawn_link(LinkConfig::new(url.as_str(), Role::Display), inbound_tx);
    let mut link_state = link.state();

    println!(
        "{} Agent joining room {} on {}",
        "▶".green(),
        code.bold(),
        config.relay_url.dimmed()
    );
    println!("  Press {} to stop.", "Ctrl+C".cyan());

    let mut gave_up = false;
    loop {
        tokio::select! {
            message = inbound.recv() => {
                let Some(message) = message else { break };
                match &message {
                    Message::Joined { room_id, controllers, active_profile, .. } => {
                        info!("Joined room {} ({} controllers)", room_id, controllers);
                        if let Some(profile) = active_profile {
                            worker.send(InputCommand::SetProfile(profile.clone()));
                        }
                    }
                    Message::Status { controllers, displays } => {
                        debug!("Room now has {} controllers, {} displays", controllers, displays);
                    }
                    Message::Error { message } => warn!("Relay error: {}", message),
                    Message::OpenTab { url } => {
                        if let Some(reply) = site_reply(url) {
                            link.send(reply);
                        }
                    }
                    _ => {}
                }
                for command in translate(&message) {
                    if !worker.send(command) {
                        warn!("Input thread is gone");
                        break;
                    }
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                print_status(&current);
            }
            changed = link_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *link_state.borrow_and_update();
                print_link(state);
                if state == LinkState::Disconnected {
                    gave_up = true;
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "Stopping agent...".dimmed());
                break;
            }
        }
    }

    link.stop().await;
    tokio::task::spawn_blocking(move || worker.shutdown()).await?;

    if gave_up {
        return Err("Lost the relay and ran out of reconnect attempts".into());
    }
    Ok(())
}
