//! Couchpad - drive your desktop from your phone
//!
//! Usage:
//!   couchpad pair              # Create a room, show the QR code, run the agent
//!   couchpad agent             # Rejoin the last room as the desktop agent
//!   couchpad remote ABC234     # Control a room from this terminal
//!   couchpad profiles          # List input profiles
//!   couchpad probe             # Check which input backends work here
//!   couchpad status            # Show config and relay health
//!   couchpad --help            # Show help

mod agent;
mod config;
mod input;
mod pairing;
mod platform;
mod qr;
mod remote;
mod supervisor;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::{AgentConfig, BackendPreference};
use couchpad_protocol::{normalize_code, Catalog, Role};
use pairing::PairingClient;
use platform::Platform;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "couchpad")]
#[command(version)]
#[command(about = "Drive your desktop from your phone", long_about = None)]
struct Cli {
    /// Relay to use instead of the configured one
    #[arg(long, global = true, env = config::RELAY_URL_ENV)]
    relay: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a room, show the pairing QR code and start the agent
    Pair {
        /// Profile the room starts in
        #[arg(short, long)]
        profile: Option<String>,
        /// Only show the QR code
        #[arg(long)]
        no_agent: bool,
    },
    /// Run the desktop agent in a room
    Agent {
        /// Room code (defaults to the last room)
        #[arg(short, long)]
        code: Option<String>,
        /// Input backend to try first
        #[arg(short, long, value_enum)]
        backend: Option<BackendPreference>,
        /// Invert trackpad scrolling
        #[arg(long)]
        natural_scroll: bool,
    },
    /// Control a room from this terminal
    Remote {
        /// Room code (defaults to the last room)
        code: Option<String>,
    },
    /// List input profiles
    Profiles {
        /// Fetch the table from the relay instead of the built-in copy
        #[arg(long)]
        remote: bool,
    },
    /// Check which input backends work on this machine
    Probe,
    /// Show config and relay health
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("couchpad=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = match AgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(relay) = cli.relay {
        config.relay_url = relay;
    }

    let result = match cli.command {
        Commands::Pair { profile, no_agent } => run_pair(config, profile, no_agent).await,
        Commands::Agent {
            code,
            backend,
            natural_scroll,
        } => {
            if let Some(backend) = backend {
                config.backend = backend;
            }
            if natural_scroll {
                config.natural_scroll = true;
            }
            match room_code(code, &config) {
                Ok(code) => agent::run(config, code).await,
                Err(e) => Err(e),
            }
        }
        Commands::Remote { code } => match room_code(code, &config) {
            Ok(code) => remote::run(config, code).await,
            Err(e) => Err(e),
        },
        Commands::Profiles { remote } => show_profiles(&config, remote).await,
        Commands::Probe => {
            run_probe(config.backend);
            Ok(())
        }
        Commands::Status => show_status(&config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// The given code, or the remembered one
fn room_code(
    code: Option<String>,
    config: &AgentConfig,
) -> Result<String, Box<dyn std::error::Error>> {
    let Some(raw) = code.or_else(|| config.last_room.clone()) else {
        return Err("No room code given and no previous room. Run `couchpad pair` first.".into());
    };
    normalize_code(&raw).ok_or_else(|| format!("'{}' is not a room code", raw).into())
}

async fn run_pair(
    config: AgentConfig,
    profile: Option<String>,
    no_agent: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(profile) = &profile {
        if !Catalog::builtin().contains(profile) {
            return Err(format!("Unknown profile: {}", profile).into());
        }
    }

    let client = PairingClient::new(&config.relay_url)?;
    let session = client.create_session(profile.as_deref()).await?;
    qr::display_pairing(&session)?;

    if no_agent {
        let mut config = config;
        config.remember_room(&session.room_id, Role::Display);
        config.save()?;
        println!(
            "  Start the agent later with {}",
            format!("couchpad agent --code {}", session.room_id).cyan()
        );
        return Ok(());
    }

    agent::run(config, session.room_id).await
}

async fn show_profiles(
    config: &AgentConfig,
    remote: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetched;
    let catalog = if remote {
        fetched = PairingClient::new(&config.relay_url)?.profiles().await?;
        &fetched
    } else {
        Catalog::builtin()
    };

    for profile in catalog.profiles() {
        println!(
            "{} {} {}",
            profile.name.bold().green(),
            format!("[{}]", profile.layout).dimmed(),
            profile.description
        );
        let actions: Vec<&str> = profile.mapping.keys().map(|k| k.as_str()).collect();
        println!("  {}", actions.join(", ").dimmed());
    }
    Ok(())
}

fn run_probe(preference: BackendPreference) {
    let platform = Platform::current();
    println!("{} Probing input backends on {}", "▶".green(), platform.name());

    let (backend, reports) = input::select_backend(platform, preference);
    for report in &reports {
        let mark = if report.passed() {
            "✓".green()
        } else if report.permission {
            "✗".red()
        } else {
            "○".dimmed()
        };
        println!("  {} {:<8} {}", mark, report.backend, report.outcome.dimmed());
    }

    match input::initial_status(backend.name(), &reports) {
        input::engine::EngineStatus::Ready { backend } => {
            println!("{} Using {}", "✓".green(), backend.bold());
        }
        input::engine::EngineStatus::PermissionDenied { .. } => {
            println!("{} {}", "!".yellow().bold(), input::permission_hint(platform));
        }
        _ => println!("{} No input backend is available", "!".yellow().bold()),
    }
}

async fn show_status(config: &AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    println!("{} {}", "Host:".dimmed(), host);
    println!("{} {}", "Config:".dimmed(), config::config_path().display());
    println!("{} {}", "Relay:".dimmed(), config.relay_url);
    match (&config.last_room, config.last_role) {
        (Some(room), Some(role)) => {
            println!("{} {} as {}", "Last room:".dimmed(), room.bold(), role)
        }
        (Some(room), None) => println!("{} {}", "Last room:".dimmed(), room.bold()),
        _ => println!("{} none", "Last room:".dimmed()),
    }

    let client = PairingClient::new(&config.relay_url)?;
    match client.health().await {
        Ok(health) => println!(
            "{} Relay {} ({} sessions)",
            "●".green(),
            health.status,
            health.sessions
        ),
        Err(e) => println!("{} Relay unreachable: {}", "○".red(), e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_falls_back_to_last_room() {
        let mut config = AgentConfig::default();
        assert!(room_code(None, &config).is_err());

        config.last_room = Some("abc234".to_string());
        assert_eq!(room_code(None, &config).unwrap(), "ABC234");
        assert_eq!(room_code(Some("xyz789".to_string()), &config).unwrap(), "XYZ789");
        assert!(room_code(Some("no!".to_string()), &config).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "couchpad",
            "agent",
            "--backend",
            "helper",
            "--natural-scroll",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Agent {
                backend: Some(BackendPreference::Helper),
                natural_scroll: true,
                ..
            }
        ));
    }
}
