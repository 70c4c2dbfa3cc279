//! QR code generation for terminal display
//!
//! The phone scans the controller URL, which carries the room code.

use crate::pairing::PairingSession;
use colored::Colorize;
use qrcode::QrCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QrError {
    #[error("Failed to generate QR code: {0}")]
    Generation(String),
}

/// Render `data` as a block-character QR code
pub fn render_qr(data: &str) -> Result<String, QrError> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| QrError::Generation(e.to_string()))?;

    Ok(code
        .render::<char>()
        .quiet_zone(true)
        .module_dimensions(2, 1)
        .build())
}

/// Print the pairing banner, QR code and room code
pub fn display_pairing(session: &PairingSession) -> Result<(), QrError> {
    let qr = render_qr(&session.controller_url)?;

    println!();
    println!(
        "{}",
        "╔═════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║           Scan with your phone to pair a controller         ║".cyan()
    );
    println!(
        "{}",
        "╚═════════════════════════════════════════════════════════════╝".cyan()
    );
    println!();

    for line in qr.lines() {
        println!("  {}", line);
    }

    println!();
    println!("  {} {}", "Room code:".dimmed(), session.room_id.bold().green());
    println!("  {} {}", "Controller:".dimmed(), session.controller_url.green());
    if let Some(profile) = &session.profile {
        println!("  {} {}", "Profile:".dimmed(), profile.yellow());
    }
    println!();

    Ok(())
}
