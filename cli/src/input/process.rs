//! Running helper programs and classifying their failures

use super::backend::BackendError;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::trace;

/// macOS assistive-access and Apple-events denials
const PERMISSION_MARKERS: &[&str] = &["-1719", "-1743", "not allowed", "not authorized"];

pub fn is_permission_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    PERMISSION_MARKERS.iter().any(|m| lower.contains(m))
}

/// Run a program to completion and return its trimmed stdout
pub fn run<S: AsRef<str>>(program: &Path, args: &[S]) -> Result<String, BackendError> {
    let label = program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string());
    trace!(
        "{} {}",
        label,
        args.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ")
    );

    let output = Command::new(program)
        .args(args.iter().map(|a| a.as_ref()))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BackendError::Unavailable(label.clone()),
            _ => BackendError::Io(e),
        })?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr
    };
    if is_permission_error(&message) {
        Err(BackendError::PermissionDenied(message))
    } else {
        Err(BackendError::Command {
            program: label,
            message,
        })
    }
}

/// Parse `"x,y"` or `"x y"` into a pair
pub fn parse_pair<T: std::str::FromStr>(text: &str) -> Option<(T, T)> {
    let mut parts = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let a = parts.next()?.trim().parse().ok()?;
    let b = parts.next()?.trim().parse().ok()?;
    Some((a, b))
}
