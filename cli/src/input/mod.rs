//! Input injection on the desktop
//!
//! Backends are probed once in rank order (native, helper, script) and the
//! first that works serves the whole process. With nothing available the
//! agent still runs on the `none` backend and says so.

pub mod backend;
pub mod engine;
pub mod helper;
pub mod keymap;
pub mod media;
#[cfg(feature = "native")]
pub mod native;
pub mod process;
pub mod script;
pub mod sites;
pub mod worker;

use crate::config::BackendPreference;
use crate::platform::Platform;
use backend::{Backend, NullBackend};
use engine::EngineStatus;
use tracing::info;

/// Outcome of one backend probe, for `couchpad probe` and the status line
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub backend: &'static str,
    pub outcome: String,
    pub permission: bool,
}

impl ProbeReport {
    pub fn passed(&self) -> bool {
        self.outcome == "ok"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Native,
    Helper,
    Script,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Kind::Native => "native",
            Kind::Helper => "helper",
            Kind::Script => "script",
        }
    }
}

/// Probe order: the preferred kind first, the rest in rank order
fn ranking(preference: BackendPreference) -> Vec<Kind> {
    let mut order = vec![Kind::Native, Kind::Helper, Kind::Script];
    let preferred = match preference {
        BackendPreference::Auto => return order,
        BackendPreference::Native => Kind::Native,
        BackendPreference::Helper => Kind::Helper,
        BackendPreference::Script => Kind::Script,
    };
    order.retain(|k| *k != preferred);
    order.insert(0, preferred);
    order
}

fn instantiate(kind: Kind, platform: Platform) -> Result<Box<dyn Backend>, String> {
    match kind {
        #[cfg(feature = "native")]
        Kind::Native => Ok(Box::new(native::NativeBackend::new())),
        #[cfg(not(feature = "native"))]
        Kind::Native => Err("built without the native feature".to_string()),
        Kind::Helper => helper::HelperBackend::detect(platform)
            .map(|b| Box::new(b) as Box<dyn Backend>)
            .ok_or_else(|| match helper::HelperTool::for_platform(platform) {
                Some(tool) => format!("{} not found on PATH", tool.program()),
                None => format!("no helper tool on {}", platform.name()),
            }),
        Kind::Script => script::ScriptBackend::detect(platform)
            .map(|b| Box::new(b) as Box<dyn Backend>)
            .ok_or_else(|| format!("no scripting bridge on {}", platform.name())),
    }
}

/// Probe every candidate and keep the first that passes
pub fn select_backend(
    platform: Platform,
    preference: BackendPreference,
) -> (Box<dyn Backend>, Vec<ProbeReport>) {
    let mut reports = Vec::new();
    let mut chosen: Option<Box<dyn Backend>> = None;

    for kind in ranking(preference) {
        if chosen.is_some() {
            reports.push(ProbeReport {
                backend: kind.name(),
                outcome: "skipped".to_string(),
                permission: false,
            });
            continue;
        }
        let report = match instantiate(kind, platform) {
            Err(reason) => ProbeReport {
                backend: kind.name(),
                outcome: reason,
                permission: false,
            },
            Ok(mut backend) => match backend.probe() {
                Ok(()) => {
                    chosen = Some(backend);
                    ProbeReport {
                        backend: kind.name(),
                        outcome: "ok".to_string(),
                        permission: false,
                    }
                }
                Err(e) => ProbeReport {
                    backend: kind.name(),
                    permission: e.is_permission(),
                    outcome: e.to_string(),
                },
            },
        };
        reports.push(report);
    }

    let backend = chosen.unwrap_or_else(|| Box::new(NullBackend));
    info!("Input backend: {}", backend.name());
    (backend, reports)
}

/// Status to publish right after selection
pub fn initial_status(backend: &'static str, reports: &[ProbeReport]) -> EngineStatus {
    if backend != NullBackend.name() {
        return EngineStatus::Ready { backend };
    }
    match reports.iter().find(|r| r.permission) {
        Some(denied) => EngineStatus::PermissionDenied {
            backend: denied.backend,
            detail: denied.outcome.clone(),
        },
        None => EngineStatus::NoBackend,
    }
}

/// Human hint for a permission failure on this platform
pub fn permission_hint(platform: Platform) -> &'static str {
    match platform {
        Platform::Mac => {
            "Grant Accessibility and Automation access to your terminal in \
             System Settings > Privacy & Security, then restart couchpad."
        }
        Platform::Windows => "Run couchpad from a desktop session, not a service.",
        Platform::Linux => "Input injection needs an X11 session (xdotool) or uinput access.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_moves_first() {
        assert_eq!(
            ranking(BackendPreference::Auto),
            vec![Kind::Native, Kind::Helper, Kind::Script]
        );
        assert_eq!(
            ranking(BackendPreference::Script),
            vec![Kind::Script, Kind::Native, Kind::Helper]
        );
    }

    #[test]
    fn test_status_after_selection() {
        let denied = ProbeReport {
            backend: "script",
            outcome: "Permission denied: -1719".to_string(),
            permission: true,
        };
        let missing = ProbeReport {
            backend: "helper",
            outcome: "xdotool not found on PATH".to_string(),
            permission: false,
        };

        assert_eq!(
            initial_status("helper", &[missing.clone()]),
            EngineStatus::Ready { backend: "helper" }
        );
        assert_eq!(initial_status("none", &[missing.clone()]), EngineStatus::NoBackend);
        assert_eq!(
            initial_status("none", &[missing, denied]),
            EngineStatus::PermissionDenied {
                backend: "script",
                detail: "Permission denied: -1719".to_string()
            }
        );
    }

    #[test]
    fn test_windows_has_no_helper() {
        let reason = instantiate(Kind::Helper, Platform::Windows).err();
        assert_eq!(reason.as_deref(), Some("no helper tool on Windows"));
    }
}
