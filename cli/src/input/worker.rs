//! Dedicated input thread
//!
//! Backends shell out or talk to the OS synchronously, so they run on their
//! own thread. For out-of-process backends, pointer moves and motion samples
//! are folded over a short window and flushed as one move: relative deltas
//! are summed, absolute targets keep the latest.

use super::engine::{Engine, EngineStatus, InputCommand, PointerMove};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// How long pointer moves are batched before one is sent
pub const COALESCE_WINDOW: Duration = Duration::from_millis(16);

enum Job {
    Input(InputCommand),
    Shutdown,
}

pub struct InputWorker {
    tx: Sender<Job>,
    status: watch::Receiver<EngineStatus>,
    handle: Option<JoinHandle<()>>,
}

impl InputWorker {
    /// Probe backends on the input thread and start serving commands
    pub fn spawn(
        settings: super::engine::EngineSettings,
        preference: crate::config::BackendPreference,
    ) -> std::io::Result<Self> {
        Self::spawn_with(move |status| {
            let platform = settings.platform;
            let (backend, reports) = super::select_backend(platform, preference);
            for report in &reports {
                debug!("probe {}: {}", report.backend, report.outcome);
            }
            status.send_replace(super::initial_status(backend.name(), &reports));
            let media = super::media::targets_for(platform);
            Engine::new(backend, settings, media, status)
        })
    }

    /// Start the thread with an engine built by `factory` on that thread
    pub fn spawn_with<F>(factory: F) -> std::io::Result<Self>
    where
        F: FnOnce(watch::Sender<EngineStatus>) -> Engine + Send + 'static,
    {
        let (status_tx, status) = watch::channel(EngineStatus::Starting);
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("couchpad-input".to_string())
            .spawn(move || {
                let engine = factory(status_tx);
                run_loop(engine, rx);
            })?;
        Ok(Self {
            tx,
            status,
            handle: Some(handle),
        })
    }

    /// Queue a command; false once the input thread is gone
    pub fn send(&self, command: InputCommand) -> bool {
        self.tx.send(Job::Input(command)).is_ok()
    }

    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    /// Drain queued commands and join the thread
    pub fn shutdown(mut self) {
        let _ = self.tx.send(Job::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Input thread panicked");
            }
        }
    }
}

impl Drop for InputWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(Job::Shutdown);
    }
}

fn run_loop(mut engine: Engine, rx: Receiver<Job>) {
    let coalesce = engine.coalesces_moves();
    let mut pending: Option<PointerMove> = None;
    let mut deadline = Instant::now();

    loop {
        let job = match pending {
            Some(_) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(job) => Some(job),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => Some(Job::Shutdown),
                }
            }
            None => Some(rx.recv().unwrap_or(Job::Shutdown)),
        };

        match job {
            None => flush(&mut engine, &mut pending),
            Some(Job::Input(command)) => {
                let movement = if coalesce {
                    engine.pointer_move(&command)
                } else {
                    None
                };
                let Some(movement) = movement else {
                    // keep ordering: moves queued before a click land first
                    flush(&mut engine, &mut pending);
                    engine.handle(command);
                    continue;
                };
                let absorbed = pending
                    .as_mut()
                    .is_some_and(|queued| queued.absorb(movement));
                if !absorbed {
                    flush(&mut engine, &mut pending);
                    pending = Some(movement);
                    deadline = Instant::now() + COALESCE_WINDOW;
                }
                if Instant::now() >= deadline {
                    flush(&mut engine, &mut pending);
                }
            }
            Some(Job::Shutdown) => {
                flush(&mut engine, &mut pending);
                debug!("Input thread stopping");
                return;
            }
        }
    }
}

fn flush(engine: &mut Engine, pending: &mut Option<PointerMove>) {
    if let Some(movement) = pending.take() {
        engine.apply_move(movement);
    }
}
