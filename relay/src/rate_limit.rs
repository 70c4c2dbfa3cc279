//! Per-IP limit on session creation

use dashmap::DashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Creations counted since `opened`
#[derive(Clone, Copy)]
struct Window {
    opened: Instant,
    used: u32,
}

pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    /// Count one attempt for `ip`; false once its window is used up
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut slot = self.windows.entry(ip).or_insert(Window {
            opened: now,
            used: 0,
        });
        if now.duration_since(slot.opened) >= self.window {
            *slot = Window {
                opened: now,
                used: 0,
            };
        }
        if slot.used >= self.limit {
            return false;
        }
        slot.used += 1;
        true
    }

    /// Forget addresses whose window closed at least one window ago
    pub fn prune(&self) {
        let now = Instant::now();
        let keep = self.window * 2;
        self.windows.retain(|_, w| now.duration_since(w.opened) < keep);
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}
