use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tellr_core::domain::SessionId;
use tokio::time::Instant;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
struct SessionWindow {
    /// Accepted request times within the last hour, oldest first.
    accepted: VecDeque<Instant>,
}

impl SessionWindow {
    fn prune(&mut self, now: Instant) {
        while self.accepted.front().is_some_and(|at| now.saturating_duration_since(*at) >= HOUR) {
            self.accepted.pop_front();
        }
    }

    fn in_last_minute(&self, now: Instant) -> usize {
        self.accepted
            .iter()
            .rev()
            .take_while(|at| now.saturating_duration_since(**at) < MINUTE)
            .count()
    }
}

/// Sliding-window limits per session. Each session's entry is locked on its own, so sessions
/// never wait on each other.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: usize,
    per_hour: usize,
    sessions: DashMap<SessionId, SessionWindow>,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            per_minute: per_minute as usize,
            per_hour: per_hour as usize,
            sessions: DashMap::new(),
        }
    }

    /// Records the request and returns true when the session is within both windows.
    pub fn try_acquire(&self, session_id: &SessionId) -> bool {
        self.try_acquire_at(session_id, Instant::now())
    }

    pub fn try_acquire_at(&self, session_id: &SessionId, now: Instant) -> bool {
        let mut window = self.sessions.entry(session_id.clone()).or_default();
        window.prune(now);
        if window.accepted.len() >= self.per_hour || window.in_last_minute(now) >= self.per_minute {
            return false;
        }
        window.accepted.push_back(now);
        true
    }

    /// Drops sessions with no request in the last hour.
    pub fn sweep(&self, now: Instant) {
        self.sessions.retain(|_, window| {
            window.prune(now);
            !window.accepted.is_empty()
        });
    }

    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }
}
