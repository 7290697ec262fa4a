//! Fixed-window rate limiting for anonymous submissions.
//!
//! Windows live in memory and can be saved to a JSON file between runs,
//! so a short-lived process (one CLI invocation per note) still sees the
//! hits recorded by the ones before it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MailslotError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Window {
    count: u32,
    resets_at: DateTime<Utc>,
}

/// Allows `limit` hits per client within each window of `window` length.
///
/// A client's window starts at its first hit and resets once it expires.
/// Constructed explicitly and passed to whoever needs it.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: TimeDelta,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter holding the windows saved at `path`.
    ///
    /// A missing file starts empty. So does an unreadable one, with a warning:
    /// losing the counters only loosens the limit for one window.
    pub fn load(path: &Path, limit: u32, window: Duration) -> Self {
        let limiter = Self::new(limit, window);
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return limiter,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read rate limit state");
                return limiter;
            }
        };
        match serde_json::from_slice::<HashMap<String, Window>>(&bytes) {
            Ok(clients) => *limiter.clients() = clients,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt rate limit state");
            }
        }
        limiter
    }

    /// Write the windows still open at `now` to `path`.
    pub fn save(&self, path: &Path, now: DateTime<Utc>) -> Result<()> {
        let json = {
            let mut clients = self.clients();
            clients.retain(|_, w| now < w.resets_at);
            serde_json::to_vec(&*clients)?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MailslotError::io(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| MailslotError::io(path, e))?;
        debug!(path = %path.display(), clients = self.tracked(), "Saved rate limit state");
        Ok(())
    }

    /// Record a hit for `client` at `now`. Returns `false` when over the limit.
    ///
    /// Expired windows of every client are forgotten on the way.
    pub fn check(&self, client: &str, now: DateTime<Utc>) -> bool {
        let mut clients = self.clients();
        clients.retain(|_, w| now < w.resets_at);

        if let Some(w) = clients.get_mut(client) {
            if w.count >= self.limit {
                return false;
            }
            w.count += 1;
            return true;
        }

        clients.insert(
            client.to_string(),
            Window {
                count: 1,
                resets_at: now
                    .checked_add_signed(self.window)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        self.limit > 0
    }

    /// Number of clients with an open window.
    pub fn tracked(&self) -> usize {
        self.clients().len()
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        match self.clients.lock() {
            Ok(guard) => guard,
            // A panic elsewhere cannot leave a window half-updated.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_limit_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = t0();
        assert!(limiter.check("1.2.3.4", t0));
        assert!(limiter.check("1.2.3.4", t0));
        assert!(limiter.check("1.2.3.4", t0 + TimeDelta::seconds(10)));
        assert!(!limiter.check("1.2.3.4", t0 + TimeDelta::seconds(20)));
        // Other clients are independent
        assert!(limiter.check("5.6.7.8", t0 + TimeDelta::seconds(20)));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = t0();
        assert!(limiter.check("c", t0));
        assert!(!limiter.check("c", t0 + TimeDelta::seconds(59)));
        assert!(limiter.check("c", t0 + TimeDelta::seconds(60)));
    }

    #[test]
    fn test_check_forgets_expired_clients() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        let t0 = t0();
        limiter.check("a", t0);
        limiter.check("b", t0);
        assert_eq!(limiter.tracked(), 2);
        limiter.check("c", t0 + TimeDelta::seconds(5));
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_limit_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("ratelimit.json");
        let window = Duration::from_secs(60);
        let t0 = t0();

        for i in 0..2 {
            let limiter = RateLimiter::load(&path, 2, window);
            assert!(limiter.check("cli", t0 + TimeDelta::seconds(i)));
            limiter.save(&path, t0 + TimeDelta::seconds(i)).unwrap();
        }
        let limiter = RateLimiter::load(&path, 2, window);
        assert!(!limiter.check("cli", t0 + TimeDelta::seconds(2)));

        let later = RateLimiter::load(&path, 2, window);
        assert!(later.check("cli", t0 + TimeDelta::seconds(61)));
    }

    #[test]
    fn test_save_drops_expired_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratelimit.json");
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let t0 = t0();
        limiter.check("old", t0);
        limiter.save(&path, t0 + TimeDelta::seconds(30)).unwrap();
        assert_eq!(RateLimiter::load(&path, 5, Duration::from_secs(10)).tracked(), 0);
    }

    #[test]
    fn test_load_ignores_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratelimit.json");
        std::fs::write(&path, b"not json").unwrap();
        let limiter = RateLimiter::load(&path, 1, Duration::from_secs(60));
        assert_eq!(limiter.tracked(), 0);
        assert!(limiter.check("c", t0()));
    }
}
