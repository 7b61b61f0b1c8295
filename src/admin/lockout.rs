use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

const MAX_FAILED_LOGINS: usize = 5;
const FAILURE_WINDOW: Duration = Duration::from_secs(900);

/// Sliding-window tracker of failed operator logins, keyed by client IP.
/// An IP with too many recent failures is locked out until enough of them
/// age past the window.
pub struct LoginLockout {
    failures: HashMap<IpAddr, Vec<Instant>>,
}

impl LoginLockout {
    pub fn new() -> Self {
        LoginLockout {
            failures: HashMap::new(),
        }
    }

    /// True while the IP has used up its failure allowance. Stale entries
    /// for the checked IP are dropped on the way.
    pub fn is_locked(&mut self, ip: &IpAddr) -> bool {
        let cutoff = Instant::now() - FAILURE_WINDOW;
        match self.failures.get_mut(ip) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= MAX_FAILED_LOGINS
            }
            None => false,
        }
    }

    pub fn record_failure(&mut self, ip: IpAddr) {
        self.failures.entry(ip).or_default().push(Instant::now());
    }

    pub fn record_success(&mut self, ip: &IpAddr) {
        self.failures.remove(ip);
    }
}
