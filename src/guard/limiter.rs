use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

// Window lengths are fixed; only the thresholds and the block length are
// configurable.
const MINUTE_WINDOW_SECS: i64 = 60;
const HOUR_WINDOW_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct GuardLimits {
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
    pub max_logins_per_day: u32,
    pub block_duration_secs: u64,
}

impl Default for GuardLimits {
    fn default() -> Self {
        GuardLimits {
            max_requests_per_minute: 5,
            max_requests_per_hour: 20,
            max_logins_per_day: 3,
            block_duration_secs: 3600,
        }
    }
}

/// Outcome of a single evaluation. `message` is empty when the action is
/// allowed and a user-facing explanation otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub message: String,
}

impl Decision {
    fn allow() -> Self {
        Decision {
            allowed: true,
            message: String::new(),
        }
    }

    fn deny(message: String) -> Self {
        Decision {
            allowed: false,
            message,
        }
    }
}

#[derive(Debug, Clone)]
struct DailyLogins {
    count: u32,
    date: NaiveDate,
}

/// Per-user view for the admin dashboard. Counts are computed against the
/// same windows `evaluate` uses.
#[derive(Debug, Clone)]
pub struct UserActivity {
    pub user_id: i64,
    pub requests_last_minute: usize,
    pub requests_last_hour: usize,
    pub daily_logins: u32,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Decides, per end user, whether an action is allowed right now.
///
/// Tracks a sliding history of allowed actions, a daily quota for login
/// attempts, and temporary blocks set when a window threshold is breached.
/// Login attempts (phone, code and password submissions) run against
/// halved thresholds since those are the actions the messaging platform
/// itself watches for automation.
///
/// All state is in-memory and process-lifetime. Blocks and stale history
/// expire lazily on the next evaluation; there is no background sweep.
pub struct AbuseGuard {
    limits: GuardLimits,
    requests: HashMap<i64, Vec<DateTime<Utc>>>,
    blocked: HashMap<i64, DateTime<Utc>>,
    daily_logins: HashMap<i64, DailyLogins>,
}

// Logins get half the allowance, rounding down (5 -> 2, 20 -> 10).
fn effective_limit(limit: u32, login_attempt: bool) -> u32 {
    if login_attempt { limit / 2 } else { limit }
}

impl AbuseGuard {
    pub fn new(limits: GuardLimits) -> Self {
        AbuseGuard {
            limits,
            requests: HashMap::new(),
            blocked: HashMap::new(),
            daily_logins: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &GuardLimits {
        &self.limits
    }

    /// Decides whether `user_id` may act at `now` and records the action
    /// when allowed. `now` must be a single clock reading; the guard never
    /// reads time itself.
    pub fn evaluate(&mut self, user_id: i64, login_attempt: bool, now: DateTime<Utc>) -> Decision {
        // An active block wins over everything else. Expired entries are
        // removed here rather than by a timer.
        if let Some(&until) = self.blocked.get(&user_id) {
            if now < until {
                let minutes = (until - now).num_seconds() / 60;
                return Decision::deny(format!(
                    "You are temporarily blocked. Try again in {} minutes.",
                    minutes
                ));
            }
            self.blocked.remove(&user_id);
        }

        if login_attempt {
            let today = now.date_naive();
            let counter = self.daily_logins.entry(user_id).or_insert(DailyLogins {
                count: 0,
                date: today,
            });
            if counter.date != today {
                counter.count = 0;
                counter.date = today;
            }
            if counter.count >= self.limits.max_logins_per_day {
                return Decision::deny(format!(
                    "Daily login limit reached ({} per day). This limit keeps the \
                     account from being flagged by the messaging platform. Try again tomorrow.",
                    self.limits.max_logins_per_day
                ));
            }
            // A login attempt spends a quota slot even if a window check
            // below rejects the same call.
            counter.count += 1;
        }

        let history = self.requests.entry(user_id).or_default();
        history.retain(|&t| (now - t).num_seconds() < HOUR_WINDOW_SECS);

        let minute_ago = now - Duration::seconds(MINUTE_WINDOW_SECS);
        let last_minute = history.iter().filter(|&&t| t > minute_ago).count();
        let per_minute = effective_limit(self.limits.max_requests_per_minute, login_attempt);
        if last_minute >= per_minute as usize {
            self.block(user_id, now);
            return Decision::deny(format!(
                "Too many requests. You have been blocked for {} minutes to keep \
                 the account safe.",
                self.limits.block_duration_secs / 60
            ));
        }

        let hour_ago = now - Duration::seconds(HOUR_WINDOW_SECS);
        let last_hour = history.iter().filter(|&&t| t > hour_ago).count();
        let per_hour = effective_limit(self.limits.max_requests_per_hour, login_attempt);
        if last_hour >= per_hour as usize {
            self.block(user_id, now);
            return Decision::deny(format!(
                "Hourly request limit exceeded. You have been blocked for {} \
                 minutes to keep the account safe.",
                self.limits.block_duration_secs / 60
            ));
        }

        self.requests.entry(user_id).or_default().push(now);
        Decision::allow()
    }

    fn block(&mut self, user_id: i64, now: DateTime<Utc>) {
        let until = now + Duration::seconds(self.limits.block_duration_secs as i64);
        self.blocked.insert(user_id, until);
    }

    /// Operator override: lift an active block without touching request
    /// history or the daily quota. Returns whether a block existed.
    pub fn clear_block(&mut self, user_id: i64) -> bool {
        self.blocked.remove(&user_id).is_some()
    }

    /// Operator override: forget everything tracked for a user.
    pub fn reset_user(&mut self, user_id: i64) {
        self.requests.remove(&user_id);
        self.blocked.remove(&user_id);
        self.daily_logins.remove(&user_id);
    }

    /// Read-only view over every tracked user, ordered by user id. Expired
    /// blocks and stale history are filtered out of the view but left in
    /// place for the next evaluation to clean up.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<UserActivity> {
        let mut ids: BTreeSet<i64> = BTreeSet::new();
        ids.extend(self.requests.keys());
        ids.extend(self.blocked.keys());
        ids.extend(self.daily_logins.keys());

        let minute_ago = now - Duration::seconds(MINUTE_WINDOW_SECS);
        let hour_ago = now - Duration::seconds(HOUR_WINDOW_SECS);
        let today = now.date_naive();

        ids.into_iter()
            .map(|user_id| {
                let history = self.requests.get(&user_id);
                UserActivity {
                    user_id,
                    requests_last_minute: history
                        .map_or(0, |h| h.iter().filter(|&&t| t > minute_ago).count()),
                    requests_last_hour: history
                        .map_or(0, |h| h.iter().filter(|&&t| t > hour_ago).count()),
                    daily_logins: self
                        .daily_logins
                        .get(&user_id)
                        .filter(|c| c.date == today)
                        .map_or(0, |c| c.count),
                    blocked_until: self
                        .blocked
                        .get(&user_id)
                        .copied()
                        .filter(|&until| until > now),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;

    use super::*;

    const USER: i64 = 42;

    fn guard() -> AbuseGuard {
        AbuseGuard::new(GuardLimits::default())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        // 2023-11-14 22:13:20 UTC
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_first_requests_allowed_then_minute_block() {
        let mut g = guard();
        for i in 0..5 {
            assert!(g.evaluate(USER, false, at(i)).allowed);
        }
        let denied = g.evaluate(USER, false, at(5));
        assert!(!denied.allowed);
        assert!(denied.message.contains("Too many requests"));
        assert_eq!(g.blocked[&USER], at(5) + Duration::seconds(3600));
    }

    #[test]
    fn test_block_rejects_everything_until_expiry() {
        let mut g = guard();
        for i in 0..6 {
            g.evaluate(USER, false, at(i));
        }
        // Blocked at t=5 until t=3605, for login and non-login alike.
        assert!(!g.evaluate(USER, false, at(1000)).allowed);
        assert!(!g.evaluate(USER, true, at(2000)).allowed);
        assert!(!g.evaluate(USER, false, at(3604)).allowed);
        // At exactly block expiry the entry is removed and the call goes
        // through the normal checks (history has aged out by then).
        assert!(g.evaluate(USER, false, at(3605)).allowed);
        assert!(!g.blocked.contains_key(&USER));
    }

    #[test]
    fn test_blocked_message_uses_floor_minutes() {
        let mut g = guard();
        for i in 0..6 {
            g.evaluate(USER, false, at(i));
        }
        // Block expires at t=3605; at t=35 there are 3570s left -> 59 min.
        let denied = g.evaluate(USER, false, at(35));
        assert!(denied.message.contains("59 minutes"));
    }

    #[test]
    fn test_login_threshold_is_halved() {
        let mut g = guard();
        assert!(g.evaluate(USER, true, at(0)).allowed);
        assert!(g.evaluate(USER, true, at(1)).allowed);
        // Two login requests in the window hit the halved limit (5 / 2 = 2).
        let denied = g.evaluate(USER, true, at(2));
        assert!(!denied.allowed);
        assert!(denied.message.contains("Too many requests"));
        assert!(g.blocked.contains_key(&USER));
    }

    #[test]
    fn test_other_users_unaffected() {
        let mut g = guard();
        for i in 0..6 {
            g.evaluate(USER, false, at(i));
        }
        assert!(!g.evaluate(USER, false, at(10)).allowed);
        assert!(g.evaluate(7, false, at(10)).allowed);
    }

    #[test]
    fn test_daily_login_quota() {
        let mut g = guard();
        // Spaced out so no window threshold trips.
        assert!(g.evaluate(USER, true, at(0)).allowed);
        assert!(g.evaluate(USER, true, at(400)).allowed);
        assert!(g.evaluate(USER, true, at(800)).allowed);

        let denied = g.evaluate(USER, true, at(1200));
        assert!(!denied.allowed);
        assert!(denied.message.contains("Daily login limit"));
        // Quota rejection is not a block; ordinary requests still pass.
        assert!(!g.blocked.contains_key(&USER));
        assert!(g.evaluate(USER, false, at(1200)).allowed);
        // And the counter does not grow past the limit.
        assert_eq!(g.daily_logins[&USER].count, 3);
    }

    #[test]
    fn test_daily_quota_resets_on_new_date() {
        let mut g = guard();
        for i in 0..3 {
            assert!(g.evaluate(USER, true, at(i * 400)).allowed);
        }
        assert!(!g.evaluate(USER, true, at(1600)).allowed);
        // Next calendar day the counter starts over.
        assert!(g.evaluate(USER, true, at(86_400)).allowed);
        assert_eq!(g.daily_logins[&USER].count, 1);
    }

    #[test]
    fn test_login_quota_consumed_when_window_blocked() {
        let mut g = guard();
        assert!(g.evaluate(USER, true, at(0)).allowed);
        assert!(g.evaluate(USER, true, at(1)).allowed);
        // Third login is rejected by the minute window, but it has already
        // spent the last daily quota slot.
        assert!(!g.evaluate(USER, true, at(2)).allowed);
        assert_eq!(g.daily_logins[&USER].count, 3);

        // After the block expires, the same day's quota is exhausted even
        // though only two logins ever went through.
        g.clear_block(USER);
        let denied = g.evaluate(USER, true, at(4000));
        assert!(!denied.allowed);
        assert!(denied.message.contains("Daily login limit"));
    }

    #[test]
    fn test_hourly_threshold() {
        let mut g = guard();
        // 20 requests two minutes apart stay under the minute limit.
        for i in 0..20 {
            assert!(g.evaluate(USER, false, at(i * 120)).allowed, "request {}", i);
        }
        let denied = g.evaluate(USER, false, at(20 * 120));
        assert!(!denied.allowed);
        assert!(denied.message.contains("Hourly request limit"));
        assert!(g.blocked.contains_key(&USER));
    }

    #[test]
    fn test_history_pruned_lazily() {
        let mut g = guard();
        for i in 0..5 {
            assert!(g.evaluate(USER, false, at(i)).allowed);
        }
        // An hour later the old entries no longer count and are dropped.
        assert!(g.evaluate(USER, false, at(3700)).allowed);
        assert_eq!(g.requests[&USER].len(), 1);
        assert_eq!(g.requests[&USER][0], at(3700));
    }

    #[test]
    fn test_clear_block_keeps_history_and_quota() {
        let mut g = guard();
        for i in 0..6 {
            g.evaluate(USER, false, at(i));
        }
        assert!(g.clear_block(USER));
        assert!(!g.clear_block(USER));
        // History is intact, so the very next request trips the minute
        // window again.
        assert!(!g.evaluate(USER, false, at(10)).allowed);
    }

    #[test]
    fn test_reset_user_forgets_everything() {
        let mut g = guard();
        for i in 0..3 {
            g.evaluate(USER, true, at(i * 400));
        }
        assert!(!g.evaluate(USER, true, at(1600)).allowed);
        g.reset_user(USER);
        assert!(g.evaluate(USER, true, at(1601)).allowed);
        assert_eq!(g.daily_logins[&USER].count, 1);
    }

    #[test]
    fn test_snapshot_reports_activity() {
        let mut g = guard();
        g.evaluate(USER, true, at(0));
        g.evaluate(USER, false, at(30));
        for i in 0..6 {
            g.evaluate(9, false, at(i));
        }

        let snapshot = g.snapshot(at(40));
        assert_eq!(snapshot.len(), 2);
        let nine = &snapshot[0];
        assert_eq!(nine.user_id, 9);
        assert!(nine.blocked_until.is_some());
        let user = &snapshot[1];
        assert_eq!(user.user_id, USER);
        assert_eq!(user.requests_last_minute, 2);
        assert_eq!(user.requests_last_hour, 2);
        assert_eq!(user.daily_logins, 1);
        assert!(user.blocked_until.is_none());

        // Snapshot must not mutate: the expired block is still visible to
        // evaluate, which then removes it.
        let later = g.snapshot(at(10_000));
        assert!(later.iter().all(|u| u.blocked_until.is_none()));
        assert!(g.blocked.contains_key(&9));
    }

    #[test]
    fn test_concurrent_evaluations_admit_exactly_threshold() {
        let g = Arc::new(Mutex::new(guard()));
        let now = at(0);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let g = Arc::clone(&g);
                std::thread::spawn(move || {
                    g.lock().unwrap().evaluate(USER, false, now).allowed
                })
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&allowed| allowed)
            .count();
        assert_eq!(allowed, 5);
    }
}
