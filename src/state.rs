use tokio::sync::{Mutex, RwLock};

use crate::admin::lockout::LoginLockout;
use crate::admin::session::SessionStore;
use crate::config::AdminConfig;
use crate::guard::limiter::AbuseGuard;
use crate::guard::pacing::HumanPacing;
use crate::token::store::ServiceTokenStore;

pub struct AppState {
    /// One lock around the whole guard: an evaluation must stay atomic so
    /// concurrent requests for the same user cannot race past a threshold.
    pub guard: Mutex<AbuseGuard>,
    pub pacing: HumanPacing,
    pub tokens: RwLock<ServiceTokenStore>,
    pub admin: AdminConfig,
    pub sessions: Mutex<SessionStore>,
    pub lockout: Mutex<LoginLockout>,
}
