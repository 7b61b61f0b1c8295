use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

const SESSION_TTL: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    created_at: Instant,
}

impl Session {
    fn new() -> Self {
        Session {
            token: generate_token(),
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > SESSION_TTL
    }
}

/// In-memory store of operator sessions. Expired entries are swept when a
/// new session is created, not on a timer.
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore {
            sessions: HashMap::new(),
        }
    }

    pub fn create(&mut self) -> Session {
        self.sessions.retain(|_, s| !s.is_expired());
        let session = Session::new();
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    pub fn validate(&self, token: &str) -> bool {
        self.sessions
            .get(token)
            .map(|s| !s.is_expired())
            .unwrap_or(false)
    }

    pub fn remove(&mut self, token: &str) {
        self.sessions.remove(token);
    }
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32).map(|_| format!("{:02x}", rng.r#gen::<u8>())).collect()
}
