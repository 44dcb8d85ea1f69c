//! Backend session handling.

use crate::config::Config;
use std::sync::Mutex;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
}

pub trait SessionProvider: Send + Sync {
    /// Current session, if the user is signed in
    fn session(&self) -> Option<Session>;
}

/// Session seeded from `FUNDPG_ACCESS_TOKEN` and replaceable at runtime
#[derive(Debug, Default)]
pub struct StoredSession {
    session: Mutex<Option<Session>>,
}

impl StoredSession {
    pub fn from_config(config: &Config) -> Self {
        let stored = Self::default();
        if let Some(token) = &config.access_token {
            stored.set_access_token(token);
        }
        stored
    }

    /// Replace the access token. An empty token signs out.
    pub fn set_access_token(&self, token: &str) {
        let token = token.trim();
        let next = if token.is_empty() {
            info!("Session cleared");
            None
        } else {
            Some(Session {
                access_token: token.to_string(),
            })
        };
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

impl SessionProvider for StoredSession {
    fn session(&self) -> Option<Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_token() {
        let stored = StoredSession::from_config(&Config::default());
        assert!(stored.session().is_none());
    }

    #[test]
    fn test_from_config_with_token() {
        let mut config = Config::default();
        config.access_token = Some(" abc ".to_string());
        let stored = StoredSession::from_config(&config);
        assert_eq!(stored.session().unwrap().access_token, "abc");
    }

    #[test]
    fn test_empty_token_signs_out() {
        let stored = StoredSession::default();
        stored.set_access_token("tok");
        assert!(stored.session().is_some());
        stored.set_access_token("  ");
        assert!(stored.session().is_none());
    }
}
