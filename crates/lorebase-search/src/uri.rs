//! Ephemeral download URIs.
//!
//! `get_file_uri` hands out opaque tokens the external HTTP layer resolves
//! through [`UriIssuer::resolve`]; tokens expire after a TTL.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use lorebase_core::LogicalPath;

/// Default token lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

pub struct UriIssuer {
    ttl: Duration,
    tokens: Mutex<HashMap<Uuid, (LogicalPath, Instant)>>,
}

impl UriIssuer {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a download URI for a file path.
    pub fn issue(&self, path: &LogicalPath) -> String {
        let token = Uuid::new_v4();
        let mut tokens = self.tokens.lock().expect("token table poisoned");
        let now = Instant::now();
        tokens.retain(|_, (_, expires)| *expires > now);
        tokens.insert(token, (path.clone(), now + self.ttl));
        format!("/api/raw/{token}")
    }

    /// Resolve a token back to its path, if still valid.
    pub fn resolve(&self, token: &str) -> Option<LogicalPath> {
        let token = Uuid::parse_str(token).ok()?;
        let tokens = self.tokens.lock().expect("token table poisoned");
        tokens
            .get(&token)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(path, _)| path.clone())
    }
}

impl Default for UriIssuer {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_resolve() {
        let issuer = UriIssuer::default();
        let path = LogicalPath::parse("docs/a.txt").unwrap();
        let uri = issuer.issue(&path);
        let token = uri.rsplit('/').next().unwrap();
        assert_eq!(issuer.resolve(token), Some(path));
    }

    #[test]
    fn unknown_token_is_none() {
        let issuer = UriIssuer::default();
        assert!(issuer.resolve("not-a-uuid").is_none());
        assert!(issuer.resolve(&Uuid::new_v4().to_string()).is_none());
    }

    #[test]
    fn expired_token_is_none() {
        let issuer = UriIssuer::new(Duration::from_millis(0));
        let path = LogicalPath::parse("docs/a.txt").unwrap();
        let uri = issuer.issue(&path);
        let token = uri.rsplit('/').next().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(issuer.resolve(token).is_none());
    }
}
