//! Login sessions
//!
//! Sessions live in memory. The cookie carries `<id>.<hmac>` so a forged or
//! truncated cookie is rejected before any map lookup.

use chrono::{DateTime, Duration, Utc};
use ldapgate_auth::LoginMethod;
use ldapgate_core::types::LocalAccount;
use ldapgate_crypto::{generate_session_id, sign_session_id, verify_signed_session};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Ten years
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub id: String,
    pub uid: i64,
    pub name: String,
    pub method: LoginMethod,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct SessionStore {
    secret: String,
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(secret: &str, ttl_seconds: u64) -> Self {
        Self {
            secret: secret.to_string(),
            ttl: Duration::seconds(ttl_seconds.min(MAX_TTL_SECS) as i64),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session; returns it with the signed cookie value
    pub async fn create(&self, account: &LocalAccount, method: LoginMethod) -> (Session, String) {
        let id = generate_session_id();
        let now = Utc::now();
        let session = Session {
            id: id.clone(),
            uid: account.uid,
            name: account.name.clone(),
            method,
            created_at: now,
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(id.clone(), session.clone());

        debug!(uid = account.uid, active = sessions.len(), "Session created");
        (session, sign_session_id(self.secret.as_bytes(), &id))
    }

    /// Session for a cookie value, if the signature holds and it has not expired
    pub async fn get(&self, cookie_value: &str) -> Option<Session> {
        let id = verify_signed_session(self.secret.as_bytes(), cookie_value)?;
        let now = Utc::now();

        {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                Some(s) if !s.is_expired(now) => return Some(s.clone()),
                None => return None,
                Some(_) => {}
            }
        }

        self.sessions.write().await.remove(&id);
        None
    }

    pub async fn remove(&self, cookie_value: &str) -> Option<Session> {
        let id = verify_signed_session(self.secret.as_bytes(), cookie_value)?;
        self.sessions.write().await.remove(&id)
    }

    pub async fn active(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired(now))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapgate_core::types::AccountStatus;

    fn harry() -> LocalAccount {
        LocalAccount {
            uid: 2,
            name: "hpotter".to_string(),
            mail: None,
            pass_hash: None,
            status: AccountStatus::Active,
            ldap_excluded: false,
            roles: Vec::new(),
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = SessionStore::new("0123456789abcdef", 3600);
        let (session, cookie) = store.create(&harry(), LoginMethod::Local).await;

        assert_eq!(store.get(&cookie).await.unwrap().uid, session.uid);
        assert_eq!(store.active().await, 1);

        assert!(store.remove(&cookie).await.is_some());
        assert!(store.get(&cookie).await.is_none());
    }

    #[tokio::test]
    async fn test_tampered_cookie_rejected() {
        let store = SessionStore::new("0123456789abcdef", 3600);
        let (session, cookie) = store.create(&harry(), LoginMethod::Local).await;

        assert!(store.get(&session.id).await.is_none());
        assert!(store.get(&format!("{}x", cookie)).await.is_none());

        let other = SessionStore::new("fedcba9876543210", 3600);
        assert!(other.get(&cookie).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_dropped() {
        let store = SessionStore::new("0123456789abcdef", 0);
        let (_, cookie) = store.create(&harry(), LoginMethod::Local).await;

        assert!(store.get(&cookie).await.is_none());
        assert_eq!(store.active().await, 0);
    }
}
