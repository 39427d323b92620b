//! Local account types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAccount {
    pub uid: i64,
    pub name: String,
    pub mail: Option<String>,
    /// Local password hash; `None` for accounts that only log in through LDAP
    #[serde(skip_serializing)]
    pub pass_hash: Option<String>,
    pub status: AccountStatus,
    /// Excluded accounts never go through LDAP authentication
    pub ldap_excluded: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl LocalAccount {
    pub fn is_site_owner(&self) -> bool {
        self.uid == crate::SITE_OWNER_UID
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Accounts that bypass the LDAP flow and authenticate locally
    pub fn bypasses_ldap(&self) -> bool {
        self.is_site_owner() || self.ldap_excluded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Blocked,
}

impl AccountStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            AccountStatus::Active => 1,
            AccountStatus::Blocked => 0,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        if v == 0 {
            AccountStatus::Blocked
        } else {
            AccountStatus::Active
        }
    }
}

/// Fields needed to create an account
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: String,
    pub mail: Option<String>,
    pub pass_hash: Option<String>,
    pub ldap_excluded: bool,
    pub roles: Vec<String>,
}

impl NewAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Link from an external identity to a local account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authmap {
    pub aid: i64,
    pub uid: i64,
    pub module: String,
    pub authname: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(uid: i64) -> LocalAccount {
        LocalAccount {
            uid,
            name: "someone".to_string(),
            mail: None,
            pass_hash: None,
            status: AccountStatus::Active,
            ldap_excluded: false,
            roles: Vec::new(),
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_bypass() {
        assert!(account(1).bypasses_ldap());
        assert!(!account(2).bypasses_ldap());

        let mut excluded = account(7);
        excluded.ldap_excluded = true;
        assert!(excluded.bypasses_ldap());
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(AccountStatus::from_i64(AccountStatus::Blocked.as_i64()), AccountStatus::Blocked);
        assert_eq!(AccountStatus::from_i64(1), AccountStatus::Active);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let mut a = account(3);
        a.pass_hash = Some("$argon2id$secret".to_string());
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("argon2id"));
    }
}
