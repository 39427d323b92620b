//! LDAP server definitions
//!
//! Supports:
//! - LDAP (OpenLDAP, 389 Directory Server)
//! - Active Directory
//! - Service account, user and anonymous binds

use serde::{Deserialize, Serialize};

/// Connection parameters for one directory, keyed by `sid`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LdapServerDefinition {
    /// Server identifier referenced from the authentication config
    pub sid: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Disabled servers are skipped even when listed in `sids`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// LDAP server type hint
    #[serde(default)]
    pub server_type: LdapServerType,

    /// LDAP server URL (ldap:// or ldaps://)
    /// Example: "ldap://ldap.example.com:389" or "ldaps://ldap.example.com:636"
    pub server_url: String,

    /// Use STARTTLS for connection upgrade
    #[serde(default)]
    pub start_tls: bool,

    /// How the search bind is performed
    #[serde(default)]
    pub bind_method: BindMethod,

    /// Bind DN for the service account
    /// Example: "cn=admin,dc=example,dc=com"
    #[serde(default)]
    pub bind_dn: String,

    /// Service account password
    #[serde(default)]
    pub bind_password: String,

    /// DN template for `BindMethod::User`; `%username` is substituted
    /// Example: "uid=%username,ou=people,dc=example,dc=com"
    #[serde(default)]
    pub user_dn_expression: Option<String>,

    /// Base DNs searched in order
    pub base_dns: Vec<String>,

    /// Attribute the submitted username is matched against
    #[serde(default = "default_user_attr")]
    pub user_attr: String,

    /// Attribute providing the local account name; falls back to `user_attr`
    #[serde(default)]
    pub account_name_attr: Option<String>,

    /// Email attribute
    #[serde(default = "default_mail_attr")]
    pub mail_attr: String,

    /// Attribute whose value never changes for an entry (entryUUID, objectGUID)
    #[serde(default)]
    pub unique_persistent_attr: Option<String>,

    /// Attribute listing group memberships
    #[serde(default = "default_group_attr")]
    pub group_attr: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_user_attr() -> String {
    "uid".to_string()
}

fn default_mail_attr() -> String {
    "mail".to_string()
}

fn default_group_attr() -> String {
    "memberOf".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for LdapServerDefinition {
    fn default() -> Self {
        Self {
            sid: String::new(),
            name: String::new(),
            enabled: true,
            server_type: LdapServerType::default(),
            server_url: "ldap://localhost:389".to_string(),
            start_tls: false,
            bind_method: BindMethod::default(),
            bind_dn: String::new(),
            bind_password: String::new(),
            user_dn_expression: None,
            base_dns: Vec::new(),
            user_attr: default_user_attr(),
            account_name_attr: None,
            mail_attr: default_mail_attr(),
            unique_persistent_attr: None,
            group_attr: default_group_attr(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// LDAP server type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LdapServerType {
    /// Generic LDAP server
    #[default]
    Ldap,
    /// Microsoft Active Directory
    ActiveDirectory,
    /// OpenLDAP
    OpenLdap,
    /// 389 Directory Server
    Directory389,
}

impl LdapServerType {
    /// Default username attribute for this server type
    pub fn default_user_attr(&self) -> &'static str {
        match self {
            LdapServerType::ActiveDirectory => "sAMAccountName",
            _ => "uid",
        }
    }

    /// Default persistent id attribute for this server type
    pub fn default_unique_persistent_attr(&self) -> &'static str {
        match self {
            LdapServerType::ActiveDirectory => "objectGUID",
            LdapServerType::Directory389 => "nsUniqueId",
            _ => "entryUUID",
        }
    }
}

/// How the directory search is authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BindMethod {
    /// Bind with `bind_dn`/`bind_password`, then search
    #[default]
    ServiceAccount,
    /// Bind as the user via `user_dn_expression`, then search
    User,
    /// Anonymous bind, then search
    Anonymous,
}

impl LdapServerDefinition {
    /// Create a definition with presets for the given server type
    pub fn from_server_type(
        sid: &str,
        server_type: LdapServerType,
        server_url: &str,
        base_dn: &str,
    ) -> Self {
        Self {
            sid: sid.to_string(),
            name: sid.to_string(),
            server_type,
            server_url: server_url.to_string(),
            base_dns: vec![base_dn.to_string()],
            user_attr: server_type.default_user_attr().to_string(),
            unique_persistent_attr: Some(server_type.default_unique_persistent_attr().to_string()),
            ..Default::default()
        }
    }

    /// Attribute providing the local account name
    pub fn account_name_attr(&self) -> &str {
        self.account_name_attr
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.user_attr)
    }

    /// DN for a user bind, when `user_dn_expression` is configured
    pub fn user_bind_dn(&self, username: &str) -> Option<String> {
        self.user_dn_expression
            .as_ref()
            .map(|expr| expr.replace("%username", username))
    }

    /// Validate the definition
    pub fn validate(&self) -> Result<(), String> {
        if self.sid.is_empty() {
            return Err("Server sid is required".to_string());
        }

        if !self.server_url.starts_with("ldap://") && !self.server_url.starts_with("ldaps://") {
            return Err(format!(
                "Server '{}': URL must start with ldap:// or ldaps://",
                self.sid
            ));
        }

        if self.base_dns.iter().all(|b| b.trim().is_empty()) {
            return Err(format!("Server '{}': at least one base DN is required", self.sid));
        }

        if self.user_attr.is_empty() {
            return Err(format!("Server '{}': user attribute is required", self.sid));
        }

        if self.timeout_seconds == 0 {
            return Err(format!("Server '{}': timeout_seconds must be at least 1", self.sid));
        }

        match self.bind_method {
            BindMethod::ServiceAccount if self.bind_dn.is_empty() => Err(format!(
                "Server '{}': service account bind requires bind_dn",
                self.sid
            )),
            BindMethod::User
                if !self
                    .user_dn_expression
                    .as_deref()
                    .is_some_and(|e| e.contains("%username")) =>
            {
                Err(format!(
                    "Server '{}': user bind requires a user_dn_expression containing %username",
                    self.sid
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hogwarts() -> LdapServerDefinition {
        LdapServerDefinition {
            sid: "hogwarts".to_string(),
            server_url: "ldap://ldap.hogwarts.edu".to_string(),
            bind_dn: "cn=service,dc=hogwarts,dc=edu".to_string(),
            base_dns: vec!["ou=people,dc=hogwarts,dc=edu".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_validation() {
        assert!(hogwarts().validate().is_ok());

        let mut server = hogwarts();
        server.server_url = "http://ldap.hogwarts.edu".to_string();
        assert!(server.validate().is_err());

        let mut server = hogwarts();
        server.base_dns = vec!["  ".to_string()];
        assert!(server.validate().is_err());

        let mut server = hogwarts();
        server.timeout_seconds = 0;
        assert!(server.validate().unwrap_err().contains("timeout_seconds"));

        let mut server = hogwarts();
        server.bind_method = BindMethod::User;
        assert!(server.validate().is_err());
        server.user_dn_expression = Some("uid=%username,ou=people,dc=hogwarts,dc=edu".to_string());
        assert!(server.validate().is_ok());
    }

    #[test]
    fn test_user_bind_dn() {
        let mut server = hogwarts();
        assert_eq!(server.user_bind_dn("hpotter"), None);

        server.user_dn_expression = Some("uid=%username,ou=people,dc=hogwarts,dc=edu".to_string());
        assert_eq!(
            server.user_bind_dn("hpotter").as_deref(),
            Some("uid=hpotter,ou=people,dc=hogwarts,dc=edu")
        );
    }

    #[test]
    fn test_active_directory_presets() {
        let server = LdapServerDefinition::from_server_type(
            "ad",
            LdapServerType::ActiveDirectory,
            "ldaps://dc.example.com:636",
            "dc=example,dc=com",
        );

        assert_eq!(server.user_attr, "sAMAccountName");
        assert_eq!(server.account_name_attr(), "sAMAccountName");
        assert_eq!(server.unique_persistent_attr.as_deref(), Some("objectGUID"));
    }
}
