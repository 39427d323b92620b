//! Configuration for ldapgate

use crate::types::{AuthenticationConfig, LdapServerDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LdapgateConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// LDAP server definitions, keyed by `sid`
    #[serde(default)]
    pub servers: Vec<LdapServerDefinition>,

    /// Default authentication settings; a persisted copy edited through the
    /// admin API takes precedence at startup
    #[serde(default)]
    pub authentication: AuthenticationConfig,

    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

impl LdapgateConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `LDAPGATE_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("LDAPGATE_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Ok(port) = std::env::var("LDAPGATE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(url) = std::env::var("LDAPGATE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(name) = std::env::var("LDAPGATE_SITE_OWNER_NAME") {
            self.site.owner_name = name;
        }
        if let Ok(password) = std::env::var("LDAPGATE_SITE_OWNER_PASSWORD") {
            self.site.owner_password = Some(password);
        }
        if let Ok(secret) = std::env::var("LDAPGATE_SESSION_SECRET") {
            self.session.secret = secret;
        }
        if let Ok(level) = std::env::var("LDAPGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LDAPGATE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    pub fn server(&self, sid: &str) -> Option<&LdapServerDefinition> {
        self.servers.iter().find(|s| s.sid == sid)
    }

    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for server in &self.servers {
            server.validate().map_err(crate::Error::ConfigError)?;
            if !seen.insert(server.sid.as_str()) {
                return Err(crate::Error::ConfigError(format!(
                    "Duplicate LDAP server sid '{}'",
                    server.sid
                )));
            }
        }

        let sids: Vec<&str> = self.servers.iter().map(|s| s.sid.as_str()).collect();
        self.authentication
            .validate(&sids)
            .map_err(crate::Error::ConfigError)?;

        if self.site.owner_name.trim().is_empty() {
            return Err(crate::Error::ConfigError("Site owner name is required".into()));
        }

        if self.session.secret.len() < 16 {
            return Err(crate::Error::ConfigError(
                "Session secret must be at least 16 characters".into(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:///var/lib/ldapgate/ldapgate.db?mode=rwc".to_string(),
            max_connections: 16,
        }
    }
}

/// Site owner (uid 1), created at startup if missing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub owner_name: String,
    pub owner_mail: Option<String>,
    /// Initial password; only used when the owner account is first created
    pub owner_password: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            owner_name: "admin".to_string(),
            owner_mail: None,
            owner_password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for signing session cookies
    pub secret: String,
    pub ttl_seconds: u64,
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_seconds: 8 * 3600,
            cookie_secure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Group-to-role authorization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Name of the consumer receiving grants
    #[serde(default = "default_consumer")]
    pub consumer: String,

    /// Entry attribute listing group memberships; falls back to the
    /// server's `group_attr`
    #[serde(default)]
    pub group_attr: Option<String>,

    #[serde(default)]
    pub mappings: Vec<GroupMapping>,

    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_consumer() -> String {
    "local_role".to_string()
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            consumer: default_consumer(),
            group_attr: None,
            mappings: Vec::new(),
            case_sensitive: false,
        }
    }
}

/// Maps a group (full DN or bare CN) to a granted role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMapping {
    pub from: String,
    pub to: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [site]
        owner_name = "admin"

        [session]
        secret = "0123456789abcdef0123"
        ttl_seconds = 3600
        cookie_secure = false

        [[servers]]
        sid = "hogwarts"
        server_url = "ldap://ldap.hogwarts.edu"
        bind_dn = "cn=service,dc=hogwarts,dc=edu"
        bind_password = "secret"
        base_dns = ["ou=people,dc=hogwarts,dc=edu"]

        [authentication]
        sids = ["hogwarts"]
        allow_only_if_text_in_dn = ["pot"]

        [authorization]
        enabled = true
        mappings = [{ from = "cn=gryffindor,ou=groups,dc=hogwarts,dc=edu", to = "student" }]
    "#;

    #[test]
    fn test_parse_and_validate() {
        let config = LdapgateConfig::from_toml(SAMPLE).unwrap();
        config.validate().unwrap();

        let server = config.server("hogwarts").unwrap();
        assert_eq!(server.user_attr, "uid");
        assert!(server.enabled);
        assert_eq!(config.authorization.consumer, "local_role");
        assert_eq!(config.authorization.mappings[0].to, "student");
    }

    #[test]
    fn test_duplicate_sid_rejected() {
        let mut config = LdapgateConfig::from_toml(SAMPLE).unwrap();
        let dup = config.servers[0].clone();
        config.servers.push(dup);
        assert!(matches!(config.validate(), Err(crate::Error::ConfigError(_))));
    }

    #[test]
    fn test_short_session_secret_rejected() {
        let mut config = LdapgateConfig::from_toml(SAMPLE).unwrap();
        config.session.secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_sid_rejected() {
        let mut config = LdapgateConfig::from_toml(SAMPLE).unwrap();
        config.authentication.sids = vec!["durmstrang".to_string()];
        assert!(config.validate().is_err());
    }
}
