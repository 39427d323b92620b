//! Authentication configuration
//!
//! Read on every login attempt. The admin API edits it through
//! [`AuthenticationForm`], whose list fields are newline-delimited text.

use serde::{Deserialize, Serialize};

/// Site-wide LDAP authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuthenticationConfig {
    /// Mixed allows local passwords for accounts not linked to LDAP
    #[serde(default)]
    pub authentication_mode: AuthenticationMode,

    /// Enabled server identifiers, tried in order
    #[serde(default)]
    pub sids: Vec<String>,

    /// Admit only entries whose DN contains one of these substrings
    #[serde(default)]
    pub allow_only_if_text_in_dn: Vec<String>,

    /// Reject entries whose DN contains any of these substrings
    #[serde(default)]
    pub exclude_if_text_in_dn: Vec<String>,

    /// Reject identities holding no authorization grant
    #[serde(default)]
    pub exclude_if_no_authorizations: bool,

    /// Predicate expression an entry must satisfy
    #[serde(default)]
    pub allow_predicate: Option<String>,

    /// Whether predicate evaluation is available on this site
    #[serde(default = "default_true")]
    pub predicate_evaluator_enabled: bool,

    #[serde(default)]
    pub email_update: EmailUpdate,

    /// Mail used when the entry has none; `{username}` is substituted
    #[serde(default)]
    pub mail_template: Option<String>,

    #[serde(default)]
    pub account_creation: AccountCreation,

    #[serde(default)]
    pub existing_account: ExistingAccount,

    #[serde(default)]
    pub help_link_url: Option<String>,

    #[serde(default)]
    pub help_link_text: Option<String>,

    #[serde(default)]
    pub sso: SsoConfig,
}

fn default_true() -> bool {
    true
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            authentication_mode: AuthenticationMode::default(),
            sids: Vec::new(),
            allow_only_if_text_in_dn: Vec::new(),
            exclude_if_text_in_dn: Vec::new(),
            exclude_if_no_authorizations: false,
            allow_predicate: None,
            predicate_evaluator_enabled: true,
            email_update: EmailUpdate::default(),
            mail_template: None,
            account_creation: AccountCreation::default(),
            existing_account: ExistingAccount::default(),
            help_link_url: None,
            help_link_text: None,
            sso: SsoConfig::default(),
        }
    }
}

impl AuthenticationConfig {
    /// Configured predicate, ignoring blank source text
    pub fn predicate_source(&self) -> Option<&str> {
        self.allow_predicate
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Validate against the set of known server identifiers
    pub fn validate(&self, known_sids: &[&str]) -> Result<(), String> {
        if self.sids.is_empty() {
            return Err("At least one LDAP server must be enabled for authentication".to_string());
        }

        for sid in &self.sids {
            if !known_sids.contains(&sid.as_str()) {
                return Err(format!("Unknown LDAP server '{}'", sid));
            }
        }

        if let Some(template) = &self.mail_template {
            if !template.is_empty() && !template.contains("{username}") {
                return Err("Mail template must contain {username} placeholder".to_string());
            }
        }

        if self.sso.enabled && self.sso.remote_user_header.trim().is_empty() {
            return Err("SSO requires a remote user header name".to_string());
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationMode {
    /// LDAP plus local passwords for accounts without an authmap
    #[default]
    Mixed,
    /// Only LDAP, except the site owner and excluded accounts
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailUpdate {
    /// Copy the directory mail onto the account at every login
    #[default]
    OnEveryLogin,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountCreation {
    #[default]
    CreateOnLogin,
    /// Only identities that already have a local account may log in
    ExistingOnly,
}

/// Handling of a local account that shares the LDAP username but has no authmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExistingAccount {
    /// Link the existing account to the LDAP identity
    Associate,
    #[default]
    Reject,
}

/// Single sign-on settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SsoConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Server variable carrying the asserted username
    #[serde(default = "default_remote_user_header")]
    pub remote_user_header: String,

    /// Strip `@realm` and `DOMAIN\` from the asserted username
    #[serde(default)]
    pub strip_domain_name: bool,

    #[serde(default)]
    pub implementation: SsoImplementation,

    #[serde(default)]
    pub seamless_login: SeamlessLogin,

    /// Paths that never auto-trigger SSO; a trailing `*` matches a prefix
    #[serde(default)]
    pub excluded_paths: Vec<String>,

    /// Hosts that never auto-trigger SSO
    #[serde(default)]
    pub excluded_hosts: Vec<String>,

    /// Tell the user they were logged in via SSO
    #[serde(default)]
    pub notify_authentication: bool,
}

fn default_remote_user_header() -> String {
    crate::DEFAULT_REMOTE_USER_HEADER.to_string()
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote_user_header: default_remote_user_header(),
            strip_domain_name: false,
            implementation: SsoImplementation::default(),
            seamless_login: SeamlessLogin::default(),
            excluded_paths: Vec::new(),
            excluded_hosts: Vec::new(),
            notify_authentication: false,
        }
    }
}

/// Front-end module asserting the identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SsoImplementation {
    /// NTLM via mod_auth_sspi; sets the header directly
    #[default]
    ModAuthSspi,
    /// Kerberos via mod_auth_kerb; may only set `REDIRECT_<header>`
    ModAuthKerb,
}

/// When SSO runs without an explicit login request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeamlessLogin {
    /// Only the explicit SSO endpoint logs in
    #[default]
    Off,
    /// Anonymous visits to the login path log in automatically
    LoginPathOnly,
    /// Any anonymous page view logs in automatically
    EveryPage,
}

/// Admin form shape of [`AuthenticationConfig`]
///
/// List fields are newline-delimited text as typed into a textarea.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuthenticationForm {
    #[serde(default)]
    pub authentication_mode: AuthenticationMode,
    #[serde(default)]
    pub sids: Vec<String>,
    #[serde(default)]
    pub allow_only_if_text_in_dn: String,
    #[serde(default)]
    pub exclude_if_text_in_dn: String,
    #[serde(default)]
    pub exclude_if_no_authorizations: bool,
    #[serde(default)]
    pub allow_predicate: String,
    #[serde(default)]
    pub email_update: EmailUpdate,
    #[serde(default)]
    pub mail_template: String,
    #[serde(default)]
    pub account_creation: AccountCreation,
    #[serde(default)]
    pub existing_account: ExistingAccount,
    #[serde(default)]
    pub help_link_url: String,
    #[serde(default)]
    pub help_link_text: String,
    #[serde(default)]
    pub sso_enabled: bool,
    #[serde(default)]
    pub sso_remote_user_header: String,
    #[serde(default)]
    pub sso_strip_domain_name: bool,
    #[serde(default)]
    pub sso_implementation: SsoImplementation,
    #[serde(default)]
    pub sso_seamless_login: SeamlessLogin,
    #[serde(default)]
    pub sso_excluded_paths: String,
    #[serde(default)]
    pub sso_excluded_hosts: String,
    #[serde(default)]
    pub sso_notify_authentication: bool,
}

/// Split newline-delimited text into trimmed, non-empty lines
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl AuthenticationForm {
    /// Convert into a config. `predicate_evaluator_enabled` is a site
    /// capability, not a form field, so it is carried over from `current`.
    pub fn into_config(self, current: &AuthenticationConfig) -> AuthenticationConfig {
        let remote_user_header = non_empty(self.sso_remote_user_header)
            .unwrap_or_else(default_remote_user_header);

        AuthenticationConfig {
            authentication_mode: self.authentication_mode,
            sids: self.sids.into_iter().filter(|s| !s.trim().is_empty()).collect(),
            allow_only_if_text_in_dn: parse_lines(&self.allow_only_if_text_in_dn),
            exclude_if_text_in_dn: parse_lines(&self.exclude_if_text_in_dn),
            exclude_if_no_authorizations: self.exclude_if_no_authorizations,
            allow_predicate: non_empty(self.allow_predicate),
            predicate_evaluator_enabled: current.predicate_evaluator_enabled,
            email_update: self.email_update,
            mail_template: non_empty(self.mail_template),
            account_creation: self.account_creation,
            existing_account: self.existing_account,
            help_link_url: non_empty(self.help_link_url),
            help_link_text: non_empty(self.help_link_text),
            sso: SsoConfig {
                enabled: self.sso_enabled,
                remote_user_header,
                strip_domain_name: self.sso_strip_domain_name,
                implementation: self.sso_implementation,
                seamless_login: self.sso_seamless_login,
                excluded_paths: parse_lines(&self.sso_excluded_paths),
                excluded_hosts: parse_lines(&self.sso_excluded_hosts),
                notify_authentication: self.sso_notify_authentication,
            },
        }
    }

    /// Render a config back into form shape
    pub fn from_config(config: &AuthenticationConfig) -> Self {
        Self {
            authentication_mode: config.authentication_mode,
            sids: config.sids.clone(),
            allow_only_if_text_in_dn: config.allow_only_if_text_in_dn.join("\n"),
            exclude_if_text_in_dn: config.exclude_if_text_in_dn.join("\n"),
            exclude_if_no_authorizations: config.exclude_if_no_authorizations,
            allow_predicate: config.allow_predicate.clone().unwrap_or_default(),
            email_update: config.email_update,
            mail_template: config.mail_template.clone().unwrap_or_default(),
            account_creation: config.account_creation,
            existing_account: config.existing_account,
            help_link_url: config.help_link_url.clone().unwrap_or_default(),
            help_link_text: config.help_link_text.clone().unwrap_or_default(),
            sso_enabled: config.sso.enabled,
            sso_remote_user_header: config.sso.remote_user_header.clone(),
            sso_strip_domain_name: config.sso.strip_domain_name,
            sso_implementation: config.sso.implementation,
            sso_seamless_login: config.sso.seamless_login,
            sso_excluded_paths: config.sso.excluded_paths.join("\n"),
            sso_excluded_hosts: config.sso.excluded_hosts.join("\n"),
            sso_notify_authentication: config.sso.notify_authentication,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines_drops_blanks() {
        assert_eq!(
            parse_lines("pot\r\n\n  ou=staff  \n\t\n"),
            vec!["pot".to_string(), "ou=staff".to_string()]
        );
        assert!(parse_lines("").is_empty());
    }

    #[test]
    fn test_form_into_config() {
        let form = AuthenticationForm {
            sids: vec!["hogwarts".to_string(), "".to_string()],
            allow_only_if_text_in_dn: "pot\nou=gryffindor".to_string(),
            exclude_if_text_in_dn: "cn=ssnape".to_string(),
            allow_predicate: "   ".to_string(),
            sso_enabled: true,
            sso_strip_domain_name: true,
            sso_excluded_paths: "/admin*\n/cron".to_string(),
            ..Default::default()
        };

        let current = AuthenticationConfig {
            predicate_evaluator_enabled: false,
            ..Default::default()
        };
        let config = form.into_config(&current);

        assert_eq!(config.sids, vec!["hogwarts".to_string()]);
        assert_eq!(config.allow_only_if_text_in_dn.len(), 2);
        assert_eq!(config.exclude_if_text_in_dn, vec!["cn=ssnape".to_string()]);
        assert_eq!(config.allow_predicate, None);
        assert!(!config.predicate_evaluator_enabled);
        assert_eq!(config.sso.remote_user_header, "REMOTE_USER");
        assert_eq!(config.sso.excluded_paths.len(), 2);
    }

    #[test]
    fn test_form_roundtrip_preserves_lists() {
        let config = AuthenticationConfig {
            sids: vec!["hogwarts".to_string()],
            exclude_if_text_in_dn: vec!["cn=ssnape".to_string(), "ou=slytherin".to_string()],
            ..Default::default()
        };

        let back = AuthenticationForm::from_config(&config).into_config(&config);
        assert_eq!(back.exclude_if_text_in_dn, config.exclude_if_text_in_dn);
    }

    #[test]
    fn test_validation() {
        let mut config = AuthenticationConfig::default();
        assert!(config.validate(&["hogwarts"]).is_err());

        config.sids = vec!["hogwarts".to_string()];
        assert!(config.validate(&["hogwarts"]).is_ok());
        assert!(config.validate(&["durmstrang"]).is_err());

        config.mail_template = Some("noreply@hogwarts.edu".to_string());
        assert!(config.validate(&["hogwarts"]).is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: AuthenticationConfig = toml::from_str(
            r#"
            sids = ["hogwarts"]
            authentication_mode = "exclusive"

            [sso]
            enabled = true
            seamless_login = "login_path_only"
            "#,
        )
        .unwrap();

        assert_eq!(config.authentication_mode, AuthenticationMode::Exclusive);
        assert!(config.predicate_evaluator_enabled);
        assert_eq!(config.sso.seamless_login, SeamlessLogin::LoginPathOnly);
        assert_eq!(config.sso.remote_user_header, "REMOTE_USER");
        assert_eq!(config.existing_account, ExistingAccount::Reject);
    }
}
