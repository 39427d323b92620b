//! Status and diagnostics types for directory servers

use ldapgate_core::types::{BindMethod, LdapServerDefinition, LdapServerType};
use serde::{Deserialize, Serialize};

/// LDAP server information read from the root DSE
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LdapServerInfo {
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub naming_contexts: Vec<String>,
    pub supported_ldap_version: Vec<String>,
}

/// Response from a connection test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConnectionResponse {
    pub sid: String,
    pub success: bool,
    pub message: String,
    pub server_info: Option<LdapServerInfo>,
}

/// Server definition with the bind password removed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizedServer {
    pub sid: String,
    pub name: String,
    pub enabled: bool,
    pub server_type: LdapServerType,
    pub server_url: String,
    pub start_tls: bool,
    pub bind_method: BindMethod,
    pub bind_dn: String,
    pub has_bind_password: bool,
    pub user_dn_expression: Option<String>,
    pub base_dns: Vec<String>,
    pub user_attr: String,
    pub account_name_attr: String,
    pub mail_attr: String,
    pub unique_persistent_attr: Option<String>,
    pub group_attr: String,
    pub timeout_seconds: u64,
}

impl From<&LdapServerDefinition> for SanitizedServer {
    fn from(def: &LdapServerDefinition) -> Self {
        Self {
            sid: def.sid.clone(),
            name: def.name.clone(),
            enabled: def.enabled,
            server_type: def.server_type,
            server_url: def.server_url.clone(),
            start_tls: def.start_tls,
            bind_method: def.bind_method,
            bind_dn: def.bind_dn.clone(),
            has_bind_password: !def.bind_password.is_empty(),
            user_dn_expression: def.user_dn_expression.clone(),
            base_dns: def.base_dns.clone(),
            user_attr: def.user_attr.clone(),
            account_name_attr: def.account_name_attr().to_string(),
            mail_attr: def.mail_attr.clone(),
            unique_persistent_attr: def.unique_persistent_attr.clone(),
            group_attr: def.group_attr.clone(),
            timeout_seconds: def.timeout_seconds,
        }
    }
}
