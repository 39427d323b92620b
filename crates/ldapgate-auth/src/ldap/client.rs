//! LDAP Client implementation
//!
//! Handles LDAP connections, search binds and password verification.
//! Supports LDAP, LDAPS (SSL) and STARTTLS connections.

use super::{Directory, DirectoryError, LdapServerInfo, RC_INVALID_CREDENTIALS};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use ldapgate_core::types::{BindMethod, LdapEntry, LdapServerDefinition};
use std::time::Duration;
use tracing::{debug, warn};

/// Live directory backed by an LDAP server
pub struct LdapClient {
    definition: LdapServerDefinition,
}

impl LdapClient {
    pub fn new(definition: LdapServerDefinition) -> Self {
        Self { definition }
    }

    /// Applies to the connect and, via `with_timeout`, to each single operation
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.definition.timeout_seconds)
    }

    /// Create LDAP connection with proper TLS settings
    async fn create_connection(&self) -> Result<(LdapConnAsync, Ldap), DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout())
            .set_starttls(self.definition.start_tls);

        debug!(sid = %self.definition.sid, url = %self.definition.server_url, "Connecting to LDAP server");

        LdapConnAsync::with_settings(settings, &self.definition.server_url)
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("Failed to connect to LDAP server: {}", e)))
    }

    /// Bind for searching according to the configured bind method
    async fn search_bind(
        &self,
        ldap: &mut Ldap,
        username: &str,
        password: Option<&str>,
    ) -> Result<(), DirectoryError> {
        let (dn, secret) = match self.definition.bind_method {
            BindMethod::Anonymous => return Ok(()),
            BindMethod::ServiceAccount => (
                self.definition.bind_dn.clone(),
                self.definition.bind_password.as_str(),
            ),
            BindMethod::User => {
                let password = password.filter(|p| !p.is_empty()).ok_or_else(|| {
                    DirectoryError::Misconfigured(format!(
                        "Server '{}' binds as the user and needs a password",
                        self.definition.sid
                    ))
                })?;
                let dn = self.definition.user_bind_dn(&ldap3::dn_escape(username)).ok_or_else(|| {
                    DirectoryError::Misconfigured(format!(
                        "Server '{}' has no user DN expression",
                        self.definition.sid
                    ))
                })?;
                (dn, password)
            }
        };

        let result = ldap
            .with_timeout(self.timeout())
            .simple_bind(&dn, secret)
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("Bind failed: {}", e)))?;

        match result.rc {
            0 => Ok(()),
            RC_INVALID_CREDENTIALS if self.definition.bind_method == BindMethod::User => {
                Err(DirectoryError::InvalidCredentials)
            }
            rc => Err(DirectoryError::Unavailable(format!(
                "Bind as '{}' failed with code: {}",
                dn, rc
            ))),
        }
    }

    fn requested_attrs(&self) -> Vec<&str> {
        let mut attrs = vec!["*"];
        // Operational attributes like entryUUID are only returned on request
        if let Some(puid) = self.definition.unique_persistent_attr.as_deref() {
            attrs.push(puid);
        }
        attrs
    }
}

#[async_trait]
impl Directory for LdapClient {
    fn definition(&self) -> &LdapServerDefinition {
        &self.definition
    }

    async fn find_entry(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<Option<LdapEntry>, DirectoryError> {
        let (conn, mut ldap) = self.create_connection().await?;
        ldap3::drive!(conn);

        self.search_bind(&mut ldap, username, password).await?;

        let filter = format!(
            "({}={})",
            self.definition.user_attr,
            ldap3::ldap_escape(username)
        );
        let attrs = self.requested_attrs();

        let mut found = Vec::new();
        for base in self.definition.base_dns.iter().filter(|b| !b.trim().is_empty()) {
            debug!(sid = %self.definition.sid, base = %base, filter = %filter, "Searching for user");

            let (rs, _res) = ldap
                .with_timeout(self.timeout())
                .search(base, Scope::Subtree, &filter, attrs.clone())
                .await
                .map_err(|e| DirectoryError::Unavailable(format!("User search failed: {}", e)))?
                .success()
                .map_err(|e| DirectoryError::Unavailable(format!("User search error: {}", e)))?;

            found.extend(rs.into_iter().map(SearchEntry::construct));
        }

        let _ = ldap.unbind().await;

        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop().map(|entry| to_entry(&self.definition.sid, entry))),
            n => {
                warn!(sid = %self.definition.sid, username, matches = n, "Username is ambiguous");
                Err(DirectoryError::Ambiguous(n))
            }
        }
    }

    async fn verify_password(
        &self,
        entry: &LdapEntry,
        password: &str,
    ) -> Result<bool, DirectoryError> {
        // Servers treat an empty password as an anonymous bind
        if password.is_empty() {
            return Ok(false);
        }

        let (conn, mut ldap) = self.create_connection().await?;
        ldap3::drive!(conn);

        let result = ldap
            .with_timeout(self.timeout())
            .simple_bind(&entry.dn, password)
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("User bind failed: {}", e)))?;
        let _ = ldap.unbind().await;

        match result.rc {
            0 => Ok(true),
            RC_INVALID_CREDENTIALS => Ok(false),
            rc => Err(DirectoryError::Unavailable(format!(
                "User bind failed with code: {}",
                rc
            ))),
        }
    }

    async fn test_connection(&self) -> Result<LdapServerInfo, DirectoryError> {
        let (conn, mut ldap) = self.create_connection().await?;
        ldap3::drive!(conn);

        if self.definition.bind_method == BindMethod::ServiceAccount {
            self.search_bind(&mut ldap, "", None).await?;
        }

        // Query root DSE for server info
        let (rs, _res) = ldap
            .with_timeout(self.timeout())
            .search(
                "",
                Scope::Base,
                "(objectClass=*)",
                vec![
                    "vendorName",
                    "vendorVersion",
                    "namingContexts",
                    "supportedLDAPVersion",
                ],
            )
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("Root DSE query failed: {}", e)))?
            .success()
            .map_err(|e| DirectoryError::Unavailable(format!("Root DSE error: {}", e)))?;

        let _ = ldap.unbind().await;

        let info = match rs.into_iter().next() {
            Some(result) => {
                let entry = SearchEntry::construct(result);
                LdapServerInfo {
                    vendor: get_first_attr(&entry, "vendorName"),
                    version: get_first_attr(&entry, "vendorVersion"),
                    naming_contexts: entry
                        .attrs
                        .get("namingContexts")
                        .cloned()
                        .unwrap_or_default(),
                    supported_ldap_version: entry
                        .attrs
                        .get("supportedLDAPVersion")
                        .cloned()
                        .unwrap_or_default(),
                }
            }
            None => LdapServerInfo {
                supported_ldap_version: vec!["3".to_string()],
                ..Default::default()
            },
        };

        Ok(info)
    }
}

fn get_first_attr(entry: &SearchEntry, attr: &str) -> Option<String> {
    entry.attrs.get(attr).and_then(|v| v.first().cloned())
}

/// Binary values (objectGUID and friends) are kept as lowercase hex
fn to_entry(sid: &str, entry: SearchEntry) -> LdapEntry {
    let mut attributes = entry.attrs;
    for (name, values) in entry.bin_attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.iter().map(hex::encode));
    }

    LdapEntry {
        dn: entry.dn,
        sid: sid.to_string(),
        attributes,
    }
}
