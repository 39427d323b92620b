//! Credential resolution
//!
//! Walks the candidate servers in order and returns the first entry whose
//! password verifies. A server that fails is logged and skipped, so one
//! unreachable directory does not block logins served by another.

use crate::ldap::{Directory, DirectoryError, ServerRegistry};
use ldapgate_core::types::{AuthenticationConfig, LdapEntry, LdapServerDefinition};
use ldapgate_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A directory entry together with the server that produced it
#[derive(Clone)]
pub struct ResolvedIdentity {
    pub entry: LdapEntry,
    /// Name as submitted or asserted
    pub username: String,
    directory: Arc<dyn Directory>,
}

impl ResolvedIdentity {
    pub fn new(entry: LdapEntry, username: &str, directory: Arc<dyn Directory>) -> Self {
        Self {
            entry,
            username: username.to_string(),
            directory,
        }
    }

    pub fn sid(&self) -> &str {
        self.directory.sid()
    }

    pub fn definition(&self) -> &LdapServerDefinition {
        self.directory.definition()
    }

    /// Local account name from the server's account name attribute,
    /// falling back to the submitted username
    pub fn account_name(&self) -> String {
        self.entry
            .get_attr(self.definition().account_name_attr())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.username.as_str())
            .to_string()
    }

    pub fn mail(&self) -> Option<String> {
        self.entry
            .get_attr(&self.definition().mail_attr)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    }

    /// Value of the unique persistent id attribute, when configured and present
    pub fn persistent_id(&self) -> Option<String> {
        let attr = self.definition().unique_persistent_attr.as_deref()?;
        self.entry
            .get_attr(attr)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl std::fmt::Debug for ResolvedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedIdentity")
            .field("sid", &self.sid())
            .field("dn", &self.entry.dn)
            .field("username", &self.username)
            .finish()
    }
}

/// Outcome ranks used to pick the error returned when no server succeeds
#[derive(Debug, Default)]
struct Failures {
    invalid_credentials: bool,
    server_error: Option<String>,
}

impl Failures {
    fn into_error(self) -> Error {
        if self.invalid_credentials {
            Error::InvalidCredentials
        } else if let Some(message) = self.server_error {
            Error::ServerError(message)
        } else {
            Error::NotFound
        }
    }
}

/// Resolve a username and password to a directory entry.
///
/// When no server admits the user, `InvalidCredentials` outranks
/// `ServerError`, which outranks `NotFound`.
pub async fn resolve_credentials(
    registry: &ServerRegistry,
    config: &AuthenticationConfig,
    username: &str,
    password: &str,
) -> Result<ResolvedIdentity> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(Error::InvalidCredentials);
    }

    resolve(registry, config, username, Some(password)).await
}

/// Resolve an SSO-asserted username without a password
pub async fn resolve_asserted(
    registry: &ServerRegistry,
    config: &AuthenticationConfig,
    username: &str,
) -> Result<ResolvedIdentity> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::NotFound);
    }

    resolve(registry, config, username, None).await
}

async fn resolve(
    registry: &ServerRegistry,
    config: &AuthenticationConfig,
    username: &str,
    password: Option<&str>,
) -> Result<ResolvedIdentity> {
    let candidates = registry.candidates(config);
    if candidates.is_empty() {
        error!(sids = ?config.sids, "No enabled LDAP server is configured for authentication");
        return Err(Error::DisabledForBadConfig(
            "no enabled LDAP server is configured for authentication".to_string(),
        ));
    }

    let mut failures = Failures::default();

    for directory in candidates {
        let sid = directory.sid().to_string();

        let entry = match directory.find_entry(username, password).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(sid = %sid, username, "No entry on server");
                continue;
            }
            Err(DirectoryError::InvalidCredentials) => {
                failures.invalid_credentials = true;
                continue;
            }
            Err(DirectoryError::Ambiguous(n)) => {
                warn!(sid = %sid, username, matches = n, "Skipping server with ambiguous match");
                continue;
            }
            Err(e) => {
                warn!(sid = %sid, username, error = %e, "LDAP server failed during lookup");
                failures.server_error.get_or_insert_with(|| format!("{}: {}", sid, e));
                continue;
            }
        };

        let Some(password) = password else {
            return Ok(ResolvedIdentity::new(entry, username, directory));
        };

        match directory.verify_password(&entry, password).await {
            Ok(true) => return Ok(ResolvedIdentity::new(entry, username, directory)),
            Ok(false) => {
                debug!(sid = %sid, dn = %entry.dn, "Password rejected");
                failures.invalid_credentials = true;
            }
            Err(e) => {
                warn!(sid = %sid, dn = %entry.dn, error = %e, "LDAP server failed during bind");
                failures.server_error.get_or_insert_with(|| format!("{}: {}", sid, e));
            }
        }
    }

    Err(failures.into_error())
}
