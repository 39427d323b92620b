//! In-process directory
//!
//! Serves entries from memory with the same lookup rules as a live server.
//! Used by tests and by `check-config` dry runs.

use super::{Directory, DirectoryError, LdapServerInfo};
use async_trait::async_trait;
use ldapgate_core::types::{BindMethod, LdapEntry, LdapServerDefinition};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

struct StoredEntry {
    entry: LdapEntry,
    password: String,
}

pub struct MemoryDirectory {
    definition: LdapServerDefinition,
    entries: RwLock<Vec<StoredEntry>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new(definition: LdapServerDefinition) -> Self {
        Self {
            definition,
            entries: RwLock::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Add an entry; its `sid` is set to this directory's
    pub fn with_entry(self, mut entry: LdapEntry, password: &str) -> Self {
        entry.sid = self.definition.sid.clone();
        if let Ok(mut entries) = self.entries.write() {
            entries.push(StoredEntry {
                entry,
                password: password.to_string(),
            });
        }
        self
    }

    /// Simulate the server going down or coming back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `find_entry` calls served
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(format!(
                "Failed to connect to LDAP server: {}",
                self.definition.server_url
            )));
        }
        Ok(())
    }

    fn in_base(&self, dn: &str) -> bool {
        let dn = dn.to_ascii_lowercase();
        self.definition
            .base_dns
            .iter()
            .filter(|b| !b.trim().is_empty())
            .any(|base| dn.ends_with(&base.trim().to_ascii_lowercase()))
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    fn definition(&self) -> &LdapServerDefinition {
        &self.definition
    }

    async fn find_entry(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<Option<LdapEntry>, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let entries = self
            .entries
            .read()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))?;

        let mut found: Vec<&StoredEntry> = entries
            .iter()
            .filter(|s| self.in_base(&s.entry.dn))
            .filter(|s| {
                s.entry
                    .get_attrs(&self.definition.user_attr)
                    .iter()
                    .any(|v| v.eq_ignore_ascii_case(username))
            })
            .collect();

        if found.len() > 1 {
            return Err(DirectoryError::Ambiguous(found.len()));
        }

        let Some(stored) = found.pop() else {
            return Ok(None);
        };

        if self.definition.bind_method == BindMethod::User {
            match password.filter(|p| !p.is_empty()) {
                None => {
                    return Err(DirectoryError::Misconfigured(format!(
                        "Server '{}' binds as the user and needs a password",
                        self.definition.sid
                    )))
                }
                Some(p) if p != stored.password => return Err(DirectoryError::InvalidCredentials),
                Some(_) => {}
            }
        }

        Ok(Some(stored.entry.clone()))
    }

    async fn verify_password(
        &self,
        entry: &LdapEntry,
        password: &str,
    ) -> Result<bool, DirectoryError> {
        self.check_available()?;

        if password.is_empty() {
            return Ok(false);
        }

        let entries = self
            .entries
            .read()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))?;

        Ok(entries
            .iter()
            .any(|s| s.entry.dn.eq_ignore_ascii_case(&entry.dn) && s.password == password))
    }

    async fn test_connection(&self) -> Result<LdapServerInfo, DirectoryError> {
        self.check_available()?;

        Ok(LdapServerInfo {
            vendor: Some("ldapgate".to_string()),
            version: Some(ldapgate_core::VERSION.to_string()),
            naming_contexts: self.definition.base_dns.clone(),
            supported_ldap_version: vec!["3".to_string()],
        })
    }
}
