//! LDAP/Active Directory access
//!
//! Provides directory lookups for the login flow via:
//! - LDAP (OpenLDAP, 389 Directory Server)
//! - Microsoft Active Directory
//! - An in-process directory for tests and dry runs
//!
//! Every configured server is reached through the [`Directory`] trait and
//! registered by `sid` in a [`ServerRegistry`].

mod client;
mod memory;
mod types;

pub use client::LdapClient;
pub use memory::MemoryDirectory;
pub use types::*;

use async_trait::async_trait;
use ldapgate_core::types::{
    AuthenticationConfig, AuthenticationMode, LdapEntry, LdapServerDefinition,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// LDAP result code for invalidCredentials
pub const RC_INVALID_CREDENTIALS: u32 = 49;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Connection, bind or search failure on the server side
    #[error("{0}")]
    Unavailable(String),

    /// The supplied password was rejected while binding as the user
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The username matched more than one entry
    #[error("username matched {0} entries")]
    Ambiguous(usize),

    /// The server definition cannot serve this request
    #[error("{0}")]
    Misconfigured(String),
}

/// One configured directory server
#[async_trait]
pub trait Directory: Send + Sync {
    fn definition(&self) -> &LdapServerDefinition;

    fn sid(&self) -> &str {
        &self.definition().sid
    }

    /// Locate the entry for a username across all base DNs.
    ///
    /// `password` is only used by servers that bind as the user before
    /// searching.
    async fn find_entry(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<Option<LdapEntry>, DirectoryError>;

    /// Bind as the entry; `Ok(false)` when the password is rejected
    async fn verify_password(&self, entry: &LdapEntry, password: &str)
        -> Result<bool, DirectoryError>;

    /// Bind and read the root DSE
    async fn test_connection(&self) -> Result<LdapServerInfo, DirectoryError>;
}

/// Configured directories keyed by `sid`, in configuration order
#[derive(Clone, Default)]
pub struct ServerRegistry {
    order: Vec<String>,
    directories: HashMap<String, Arc<dyn Directory>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build live LDAP clients for every definition
    pub fn from_definitions(definitions: &[LdapServerDefinition]) -> Self {
        let mut registry = Self::new();
        for definition in definitions {
            registry.insert(Arc::new(LdapClient::new(definition.clone())));
        }
        registry
    }

    /// Register a directory, replacing any previous one with the same sid
    pub fn insert(&mut self, directory: Arc<dyn Directory>) {
        let sid = directory.sid().to_string();
        if !self.directories.contains_key(&sid) {
            self.order.push(sid.clone());
        }
        self.directories.insert(sid, directory);
    }

    pub fn get(&self, sid: &str) -> Option<Arc<dyn Directory>> {
        self.directories.get(sid).cloned()
    }

    pub fn sids(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn Directory>> {
        self.order
            .iter()
            .filter_map(|sid| self.directories.get(sid).cloned())
            .collect()
    }

    /// Servers consulted for a login attempt, in order.
    ///
    /// Mixed mode walks every enabled server listed in `sids`; exclusive
    /// mode only consults the first of them.
    pub fn candidates(&self, config: &AuthenticationConfig) -> Vec<Arc<dyn Directory>> {
        let enabled = config
            .sids
            .iter()
            .filter_map(|sid| self.directories.get(sid))
            .filter(|d| d.definition().enabled)
            .cloned();

        match config.authentication_mode {
            AuthenticationMode::Mixed => enabled.collect(),
            AuthenticationMode::Exclusive => enabled.take(1).collect(),
        }
    }
}
