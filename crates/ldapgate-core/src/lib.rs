//! ldapgate Core Library
//!
//! Configuration, error taxonomy and domain types shared by the LDAP login
//! service crates.

pub mod config;
pub mod error;
pub mod messages;
pub mod types;
pub mod utils;

pub use config::LdapgateConfig;
pub use error::{Error, Result};

/// ldapgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Authmap module name for identities linked by LDAP authentication
pub const AUTHMAP_MODULE: &str = "ldap_authentication";

/// Local account id of the site owner
pub const SITE_OWNER_UID: i64 = 1;

/// Default header carrying the SSO-asserted username
pub const DEFAULT_REMOTE_USER_HEADER: &str = "REMOTE_USER";

/// Name of the session cookie issued after a successful login
pub const SESSION_COOKIE: &str = "ldapgate_session";
