//! Authentication for ldapgate
//!
//! A login attempt flows through three stages:
//! credential resolution against the configured directories, the policy
//! gate, and the account mapper that links the identity to a local account.

pub mod authenticator;
pub mod authorization;
pub mod ldap;
pub mod mapper;
pub mod policy;
pub mod predicate;
pub mod resolver;
pub mod sso;

pub use authenticator::{Authenticator, LoginMethod, LoginOutcome, CONFIG_KEY};
pub use authorization::{AuthorizationProvider, GroupMappingAuthorization, NoAuthorization};
pub use ldap::{
    Directory, DirectoryError, LdapClient, LdapServerInfo, MemoryDirectory, SanitizedServer,
    ServerRegistry, TestConnectionResponse,
};
pub use mapper::{AccountMapper, MappedAccount};
pub use policy::{PolicyDecision, PolicyGate};
pub use predicate::{EntryPredicate, Expression, PredicateError};
pub use resolver::{resolve_asserted, resolve_credentials, ResolvedIdentity};
