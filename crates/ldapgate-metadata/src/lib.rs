//! Account storage for ldapgate
//!
//! Local accounts, authmap links and persisted site configuration, backed
//! by SQLite.

pub mod repository;
pub mod traits;

pub use repository::MetadataStore;
pub use traits::*;
