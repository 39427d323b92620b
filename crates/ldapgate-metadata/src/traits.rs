//! Account repository trait
//!
//! Defines the storage operations the login flow and admin API need.
//! Authmap uniqueness on `(module, authname)` is the store's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ldapgate_core::types::{AccountStatus, Authmap, LocalAccount, NewAccount};
use ldapgate_core::Result;

#[async_trait]
pub trait AccountStore: Send + Sync {
    // ============= Account Operations =============

    async fn create_account(&self, account: &NewAccount) -> Result<LocalAccount>;

    /// Create the site owner with uid 1; a no-op returning the existing
    /// owner when one is present
    async fn ensure_site_owner(&self, account: &NewAccount) -> Result<LocalAccount>;

    async fn get_account(&self, uid: i64) -> Result<Option<LocalAccount>>;

    /// Lookup by name, case-insensitive
    async fn get_account_by_name(&self, name: &str) -> Result<Option<LocalAccount>>;

    async fn list_accounts(&self) -> Result<Vec<LocalAccount>>;

    async fn update_mail(&self, uid: i64, mail: Option<&str>) -> Result<()>;

    async fn update_roles(&self, uid: i64, roles: &[String]) -> Result<()>;

    async fn set_status(&self, uid: i64, status: AccountStatus) -> Result<()>;

    async fn set_ldap_excluded(&self, uid: i64, excluded: bool) -> Result<()>;

    async fn touch_login(&self, uid: i64, at: DateTime<Utc>) -> Result<()>;

    // ============= Authmap Operations =============

    async fn get_account_by_authname(
        &self,
        module: &str,
        authname: &str,
    ) -> Result<Option<LocalAccount>>;

    async fn get_authmap(&self, uid: i64, module: &str) -> Result<Option<Authmap>>;

    /// Fails with `ProvisioningError` when `(module, authname)` is taken
    async fn create_authmap(&self, uid: i64, module: &str, authname: &str) -> Result<Authmap>;

    /// Create an account and its authmap atomically
    async fn provision_account(
        &self,
        account: &NewAccount,
        module: &str,
        authname: &str,
    ) -> Result<LocalAccount>;

    // ============= Site Configuration =============

    async fn put_site_config(&self, name: &str, json: &str) -> Result<()>;

    async fn get_site_config(&self, name: &str) -> Result<Option<String>>;

    async fn health_check(&self) -> Result<()>;
}
