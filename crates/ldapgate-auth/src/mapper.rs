//! Account mapper
//!
//! Links an admitted directory identity to exactly one local account,
//! provisioning or associating as configured. The authname recorded in the
//! authmap is the entry's persistent id when the server has one configured,
//! so renames in the directory keep pointing at the same local account.

use crate::resolver::ResolvedIdentity;
use chrono::Utc;
use ldapgate_core::types::{
    AccountCreation, AccountStatus, AuthenticationConfig, EmailUpdate, ExistingAccount,
    LocalAccount, NewAccount,
};
use ldapgate_core::utils::normalize_authname;
use ldapgate_core::{Error, Result, AUTHMAP_MODULE};
use ldapgate_metadata::AccountStore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MappedAccount {
    pub account: LocalAccount,
    /// True when the account was created by this login
    pub provisioned: bool,
}

pub struct AccountMapper<'a> {
    store: &'a dyn AccountStore,
    config: &'a AuthenticationConfig,
    /// Replace local roles with the grants
    sync_roles: bool,
}

impl<'a> AccountMapper<'a> {
    pub fn new(store: &'a dyn AccountStore, config: &'a AuthenticationConfig) -> Self {
        Self {
            store,
            config,
            sync_roles: false,
        }
    }

    pub fn with_role_sync(mut self, sync_roles: bool) -> Self {
        self.sync_roles = sync_roles;
        self
    }

    /// Authname linking the identity to its local account
    pub fn authname(identity: &ResolvedIdentity) -> String {
        match identity.persistent_id() {
            Some(puid) => puid,
            None => {
                if identity.definition().unique_persistent_attr.is_some() {
                    warn!(
                        sid = %identity.sid(),
                        dn = %identity.entry.dn,
                        "Entry lacks its persistent id attribute, linking by account name"
                    );
                }
                normalize_authname(&identity.account_name())
            }
        }
    }

    fn mail_for(&self, identity: &ResolvedIdentity, account_name: &str) -> Option<String> {
        identity.mail().or_else(|| {
            self.config
                .mail_template
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| t.replace("{username}", account_name))
        })
    }

    pub async fn map(&self, identity: &ResolvedIdentity, grants: &[String]) -> Result<MappedAccount> {
        let authname = Self::authname(identity);
        let account_name = identity.account_name();
        let mail = self.mail_for(identity, &account_name);

        if let Some(account) = self
            .store
            .get_account_by_authname(AUTHMAP_MODULE, &authname)
            .await?
        {
            let account = self.refresh(account, mail.as_deref(), grants).await?;
            return Ok(MappedAccount {
                account,
                provisioned: false,
            });
        }

        if let Some(existing) = self.store.get_account_by_name(&account_name).await? {
            let account = self.associate(existing, &authname, mail.as_deref(), grants).await?;
            return Ok(MappedAccount {
                account,
                provisioned: false,
            });
        }

        if self.config.account_creation == AccountCreation::ExistingOnly {
            info!(name = %account_name, "No local account and account creation is disabled");
            return Err(Error::ProvisioningError(format!(
                "no local account for '{}' and account creation is disabled",
                account_name
            )));
        }

        let new_account = NewAccount {
            name: account_name.clone(),
            mail,
            roles: grants.to_vec(),
            ..Default::default()
        };

        let mut account = self
            .store
            .provision_account(&new_account, AUTHMAP_MODULE, &authname)
            .await?;

        let now = Utc::now();
        self.store.touch_login(account.uid, now).await?;
        account.last_login = Some(now);

        info!(
            uid = account.uid,
            name = %account.name,
            sid = %identity.sid(),
            authname = %authname,
            "Provisioned account from LDAP"
        );

        Ok(MappedAccount {
            account,
            provisioned: true,
        })
    }

    async fn associate(
        &self,
        existing: LocalAccount,
        authname: &str,
        mail: Option<&str>,
        grants: &[String],
    ) -> Result<LocalAccount> {
        if existing.bypasses_ldap() {
            warn!(uid = existing.uid, name = %existing.name, "Directory identity matches an account excluded from LDAP");
            return Err(Error::UserDisallowed(
                "account is excluded from LDAP authentication".to_string(),
            ));
        }

        if let Some(authmap) = self.store.get_authmap(existing.uid, AUTHMAP_MODULE).await? {
            warn!(
                uid = existing.uid,
                linked = %authmap.authname,
                authname,
                "Local account is already linked to another directory identity"
            );
            return Err(Error::ProvisioningError(format!(
                "account '{}' is linked to another directory identity",
                existing.name
            )));
        }

        if self.config.existing_account == ExistingAccount::Reject {
            info!(uid = existing.uid, name = %existing.name, "Refusing to associate existing local account");
            return Err(Error::ProvisioningError(format!(
                "local account '{}' already exists",
                existing.name
            )));
        }

        self.store
            .create_authmap(existing.uid, AUTHMAP_MODULE, authname)
            .await?;
        info!(uid = existing.uid, name = %existing.name, authname, "Associated existing account with LDAP identity");

        self.refresh(existing, mail, grants).await
    }

    /// Apply per-login updates to a linked account
    async fn refresh(
        &self,
        mut account: LocalAccount,
        mail: Option<&str>,
        grants: &[String],
    ) -> Result<LocalAccount> {
        if account.status == AccountStatus::Blocked {
            info!(uid = account.uid, name = %account.name, "Login denied: account is blocked");
            return Err(Error::UserDisallowed("account is blocked".to_string()));
        }

        if self.config.email_update == EmailUpdate::OnEveryLogin {
            if let Some(mail) = mail {
                if account.mail.as_deref() != Some(mail) {
                    debug!(uid = account.uid, mail, "Updating mail from directory");
                    self.store.update_mail(account.uid, Some(mail)).await?;
                    account.mail = Some(mail.to_string());
                }
            }
        }

        if self.sync_roles && account.roles != grants {
            debug!(uid = account.uid, roles = ?grants, "Syncing roles from authorizations");
            self.store.update_roles(account.uid, grants).await?;
            account.roles = grants.to_vec();
        }

        let now = Utc::now();
        self.store.touch_login(account.uid, now).await?;
        account.last_login = Some(now);

        Ok(account)
    }
}
