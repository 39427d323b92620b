//! Login orchestration
//!
//! Ties credential resolution, the policy gate and the account mapper into
//! the two entry points used by the HTTP layer: password login and SSO.

use crate::authorization::{AuthorizationProvider, NoAuthorization};
use crate::ldap::ServerRegistry;
use crate::mapper::AccountMapper;
use crate::policy::PolicyGate;
use crate::predicate::{EntryPredicate, Expression};
use crate::resolver::{resolve_asserted, resolve_credentials, ResolvedIdentity};
use crate::sso;
use chrono::Utc;
use ldapgate_core::messages;
use ldapgate_core::types::{
    AuthenticationConfig, AuthenticationMode, LocalAccount, NewAccount, RequestContext,
};
use ldapgate_core::{Error, Result, AUTHMAP_MODULE};
use ldapgate_crypto::PasswordHasher;
use ldapgate_metadata::AccountStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Site configuration key holding the persisted authentication settings
pub const CONFIG_KEY: &str = "ldap_authentication";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoginMethod {
    /// Local password hash
    Local,
    /// Password verified by a directory bind
    Ldap { sid: String },
    /// Identity asserted by the front-end web server
    Sso { sid: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub account: LocalAccount,
    pub method: LoginMethod,
    pub provisioned: bool,
    /// Notices for the user, e.g. the SSO confirmation
    pub messages: Vec<String>,
}

pub struct Authenticator {
    config: RwLock<AuthenticationConfig>,
    registry: ServerRegistry,
    store: Arc<dyn AccountStore>,
    authorization: Arc<dyn AuthorizationProvider>,
    predicates: Vec<Arc<dyn EntryPredicate>>,
    hasher: PasswordHasher,
}

impl Authenticator {
    pub fn new(
        config: AuthenticationConfig,
        registry: ServerRegistry,
        store: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            registry,
            store,
            authorization: Arc::new(NoAuthorization),
            predicates: Vec::new(),
            hasher: PasswordHasher::new(),
        }
    }

    pub fn with_authorization(mut self, authorization: Arc<dyn AuthorizationProvider>) -> Self {
        self.authorization = authorization;
        self
    }

    /// Register an additional allow rule checked by the policy gate
    pub fn with_predicate(mut self, predicate: Arc<dyn EntryPredicate>) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn store(&self) -> Arc<dyn AccountStore> {
        self.store.clone()
    }

    pub fn authorization(&self) -> Arc<dyn AuthorizationProvider> {
        self.authorization.clone()
    }

    /// Snapshot of the current settings
    pub async fn config(&self) -> AuthenticationConfig {
        self.config.read().await.clone()
    }

    /// Validate, persist and apply new settings
    pub async fn update_config(&self, config: AuthenticationConfig) -> Result<()> {
        self.check_settings(&config).map_err(Error::InvalidArgument)?;

        let json = serde_json::to_string(&config)
            .map_err(|e| Error::InternalError(format!("serialize settings: {}", e)))?;
        self.store.put_site_config(CONFIG_KEY, &json).await?;

        *self.config.write().await = config;
        info!("Authentication settings updated");
        Ok(())
    }

    fn check_settings(&self, config: &AuthenticationConfig) -> std::result::Result<(), String> {
        config.validate(&self.registry.sids())?;
        if let Some(source) = config.predicate_source() {
            Expression::parse(source).map_err(|e| format!("allow predicate: {}", e))?;
        }
        Ok(())
    }

    /// Apply settings saved through the admin API, if any.
    ///
    /// Saved settings that no longer validate are ignored with a warning.
    pub async fn load_persisted_config(&self) -> Result<bool> {
        let Some(json) = self.store.get_site_config(CONFIG_KEY).await? else {
            return Ok(false);
        };

        let config: AuthenticationConfig = match serde_json::from_str(&json) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable saved authentication settings");
                return Ok(false);
            }
        };

        if let Err(e) = self.check_settings(&config) {
            warn!(error = %e, "Ignoring invalid saved authentication settings");
            return Ok(false);
        }

        *self.config.write().await = config;
        info!("Loaded saved authentication settings");
        Ok(true)
    }

    /// Message shown at the login form for a failed attempt
    pub async fn failure_message(&self, err: &Error) -> String {
        let config = self.config.read().await;
        messages::with_help_link(
            err.user_message(),
            config.help_link_url.as_deref(),
            config.help_link_text.as_deref(),
        )
    }

    fn hash(&self, password: &str) -> Result<String> {
        self.hasher
            .hash(password)
            .map_err(|e| Error::InternalError(e.to_string()))
    }

    /// Create the uid 1 account unless it exists
    pub async fn ensure_site_owner(
        &self,
        name: &str,
        mail: Option<&str>,
        password: Option<&str>,
    ) -> Result<LocalAccount> {
        let account = NewAccount {
            name: name.to_string(),
            mail: mail.map(str::to_string),
            pass_hash: password.map(|p| self.hash(p)).transpose()?,
            ..Default::default()
        };
        self.store.ensure_site_owner(&account).await
    }

    /// Create an account with a local password
    pub async fn create_local_account(
        &self,
        name: &str,
        mail: Option<&str>,
        password: &str,
        ldap_excluded: bool,
    ) -> Result<LocalAccount> {
        let account = NewAccount {
            name: name.to_string(),
            mail: mail.map(str::to_string),
            pass_hash: Some(self.hash(password)?),
            ldap_excluded,
            ..Default::default()
        };
        self.store.create_account(&account).await
    }

    /// Check site owner credentials without recording a login
    pub async fn verify_site_owner(&self, name: &str, password: &str) -> Result<LocalAccount> {
        let account = self
            .store
            .get_account_by_name(name.trim())
            .await?
            .filter(LocalAccount::is_site_owner)
            .ok_or(Error::InvalidCredentials)?;

        let hash = account.pass_hash.as_deref().ok_or(Error::InvalidCredentials)?;
        match self.hasher.verify(password, hash) {
            Ok(true) => Ok(account),
            _ => Err(Error::InvalidCredentials),
        }
    }

    /// Password login
    pub async fn login(&self, name: &str, password: &str) -> Result<LoginOutcome> {
        let name = name.trim();
        if name.is_empty() || password.is_empty() {
            return Err(Error::InvalidCredentials);
        }

        let config = self.config().await;

        if let Some(local) = self.store.get_account_by_name(name).await? {
            if local.bypasses_ldap() {
                debug!(uid = local.uid, "Account bypasses LDAP, using local password");
                return self.local_login(local, password).await;
            }

            if config.authentication_mode == AuthenticationMode::Mixed
                && local.pass_hash.is_some()
                && self
                    .store
                    .get_authmap(local.uid, AUTHMAP_MODULE)
                    .await?
                    .is_none()
            {
                match self.local_login(local, password).await {
                    Err(Error::InvalidCredentials) => {
                        debug!(username = name, "Local password rejected, trying LDAP");
                    }
                    other => return other,
                }
            }
        }

        let identity = resolve_credentials(&self.registry, &config, name, password).await?;
        let sid = identity.sid().to_string();
        self.admit(&identity, &config, LoginMethod::Ldap { sid })
            .await
    }

    /// Login from an identity asserted by the front-end web server
    pub async fn sso_login(&self, ctx: &RequestContext) -> Result<LoginOutcome> {
        let config = self.config().await;
        if !config.sso.enabled {
            return Err(Error::SsoDisabled);
        }

        let username = sso::asserted_username(ctx, &config.sso).ok_or_else(|| {
            debug!(header = %config.sso.remote_user_header, path = %ctx.path, "No SSO username asserted");
            Error::NotFound
        })?;

        let identity = resolve_asserted(&self.registry, &config, &username).await?;
        let sid = identity.sid().to_string();
        let mut outcome = self
            .admit(&identity, &config, LoginMethod::Sso { sid })
            .await?;

        if config.sso.notify_authentication {
            outcome.messages.push(messages::SSO_LOGGED_IN.to_string());
        }
        Ok(outcome)
    }

    async fn admit(
        &self,
        identity: &ResolvedIdentity,
        config: &AuthenticationConfig,
        method: LoginMethod,
    ) -> Result<LoginOutcome> {
        let decision = PolicyGate::new(config, self.authorization.as_ref(), &self.predicates)
            .evaluate(identity)
            .await?;

        let mapped = AccountMapper::new(self.store.as_ref(), config)
            .with_role_sync(decision.grants.is_some())
            .map(identity, decision.grants.as_deref().unwrap_or_default())
            .await?;

        info!(
            uid = mapped.account.uid,
            name = %mapped.account.name,
            sid = %identity.sid(),
            provisioned = mapped.provisioned,
            method = ?method,
            "Login admitted"
        );

        Ok(LoginOutcome {
            account: mapped.account,
            method,
            provisioned: mapped.provisioned,
            messages: Vec::new(),
        })
    }

    async fn local_login(&self, mut account: LocalAccount, password: &str) -> Result<LoginOutcome> {
        let Some(hash) = account.pass_hash.as_deref() else {
            debug!(uid = account.uid, "Account has no local password");
            return Err(Error::InvalidCredentials);
        };

        let verified = self.hasher.verify(password, hash).unwrap_or_else(|e| {
            warn!(uid = account.uid, error = %e, "Stored password hash is unreadable");
            false
        });
        if !verified {
            return Err(Error::InvalidCredentials);
        }

        if !account.is_active() {
            info!(uid = account.uid, "Login denied: account is blocked");
            return Err(Error::UserDisallowed("account is blocked".to_string()));
        }

        let now = Utc::now();
        self.store.touch_login(account.uid, now).await?;
        account.last_login = Some(now);

        info!(uid = account.uid, name = %account.name, "Local login admitted");
        Ok(LoginOutcome {
            account,
            method: LoginMethod::Local,
            provisioned: false,
            messages: Vec::new(),
        })
    }
}
