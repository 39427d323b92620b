//! Policy gate
//!
//! Decides whether a resolved identity may log in. Checks run in a fixed
//! order and the first failure wins:
//!
//! 1. allow list: the DN must contain one of the configured fragments
//! 2. deny list: the DN must contain none of them
//! 3. predicates: the configured expression, then registered predicates
//! 4. authorizations: at least one grant when required
//!
//! Configuration problems fail closed with `DisabledForBadConfig`.

use crate::authorization::AuthorizationProvider;
use crate::predicate::{EntryPredicate, Expression};
use crate::resolver::ResolvedIdentity;
use ldapgate_core::types::AuthenticationConfig;
use ldapgate_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Admitted identity with the grants computed on the way
#[derive(Debug, Clone, Default)]
pub struct PolicyDecision {
    /// `None` when no provider answered; stored roles are then left as is
    pub grants: Option<Vec<String>>,
}

pub struct PolicyGate<'a> {
    config: &'a AuthenticationConfig,
    authorization: &'a dyn AuthorizationProvider,
    predicates: &'a [Arc<dyn EntryPredicate>],
}

impl<'a> PolicyGate<'a> {
    pub fn new(
        config: &'a AuthenticationConfig,
        authorization: &'a dyn AuthorizationProvider,
        predicates: &'a [Arc<dyn EntryPredicate>],
    ) -> Self {
        Self {
            config,
            authorization,
            predicates,
        }
    }

    pub async fn evaluate(&self, identity: &ResolvedIdentity) -> Result<PolicyDecision> {
        let entry = &identity.entry;
        let username = identity.username.as_str();

        if !self.config.allow_only_if_text_in_dn.is_empty()
            && !self
                .config
                .allow_only_if_text_in_dn
                .iter()
                .any(|fragment| entry.dn_contains(fragment))
        {
            info!(username, dn = %entry.dn, "Login denied: DN matches no allowed text");
            return Err(Error::UserDisallowed("DN not in allow list".to_string()));
        }

        if let Some(fragment) = self
            .config
            .exclude_if_text_in_dn
            .iter()
            .find(|fragment| entry.dn_contains(fragment))
        {
            info!(username, dn = %entry.dn, excluded = %fragment, "Login denied: DN contains excluded text");
            return Err(Error::UserDisallowed("DN in deny list".to_string()));
        }

        self.check_predicates(identity)?;

        let group_attr = identity.definition().group_attr.clone();
        let grants = if !self.authorization.is_enabled() {
            None
        } else if self.config.exclude_if_no_authorizations {
            Some(self.authorization.grants(entry, &group_attr).await?)
        } else {
            match self.authorization.grants(entry, &group_attr).await {
                Ok(grants) => Some(grants),
                Err(e) => {
                    warn!(username, error = %e, "Authorization lookup failed, keeping stored roles");
                    None
                }
            }
        };

        if self.config.exclude_if_no_authorizations {
            if !self.authorization.is_enabled() {
                error!(
                    username,
                    "Logins require an authorization but no authorization provider is enabled"
                );
                return Err(Error::DisabledForBadConfig(
                    "authorization required but no provider is enabled".to_string(),
                ));
            }

            if grants.as_ref().map_or(true, Vec::is_empty) {
                info!(username, consumer = %self.authorization.consumer(), "Login denied: no authorizations granted");
                return Err(Error::UserDisallowed("no authorizations".to_string()));
            }
        }

        debug!(username, sid = %identity.sid(), grants = ?grants, "Policy gate passed");
        Ok(PolicyDecision { grants })
    }

    fn check_predicates(&self, identity: &ResolvedIdentity) -> Result<()> {
        let entry = &identity.entry;
        let username = identity.username.as_str();

        if let Some(source) = self.config.predicate_source() {
            if !self.config.predicate_evaluator_enabled {
                error!(username, "An allow predicate is configured but predicate evaluation is disabled");
                return Err(Error::DisabledForBadConfig(
                    "predicate configured but evaluator disabled".to_string(),
                ));
            }

            let expression = Expression::parse(source).map_err(|e| {
                error!(username, error = %e, "Allow predicate does not parse");
                Error::DisabledForBadConfig(format!("allow predicate: {}", e))
            })?;

            if !expression.matches(entry, username) {
                info!(username, dn = %entry.dn, "Login denied by allow predicate");
                return Err(Error::UserDisallowed("allow predicate returned false".to_string()));
            }
        }

        for predicate in self.predicates {
            match predicate.evaluate(entry, username) {
                Ok(true) => {}
                Ok(false) => {
                    info!(username, predicate = predicate.name(), "Login denied by registered predicate");
                    return Err(Error::UserDisallowed(format!(
                        "predicate '{}' returned false",
                        predicate.name()
                    )));
                }
                Err(e) => {
                    error!(username, predicate = predicate.name(), error = %e, "Registered predicate failed");
                    return Err(Error::DisabledForBadConfig(format!(
                        "predicate '{}': {}",
                        predicate.name(),
                        e
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{GroupMappingAuthorization, NoAuthorization};
    use crate::ldap::MemoryDirectory;
    use crate::predicate::PredicateError;
    use ldapgate_core::config::{AuthorizationConfig, GroupMapping};
    use ldapgate_core::types::{LdapEntry, LdapServerDefinition};

    fn identity(dn: &str, username: &str) -> ResolvedIdentity {
        let directory = Arc::new(MemoryDirectory::new(LdapServerDefinition {
            sid: "hogwarts".to_string(),
            base_dns: vec!["dc=hogwarts,dc=edu".to_string()],
            ..Default::default()
        }));
        let entry = LdapEntry::new(dn, "hogwarts")
            .with_attr("uid", username)
            .with_attr("memberOf", "cn=gryffindor,ou=groups,dc=hogwarts,dc=edu");
        ResolvedIdentity::new(entry, username, directory)
    }

    fn harry() -> ResolvedIdentity {
        identity("cn=hpotter,ou=people,dc=hogwarts,dc=edu", "hpotter")
    }

    fn snape() -> ResolvedIdentity {
        identity("cn=ssnape,ou=people,dc=hogwarts,dc=edu", "ssnape")
    }

    fn houses() -> GroupMappingAuthorization {
        GroupMappingAuthorization::new(AuthorizationConfig {
            enabled: true,
            mappings: vec![GroupMapping {
                from: "gryffindor".to_string(),
                to: "student".to_string(),
            }],
            ..Default::default()
        })
    }

    async fn run(config: &AuthenticationConfig, who: &ResolvedIdentity) -> Result<PolicyDecision> {
        PolicyGate::new(config, &NoAuthorization, &[]).evaluate(who).await
    }

    #[tokio::test]
    async fn test_open_config_admits() {
        let config = AuthenticationConfig::default();
        assert!(run(&config, &harry()).await.is_ok());
    }

    #[tokio::test]
    async fn test_allow_list() {
        let config = AuthenticationConfig {
            allow_only_if_text_in_dn: vec!["POT".to_string()],
            ..Default::default()
        };

        assert!(run(&config, &harry()).await.is_ok());
        assert!(matches!(
            run(&config, &snape()).await,
            Err(Error::UserDisallowed(_))
        ));
    }

    #[tokio::test]
    async fn test_deny_list_dominates_allow_list() {
        let config = AuthenticationConfig {
            allow_only_if_text_in_dn: vec!["ou=people".to_string()],
            exclude_if_text_in_dn: vec!["hpotter".to_string()],
            ..Default::default()
        };

        assert!(matches!(
            run(&config, &harry()).await,
            Err(Error::UserDisallowed(_))
        ));
        assert!(run(&config, &snape()).await.is_ok());
    }

    #[tokio::test]
    async fn test_predicate_rules() {
        let mut config = AuthenticationConfig {
            allow_predicate: Some(r#"username == "hpotter""#.to_string()),
            ..Default::default()
        };
        assert!(run(&config, &harry()).await.is_ok());
        assert!(matches!(
            run(&config, &snape()).await,
            Err(Error::UserDisallowed(_))
        ));

        config.predicate_evaluator_enabled = false;
        assert!(matches!(
            run(&config, &harry()).await,
            Err(Error::DisabledForBadConfig(_))
        ));

        config.predicate_evaluator_enabled = true;
        config.allow_predicate = Some("return TRUE;".to_string());
        assert!(matches!(
            run(&config, &harry()).await,
            Err(Error::DisabledForBadConfig(_))
        ));

        // blank source means no predicate
        config.allow_predicate = Some("   ".to_string());
        assert!(run(&config, &snape()).await.is_ok());
    }

    struct Broken;

    impl EntryPredicate for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn evaluate(&self, _: &LdapEntry, _: &str) -> std::result::Result<bool, PredicateError> {
            Err(PredicateError {
                message: "lookup table missing".to_string(),
                position: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_registered_predicates() {
        let config = AuthenticationConfig::default();

        let only_harry: Vec<Arc<dyn EntryPredicate>> =
            vec![Arc::new(Expression::parse(r#"dn contains "hpotter""#).unwrap())];
        let gate = PolicyGate::new(&config, &NoAuthorization, &only_harry);
        assert!(gate.evaluate(&harry()).await.is_ok());
        assert!(matches!(
            gate.evaluate(&snape()).await,
            Err(Error::UserDisallowed(_))
        ));

        let broken: Vec<Arc<dyn EntryPredicate>> = vec![Arc::new(Broken)];
        let gate = PolicyGate::new(&config, &NoAuthorization, &broken);
        assert!(matches!(
            gate.evaluate(&harry()).await,
            Err(Error::DisabledForBadConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_required_authorizations() {
        let config = AuthenticationConfig {
            exclude_if_no_authorizations: true,
            ..Default::default()
        };

        // flag set without an enabled provider fails closed
        assert!(matches!(
            run(&config, &harry()).await,
            Err(Error::DisabledForBadConfig(_))
        ));

        let authz = houses();
        let gate = PolicyGate::new(&config, &authz, &[]);
        let decision = gate.evaluate(&harry()).await.unwrap();
        assert_eq!(decision.grants, Some(vec!["student".to_string()]));

        let mut muggle = snape();
        muggle.entry.attributes.clear();
        assert!(matches!(
            gate.evaluate(&muggle).await,
            Err(Error::UserDisallowed(_))
        ));
    }

    #[tokio::test]
    async fn test_grants_computed_without_requirement() {
        let config = AuthenticationConfig::default();
        let authz = houses();
        let decision = PolicyGate::new(&config, &authz, &[])
            .evaluate(&harry())
            .await
            .unwrap();
        assert_eq!(decision.grants, Some(vec!["student".to_string()]));

        let decision = run(&config, &harry()).await.unwrap();
        assert_eq!(decision.grants, None);
    }

    struct Outage;

    #[async_trait::async_trait]
    impl AuthorizationProvider for Outage {
        fn is_enabled(&self) -> bool {
            true
        }

        fn consumer(&self) -> &str {
            "local_role"
        }

        async fn grants(&self, _entry: &LdapEntry, _fallback_group_attr: &str) -> Result<Vec<String>> {
            Err(Error::ServerError("role service down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_grant_lookup_only_blocks_when_required() {
        let mut config = AuthenticationConfig::default();
        let decision = PolicyGate::new(&config, &Outage, &[])
            .evaluate(&harry())
            .await
            .unwrap();
        assert_eq!(decision.grants, None);

        config.exclude_if_no_authorizations = true;
        assert!(matches!(
            PolicyGate::new(&config, &Outage, &[]).evaluate(&harry()).await,
            Err(Error::ServerError(_))
        ));
    }
}
