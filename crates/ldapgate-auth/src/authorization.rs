//! Authorization providers
//!
//! Grants derived from a directory entry. The policy gate consults the
//! provider when `exclude_if_no_authorizations` is set, and the account
//! mapper syncs the grants into local roles.

use async_trait::async_trait;
use ldapgate_core::config::AuthorizationConfig;
use ldapgate_core::types::LdapEntry;
use ldapgate_core::Result;

#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Consumer receiving the grants, e.g. "local_role"
    fn consumer(&self) -> &str;

    /// Grants for the entry; `fallback_group_attr` is the server's group
    /// attribute, used when the provider does not name one
    async fn grants(&self, entry: &LdapEntry, fallback_group_attr: &str) -> Result<Vec<String>>;
}

/// Maps group memberships to local roles
#[derive(Debug, Clone)]
pub struct GroupMappingAuthorization {
    config: AuthorizationConfig,
}

impl GroupMappingAuthorization {
    pub fn new(config: AuthorizationConfig) -> Self {
        Self { config }
    }

    fn normalize(&self, value: &str) -> String {
        // "cn=a, ou=b" and "cn=a,ou=b" are the same DN
        let compact = value
            .split(',')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(",");
        if self.config.case_sensitive {
            compact
        } else {
            compact.to_lowercase()
        }
    }

    fn matches(&self, group: &str, from: &str) -> bool {
        let group = self.normalize(group);
        let from = self.normalize(from);

        if from.contains('=') {
            return group == from;
        }

        // Bare names match the group's leading CN
        group == from || leading_cn(&group).is_some_and(|cn| cn == from)
    }
}

fn leading_cn(dn: &str) -> Option<&str> {
    let first = dn.split(',').next()?;
    let (key, value) = first.split_once('=')?;
    key.trim().eq_ignore_ascii_case("cn").then(|| value.trim())
}

#[async_trait]
impl AuthorizationProvider for GroupMappingAuthorization {
    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn consumer(&self) -> &str {
        &self.config.consumer
    }

    async fn grants(&self, entry: &LdapEntry, fallback_group_attr: &str) -> Result<Vec<String>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        let attr = self
            .config
            .group_attr
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(fallback_group_attr);
        let groups = entry.get_attrs(attr);

        let mut roles: Vec<String> = Vec::new();
        for mapping in &self.config.mappings {
            if roles.contains(&mapping.to) {
                continue;
            }
            if groups.iter().any(|g| self.matches(g, &mapping.from)) {
                roles.push(mapping.to.clone());
            }
        }

        Ok(roles)
    }
}

/// Provider used when no authorization is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthorization;

#[async_trait]
impl AuthorizationProvider for NoAuthorization {
    fn is_enabled(&self) -> bool {
        false
    }

    fn consumer(&self) -> &str {
        "none"
    }

    async fn grants(&self, _entry: &LdapEntry, _fallback_group_attr: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapgate_core::config::GroupMapping;

    fn provider(case_sensitive: bool) -> GroupMappingAuthorization {
        GroupMappingAuthorization::new(AuthorizationConfig {
            enabled: true,
            mappings: vec![
                GroupMapping {
                    from: "cn=Gryffindor, ou=groups, dc=hogwarts, dc=edu".to_string(),
                    to: "student".to_string(),
                },
                GroupMapping {
                    from: "quidditch".to_string(),
                    to: "athlete".to_string(),
                },
                GroupMapping {
                    from: "cn=faculty,ou=groups,dc=hogwarts,dc=edu".to_string(),
                    to: "student".to_string(),
                },
            ],
            case_sensitive,
            ..Default::default()
        })
    }

    fn harry() -> LdapEntry {
        LdapEntry::new("cn=hpotter,ou=people,dc=hogwarts,dc=edu", "hogwarts")
            .with_attr("memberOf", "cn=gryffindor,ou=groups,dc=hogwarts,dc=edu")
            .with_attr("memberOf", "CN=Quidditch,ou=groups,dc=hogwarts,dc=edu")
    }

    #[tokio::test]
    async fn test_dn_and_cn_mappings() {
        let grants = provider(false).grants(&harry(), "memberOf").await.unwrap();
        assert_eq!(grants, vec!["student", "athlete"]);
    }

    #[tokio::test]
    async fn test_case_sensitive_mappings() {
        let grants = provider(true).grants(&harry(), "memberOf").await.unwrap();
        assert!(grants.is_empty());
    }

    #[tokio::test]
    async fn test_group_attr_override() {
        let mut config = provider(false).config;
        config.group_attr = Some("groupMembership".to_string());
        let grants = GroupMappingAuthorization::new(config)
            .grants(&harry(), "memberOf")
            .await
            .unwrap();
        assert!(grants.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_provider_grants_nothing() {
        let mut config = provider(false).config;
        config.enabled = false;
        let authz = GroupMappingAuthorization::new(config);

        assert!(!authz.is_enabled());
        assert!(authz.grants(&harry(), "memberOf").await.unwrap().is_empty());
        assert!(!NoAuthorization.is_enabled());
    }

    #[test]
    fn test_leading_cn() {
        assert_eq!(leading_cn("cn=staff,dc=x"), Some("staff"));
        assert_eq!(leading_cn("ou=staff,dc=x"), None);
    }
}
