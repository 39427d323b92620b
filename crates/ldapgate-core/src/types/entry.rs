//! Directory entries resolved during a login attempt

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resolved directory record for a candidate identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapEntry {
    /// Distinguished Name
    pub dn: String,

    /// Server the entry was found on
    pub sid: String,

    /// Raw LDAP attributes (all values are multi-valued)
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    pub fn new(dn: impl Into<String>, sid: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            sid: sid.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute append
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// All values of an attribute. Attribute names compare case-insensitively.
    pub fn get_attrs(&self, name: &str) -> &[String] {
        if let Some(values) = self.attributes.get(name) {
            return values;
        }
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// First value of an attribute
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.get_attrs(name).first().map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        !self.get_attrs(name).is_empty()
    }

    /// Case-insensitive substring test against the DN
    pub fn dn_contains(&self, needle: &str) -> bool {
        self.dn.to_lowercase().contains(&needle.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup_ignores_case() {
        let entry = LdapEntry::new("cn=hpotter,ou=people,dc=hogwarts,dc=edu", "hogwarts")
            .with_attr("mail", "hpotter@hogwarts.edu")
            .with_attr("memberOf", "cn=gryffindor,ou=groups,dc=hogwarts,dc=edu")
            .with_attr("memberOf", "cn=quidditch,ou=groups,dc=hogwarts,dc=edu");

        assert_eq!(entry.get_attr("MAIL"), Some("hpotter@hogwarts.edu"));
        assert_eq!(entry.get_attrs("memberof").len(), 2);
        assert!(entry.get_attrs("telephoneNumber").is_empty());
        assert!(!entry.has_attr("telephoneNumber"));
    }

    #[test]
    fn test_dn_contains() {
        let entry = LdapEntry::new("CN=hpotter,OU=people,DC=hogwarts,DC=edu", "hogwarts");
        assert!(entry.dn_contains("pot"));
        assert!(entry.dn_contains("ou=People"));
        assert!(!entry.dn_contains("ssnape"));
    }
}
