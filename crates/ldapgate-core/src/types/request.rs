//! Request context passed explicitly into SSO resolution

use std::collections::HashMap;

/// The parts of an incoming request that SSO resolution reads
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Server variables / trusted headers set by the front-end proxy
    pub server_vars: HashMap<String, String>,
    /// Request path, e.g. "/user/login"
    pub path: String,
    /// Request host without port
    pub host: String,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            server_vars: HashMap::new(),
            path: path.into(),
            host: host.into(),
        }
    }

    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.server_vars.insert(name.to_string(), value.into());
        self
    }

    /// Non-empty server variable; names compare case-insensitively
    pub fn var(&self, name: &str) -> Option<&str> {
        self.server_vars
            .get(name)
            .or_else(|| {
                self.server_vars
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}
