//! Utility functions

/// Authmap key form of an account name
pub fn normalize_authname(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Match a path against an exclusion pattern; a trailing `*` matches a prefix
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern = pattern.trim();
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == pattern || path.trim_end_matches('/') == pattern.trim_end_matches('/'),
    }
}

/// Format datetime for API responses
pub fn format_datetime(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_authname() {
        assert_eq!(normalize_authname("  HPotter "), "hpotter");
    }

    #[test]
    fn test_path_matches() {
        assert!(path_matches("/admin*", "/admin/config"));
        assert!(path_matches("/cron", "/cron/"));
        assert!(!path_matches("/cron", "/cron/run"));
        assert!(!path_matches("/admin*", "/user/login"));
    }
}
