//! Single sign-on helpers
//!
//! The front-end web server authenticates the user (NTLM or Kerberos) and
//! passes the name in a server variable. Everything here reads the explicit
//! [`RequestContext`]; nothing touches process-wide state.

use ldapgate_core::types::{RequestContext, SeamlessLogin, SsoConfig, SsoImplementation};
use ldapgate_core::utils::path_matches;

/// Path of the login form; `LoginPathOnly` triggers under this prefix
pub const LOGIN_PATH: &str = "/user/login";

/// Explicit SSO endpoint, never excluded
pub const SSO_PATH: &str = "/user/login/sso";

/// Username asserted by the front end, with the domain stripped when
/// configured.
///
/// mod_auth_kerb may only set `REDIRECT_<header>` after an internal
/// redirect, so that variable is consulted as a fallback.
pub fn asserted_username(ctx: &RequestContext, sso: &SsoConfig) -> Option<String> {
    let header = sso.remote_user_header.trim();
    if header.is_empty() {
        return None;
    }

    let raw = ctx.var(header).or_else(|| match sso.implementation {
        SsoImplementation::ModAuthKerb => ctx.var(&format!("REDIRECT_{}", header)),
        SsoImplementation::ModAuthSspi => None,
    })?;

    let name = if sso.strip_domain_name {
        strip_domain(raw)
    } else {
        raw
    };

    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// `user@REALM` and `DOMAIN\user` both become `user`
pub fn strip_domain(name: &str) -> &str {
    let name = match name.rfind('\\') {
        Some(idx) => &name[idx + 1..],
        None => name,
    };
    match name.find('@') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Whether the path or host is excluded from automatic SSO
pub fn is_excluded(ctx: &RequestContext, sso: &SsoConfig) -> bool {
    let host_excluded = sso
        .excluded_hosts
        .iter()
        .any(|h| h.trim().eq_ignore_ascii_case(ctx.host.trim()));

    host_excluded
        || sso
            .excluded_paths
            .iter()
            .any(|pattern| path_matches(pattern, &ctx.path))
}

/// Whether an anonymous request should be logged in without asking.
///
/// The caller checks for an existing session first.
pub fn should_auto_login(ctx: &RequestContext, sso: &SsoConfig) -> bool {
    if !sso.enabled || is_excluded(ctx, sso) {
        return false;
    }

    match sso.seamless_login {
        SeamlessLogin::Off => false,
        SeamlessLogin::LoginPathOnly => ctx.path.starts_with(LOGIN_PATH),
        SeamlessLogin::EveryPage => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sso() -> SsoConfig {
        SsoConfig {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_strip_domain() {
        assert_eq!(strip_domain("hpotter@HOGWARTS.EDU"), "hpotter");
        assert_eq!(strip_domain("HOGWARTS\\hpotter"), "hpotter");
        assert_eq!(strip_domain("HOGWARTS\\hpotter@realm"), "hpotter");
        assert_eq!(strip_domain("hpotter"), "hpotter");
    }

    #[test]
    fn test_asserted_username() {
        let ctx = RequestContext::new("/user/login/sso", "intranet").with_var("REMOTE_USER", "hpotter@hogwarts");

        let mut config = sso();
        assert_eq!(asserted_username(&ctx, &config).as_deref(), Some("hpotter@hogwarts"));

        config.strip_domain_name = true;
        assert_eq!(asserted_username(&ctx, &config).as_deref(), Some("hpotter"));

        let empty = RequestContext::new("/", "intranet").with_var("REMOTE_USER", "   ");
        assert_eq!(asserted_username(&empty, &config), None);
    }

    #[test]
    fn test_kerberos_redirect_fallback() {
        let ctx = RequestContext::new("/", "intranet").with_var("REDIRECT_REMOTE_USER", "hpotter");

        let mut config = sso();
        assert_eq!(asserted_username(&ctx, &config), None);

        config.implementation = SsoImplementation::ModAuthKerb;
        assert_eq!(asserted_username(&ctx, &config).as_deref(), Some("hpotter"));
    }

    #[test]
    fn test_custom_header() {
        let mut config = sso();
        config.remote_user_header = "X-Forwarded-User".to_string();

        let ctx = RequestContext::new("/", "intranet").with_var("x-forwarded-user", "hpotter");
        assert_eq!(asserted_username(&ctx, &config).as_deref(), Some("hpotter"));
    }

    #[test]
    fn test_seamless_login() {
        let mut config = sso();
        let login = RequestContext::new("/user/login", "intranet");
        let page = RequestContext::new("/node/12", "intranet");

        assert!(!should_auto_login(&login, &config));

        config.seamless_login = SeamlessLogin::LoginPathOnly;
        assert!(should_auto_login(&login, &config));
        assert!(!should_auto_login(&page, &config));

        config.seamless_login = SeamlessLogin::EveryPage;
        assert!(should_auto_login(&page, &config));

        config.enabled = false;
        assert!(!should_auto_login(&page, &config));
    }

    #[test]
    fn test_exclusions() {
        let mut config = sso();
        config.seamless_login = SeamlessLogin::EveryPage;
        config.excluded_paths = vec!["/cron.php".to_string(), "/api/*".to_string()];
        config.excluded_hosts = vec!["public.hogwarts.edu".to_string()];

        assert!(!should_auto_login(&RequestContext::new("/cron.php", "intranet"), &config));
        assert!(!should_auto_login(&RequestContext::new("/api/v1/health", "intranet"), &config));
        assert!(!should_auto_login(&RequestContext::new("/", "Public.Hogwarts.edu"), &config));
        assert!(should_auto_login(&RequestContext::new("/node/1", "intranet"), &config));
    }
}
