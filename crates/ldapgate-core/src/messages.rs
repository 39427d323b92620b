//! User-facing messages surfaced verbatim at the login form

pub const USER_DISALLOWED: &str = "User disallowed";

pub const DISABLED_FOR_BAD_CONFIG: &str = "The site logon is currently not working due to a configuration error. Please see logs for additional details.";

pub const BAD_CREDENTIALS: &str = "Sorry, unrecognized username or password.";

pub const SERVER_UNAVAILABLE: &str = "Login is temporarily unavailable. Please try again later.";

pub const ACCOUNT_NOT_PROVISIONED: &str = "Your account could not be set up on this site. Please contact the site administrator.";

pub const SSO_DISABLED: &str = "Single sign-on is not enabled on this site.";

pub const SSO_LOGGED_IN: &str = "You have been logged in via single sign-on.";

/// Appends the configured help link to a failure message.
pub fn with_help_link(message: &str, url: Option<&str>, text: Option<&str>) -> String {
    match url {
        Some(url) if !url.is_empty() => {
            let text = text.filter(|t| !t.is_empty()).unwrap_or("Get help logging in");
            format!("{} {}: {}", message, text, url)
        }
        _ => message.to_string(),
    }
}
