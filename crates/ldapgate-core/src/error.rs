//! Error types for ldapgate

use crate::messages;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Credential Resolution
    #[error("No matching directory entry")]
    NotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Directory server error: {0}")]
    ServerError(String),

    // Policy Gate
    #[error("User disallowed: {0}")]
    UserDisallowed(String),

    #[error("Disabled for bad configuration: {0}")]
    DisabledForBadConfig(String),

    // Account Mapper
    #[error("Provisioning failed: {0}")]
    ProvisioningError(String),

    // SSO
    #[error("Single sign-on is disabled")]
    SsoDisabled,

    // Validation Errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Database Errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    // Internal Errors
    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound => "NotFound",
            Error::InvalidCredentials => "InvalidCredentials",
            Error::ServerError(_) => "ServerError",
            Error::UserDisallowed(_) => "UserDisallowed",
            Error::DisabledForBadConfig(_) => "DisabledForBadConfig",
            Error::ProvisioningError(_) => "ProvisioningError",
            Error::SsoDisabled => "SsoDisabled",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::ConfigError(_) => "ConfigError",
            Error::DatabaseError(_) => "InternalError",
            Error::InternalError(_) => "InternalError",
            Error::Io(_) => "InternalError",
            Error::Other(_) => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidArgument(_) => 400,

            Error::NotFound | Error::InvalidCredentials => 401,

            Error::UserDisallowed(_) | Error::SsoDisabled => 403,

            Error::ProvisioningError(_) => 409,

            Error::ServerError(_) | Error::DisabledForBadConfig(_) => 503,

            _ => 500,
        }
    }

    /// Message shown at the login form.
    ///
    /// `NotFound` and `InvalidCredentials` share one message so the form does
    /// not reveal which usernames exist in the directory.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::NotFound | Error::InvalidCredentials => messages::BAD_CREDENTIALS,
            Error::ServerError(_) => messages::SERVER_UNAVAILABLE,
            Error::UserDisallowed(_) => messages::USER_DISALLOWED,
            Error::DisabledForBadConfig(_) => messages::DISABLED_FOR_BAD_CONFIG,
            Error::ProvisioningError(_) => messages::ACCOUNT_NOT_PROVISIONED,
            Error::SsoDisabled => messages::SSO_DISABLED,
            _ => messages::SERVER_UNAVAILABLE,
        }
    }

    /// Whether this error ends a login attempt rather than signalling a fault.
    pub fn is_login_failure(&self) -> bool {
        matches!(
            self,
            Error::NotFound
                | Error::InvalidCredentials
                | Error::ServerError(_)
                | Error::UserDisallowed(_)
                | Error::DisabledForBadConfig(_)
                | Error::ProvisioningError(_)
                | Error::SsoDisabled
        )
    }
}
