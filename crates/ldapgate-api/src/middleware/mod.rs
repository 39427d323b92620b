pub mod auth;
pub mod sso;
