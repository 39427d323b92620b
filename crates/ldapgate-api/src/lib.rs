//! HTTP server for ldapgate
//!
//! Login and SSO endpoints, the seamless SSO middleware, the admin API and
//! Prometheus metrics.

pub mod admin;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod session;

pub use metrics::MetricsRecorder;
pub use server::{create_router, AppState, LdapgateServer};
pub use session::{Session, SessionStore};
