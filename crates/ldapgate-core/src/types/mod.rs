//! Core types for ldapgate

mod account;
mod authentication;
mod entry;
mod request;
mod server;

pub use account::*;
pub use authentication::*;
pub use entry::*;
pub use request::*;
pub use server::*;
