//! Cryptography utilities for ldapgate

pub mod hash;
pub mod password;

pub use hash::*;
pub use password::*;
