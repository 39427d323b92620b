//! Hash utilities and signed session tokens

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Random 32-byte session identifier, hex encoded
pub fn generate_session_id() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Cookie value `<id>.<hmac(id)>`
pub fn sign_session_id(secret: &[u8], session_id: &str) -> String {
    format!("{}.{}", session_id, hmac_sha256_hex(secret, session_id.as_bytes()))
}

/// Verify a signed cookie value and return the session id
pub fn verify_signed_session(secret: &[u8], value: &str) -> Option<String> {
    let (id, signature) = value.rsplit_once('.')?;
    let signature = hex::decode(signature).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(id.as_bytes());
    mac.verify_slice(&signature).ok()?;

    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123";

    #[test]
    fn test_session_ids_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_signed_session_verifies() {
        let id = generate_session_id();
        let cookie = sign_session_id(SECRET, &id);
        assert_eq!(verify_signed_session(SECRET, &cookie), Some(id));
    }

    #[test]
    fn test_tampered_session_rejected() {
        let cookie = sign_session_id(SECRET, "abc123");
        let tampered = cookie.replacen("abc123", "abc124", 1);
        assert_eq!(verify_signed_session(SECRET, &tampered), None);
        assert_eq!(verify_signed_session(b"another-secret-key!!", &cookie), None);
        assert_eq!(verify_signed_session(SECRET, "no-signature"), None);
    }
}
