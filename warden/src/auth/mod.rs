//! Credential hashing
//!
//! Stored credentials look like `$wsha$<work_factor>$<salt hex>$<digest hex>`.
//! The digest is SHA-256 over salt and secret, re-hashed until 2^work_factor
//! rounds have been applied.

pub mod accounts;

use rand::Rng;
use sha2::{Digest, Sha256};

const SCHEME: &str = "wsha";

/// Generate a random salt for credential hashing
pub fn generate_salt() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    hex::encode(random_bytes)
}

fn digest(secret: &str, salt: &str, work_factor: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    let mut hash = hasher.finalize();

    let rounds = 1u64 << work_factor.min(31);
    for _ in 1..rounds {
        let mut hasher = Sha256::new();
        hasher.update(hash);
        hasher.update(salt.as_bytes());
        hash = hasher.finalize();
    }

    hex::encode(hash)
}

/// Parsed form of a stored credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub work_factor: u32,
    pub salt: String,
    pub digest: String,
}

impl Credential {
    pub fn parse(stored: &str) -> Option<Self> {
        let mut parts = stored.strip_prefix('$')?.split('$');
        if parts.next()? != SCHEME {
            return None;
        }
        let work_factor = parts.next()?.parse().ok()?;
        let salt = parts.next()?.to_string();
        let digest = parts.next()?.to_string();
        if parts.next().is_some() || salt.is_empty() || digest.is_empty() {
            return None;
        }
        Some(Self {
            work_factor,
            salt,
            digest,
        })
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "${}${}${}${}",
            SCHEME, self.work_factor, self.salt, self.digest
        )
    }
}

/// Hash a secret at the given work factor with a fresh salt
pub fn hash_credential(secret: &str, work_factor: u32) -> String {
    let salt = generate_salt();
    Credential {
        work_factor,
        digest: digest(secret, &salt, work_factor),
        salt,
    }
    .to_string()
}

/// Verify a secret against a stored credential; malformed input never matches
pub fn verify_credential(secret: &str, stored: &str) -> bool {
    match Credential::parse(stored) {
        Some(c) => digest(secret, &c.salt, c.work_factor) == c.digest,
        None => false,
    }
}

/// Whether a stored credential was hashed below the wanted work factor
pub fn needs_rehash(stored: &str, work_factor: u32) -> bool {
    Credential::parse(stored).is_none_or(|c| c.work_factor < work_factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_generation() {
        let salt1 = generate_salt();
        let salt2 = generate_salt();

        // 128 bits of salt
        assert_eq!(salt1.len(), 32);
        assert_ne!(salt1, salt2);
    }

    #[test]
    fn test_digest_deterministic() {
        assert_eq!(digest("secret123", "abcd", 4), digest("secret123", "abcd", 4));
        assert_ne!(digest("secret123", "abcd", 4), digest("secret123", "abce", 4));
        assert_ne!(digest("secret123", "abcd", 4), digest("secret123", "abcd", 5));
    }

    #[test]
    fn test_format() {
        let stored = hash_credential("hunter22", 5);
        assert!(stored.starts_with("$wsha$5$"));

        let parsed = Credential::parse(&stored).unwrap();
        assert_eq!(parsed.work_factor, 5);
        assert_eq!(parsed.salt.len(), 32);
        assert_eq!(parsed.digest.len(), 64);
        assert_eq!(parsed.to_string(), stored);
    }

    #[test]
    fn test_verify() {
        let stored = hash_credential("mysecret", 4);
        assert!(verify_credential("mysecret", &stored));
        assert!(!verify_credential("wrongsecret", &stored));
        assert!(!verify_credential("mysecret", "plaintext"));
    }

    #[test]
    fn test_needs_rehash() {
        let stored = hash_credential("mysecret", 4);
        assert!(needs_rehash(&stored, 7));
        assert!(!needs_rehash(&stored, 4));
        assert!(needs_rehash("garbage", 4));
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(Credential::parse("$2a$10$abcdef").is_none());
        assert!(Credential::parse("$wsha$x$aa$bb").is_none());
        assert!(Credential::parse("$wsha$4$aa$bb$cc").is_none());
    }
}
