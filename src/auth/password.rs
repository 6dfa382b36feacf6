//! Salted password credentials in the `v1:<salt>:<digest>` format.
//!
//! The digest is built from FNV-1a 64 rounds over `salt || secret || plain || salt`.
//! Stored credentials written by earlier deployments must keep verifying, so the
//! construction below is bit-exact and must not be changed without a version bump.

use std::hash::Hasher;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use fnv::FnvHasher;
use rand::{RngCore, rngs::OsRng};

const HASH_VERSION: &str = "v1";
const SALT_BYTES: usize = 16;
const DIGEST_BYTES: usize = 24;

/// Hashes and verifies plaintext passwords with a process-wide secret.
#[derive(Clone)]
pub struct PasswordHasher {
    secret: String,
}

impl PasswordHasher {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Produce a stored credential for `plain` using a fresh random salt.
    pub fn hash(&self, plain: &str) -> String {
        let salt = random_salt();
        let digest = digest(plain.as_bytes(), self.secret.as_bytes(), &salt);

        format!(
            "{}:{}:{}",
            HASH_VERSION,
            URL_SAFE_NO_PAD.encode(&salt),
            URL_SAFE_NO_PAD.encode(digest)
        )
    }

    /// Check `plain` against a stored credential.
    ///
    /// Malformed credentials never verify.
    pub fn verify(&self, plain: &str, stored: &str) -> bool {
        let parts: Vec<&str> = stored.split(':').collect();
        let [version, salt, expected] = parts.as_slice() else {
            return false;
        };
        if *version != HASH_VERSION {
            return false;
        }
        let Ok(salt) = URL_SAFE_NO_PAD.decode(salt) else {
            return false;
        };
        let Ok(expected) = URL_SAFE_NO_PAD.decode(expected) else {
            return false;
        };

        let actual = digest(plain.as_bytes(), self.secret.as_bytes(), &salt);
        constant_time_eq(&actual, &expected)
    }
}

fn random_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_BYTES];
    match OsRng.try_fill_bytes(&mut salt) {
        Ok(()) => salt,
        Err(err) => {
            tracing::error!(error = ?err, "random source unavailable, hashing with an empty salt");
            Vec::new()
        }
    }
}

fn fnv64a(chunks: &[&[u8]]) -> [u8; 8] {
    let mut hasher = FnvHasher::default();
    for chunk in chunks {
        hasher.write(chunk);
    }
    hasher.finish().to_be_bytes()
}

fn interleave(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    for i in 0..a.len().max(b.len()) {
        if let Some(byte) = a.get(i) {
            out.push(*byte);
        }
        if let Some(byte) = b.get(i) {
            out.push(*byte);
        }
    }
    out
}

fn digest(plain: &[u8], secret: &[u8], salt: &[u8]) -> Vec<u8> {
    let mut mixed = Vec::with_capacity(salt.len() * 2 + secret.len() + plain.len());
    mixed.extend_from_slice(salt);
    mixed.extend_from_slice(secret);
    mixed.extend_from_slice(plain);
    mixed.extend_from_slice(salt);

    let round1 = fnv64a(&[&mixed]);
    let round2 = fnv64a(&[&interleave(&round1, &mixed)]);

    let mut seed = [0u8; 16];
    seed[..8].copy_from_slice(&round1);
    seed[8..].copy_from_slice(&round2);

    let mut out = Vec::with_capacity(DIGEST_BYTES + 8);
    let mut counter: u64 = 0;
    while out.len() < DIGEST_BYTES {
        out.extend_from_slice(&fnv64a(&[&seed, &counter.to_le_bytes()]));
        counter += 1;
    }
    out.truncate(DIGEST_BYTES);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hasher = PasswordHasher::new("pepper");
        let stored = hasher.hash("correct horse");

        assert!(stored.starts_with("v1:"));
        assert!(hasher.verify("correct horse", &stored));
        assert!(!hasher.verify("correct horse!", &stored));
    }

    #[test]
    fn test_salts_differ_between_hashes() {
        let hasher = PasswordHasher::new("pepper");
        let first = hasher.hash("hunter22");
        let second = hasher.hash("hunter22");

        assert_ne!(first, second);
        assert!(hasher.verify("hunter22", &first));
        assert!(hasher.verify("hunter22", &second));
    }

    #[test]
    fn test_credential_layout() {
        let stored = PasswordHasher::new("").hash("password1");
        let parts: Vec<&str> = stored.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[1]).unwrap().len(), SALT_BYTES);
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[2]).unwrap().len(), DIGEST_BYTES);
    }

    #[test]
    fn test_flipped_digest_bit_fails() {
        let hasher = PasswordHasher::new("pepper");
        let stored = hasher.hash("password1");
        let parts: Vec<&str> = stored.split(':').collect();

        let mut digest = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        digest[5] ^= 0x01;
        let tampered = format!("v1:{}:{}", parts[1], URL_SAFE_NO_PAD.encode(&digest));

        assert!(!hasher.verify("password1", &tampered));
    }

    #[test]
    fn test_secret_is_part_of_the_digest() {
        let stored = PasswordHasher::new("one").hash("password1");
        assert!(!PasswordHasher::new("two").verify("password1", &stored));
    }

    #[test]
    fn test_malformed_credentials_never_verify() {
        let hasher = PasswordHasher::new("pepper");
        let stored = hasher.hash("password1");
        let truncated = &stored[..stored.len() - 2];

        for candidate in [
            "",
            "v1",
            "v1:abc",
            "v2:AAAA:AAAA",
            "v1:!!!:AAAA",
            "v1:AAAA:***",
            "v1:AAAA:AAAA:AAAA",
            truncated,
        ] {
            assert!(!hasher.verify("password1", candidate), "{candidate:?}");
        }
    }

    #[test]
    fn test_known_vector_is_stable() {
        // Fixed salt so the construction can be checked independently of the RNG.
        let salt = [7u8; SALT_BYTES];
        let expected: [u8; DIGEST_BYTES] = [
            0x09, 0x99, 0x30, 0xdf, 0x94, 0x32, 0x4f, 0x79,
            0xea, 0x9e, 0x69, 0xd6, 0x89, 0x43, 0x05, 0x58,
            0x47, 0x8e, 0xbe, 0xf1, 0xaa, 0x10, 0xe3, 0xbb,
        ];
        assert_eq!(digest(b"password1", b"secret", &salt), expected);

        // FNV-1a 64 of the empty input is the offset basis.
        assert_eq!(fnv64a(&[]), 0xcbf29ce484222325u64.to_be_bytes());
        // FNV-1a 64 of "a".
        assert_eq!(fnv64a(&[b"a"]), 0xaf63dc4c8601ec8cu64.to_be_bytes());
    }

    #[test]
    fn test_interleave_appends_longer_tail() {
        assert_eq!(interleave(&[1, 2], &[9, 8, 7, 6]), vec![1, 9, 2, 8, 7, 6]);
        assert_eq!(interleave(&[1, 2, 3], &[9]), vec![1, 9, 2, 3]);
    }

    #[test]
    fn test_empty_salt_credentials_still_verify() {
        let hasher = PasswordHasher::new("pepper");
        let digest = digest(b"password1", b"pepper", &[]);
        let stored = format!("v1::{}", URL_SAFE_NO_PAD.encode(digest));
        assert!(hasher.verify("password1", &stored));
    }
}
