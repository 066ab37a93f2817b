//! ---
//! srr_section: "01-shared-runtime"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Shared configuration, logging, and crypto primitives."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
//! Digest and passphrase facade.
//!
//! The armor produced by [`encrypt`] is a reversible obfuscation, not a
//! cryptographic sealing: the save/restore protocol only requires the
//! round-trip law `decrypt(encrypt(p, p), p) == p` so that a restore payload
//! can prove it was produced with the same passphrase.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Minimum number of characters a passphrase must carry.
const PASSPHRASE_MIN_CHARS: usize = 8;

/// Errors raised by the passphrase armor.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The armored string is not valid base64.
    #[error("malformed armored data: {0}")]
    Armor(#[from] base64::DecodeError),
    /// The unarmored bytes are not valid UTF-8 (wrong passphrase or
    /// corrupted checksum).
    #[error("unarmored data is not valid utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Compute the lowercase hex SHA-256 digest of `data`. Always 64 characters.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn keystream(passphrase: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    hasher.finalize().into()
}

/// Armor `plain` under `passphrase`. The result is opaque to callers.
pub fn encrypt(plain: &str, passphrase: &str) -> String {
    let key = keystream(passphrase);
    let mixed: Vec<u8> = plain
        .as_bytes()
        .iter()
        .zip(key.iter().cycle())
        .map(|(byte, key_byte)| byte ^ key_byte)
        .collect();
    BASE64.encode(mixed)
}

/// Reverse [`encrypt`]. Fails when the armor is malformed or the passphrase
/// does not match the one used by the producer.
pub fn decrypt(armored: &str, passphrase: &str) -> Result<String, CryptoError> {
    let key = keystream(passphrase);
    let mixed = BASE64.decode(armored)?;
    let plain: Vec<u8> = mixed
        .iter()
        .zip(key.iter().cycle())
        .map(|(byte, key_byte)| byte ^ key_byte)
        .collect();
    Ok(String::from_utf8(plain)?)
}

/// True when `passphrase` satisfies the published format rule.
pub fn check_passphrase_format(passphrase: &str) -> bool {
    passphrase.chars().count() >= PASSPHRASE_MIN_CHARS
}

/// Human-readable passphrase rule, interpolated into operator-facing
/// error messages ("Passphrase must have {} characters").
pub fn passphrase_format() -> String {
    format!("at least {}", PASSPHRASE_MIN_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"").len(), 64);
    }

    #[test]
    fn armor_round_trips_for_valid_passphrases() {
        for passphrase in ["Eaton1234!", "longer passphrase with spaces", "ünïcödé-pass"] {
            assert!(check_passphrase_format(passphrase));
            let armored = encrypt(passphrase, passphrase);
            assert_ne!(armored, passphrase);
            assert_eq!(decrypt(&armored, passphrase).unwrap(), passphrase);
        }
    }

    #[test]
    fn wrong_passphrase_does_not_round_trip() {
        let armored = encrypt("Eaton1234!", "Eaton1234!");
        match decrypt(&armored, "Other5678!") {
            Ok(plain) => assert_ne!(plain, "Eaton1234!"),
            Err(CryptoError::Encoding(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_armor_is_rejected() {
        assert!(matches!(
            decrypt("not//valid@base64!", "Eaton1234!"),
            Err(CryptoError::Armor(_))
        ));
    }

    #[test]
    fn passphrase_format_rule() {
        assert!(!check_passphrase_format("short"));
        assert!(check_passphrase_format("12345678"));
        assert!(passphrase_format().contains('8'));
    }
}
