//! AES-256-GCM key wrapping and random generation.
//!
//! The server stores three opaque values per keyed account:
//! `protectedSymmetricKey` (the 512-bit symmetric key wrapped under the
//! master key), `encryptedPrivateKey` (the asymmetric private key wrapped
//! under the symmetric key) and the clear `publicKey`. All wrapping happens
//! client-side; these helpers exist for client tooling and for tests that
//! exercise the full hierarchy against the server.
//!
//! Wrapped values are encoded as `base64(nonce):base64(ciphertext)` where the
//! ciphertext carries ring's appended 128-bit authentication tag.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{CryptoError, Result};

/// AES-256-GCM key length in bytes.
pub const AEAD_KEY_LEN: usize = 32;

/// Symmetric account key length in bytes (512 bits: enc key + mac key halves
/// for clients that split it; stored and wrapped as one opaque value).
pub const SYMMETRIC_KEY_LEN: usize = 64;

/// Opaque refresh-token length in bytes before encoding.
const TOKEN_LEN: usize = 32;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

/// A nonce sequence that yields exactly one nonce and then errors.
///
/// Each sealing key is used for a single message with a fresh random nonce.
struct SingleNonce(Option<[u8; NONCE_LEN]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// Fill a buffer of `len` cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut out = vec![0u8; len];
    rng.fill(&mut out)
        .map_err(|_| CryptoError::OperationFailed("failed to generate random bytes"))?;
    Ok(out)
}

/// Generate a fresh 512-bit symmetric account key.
pub fn generate_symmetric_key() -> Result<Vec<u8>> {
    random_bytes(SYMMETRIC_KEY_LEN)
}

/// Generate an opaque token string (unpadded base64url of 256 random bits).
///
/// Used for refresh tokens; the value is meaningless without the server-side
/// row it is persisted in.
pub fn random_token() -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes(TOKEN_LEN)?))
}

/// Encrypt `plaintext` under a 256-bit key, returning `base64(nonce):base64(ct)`.
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<String> {
    if key.len() != AEAD_KEY_LEN {
        return Err(CryptoError::OperationFailed("aead key must be 32 bytes"));
    }

    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce)
        .map_err(|_| CryptoError::OperationFailed("failed to generate random nonce"))?;

    let unbound = UnboundKey::new(AEAD_ALG, key)
        .map_err(|_| CryptoError::OperationFailed("failed to create aead key"))?;
    let mut sealing = SealingKey::new(unbound, SingleNonce(Some(nonce)));

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::OperationFailed("seal failed"))?;

    Ok(format!("{}:{}", BASE64.encode(nonce), BASE64.encode(in_out)))
}

/// Decrypt a `base64(nonce):base64(ct)` string produced by [`seal`].
pub fn open(wrapped: &str, key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != AEAD_KEY_LEN {
        return Err(CryptoError::OperationFailed("aead key must be 32 bytes"));
    }

    let (nonce_b64, ct_b64) = wrapped
        .split_once(':')
        .ok_or_else(|| CryptoError::MalformedEncoding("missing nonce separator".into()))?;

    let nonce_bytes = BASE64
        .decode(nonce_b64)
        .map_err(|e| CryptoError::MalformedEncoding(format!("invalid nonce: {e}")))?;
    let nonce: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| CryptoError::MalformedEncoding("nonce must be 12 bytes".into()))?;
    let mut ct = BASE64
        .decode(ct_b64)
        .map_err(|e| CryptoError::MalformedEncoding(format!("invalid ciphertext: {e}")))?;

    let unbound = UnboundKey::new(AEAD_ALG, key)
        .map_err(|_| CryptoError::OperationFailed("failed to create aead key"))?;
    let mut opening = OpeningKey::new(unbound, SingleNonce(Some(nonce)));

    let plaintext = opening
        .open_in_place(Aad::empty(), &mut ct)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(plaintext.to_vec())
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = random_bytes(AEAD_KEY_LEN).unwrap();
        let wrapped = seal(b"secret payload", &key).unwrap();
        assert_eq!(open(&wrapped, &key).unwrap(), b"secret payload");
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let key = random_bytes(AEAD_KEY_LEN).unwrap();
        let other = random_bytes(AEAD_KEY_LEN).unwrap();
        let wrapped = seal(b"secret payload", &key).unwrap();
        assert!(matches!(
            open(&wrapped, &other),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let key = random_bytes(AEAD_KEY_LEN).unwrap();
        let wrapped = seal(b"secret payload", &key).unwrap();
        let mut bytes = wrapped.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert!(open(&tampered, &key).is_err());
    }

    #[test]
    fn tokens_are_unique() {
        let a = random_token().unwrap();
        let b = random_token().unwrap();
        assert_ne!(a, b);
        assert!(a.len() >= 40);
    }
}
