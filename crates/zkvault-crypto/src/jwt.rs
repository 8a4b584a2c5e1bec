//! Minimal HS256 compact-token utilities over `ring::hmac`.
//!
//! Access tokens are stateless and self-verifying: signature plus the expiry
//! claim checked by the caller. Only base64url without padding is accepted,
//! and only the `HS256`/`JWT` header combination.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::hmac;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CryptoError, Result};

#[derive(Debug, Serialize, serde::Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

fn b64url_decode(s: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(s.as_bytes())
        .map_err(|_| CryptoError::InvalidToken)
}

/// Encode claims as an HS256-signed compact token.
pub fn encode_hs256<T: Serialize>(secret: &[u8], claims: &T) -> Result<String> {
    let header = Header {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{header_b64}.{claims_b64}");

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, signing_input.as_bytes());

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
}

/// Verify an HS256 token's signature and decode its claims.
///
/// Does not validate `exp`/`nbf`; the token service owns those checks. Every
/// malformation is collapsed into [`CryptoError::InvalidToken`].
pub fn decode_hs256<T: DeserializeOwned>(secret: &[u8], token: &str) -> Result<T> {
    let mut parts = token.trim().split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CryptoError::InvalidToken);
    };

    let header: Header =
        serde_json::from_slice(&b64url_decode(header_b64)?).map_err(|_| CryptoError::InvalidToken)?;
    if header.alg != "HS256" || !header.typ.eq_ignore_ascii_case("JWT") {
        return Err(CryptoError::InvalidToken);
    }

    let signing_input = format!("{header_b64}.{payload_b64}");
    let sig = b64url_decode(sig_b64)?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, signing_input.as_bytes(), &sig).map_err(|_| CryptoError::InvalidToken)?;

    serde_json::from_slice(&b64url_decode(payload_b64)?).map_err(|_| CryptoError::InvalidToken)
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    #[test]
    fn encode_decode_roundtrip() {
        let claims = Claims {
            sub: "user-1".into(),
            exp: 1_700_000_000,
        };
        let token = encode_hs256(b"test-secret", &claims).unwrap();
        let decoded: Claims = decode_hs256(b"test-secret", &token).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = Claims {
            sub: "user-1".into(),
            exp: 0,
        };
        let token = encode_hs256(b"secret-a", &claims).unwrap();
        assert!(decode_hs256::<Claims>(b"secret-b", &token).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let claims = Claims {
            sub: "user-1".into(),
            exp: 0,
        };
        let token = encode_hs256(b"secret", &claims).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"user-2","exp":0}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert!(decode_hs256::<Claims>(b"secret", &forged).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_hs256::<Claims>(b"secret", "not-a-token").is_err());
        assert!(decode_hs256::<Claims>(b"secret", "a.b").is_err());
        assert!(decode_hs256::<Claims>(b"secret", "a.b.c.d").is_err());
    }
}
