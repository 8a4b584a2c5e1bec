//! RFC 6238 time-based one-time passwords.
//!
//! Used as the optional second factor on the password login path. Six-digit
//! codes, 30-second steps, one step of clock tolerance in each direction.
//! HMAC-SHA1 is what RFC 6238 interoperates with; authenticator apps expect
//! it, so `ring`'s legacy constant is the right tool here.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::hmac;

use crate::error::{CryptoError, Result};
use crate::seal::random_bytes;

/// Time step in seconds.
const STEP_SECS: i64 = 30;

/// Accepted drift in steps, in each direction.
const TOLERANCE_STEPS: i64 = 1;

/// Number of code digits.
const DIGITS: u32 = 6;

/// Generate a new base64-encoded TOTP secret (160 bits).
pub fn generate_secret() -> Result<String> {
    Ok(BASE64.encode(random_bytes(20)?))
}

fn code_at(secret: &[u8], step: i64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret);
    let tag = hmac::sign(&key, &step.to_be_bytes());
    let bytes = tag.as_ref();

    // Dynamic truncation per RFC 4226 §5.3.
    let offset = (bytes[bytes.len() - 1] & 0x0f) as usize;
    let bin = (u32::from(bytes[offset] & 0x7f) << 24)
        | (u32::from(bytes[offset + 1]) << 16)
        | (u32::from(bytes[offset + 2]) << 8)
        | u32::from(bytes[offset + 3]);

    format!("{:06}", bin % 10u32.pow(DIGITS))
}

/// Compute the current code for a base64-encoded secret at `now` (Unix secs).
pub fn current_code(secret_b64: &str, now: i64) -> Result<String> {
    let secret = BASE64
        .decode(secret_b64)
        .map_err(|e| CryptoError::MalformedEncoding(format!("invalid totp secret: {e}")))?;
    Ok(code_at(&secret, now / STEP_SECS))
}

/// Verify a submitted code against a base64-encoded secret at `now`.
///
/// Accepts the current step and one step either side. Comparison is
/// constant-time per candidate.
pub fn verify_code(secret_b64: &str, code: &str, now: i64) -> Result<bool> {
    let secret = BASE64
        .decode(secret_b64)
        .map_err(|e| CryptoError::MalformedEncoding(format!("invalid totp secret: {e}")))?;

    let step = now / STEP_SECS;
    for delta in -TOLERANCE_STEPS..=TOLERANCE_STEPS {
        let candidate = code_at(&secret, step + delta);
        // ring::constant_time over equal-length ASCII digit strings.
        if code.len() == candidate.len()
            && ring::constant_time::verify_slices_are_equal(code.as_bytes(), candidate.as_bytes())
                .is_ok()
        {
            return Ok(true);
        }
    }
    Ok(false)
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_code_verifies() {
        let secret = generate_secret().unwrap();
        let now = 1_724_800_000;
        let code = current_code(&secret, now).unwrap();
        assert!(verify_code(&secret, &code, now).unwrap());
    }

    #[test]
    fn adjacent_step_is_tolerated() {
        let secret = generate_secret().unwrap();
        let now = 1_724_800_000;
        let code = current_code(&secret, now).unwrap();
        assert!(verify_code(&secret, &code, now + STEP_SECS).unwrap());
        assert!(verify_code(&secret, &code, now - STEP_SECS).unwrap());
    }

    #[test]
    fn distant_code_is_rejected() {
        let secret = generate_secret().unwrap();
        let now = 1_724_800_000;
        let code = current_code(&secret, now).unwrap();
        assert!(!verify_code(&secret, &code, now + 10 * STEP_SECS).unwrap());
    }

    #[test]
    fn wrong_code_is_rejected() {
        let secret = generate_secret().unwrap();
        let now = 1_724_800_000;
        assert!(!verify_code(&secret, "000000", now).unwrap() || {
            // One-in-a-million collision with the real code; regenerate view.
            current_code(&secret, now).unwrap() == "000000"
        });
    }
}
