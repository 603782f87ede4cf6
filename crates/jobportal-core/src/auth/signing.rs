//! HMAC-SHA256 signing of cookie payloads.
//!
//! Signed values have the form `<payload>.<hex(hmac(secret, payload))>`.
//! The payload is opaque to the signer; the session store feeds it
//! base64url-encoded JSON.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Separator between payload and signature
const SEPARATOR: char = '.';

/// HMAC-SHA256 tag length in hex characters
const SIGNATURE_HEX_LEN: usize = 64;

#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail.
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length")
    }

    /// Sign a payload, returning `payload.signature`.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{}{}{}", payload, SEPARATOR, signature)
    }

    /// Verify a signed value and return its payload segment.
    ///
    /// Splits on the last separator. Returns `None` when the separator is
    /// missing, the signature is not exactly the lowercase hex `sign`
    /// produces, or the MAC does not match. The MAC comparison is
    /// constant-time over the full signature.
    pub fn verify<'a>(&self, signed: &'a str) -> Option<&'a str> {
        let (payload, signature) = signed.rsplit_once(SEPARATOR)?;
        if !is_canonical_signature(signature) {
            return None;
        }
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(payload)
    }
}

/// Only the encoding produced by `sign` is accepted, so a signature that
/// differs in letter case is a different value.
fn is_canonical_signature(signature: &str) -> bool {
    signature.len() == SIGNATURE_HEX_LEN
        && signature
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// Never print the key.
impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner").finish_non_exhaustive()
    }
}
