//! `x-signature` verification for payment webhooks.
//!
//! The header carries the lowercase hex HMAC-SHA256 of the raw request body
//! under the shared webhook secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing {SIGNATURE_HEADER} header")]
    Missing,

    #[error("{SIGNATURE_HEADER} header is not valid hex")]
    NotHex,

    #[error("invalid signature")]
    Mismatch,
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size")
}

/// Hex digest a sender would put in the header for `body`.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = new_mac(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check `header` against the digest of `body`, in constant time.
///
/// The header must be the lowercase hex digest exactly: no surrounding
/// whitespace, no uppercase digits.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
    let header = header.filter(|h| !h.is_empty()).ok_or(SignatureError::Missing)?;
    let provided = hex::decode(header).map_err(|_| SignatureError::NotHex)?;
    if header.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(SignatureError::Mismatch);
    }

    let mut mac = new_mac(secret);
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
}
