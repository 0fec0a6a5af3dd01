//! Bearer session tokens for API callers.
//!
//! Tokens are HMAC-SHA256 based and scoped to one account.
//! Format: `pd_st_<user_id>_<hmac_hex>`

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "pd_st_";

/// Length of a hyphenated UUID.
const UUID_LEN: usize = 36;

#[derive(Debug, thiserror::Error)]
pub enum SessionTokenError {
    #[error("invalid session token format: {0}")]
    InvalidFormat(String),

    #[error("invalid user ID in session token: {0}")]
    InvalidUserId(String),

    #[error("session token HMAC verification failed")]
    HmacMismatch,

    #[error("session secret is not valid hex: {0}")]
    InvalidSecret(String),
}

/// Key material for issuing and checking session tokens.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: Vec<u8>,
}

impl SessionConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Build from a hex-encoded secret as stored in the config file.
    pub fn from_hex(secret_hex: &str) -> Result<Self, SessionTokenError> {
        let secret = hex::decode(secret_hex.trim())
            .map_err(|e| SessionTokenError::InvalidSecret(e.to_string()))?;
        Ok(Self::new(secret))
    }
}

fn signed_message(user_id: Uuid) -> String {
    format!("session:{user_id}")
}

/// Issue a session token for `user_id`.
pub fn generate_session_token(config: &SessionConfig, user_id: Uuid) -> String {
    let mut mac = new_mac(&config.secret);
    mac.update(signed_message(user_id).as_bytes());
    let hmac_hex = hex::encode(mac.finalize().into_bytes());
    format!("{TOKEN_PREFIX}{user_id}_{hmac_hex}")
}

/// Check a session token and return the account it belongs to.
pub fn validate_session_token(config: &SessionConfig, token: &str) -> Result<Uuid, SessionTokenError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
        SessionTokenError::InvalidFormat(format!("token must start with '{TOKEN_PREFIX}'"))
    })?;

    if rest.len() < UUID_LEN || !rest.is_char_boundary(UUID_LEN) {
        return Err(SessionTokenError::InvalidFormat(
            "token too short to contain a user ID".to_string(),
        ));
    }
    let (user_id_str, after_user_id) = rest.split_at(UUID_LEN);

    let user_id =
        Uuid::parse_str(user_id_str).map_err(|e| SessionTokenError::InvalidUserId(e.to_string()))?;

    let hmac_hex = after_user_id.strip_prefix('_').ok_or_else(|| {
        SessionTokenError::InvalidFormat("expected underscore after user ID".to_string())
    })?;

    let provided_mac = hex::decode(hmac_hex)
        .map_err(|e| SessionTokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    let mut mac = new_mac(&config.secret);
    mac.update(signed_message(user_id).as_bytes());
    mac.verify_slice(&provided_mac)
        .map_err(|_| SessionTokenError::HmacMismatch)?;

    Ok(user_id)
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SessionConfig {
        SessionConfig::new(b"test-secret-key-for-promptdeck".to_vec())
    }

    fn user() -> Uuid {
        Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap()
    }

    #[test]
    fn token_has_expected_shape() {
        let token = generate_session_token(&test_config(), user());
        let rest = token.strip_prefix("pd_st_").expect("prefix");
        assert!(rest.starts_with(&user().to_string()));
        let hmac_hex = rest[36..].strip_prefix('_').unwrap();
        assert_eq!(hmac_hex.len(), 64);
    }

    #[test]
    fn roundtrip_yields_user_id() {
        let config = test_config();
        let token = generate_session_token(&config, user());
        assert_eq!(validate_session_token(&config, &token).unwrap(), user());
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = generate_session_token(&test_config(), user());
        let other = SessionConfig::new(b"another-secret".to_vec());
        assert!(matches!(
            validate_session_token(&other, &token),
            Err(SessionTokenError::HmacMismatch)
        ));
    }

    #[test]
    fn swapped_user_id_is_rejected() {
        let config = test_config();
        let token = generate_session_token(&config, user());
        let forged = token.replace(&user().to_string(), &Uuid::new_v4().to_string());
        assert!(matches!(
            validate_session_token(&config, &forged),
            Err(SessionTokenError::HmacMismatch)
        ));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let config = test_config();
        for bad in ["", "pd_st_", "pdst_x_y", "pd_st_not-a-uuid-at-all-but-36-chars-long_00"] {
            assert!(validate_session_token(&config, bad).is_err(), "accepted {bad:?}");
        }
        let token = generate_session_token(&config, user());
        assert!(matches!(
            validate_session_token(&config, &format!("{token}zz")),
            Err(SessionTokenError::InvalidFormat(_))
        ));
    }

    #[test]
    fn secret_from_hex() {
        let config = SessionConfig::from_hex("deadbeef").unwrap();
        assert_eq!(config.secret, vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(SessionConfig::from_hex("nothex").is_err());
    }
}
