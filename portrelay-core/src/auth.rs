//! Node key checks for the agent control surface

use portrelay_common::RelayError;
use subtle::ConstantTimeEq;

/// Longest node key accepted from configuration or a request header
pub const MAX_NODE_KEY_LEN: usize = 256;

/// Constant-time comparison of two byte slices
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// True when `presented` matches the configured node key.
#[must_use]
pub fn verify_node_key(presented: Option<&str>, expected: &str) -> bool {
    match presented {
        Some(key) => constant_time_eq(key.as_bytes(), expected.as_bytes()),
        None => false,
    }
}

/// Validate a node key before an agent starts serving with it.
pub fn validate_key_format(key: &str) -> Result<(), KeyValidationError> {
    if key.is_empty() {
        return Err(KeyValidationError::Empty);
    }
    if key.len() > MAX_NODE_KEY_LEN {
        return Err(KeyValidationError::TooLong {
            len: key.len(),
            max: MAX_NODE_KEY_LEN,
        });
    }
    // Keys travel in an HTTP header.
    if !key.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(KeyValidationError::InvalidCharacters);
    }
    Ok(())
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyValidationError {
    #[error("node key is empty")]
    Empty,
    #[error("node key too long: {len} bytes exceeds maximum of {max} bytes")]
    TooLong { len: usize, max: usize },
    #[error("node key contains invalid characters")]
    InvalidCharacters,
}

impl From<KeyValidationError> for RelayError {
    fn from(err: KeyValidationError) -> Self {
        RelayError::Config(err.to_string())
    }
}
