use std::sync::Arc;
use std::{fmt, str::FromStr};

use rand::RngCore;
use sha3::{Digest, Sha3_256};

pub type EntityId = String;

pub mod prefix {
    pub const SESSION_ID: &str = "cs";
    pub const TRANSACTION_ID: &str = "gt";
}

const ID_BYTES: usize = 16;

/// Generates a new random entity ID with the given prefix and length (in bytes).
pub fn new_random_id(prefix: &str, length: usize) -> EntityId {
    let mut bytes = vec![0u8; length];
    let mut rng = rand::rng();
    rng.fill_bytes(&mut bytes);
    encode_with_prefix(prefix, &bytes)
}

pub fn new_entity_id(prefix: &str) -> EntityId {
    new_random_id(prefix, ID_BYTES)
}

/// Derives a stable ID from an input label. Same label, same ID.
pub fn new_hashed_id(prefix: &str, input: &str) -> EntityId {
    let mut hasher = Sha3_256::default();
    hasher.update(input.as_bytes());
    let full_hash = hasher.finalize();
    encode_with_prefix(prefix, &full_hash[..ID_BYTES])
}

/// Decodes the base58-encoded part of the ID into raw bytes.
pub fn decode_id(id: &str) -> Option<Vec<u8>> {
    id.split_once('_')
        .and_then(|(_, encoded)| bs58::decode(encoded).into_vec().ok())
}

/// Returns the prefix part (before `_`) of the ID.
pub fn get_prefix(id: &str) -> Option<&str> {
    id.split_once('_').map(|(prefix, _)| prefix)
}

fn encode_with_prefix(prefix: &str, bytes: &[u8]) -> EntityId {
    let encoded = bs58::encode(bytes).into_string();
    format!("{}_{}", prefix, encoded)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdValidationError {
    #[error("ID exceeds maximum length of {0} characters")]
    TooLong(usize),
    #[error("ID contains invalid characters")]
    InvalidCharacters,
    #[error("ID is empty")]
    Empty,
    #[error("Invalid prefix: expected {expected}, got {got}")]
    InvalidPrefix { expected: String, got: String },
}

pub fn validate_id_string(s: &str, max_len: usize) -> Result<(), IdValidationError> {
    if s.is_empty() {
        return Err(IdValidationError::Empty);
    }
    if s.len() > max_len {
        return Err(IdValidationError::TooLong(max_len));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(IdValidationError::InvalidCharacters);
    }
    Ok(())
}

fn parse_prefixed(value: String, expected_prefix: &str) -> Result<Arc<EntityId>, IdValidationError> {
    let Some(encoded) = value.strip_prefix(&format!("{}_", expected_prefix)) else {
        let got = get_prefix(&value).unwrap_or("none").to_string();
        return Err(IdValidationError::InvalidPrefix {
            expected: expected_prefix.to_string(),
            got,
        });
    };

    bs58::decode(encoded)
        .into_vec()
        .map_err(|_| IdValidationError::InvalidCharacters)?;

    Ok(Arc::new(value))
}

/// Identifies one call session for its whole lifetime. Cheap to clone.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId {
    internal: Arc<EntityId>,
}

impl SessionId {
    pub fn new() -> Self {
        Self {
            internal: Arc::new(new_entity_id(prefix::SESSION_ID)),
        }
    }

    /// Stable ID derived from a label, for reproducible runs.
    pub fn from_label(label: &str) -> Self {
        Self {
            internal: Arc::new(new_hashed_id(prefix::SESSION_ID, label)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.internal
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let internal = parse_prefixed(value, prefix::SESSION_ID)?;
        Ok(Self { internal })
    }
}

impl FromStr for SessionId {
    type Err = IdValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.internal.as_ref().clone()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.internal, f)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionId").field(&*self.internal).finish()
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.internal
    }
}

/// Identifies one recorded gift transaction.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId {
    internal: Arc<EntityId>,
}

impl TransactionId {
    pub fn new() -> Self {
        Self {
            internal: Arc::new(new_entity_id(prefix::TRANSACTION_ID)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.internal
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for TransactionId {
    type Error = IdValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let internal = parse_prefixed(value, prefix::TRANSACTION_ID)?;
        Ok(Self { internal })
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.internal.as_ref().clone()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.internal, f)
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransactionId")
            .field(&*self.internal)
            .finish()
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.internal
    }
}

/// Catalog key for a gift. Supplied externally (config), so it is validated
/// rather than generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GiftId(String);

impl GiftId {
    const MAX_LEN: usize = 32;

    pub fn new(id: String) -> Result<Self, IdValidationError> {
        validate_id_string(&id, Self::MAX_LEN)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for GiftId {
    type Err = IdValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for GiftId {
    type Error = IdValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GiftId> for String {
    fn from(id: GiftId) -> Self {
        id.0
    }
}

impl fmt::Display for GiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl AsRef<str> for GiftId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
