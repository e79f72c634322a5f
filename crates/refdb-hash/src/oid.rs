use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string, is_lower_hex_digit};
use crate::HashError;

/// Number of raw bytes in an object identifier.
pub const RAW_LEN: usize = 20;
/// Number of hex digits in an object identifier.
pub const HEX_LEN: usize = RAW_LEN * 2;

/// A 160-bit object identifier, the hash naming an immutable object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; RAW_LEN]);

impl ObjectId {
    /// The null identifier (all zeros).
    pub const NULL: Self = Self([0u8; RAW_LEN]);

    /// Build from raw bytes.
    pub fn from_bytes(bytes: [u8; RAW_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from 40 hex digits, either case.
    pub fn from_hex(hex: impl AsRef<[u8]>) -> Result<Self, HashError> {
        let hex = hex.as_ref();
        let mut bytes = [0u8; RAW_LEN];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Parse from exactly 40 *lowercase* hex digits, as the packed wire
    /// format requires.
    pub fn from_hex_strict(hex: impl AsRef<[u8]>) -> Result<Self, HashError> {
        let hex = hex.as_ref();
        if let Some(position) = hex.iter().position(|&b| !is_lower_hex_digit(b)) {
            return Err(HashError::InvalidHex {
                position,
                character: hex[position] as char,
            });
        }
        Self::from_hex(hex)
    }

    /// The raw bytes of the identifier.
    pub fn as_bytes(&self) -> &[u8; RAW_LEN] {
        &self.0
    }

    /// Whether this is the null (all-zeros) identifier.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
