/*
    entry.rs - Store data model

    Keys and values are printable ASCII tokens that survive the wire
    protocol's delimiters. Timestamps are wall-clock milliseconds minted
    at write origination and carried verbatim through replication.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, minted by the writer's local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("System clock is before UNIX epoch");
        Timestamp(duration.as_millis() as u64)
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live (value, timestamp) binding for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub timestamp: Timestamp,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, timestamp: Timestamp) -> Self {
        Entry {
            key: key.into(),
            value: value.into(),
            timestamp,
        }
    }
}

/// Characters that would collide with the wire protocol's token and
/// list delimiters. Keys and values must avoid all of them.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && b != b':' && b != b';' && b != b','
}

/// A key is a non-empty printable ASCII token free of whitespace and
/// the `:`/`;`/`,` delimiters.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(is_token_byte)
}

/// Values share the key constraints; the empty string is reserved as the
/// "absent" reply.
pub fn is_valid_value(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(is_token_byte)
}
