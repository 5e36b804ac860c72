use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::ResultExt;
use uuid::Uuid;

use super::error::{InvalidConversationIdSnafu, InvalidMessageIdSnafu, StorageError, StorageResult};

/// Conversation identifier, a random UUID minted by the caller before the
/// record exists so a fresh conversation can be "current" prior to its first
/// persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new(raw: Uuid) -> Self {
        Self(raw)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> StorageResult<Self> {
        let parsed = Uuid::parse_str(raw).context(InvalidConversationIdSnafu {
            stage: "parse-conversation-id",
            raw: raw.to_string(),
        })?;
        Ok(Self(parsed))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<Uuid> for ConversationId {
    fn from(value: Uuid) -> Self {
        Self::new(value)
    }
}

impl FromStr for ConversationId {
    type Err = StorageError;

    fn from_str(raw: &str) -> StorageResult<Self> {
        Self::parse(raw)
    }
}

/// Message identifier, the unix-millisecond instant the message was minted.
///
/// Two messages minted within the same millisecond would collide, so
/// [`MessageId::mint_after`] nudges the new id one past the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn mint_after(previous: Option<MessageId>) -> Self {
        let now = current_unix_millis();
        match previous {
            Some(last) if last.0 >= now => Self(last.0 + 1),
            _ => Self(now),
        }
    }

    pub fn parse(raw: &str) -> StorageResult<Self> {
        let parsed = raw.parse::<u64>().context(InvalidMessageIdSnafu {
            stage: "parse-message-id",
            raw: raw.to_string(),
        })?;
        Ok(Self(parsed))
    }

    pub fn unix_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = StorageError;

    fn from_str(raw: &str) -> StorageResult<Self> {
        Self::parse(raw)
    }
}

/// Opaque identity-provider subject the records belong to. The identity
/// provider itself stays outside this crate; callers inject the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

pub(crate) fn current_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}
