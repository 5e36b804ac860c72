use super::ids::{ConversationId, MessageId, OwnerId};

/// Default conversation title used when a caller supplies a blank one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub owner: OwnerId,
    pub title: String,
    /// Artwork the conversation was opened from, when it was opened from one.
    pub artwork_id: Option<String>,
    /// Retrieval collection the backend grounds answers in.
    pub collection_name: Option<String>,
    pub created_at_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub id: ConversationId,
    pub owner: OwnerId,
    pub title: String,
    pub artwork_id: Option<String>,
    pub collection_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub question: String,
    /// Mutable while the answer streams in; final once the record persists.
    pub answer: String,
    pub created_at_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub question: String,
    pub answer: String,
}
