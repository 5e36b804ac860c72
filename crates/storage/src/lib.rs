pub mod error;
pub mod ids;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;

pub use error::{StorageError, StorageResult};
pub use ids::{ConversationId, MessageId, OwnerId};
pub use sqlite::SqliteStore;
pub use types::{
    ConversationRecord, DEFAULT_CONVERSATION_TITLE, MessageRecord, NewConversation, NewMessage,
};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        input: NewConversation,
    ) -> StorageResult<ConversationRecord>;
    /// Lists the owner's conversations, most recently created first.
    async fn list_conversations(&self, owner: &OwnerId) -> StorageResult<Vec<ConversationRecord>>;
    async fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Option<ConversationRecord>>;
    /// Looks up the conversation an owner already has for a given artwork.
    async fn find_artwork_conversation(
        &self,
        owner: &OwnerId,
        artwork_id: &str,
    ) -> StorageResult<Option<ConversationRecord>>;
    /// Fetches just the retrieval-collection name of a conversation.
    async fn conversation_collection(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Option<String>>;
    async fn delete_conversation(
        &self,
        conversation_id: ConversationId,
        owner: &OwnerId,
    ) -> StorageResult<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, input: NewMessage) -> StorageResult<MessageRecord>;
    /// Lists a conversation's messages, most recently created first.
    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Vec<MessageRecord>>;
    async fn delete_messages(&self, conversation_id: ConversationId) -> StorageResult<u64>;
}

pub trait Store: ConversationStore + MessageStore {}

impl<T> Store for T where T: ConversationStore + MessageStore {}
