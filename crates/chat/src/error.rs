use snafu::Snafu;

use artalk_backend::BackendError;
use artalk_storage::StorageError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("failed to load conversations: {source}"))]
    LoadConversations {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to load messages for conversation '{conversation_id}': {source}"))]
    LoadMessages {
        stage: &'static str,
        conversation_id: String,
        source: StorageError,
    },
    #[snafu(display("failed to create conversation '{conversation_id}': {source}"))]
    CreateConversation {
        stage: &'static str,
        conversation_id: String,
        source: StorageError,
    },
    #[snafu(display(
        "failed to resolve collection for conversation '{conversation_id}': {source}"
    ))]
    ResolveCollection {
        stage: &'static str,
        conversation_id: String,
        source: StorageError,
    },
    #[snafu(display("failed to look up artwork conversation for '{artwork_id}': {source}"))]
    LookupArtworkConversation {
        stage: &'static str,
        artwork_id: String,
        source: StorageError,
    },
    #[snafu(display("failed to delete conversation '{conversation_id}': {source}"))]
    DeleteConversation {
        stage: &'static str,
        conversation_id: String,
        source: StorageError,
    },
    #[snafu(display("failed to persist message '{message_id}' after retry: {source}"))]
    PersistMessage {
        stage: &'static str,
        message_id: String,
        source: StorageError,
    },
    #[snafu(display("speech synthesis failed: {source}"))]
    Speech {
        stage: &'static str,
        source: BackendError,
    },
}

pub type ChatResult<T> = Result<T, ChatError>;
