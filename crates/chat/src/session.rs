use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use snafu::ResultExt;
use tracing::{debug, warn};

use artalk_backend::{AnswerEvent, AnswerRequest, AnswerSource};
use artalk_storage::{
    ConversationId, ConversationRecord, ConversationStore, MessageId, MessageRecord, MessageStore,
    NewConversation, NewMessage, OwnerId, StorageError, Store,
};

use crate::aggregator::{AnswerAggregator, PLACEHOLDER_ANSWER};
use crate::error::{
    ChatResult, CreateConversationSnafu, DeleteConversationSnafu, LoadConversationsSnafu,
    LoadMessagesSnafu, LookupArtworkConversationSnafu, PersistMessageSnafu, ResolveCollectionSnafu,
};
use crate::prompt::build_prompt;
use crate::publish::Published;

/// Knobs a host wires in at construction. Nothing here is resolved from
/// ambient globals.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Collection used when neither the conversation nor the store names one.
    pub default_collection: Option<String>,
    /// Prompt-template identifier forwarded with every generation request.
    pub prompt_template: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_collection: Some("defaultCollectionName".to_string()),
            prompt_template: Some("prompt_template_TOPIC".to_string()),
        }
    }
}

/// Cooperative stop signal for the in-flight stream. Cloneable so a UI can
/// hold one while the session is mutably borrowed by `send_query`.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Association staged by [`ChatSession::open_artwork_conversation`] for a
/// conversation whose record does not exist yet. The first send consumes it.
#[derive(Debug, Clone)]
struct PendingConversation {
    artwork_id: Option<String>,
    collection_name: Option<String>,
    title: Option<String>,
}

/// Orchestrates the chat flow for one owner: conversation lifecycle, query
/// sends, stream consumption, and the published snapshots a UI renders.
///
/// `send_query` takes `&mut self` and consumes the stream inline, so all
/// session operations are serialized; at most one send is active.
pub struct ChatSession {
    store: Arc<dyn Store>,
    source: Arc<dyn AnswerSource>,
    owner: OwnerId,
    options: SessionOptions,
    conversations: Published<Vec<ConversationRecord>>,
    messages: Published<HashMap<ConversationId, Vec<MessageRecord>>>,
    current_conversation: Published<Option<ConversationId>>,
    awaiting_response: Published<bool>,
    loading: Published<bool>,
    stop_flag: Arc<AtomicBool>,
    pending_association: Option<PendingConversation>,
    last_message_id: Option<MessageId>,
}

impl ChatSession {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn AnswerSource>,
        owner: OwnerId,
        options: SessionOptions,
    ) -> Self {
        Self {
            store,
            source,
            owner,
            options,
            conversations: Published::new(Vec::new()),
            messages: Published::new(HashMap::new()),
            current_conversation: Published::new(None),
            awaiting_response: Published::new(false),
            loading: Published::new(false),
            stop_flag: Arc::new(AtomicBool::new(false)),
            pending_association: None,
            last_message_id: None,
        }
    }

    pub fn conversations(&self) -> &Published<Vec<ConversationRecord>> {
        &self.conversations
    }

    pub fn messages(&self) -> &Published<HashMap<ConversationId, Vec<MessageRecord>>> {
        &self.messages
    }

    pub fn current_conversation(&self) -> &Published<Option<ConversationId>> {
        &self.current_conversation
    }

    pub fn awaiting_response(&self) -> &Published<bool> {
        &self.awaiting_response
    }

    pub fn loading(&self) -> &Published<bool> {
        &self.loading
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop_flag),
        }
    }

    /// Loads the owner's conversations and opens the most recent one.
    pub async fn initialize(&mut self) -> ChatResult<()> {
        self.loading.set(true);
        let outcome = self.initialize_inner().await;
        self.loading.set(false);
        outcome
    }

    async fn initialize_inner(&mut self) -> ChatResult<()> {
        let conversations = self
            .store
            .list_conversations(&self.owner)
            .await
            .context(LoadConversationsSnafu { stage: "initialize" })?;

        let most_recent = conversations.first().map(|record| record.id);
        self.conversations.set(conversations);

        if let Some(conversation_id) = most_recent {
            self.current_conversation.set(Some(conversation_id));
            self.load_messages_if_absent(conversation_id).await?;
        }
        Ok(())
    }

    /// Makes `conversation_id` current, loading its history on first visit.
    pub async fn select_conversation(&mut self, conversation_id: ConversationId) -> ChatResult<()> {
        self.current_conversation.set(Some(conversation_id));
        self.pending_association = None;
        self.load_messages_if_absent(conversation_id).await
    }

    /// Starts an empty conversation; its record is created lazily by the
    /// first send.
    pub fn new_conversation(&mut self) -> ConversationId {
        let conversation_id = ConversationId::random();
        self.pending_association = None;
        self.insert_empty_history(conversation_id);
        self.current_conversation.set(Some(conversation_id));
        conversation_id
    }

    /// Opens the owner's conversation for an artwork, reusing an existing one
    /// or staging a fresh one carrying the artwork and collection association.
    pub async fn open_artwork_conversation(
        &mut self,
        artwork_id: &str,
        collection_name: Option<String>,
        title: Option<String>,
    ) -> ChatResult<ConversationId> {
        let existing = self
            .store
            .find_artwork_conversation(&self.owner, artwork_id)
            .await
            .context(LookupArtworkConversationSnafu {
                stage: "open-artwork-conversation",
                artwork_id: artwork_id.to_string(),
            })?;

        if let Some(record) = existing {
            let conversation_id = record.id;
            self.select_conversation(conversation_id).await?;
            return Ok(conversation_id);
        }

        let conversation_id = ConversationId::random();
        self.pending_association = Some(PendingConversation {
            artwork_id: Some(artwork_id.to_string()),
            collection_name,
            title,
        });
        self.insert_empty_history(conversation_id);
        self.current_conversation.set(Some(conversation_id));
        Ok(conversation_id)
    }

    /// Deletes a conversation and its messages. If it was current, the most
    /// recent remaining conversation becomes current.
    pub async fn delete_conversation(&mut self, conversation_id: ConversationId) -> ChatResult<()> {
        self.store
            .delete_messages(conversation_id)
            .await
            .context(DeleteConversationSnafu {
                stage: "delete-messages",
                conversation_id: conversation_id.to_string(),
            })?;
        if let Err(error) = self
            .store
            .delete_conversation(conversation_id, &self.owner)
            .await
        {
            // A staged conversation has no record yet; dropping its in-memory
            // history is all the deletion there is.
            let staged_only = !self
                .conversations
                .get()
                .iter()
                .any(|record| record.id == conversation_id);
            if !(staged_only && matches!(error, StorageError::NotFound { .. })) {
                return Err(error).context(DeleteConversationSnafu {
                    stage: "delete-conversation",
                    conversation_id: conversation_id.to_string(),
                });
            }
        }

        let mut conversations = self.conversations.get();
        conversations.retain(|record| record.id != conversation_id);
        self.conversations.set(conversations.clone());

        let mut histories = self.messages.get();
        histories.remove(&conversation_id);
        self.messages.set(histories);

        if self.current_conversation.get() == Some(conversation_id) {
            self.pending_association = None;
            let fallback = conversations.first().map(|record| record.id);
            self.current_conversation.set(fallback);
            if let Some(next) = fallback {
                self.load_messages_if_absent(next).await?;
            }
        }
        Ok(())
    }

    /// Sends a user query through the full pipeline: placeholder message,
    /// lazy conversation creation, prompt construction, stream consumption,
    /// final persistence.
    pub async fn send_query(&mut self, text: &str) -> ChatResult<()> {
        self.stop_flag.store(false, Ordering::SeqCst);

        let conversation_id = match self.current_conversation.get() {
            Some(id) => id,
            None => {
                let id = ConversationId::random();
                self.insert_empty_history(id);
                self.current_conversation.set(Some(id));
                id
            }
        };

        let history_was_empty = self.history_len(conversation_id) == 0;

        let message_id = MessageId::mint_after(self.last_message_id);
        self.last_message_id = Some(message_id);
        let message = MessageRecord {
            id: message_id,
            conversation_id,
            question: text.to_string(),
            answer: PLACEHOLDER_ANSWER.to_string(),
            created_at_unix_ms: message_id.unix_millis(),
        };
        self.push_message(message);
        self.awaiting_response.set(true);

        let request = match self
            .prepare_request(conversation_id, history_was_empty, text)
            .await
        {
            Ok(request) => request,
            Err(error) => {
                // Lookup failures abort the send; the placeholder comes back out.
                self.remove_message(conversation_id, message_id);
                self.awaiting_response.set(false);
                return Err(error);
            }
        };

        let final_answer = self.consume_stream(conversation_id, message_id, request).await;
        self.set_answer(conversation_id, message_id, &final_answer);
        self.awaiting_response.set(false);

        self.persist_message(conversation_id, message_id, text, &final_answer)
            .await
    }

    /// Creates the conversation record when this send is the first message,
    /// then resolves the collection and builds the generation request.
    async fn prepare_request(
        &mut self,
        conversation_id: ConversationId,
        history_was_empty: bool,
        text: &str,
    ) -> ChatResult<AnswerRequest> {
        if history_was_empty && !self.conversation_record_exists(conversation_id).await? {
            let pending = self.pending_association.take();
            let title = pending
                .as_ref()
                .and_then(|association| association.title.clone())
                .unwrap_or_else(|| text.to_string());
            let record = self
                .store
                .create_conversation(NewConversation {
                    id: conversation_id,
                    owner: self.owner.clone(),
                    title,
                    artwork_id: pending
                        .as_ref()
                        .and_then(|association| association.artwork_id.clone()),
                    collection_name: pending
                        .and_then(|association| association.collection_name),
                })
                .await
                .context(CreateConversationSnafu {
                    stage: "send-create-conversation",
                    conversation_id: conversation_id.to_string(),
                })?;

            let mut conversations = self.conversations.get();
            conversations.insert(0, record);
            self.conversations.set(conversations);
        }

        let collection = self.resolve_collection(conversation_id).await?;
        let prompt = build_prompt(&self.history(conversation_id));

        let mut request = AnswerRequest::new(prompt);
        if let Some(collection) = collection {
            request = request.with_collection(collection);
        }
        if let Some(template) = self.options.prompt_template.clone() {
            request = request.with_prompt_template(template);
        }
        Ok(request)
    }

    /// An empty in-memory history does not imply a missing record: a record
    /// persists across restarts even when no message ever did.
    async fn conversation_record_exists(
        &self,
        conversation_id: ConversationId,
    ) -> ChatResult<bool> {
        if self
            .conversations
            .get()
            .iter()
            .any(|record| record.id == conversation_id)
        {
            return Ok(true);
        }

        let stored = self
            .store
            .get_conversation(conversation_id)
            .await
            .context(CreateConversationSnafu {
                stage: "send-check-conversation",
                conversation_id: conversation_id.to_string(),
            })?;
        Ok(stored.is_some())
    }

    /// In-memory record first, store lookup second, configured default last.
    async fn resolve_collection(
        &self,
        conversation_id: ConversationId,
    ) -> ChatResult<Option<String>> {
        let in_memory = self
            .conversations
            .get()
            .iter()
            .find(|record| record.id == conversation_id)
            .and_then(|record| record.collection_name.clone());
        if in_memory.is_some() {
            return Ok(in_memory);
        }

        let stored = self
            .store
            .conversation_collection(conversation_id)
            .await
            .context(ResolveCollectionSnafu {
                stage: "resolve-collection",
                conversation_id: conversation_id.to_string(),
            })?;
        if stored.is_some() {
            return Ok(stored);
        }

        Ok(self.options.default_collection.clone())
    }

    /// Drains the answer stream, republishing the active message on every
    /// accepted fragment, and returns the terminal answer.
    async fn consume_stream(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        request: AnswerRequest,
    ) -> String {
        let mut stream = self.source.stream_answer(request);
        let mut aggregator = AnswerAggregator::begin();

        while let Some(event) = stream.recv().await {
            if self.stop_flag.load(Ordering::SeqCst) {
                aggregator.cancel();
                stream.cancel();
            }
            match event {
                AnswerEvent::Fragment(fragment) => {
                    if let Some(answer) = aggregator.on_fragment(&fragment) {
                        self.set_answer(conversation_id, message_id, &answer);
                    }
                }
                AnswerEvent::Done => break,
                AnswerEvent::Failed { reason } => {
                    warn!(conversation = %conversation_id, error = %reason, "answer stream failed");
                    aggregator.fail();
                    break;
                }
            }
        }

        let final_answer = aggregator.finish();
        debug!(
            conversation = %conversation_id,
            message = %message_id,
            phase = ?aggregator.phase(),
            "answer stream finished"
        );
        final_answer
    }

    /// Persists the finished message, retrying once before surfacing the
    /// error. The in-memory answer stays displayed either way.
    async fn persist_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        question: &str,
        answer: &str,
    ) -> ChatResult<()> {
        let input = NewMessage {
            id: message_id,
            conversation_id,
            question: question.to_string(),
            answer: answer.to_string(),
        };

        if let Err(first) = self.store.create_message(input.clone()).await {
            warn!(message = %message_id, error = %first, "message persist failed, retrying");
            self.store
                .create_message(input)
                .await
                .context(PersistMessageSnafu {
                    stage: "persist-message",
                    message_id: message_id.to_string(),
                })?;
        }
        Ok(())
    }

    async fn load_messages_if_absent(
        &mut self,
        conversation_id: ConversationId,
    ) -> ChatResult<()> {
        if self.messages.get().contains_key(&conversation_id) {
            return Ok(());
        }

        let history = self
            .store
            .list_messages(conversation_id)
            .await
            .context(LoadMessagesSnafu {
                stage: "load-messages",
                conversation_id: conversation_id.to_string(),
            })?;
        self.last_message_id = self
            .last_message_id
            .into_iter()
            .chain(history.first().map(|message| message.id))
            .max();

        let mut histories = self.messages.get();
        histories.insert(conversation_id, history);
        self.messages.set(histories);
        Ok(())
    }

    fn insert_empty_history(&self, conversation_id: ConversationId) {
        let mut histories = self.messages.get();
        histories.entry(conversation_id).or_default();
        self.messages.set(histories);
    }

    fn history(&self, conversation_id: ConversationId) -> Vec<MessageRecord> {
        self.messages
            .get()
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    fn history_len(&self, conversation_id: ConversationId) -> usize {
        self.messages
            .get()
            .get(&conversation_id)
            .map_or(0, Vec::len)
    }

    fn push_message(&self, message: MessageRecord) {
        let mut histories = self.messages.get();
        histories
            .entry(message.conversation_id)
            .or_default()
            .insert(0, message);
        self.messages.set(histories);
    }

    fn remove_message(&self, conversation_id: ConversationId, message_id: MessageId) {
        let mut histories = self.messages.get();
        if let Some(history) = histories.get_mut(&conversation_id) {
            history.retain(|message| message.id != message_id);
        }
        self.messages.set(histories);
    }

    fn set_answer(&self, conversation_id: ConversationId, message_id: MessageId, answer: &str) {
        let mut histories = self.messages.get();
        if let Some(message) = histories
            .get_mut(&conversation_id)
            .and_then(|history| history.iter_mut().find(|message| message.id == message_id))
        {
            message.answer = answer.to_string();
        }
        self.messages.set(histories);
    }
}
