use artalk_storage::{
    ConversationId, ConversationStore, MessageId, MessageStore, NewConversation, NewMessage,
    OwnerId, SqliteStore, StorageError, DEFAULT_CONVERSATION_TITLE,
};

async fn open_store() -> SqliteStore {
    SqliteStore::open(":memory:")
        .await
        .expect("in-memory sqlite store should open")
}

fn new_conversation(owner: &OwnerId, title: &str) -> NewConversation {
    NewConversation {
        id: ConversationId::random(),
        owner: owner.clone(),
        title: title.to_string(),
        artwork_id: None,
        collection_name: None,
    }
}

#[tokio::test]
async fn open_creates_schema_on_disk() {
    let directory = tempfile::tempdir().expect("tempdir");
    let db_path = directory.path().join("nested").join("artalk.db");

    let store = SqliteStore::open(&db_path.display().to_string())
        .await
        .expect("store opens and migrates at a nested path");

    let owner = OwnerId::new("owner-a");
    let conversations = store.list_conversations(&owner).await.expect("list");
    assert!(conversations.is_empty());
}

#[tokio::test]
async fn conversations_list_most_recent_first_per_owner() {
    let store = open_store().await;
    let owner = OwnerId::new("owner-a");
    let other_owner = OwnerId::new("owner-b");

    let first = store
        .create_conversation(new_conversation(&owner, "first"))
        .await
        .expect("create first");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = store
        .create_conversation(new_conversation(&owner, "second"))
        .await
        .expect("create second");
    store
        .create_conversation(new_conversation(&other_owner, "unrelated"))
        .await
        .expect("create unrelated");

    let listed = store.list_conversations(&owner).await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);
    assert!(listed[0].created_at_unix_ms >= listed[1].created_at_unix_ms);
}

#[tokio::test]
async fn blank_title_falls_back_to_default() {
    let store = open_store().await;
    let owner = OwnerId::new("owner-a");

    let created = store
        .create_conversation(new_conversation(&owner, "   "))
        .await
        .expect("create");

    assert_eq!(created.title, DEFAULT_CONVERSATION_TITLE);
    let loaded = store
        .get_conversation(created.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(loaded.title, DEFAULT_CONVERSATION_TITLE);
}

#[tokio::test]
async fn artwork_lookup_scopes_by_owner() {
    let store = open_store().await;
    let owner = OwnerId::new("owner-a");
    let other_owner = OwnerId::new("owner-b");

    let mut input = new_conversation(&owner, "La Joconde");
    input.artwork_id = Some("mona-lisa".to_string());
    input.collection_name = Some("louvre".to_string());
    let created = store.create_conversation(input).await.expect("create");

    let found = store
        .find_artwork_conversation(&owner, "mona-lisa")
        .await
        .expect("lookup");
    assert_eq!(found.map(|record| record.id), Some(created.id));

    let foreign = store
        .find_artwork_conversation(&other_owner, "mona-lisa")
        .await
        .expect("lookup");
    assert!(foreign.is_none());

    let collection = store
        .conversation_collection(created.id)
        .await
        .expect("collection");
    assert_eq!(collection.as_deref(), Some("louvre"));
}

#[tokio::test]
async fn collection_is_none_for_unassociated_conversations() {
    let store = open_store().await;
    let owner = OwnerId::new("owner-a");

    let created = store
        .create_conversation(new_conversation(&owner, "free chat"))
        .await
        .expect("create");

    let collection = store
        .conversation_collection(created.id)
        .await
        .expect("collection");
    assert!(collection.is_none());
}

#[tokio::test]
async fn messages_roundtrip_most_recent_first() {
    let store = open_store().await;
    let owner = OwnerId::new("owner-a");
    let conversation = store
        .create_conversation(new_conversation(&owner, "chat"))
        .await
        .expect("create conversation");

    let first_id = MessageId::mint_after(None);
    let second_id = MessageId::mint_after(Some(first_id));
    store
        .create_message(NewMessage {
            id: first_id,
            conversation_id: conversation.id,
            question: "Qui a peint ce tableau ?".to_string(),
            answer: "Léonard de Vinci.".to_string(),
        })
        .await
        .expect("create first message");
    store
        .create_message(NewMessage {
            id: second_id,
            conversation_id: conversation.id,
            question: "En quelle année ?".to_string(),
            answer: "Vers 1503.".to_string(),
        })
        .await
        .expect("create second message");

    let listed = store.list_messages(conversation.id).await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second_id);
    assert_eq!(listed[1].id, first_id);
    assert_eq!(listed[0].created_at_unix_ms, second_id.unix_millis());
}

#[tokio::test]
async fn message_insert_requires_existing_conversation() {
    let store = open_store().await;

    let result = store
        .create_message(NewMessage {
            id: MessageId::mint_after(None),
            conversation_id: ConversationId::random(),
            question: "orphan".to_string(),
            answer: "orphan".to_string(),
        })
        .await;

    assert!(matches!(result, Err(StorageError::SqliteQuery { .. })));
}

#[tokio::test]
async fn delete_conversation_requires_matching_owner() {
    let store = open_store().await;
    let owner = OwnerId::new("owner-a");
    let other_owner = OwnerId::new("owner-b");

    let created = store
        .create_conversation(new_conversation(&owner, "mine"))
        .await
        .expect("create");

    let foreign_delete = store.delete_conversation(created.id, &other_owner).await;
    assert!(matches!(foreign_delete, Err(StorageError::NotFound { .. })));

    store
        .delete_conversation(created.id, &owner)
        .await
        .expect("owner delete succeeds");
    let remaining = store.list_conversations(&owner).await.expect("list");
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn delete_messages_clears_only_the_target_conversation() {
    let store = open_store().await;
    let owner = OwnerId::new("owner-a");
    let kept = store
        .create_conversation(new_conversation(&owner, "kept"))
        .await
        .expect("create kept");
    let purged = store
        .create_conversation(new_conversation(&owner, "purged"))
        .await
        .expect("create purged");

    let kept_message_id = MessageId::mint_after(None);
    store
        .create_message(NewMessage {
            id: kept_message_id,
            conversation_id: kept.id,
            question: "keep me".to_string(),
            answer: "kept".to_string(),
        })
        .await
        .expect("create kept message");
    store
        .create_message(NewMessage {
            id: MessageId::mint_after(Some(kept_message_id)),
            conversation_id: purged.id,
            question: "purge me".to_string(),
            answer: "purged".to_string(),
        })
        .await
        .expect("create purged message");

    let deleted = store.delete_messages(purged.id).await.expect("delete");
    assert_eq!(deleted, 1);
    assert!(store
        .list_messages(purged.id)
        .await
        .expect("list purged")
        .is_empty());
    assert_eq!(
        store.list_messages(kept.id).await.expect("list kept").len(),
        1
    );
}
