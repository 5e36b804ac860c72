use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use super::error::{
    CreateSqliteDirectorySnafu, NotFoundSnafu, SqliteConnectOptionsSnafu, SqliteConnectSnafu,
    SqliteMigrateSnafu, SqlitePragmaSnafu, SqliteQuerySnafu, StorageResult,
};
use super::ids::{ConversationId, MessageId, OwnerId, current_unix_millis};
use super::types::{
    ConversationRecord, DEFAULT_CONVERSATION_TITLE, MessageRecord, NewConversation, NewMessage,
};
use super::{ConversationStore, MessageStore};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        // Explicit PRAGMA writes keep bootstrap behavior deterministic across drivers.
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-foreign-keys",
                pragma: "foreign_keys",
            })?;
        sqlx::query("PRAGMA busy_timeout = 5000;")
            .execute(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-busy-timeout",
                pragma: "busy_timeout",
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;

        tracing::debug!(database_url = %database_url, "sqlite store opened and migrated");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(
        &self,
        input: NewConversation,
    ) -> StorageResult<ConversationRecord> {
        let mut title = input.title;
        if title.trim().is_empty() {
            title = DEFAULT_CONVERSATION_TITLE.to_string();
        }

        let created_at = current_unix_millis();
        sqlx::query(
            "INSERT INTO conversations (id, owner, title, artwork_id, collection_name, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(input.id.to_string())
        .bind(input.owner.as_str())
        .bind(title.clone())
        .bind(input.artwork_id.clone())
        .bind(input.collection_name.clone())
        .bind(u64_to_i64(created_at, "conversation-create-created-at")?)
        .execute(&self.pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "conversation-create-insert",
        })?;

        Ok(ConversationRecord {
            id: input.id,
            owner: input.owner,
            title,
            artwork_id: input.artwork_id,
            collection_name: input.collection_name,
            created_at_unix_ms: created_at,
        })
    }

    async fn list_conversations(&self, owner: &OwnerId) -> StorageResult<Vec<ConversationRecord>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, owner, title, artwork_id, collection_name, created_at FROM conversations WHERE owner = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "conversation-list-query",
        })?;

        rows.into_iter().map(conversation_row_to_record).collect()
    }

    async fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Option<ConversationRecord>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, owner, title, artwork_id, collection_name, created_at FROM conversations WHERE id = ?",
        )
        .bind(conversation_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "conversation-get-query",
        })?;

        row.map(conversation_row_to_record).transpose()
    }

    async fn find_artwork_conversation(
        &self,
        owner: &OwnerId,
        artwork_id: &str,
    ) -> StorageResult<Option<ConversationRecord>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, owner, title, artwork_id, collection_name, created_at FROM conversations WHERE owner = ? AND artwork_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(owner.as_str())
        .bind(artwork_id)
        .fetch_optional(&self.pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "conversation-find-artwork-query",
        })?;

        row.map(conversation_row_to_record).transpose()
    }

    async fn conversation_collection(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Option<String>> {
        let collection = sqlx::query_scalar::<_, Option<String>>(
            "SELECT collection_name FROM conversations WHERE id = ?",
        )
        .bind(conversation_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "conversation-collection-query",
        })?;

        Ok(collection.flatten())
    }

    async fn delete_conversation(
        &self,
        conversation_id: ConversationId,
        owner: &OwnerId,
    ) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ? AND owner = ?")
            .bind(conversation_id.to_string())
            .bind(owner.as_str())
            .execute(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "conversation-delete-apply",
            })?;

        if result.rows_affected() == 0 {
            return NotFoundSnafu {
                stage: "conversation-delete-missing",
                entity: "conversation",
                id: conversation_id.to_string(),
            }
            .fail();
        }

        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_message(&self, input: NewMessage) -> StorageResult<MessageRecord> {
        let created_at = input.id.unix_millis();
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, question, answer, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(input.id.to_string())
        .bind(input.conversation_id.to_string())
        .bind(input.question.clone())
        .bind(input.answer.clone())
        .bind(u64_to_i64(created_at, "message-create-created-at")?)
        .execute(&self.pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "message-create-insert",
        })?;

        Ok(MessageRecord {
            id: input.id,
            conversation_id: input.conversation_id,
            question: input.question,
            answer: input.answer,
            created_at_unix_ms: created_at,
        })
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Vec<MessageRecord>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, question, answer, created_at FROM messages WHERE conversation_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "message-list-query",
        })?;

        rows.into_iter().map(message_row_to_record).collect()
    }

    async fn delete_messages(&self, conversation_id: ConversationId) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id.to_string())
            .execute(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-delete-apply",
            })?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: String,
    owner: String,
    title: String,
    artwork_id: Option<String>,
    collection_name: Option<String>,
    created_at: i64,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    question: String,
    answer: String,
    created_at: i64,
}

fn conversation_row_to_record(row: ConversationRow) -> StorageResult<ConversationRecord> {
    Ok(ConversationRecord {
        id: ConversationId::parse(&row.id)?,
        owner: OwnerId::new(row.owner),
        title: row.title,
        artwork_id: row.artwork_id,
        collection_name: row.collection_name,
        created_at_unix_ms: i64_to_u64(row.created_at, "conversation-row-created-at")?,
    })
}

fn message_row_to_record(row: MessageRow) -> StorageResult<MessageRecord> {
    Ok(MessageRecord {
        id: MessageId::parse(&row.id)?,
        conversation_id: ConversationId::parse(&row.conversation_id)?,
        question: row.question,
        answer: row.answer,
        created_at_unix_ms: i64_to_u64(row.created_at, "message-row-created-at")?,
    })
}

fn i64_to_u64(value: i64, stage: &'static str) -> StorageResult<u64> {
    value
        .try_into()
        .map_err(|_| super::error::StorageError::InvariantViolation {
            stage,
            details: format!("negative sqlite integer '{value}' cannot map to u64"),
        })
}

fn u64_to_i64(value: u64, stage: &'static str) -> StorageResult<i64> {
    value
        .try_into()
        .map_err(|_| super::error::StorageError::InvariantViolation {
            stage,
            details: format!("u64 '{value}' cannot map to sqlite i64"),
        })
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") || database_location == ":memory:" {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    format!("sqlite://{database_location}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_passes_explicit_sqlite_urls_through() {
        assert_eq!(
            normalize_database_url("sqlite:///tmp/artalk.db"),
            "sqlite:///tmp/artalk.db"
        );
    }

    #[test]
    fn normalize_maps_memory_shorthand() {
        assert_eq!(normalize_database_url(":memory:"), "sqlite::memory:");
    }

    #[test]
    fn normalize_prefixes_bare_paths() {
        assert_eq!(
            normalize_database_url("data/artalk.db"),
            "sqlite://data/artalk.db"
        );
    }
}
