use std::collections::HashSet;
use std::env;

use snafu::{OptionExt, ResultExt, Snafu};

use artalk_storage::{
    ConversationId, ConversationStore, MessageId, MessageStore, NewConversation, NewMessage,
    OwnerId, SqliteStore, StorageError, DEFAULT_CONVERSATION_TITLE,
};

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
    db_path: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    IdRoundtrip,
    IdInvalid,
    SchemaInit,
    FkViolation,
    ConversationCrud,
    ArtworkLookup,
    MessageRoundtrip,
    DeleteCascade,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "id_roundtrip" => Some(Self::IdRoundtrip),
            "id_invalid" => Some(Self::IdInvalid),
            "schema_init" => Some(Self::SchemaInit),
            "fk_violation" => Some(Self::FkViolation),
            "conversation_crud" => Some(Self::ConversationCrud),
            "artwork_lookup" => Some(Self::ArtworkLookup),
            "message_roundtrip" => Some(Self::MessageRoundtrip),
            "delete_cascade" => Some(Self::DeleteCascade),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::IdRoundtrip => "id_roundtrip",
            Self::IdInvalid => "id_invalid",
            Self::SchemaInit => "schema_init",
            Self::FkViolation => "fk_violation",
            Self::ConversationCrud => "conversation_crud",
            Self::ArtworkLookup => "artwork_lookup",
            Self::MessageRoundtrip => "message_roundtrip",
            Self::DeleteCascade => "delete_cascade",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("missing required --db argument for scenario '{scenario}'"))]
    MissingDbPath {
        stage: &'static str,
        scenario: &'static str,
    },
    #[snafu(display("storage validation failed: {source}"))]
    StorageValidation {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("sqlite query failed: {source}"))]
    SqliteQuery {
        stage: &'static str,
        source: sqlx::Error,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber_init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

fn tracing_subscriber_init() {
    // The runner is a dev tool; a failed double-init is fine to ignore.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());
    if let Some(db_path) = args.db_path.as_deref() {
        println!("db_path={db_path}");
    }

    match args.scenario {
        Scenario::IdRoundtrip => run_id_roundtrip(),
        Scenario::IdInvalid => run_id_invalid(),
        Scenario::SchemaInit => run_schema_init(require_db_path(&args, "schema_init")?).await,
        Scenario::FkViolation => run_fk_violation(require_db_path(&args, "fk_violation")?).await,
        Scenario::ConversationCrud => {
            run_conversation_crud(require_db_path(&args, "conversation_crud")?).await
        }
        Scenario::ArtworkLookup => {
            run_artwork_lookup(require_db_path(&args, "artwork_lookup")?).await
        }
        Scenario::MessageRoundtrip => {
            run_message_roundtrip(require_db_path(&args, "message_roundtrip")?).await
        }
        Scenario::DeleteCascade => {
            run_delete_cascade(require_db_path(&args, "delete_cascade")?).await
        }
        Scenario::All => run_all(args.db_path.as_deref()).await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut db_path = None;
    let mut pending = args.into_iter();

    // The parser is intentionally strict to keep scenario execution deterministic in CI.
    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            "--db" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-db-value",
                    arg: "--db",
                })?;
                db_path = Some(value);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
        db_path,
    })
}

fn require_db_path<'a>(args: &'a RunnerArgs, scenario: &'static str) -> RunnerResult<&'a str> {
    args.db_path.as_deref().context(MissingDbPathSnafu {
        stage: "require-db-path",
        scenario,
    })
}

fn run_id_roundtrip() -> RunnerResult<()> {
    let conversation_id = ConversationId::random();
    let conversation_ok = ConversationId::parse(&conversation_id.to_string())
        .is_ok_and(|parsed| parsed == conversation_id);

    let message_id = MessageId::mint_after(None);
    let message_ok =
        MessageId::parse(&message_id.to_string()).is_ok_and(|parsed| parsed == message_id);

    println!("id_roundtrip={}", conversation_ok && message_ok);
    if !(conversation_ok && message_ok) {
        return ScenarioFailedSnafu {
            stage: "scenario-id-roundtrip",
            scenario: "id_roundtrip",
            reason: "an id failed to roundtrip through its display form".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_id_invalid() -> RunnerResult<()> {
    let conversation_rejected = ConversationId::parse("not-a-valid-uuid").is_err();
    let message_rejected = MessageId::parse("not-a-timestamp").is_err();

    println!(
        "invalid_id_error={}",
        conversation_rejected && message_rejected
    );
    if !(conversation_rejected && message_rejected) {
        return ScenarioFailedSnafu {
            stage: "scenario-id-invalid",
            scenario: "id_invalid",
            reason: "an id wrapper accepted malformed input".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_schema_init(db_path: &str) -> RunnerResult<()> {
    let store = SqliteStore::open(db_path)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-schema-init-open",
        })?;
    let pool = store.pool();

    let discovered_tables = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('conversations', 'messages')",
    )
    .fetch_all(pool)
    .await
    .context(SqliteQuerySnafu {
        stage: "scenario-schema-init-list-tables",
    })?;

    let available_tables: HashSet<String> = discovered_tables.into_iter().collect();
    let schema_ok = ["conversations", "messages"]
        .iter()
        .all(|table_name| available_tables.contains(*table_name));

    let foreign_keys = sqlx::query_scalar::<_, i64>("PRAGMA foreign_keys;")
        .fetch_one(pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "scenario-schema-init-foreign-keys",
        })?;

    println!("schema_ok={schema_ok}");
    println!("foreign_keys={foreign_keys}");
    if !schema_ok || foreign_keys != 1 {
        return ScenarioFailedSnafu {
            stage: "scenario-schema-init",
            scenario: "schema_init",
            reason: "schema tables or pragmas are not in their expected state".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_fk_violation(db_path: &str) -> RunnerResult<()> {
    let store = SqliteStore::open(db_path)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-fk-violation-open",
        })?;

    let orphan_rejected = store
        .create_message(NewMessage {
            id: MessageId::mint_after(None),
            conversation_id: ConversationId::random(),
            question: "orphan question".to_string(),
            answer: "orphan answer".to_string(),
        })
        .await
        .is_err();

    println!("fk_violation_rejected={orphan_rejected}");
    if !orphan_rejected {
        return ScenarioFailedSnafu {
            stage: "scenario-fk-violation",
            scenario: "fk_violation",
            reason: "message insert without a conversation row was accepted".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_conversation_crud(db_path: &str) -> RunnerResult<()> {
    let store = SqliteStore::open(db_path)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-conversation-crud-open",
        })?;
    let owner = OwnerId::new("qa-owner");

    let created = store
        .create_conversation(NewConversation {
            id: ConversationId::random(),
            owner: owner.clone(),
            title: "  ".to_string(),
            artwork_id: None,
            collection_name: None,
        })
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-conversation-crud-create",
        })?;

    let default_title_applied = created.title == DEFAULT_CONVERSATION_TITLE;
    let listed = store
        .list_conversations(&owner)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-conversation-crud-list",
        })?;
    let listed_contains_created = listed.iter().any(|record| record.id == created.id);

    store
        .delete_conversation(created.id, &owner)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-conversation-crud-delete",
        })?;
    let gone = store
        .get_conversation(created.id)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-conversation-crud-get",
        })?
        .is_none();

    println!("default_title_applied={default_title_applied}");
    println!("listed_contains_created={listed_contains_created}");
    println!("deleted={gone}");
    if !default_title_applied || !listed_contains_created || !gone {
        return ScenarioFailedSnafu {
            stage: "scenario-conversation-crud",
            scenario: "conversation_crud",
            reason: "conversation create/list/delete did not behave as expected".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_artwork_lookup(db_path: &str) -> RunnerResult<()> {
    let store = SqliteStore::open(db_path)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-artwork-lookup-open",
        })?;
    let owner = OwnerId::new("qa-owner");

    let created = store
        .create_conversation(NewConversation {
            id: ConversationId::random(),
            owner: owner.clone(),
            title: "Nymphéas".to_string(),
            artwork_id: Some("water-lilies".to_string()),
            collection_name: Some("orangerie".to_string()),
        })
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-artwork-lookup-create",
        })?;

    let found = store
        .find_artwork_conversation(&owner, "water-lilies")
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-artwork-lookup-find",
        })?;
    let lookup_ok = found.map(|record| record.id) == Some(created.id);

    let collection = store
        .conversation_collection(created.id)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-artwork-lookup-collection",
        })?;
    let collection_ok = collection.as_deref() == Some("orangerie");

    println!("artwork_lookup_ok={lookup_ok}");
    println!("collection_ok={collection_ok}");
    if !lookup_ok || !collection_ok {
        return ScenarioFailedSnafu {
            stage: "scenario-artwork-lookup",
            scenario: "artwork_lookup",
            reason: "artwork lookup or collection fetch returned unexpected rows".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_message_roundtrip(db_path: &str) -> RunnerResult<()> {
    let store = SqliteStore::open(db_path)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-message-roundtrip-open",
        })?;
    let owner = OwnerId::new("qa-owner");

    let conversation = store
        .create_conversation(NewConversation {
            id: ConversationId::random(),
            owner: owner.clone(),
            title: "roundtrip".to_string(),
            artwork_id: None,
            collection_name: None,
        })
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-message-roundtrip-create-conversation",
        })?;

    let first_id = MessageId::mint_after(None);
    let second_id = MessageId::mint_after(Some(first_id));
    for (id, question) in [(first_id, "first"), (second_id, "second")] {
        store
            .create_message(NewMessage {
                id,
                conversation_id: conversation.id,
                question: question.to_string(),
                answer: format!("answer to {question}"),
            })
            .await
            .context(StorageValidationSnafu {
                stage: "scenario-message-roundtrip-create-message",
            })?;
    }

    let listed = store
        .list_messages(conversation.id)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-message-roundtrip-list",
        })?;
    let ordering_ok = listed.len() == 2 && listed[0].id == second_id && listed[1].id == first_id;

    println!("message_ordering_ok={ordering_ok}");
    if !ordering_ok {
        return ScenarioFailedSnafu {
            stage: "scenario-message-roundtrip",
            scenario: "message_roundtrip",
            reason: "message listing is not most-recent-first".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_delete_cascade(db_path: &str) -> RunnerResult<()> {
    let store = SqliteStore::open(db_path)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-delete-cascade-open",
        })?;
    let owner = OwnerId::new("qa-owner");

    let conversation = store
        .create_conversation(NewConversation {
            id: ConversationId::random(),
            owner: owner.clone(),
            title: "cascade".to_string(),
            artwork_id: None,
            collection_name: None,
        })
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-delete-cascade-create-conversation",
        })?;
    store
        .create_message(NewMessage {
            id: MessageId::mint_after(None),
            conversation_id: conversation.id,
            question: "will cascade".to_string(),
            answer: "gone soon".to_string(),
        })
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-delete-cascade-create-message",
        })?;

    store
        .delete_conversation(conversation.id, &owner)
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-delete-cascade-delete",
        })?;

    let remaining_messages = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?",
    )
    .bind(conversation.id.to_string())
    .fetch_one(store.pool())
    .await
    .context(SqliteQuerySnafu {
        stage: "scenario-delete-cascade-count",
    })?;

    println!("cascade_cleared={}", remaining_messages == 0);
    if remaining_messages != 0 {
        return ScenarioFailedSnafu {
            stage: "scenario-delete-cascade",
            scenario: "delete_cascade",
            reason: format!("{remaining_messages} message rows survived the cascade"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_all(db_path: Option<&str>) -> RunnerResult<()> {
    run_id_roundtrip()?;
    run_id_invalid()?;

    if let Some(path) = db_path {
        run_schema_init(path).await?;
        run_fk_violation(path).await?;
        run_conversation_crud(path).await?;
        run_artwork_lookup(path).await?;
        run_message_roundtrip(path).await?;
        run_delete_cascade(path).await?;
    }

    println!("all_passed=true");
    Ok(())
}
