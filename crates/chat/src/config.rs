use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::session::SessionOptions;

pub const CONFIG_DIRECTORY_NAME: &str = "artalk";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ENV_PREFIX: &str = "ARTALK_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the generation backend; the endpoint path is fixed.
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database location; `:memory:` keeps everything transient.
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub default_collection: Option<String>,
    pub prompt_template: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            default_collection: options.default_collection,
            prompt_template: options.prompt_template,
        }
    }
}

impl SessionConfig {
    pub fn to_options(&self) -> SessionOptions {
        SessionOptions {
            default_collection: self.default_collection.clone(),
            prompt_template: self.prompt_template.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub base_url: String,
    pub api_key: String,
    pub voice_id: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".to_string(),
            api_key: String::new(),
            voice_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub speech: SpeechConfig,
}

impl ChatConfig {
    /// Layered load: built-in defaults, then the TOML file, then
    /// `ARTALK_`-prefixed environment variables (`ARTALK_BACKEND__BASE_URL`).
    /// A missing or unparsable file falls back to defaults with a warning;
    /// configuration problems never stop the client from starting.
    pub fn load_from(path: &Path) -> Self {
        let figment = Figment::from(Serialized::defaults(ChatConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        match figment.extract::<ChatConfig>() {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(
                    "failed to load configuration from {:?}: {}. using defaults",
                    path,
                    error
                );
                ChatConfig::default()
            }
        }
    }
}

/// Loaded configuration shared across the client. Readers take cheap
/// snapshots; `reload` swaps in a fresh load atomically.
pub struct ConfigStore {
    config: Arc<ArcSwap<ChatConfig>>,
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(CONFIG_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".artalk"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let config = ChatConfig::load_from(&config_path);
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config(&self) -> Arc<ChatConfig> {
        self.config.load_full()
    }

    pub fn reload(&self) {
        let config = ChatConfig::load_from(&self.config_path);
        self.config.store(Arc::new(config));
    }
}

fn default_database_url() -> String {
    dirs::data_dir()
        .map(|path| {
            path.join(CONFIG_DIRECTORY_NAME)
                .join("chat.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "chat.db".to_string())
}
