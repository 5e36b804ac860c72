pub mod aggregator;
pub mod config;
pub mod error;
pub mod prompt;
pub mod publish;
pub mod session;
pub mod speech;

pub use aggregator::{AnswerAggregator, FALLBACK_ANSWER, PLACEHOLDER_ANSWER, StreamPhase};
pub use config::{ChatConfig, ConfigStore};
pub use error::{ChatError, ChatResult};
pub use prompt::build_prompt;
pub use publish::Published;
pub use session::{ChatSession, SessionOptions, StopHandle};
pub use speech::{AudioPlayer, SpeechController};
