pub mod error;
pub mod http;
pub mod source;
pub mod speech;

pub use error::{BackendError, BackendResult};
pub use http::{GENERATION_PATH, HttpAnswerSource};
pub use source::{
    AnswerEvent, AnswerRequest, AnswerSource, AnswerStream, FAILURE_ANSWER, answer_channel,
};
pub use speech::{HttpSpeechSynthesizer, SPEECH_MODEL_ID, SpeechSynthesizer};
