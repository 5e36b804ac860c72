use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Fixed line the generation endpoint yields on a non-success response, and
/// the answer shown to the user when the transport itself fails.
pub const FAILURE_ANSWER: &str = "Failure! Try again";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            collection_name: None,
            prompt_template: None,
        }
    }

    pub fn with_collection(mut self, collection_name: impl Into<String>) -> Self {
        self.collection_name = Some(collection_name.into());
        self
    }

    pub fn with_prompt_template(mut self, prompt_template: impl Into<String>) -> Self {
        self.prompt_template = Some(prompt_template.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    /// One line of the streamed response body.
    Fragment(String),
    /// The stream closed normally; no further fragments follow.
    Done,
    /// The transport failed; the reason is for logs, never for display.
    Failed { reason: String },
}

/// Receiving half of an answer stream. Dropping it (or calling
/// [`AnswerStream::cancel`]) tells the producing worker to stop.
pub struct AnswerStream {
    events: mpsc::UnboundedReceiver<AnswerEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl AnswerStream {
    fn new(events: mpsc::UnboundedReceiver<AnswerEvent>, cancel_tx: oneshot::Sender<()>) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<AnswerEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AnswerEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for AnswerStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Seam over the text-generation backend. Starting a stream is infallible;
/// failures arrive as a terminal [`AnswerEvent::Failed`] event.
pub trait AnswerSource: Send + Sync {
    fn stream_answer(&self, request: AnswerRequest) -> AnswerStream;
}

/// Builds the channel triple an [`AnswerSource`] implementation feeds: event
/// sender for the worker, stream for the consumer, cancel signal back to the
/// worker. Also the hook scripted test sources use.
pub fn answer_channel() -> (
    mpsc::UnboundedSender<AnswerEvent>,
    AnswerStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (event_tx, AnswerStream::new(event_rx, cancel_tx), cancel_rx)
}
