use futures::StreamExt;
use reqwest::Client;
use tokio::sync::{mpsc, oneshot};

use super::source::{
    AnswerEvent, AnswerRequest, AnswerSource, AnswerStream, FAILURE_ANSWER, answer_channel,
};

/// Path of the retrieval-augmented generation endpoint, relative to the
/// configured base URL.
pub const GENERATION_PATH: &str = "/gemini/generate_rag";

/// Streams answers from the backend's line-oriented generation endpoint.
pub struct HttpAnswerSource {
    client: Client,
    base_url: String,
}

impl HttpAnswerSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn generation_url(&self) -> String {
        format!("{}{GENERATION_PATH}", self.base_url)
    }
}

impl AnswerSource for HttpAnswerSource {
    fn stream_answer(&self, request: AnswerRequest) -> AnswerStream {
        let (event_tx, stream, cancel_rx) = answer_channel();
        let client = self.client.clone();
        let url = self.generation_url();

        tokio::spawn(run_stream_worker(client, url, request, event_tx, cancel_rx));

        stream
    }
}

async fn run_stream_worker(
    client: Client,
    url: String,
    request: AnswerRequest,
    event_tx: mpsc::UnboundedSender<AnswerEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let response = match client.post(&url).json(&request).send().await {
        Ok(response) => response,
        Err(source) => {
            tracing::warn!(url = %url, error = %source, "generation request failed to send");
            let _ = event_tx.send(AnswerEvent::Failed {
                reason: source.to_string(),
            });
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        // The endpoint's wire contract: a non-success response stands in for
        // a single fixed failure line followed by stream close.
        tracing::warn!(url = %url, status = %status, "generation endpoint returned non-success status");
        let _ = event_tx.send(AnswerEvent::Fragment(FAILURE_ANSWER.to_string()));
        let _ = event_tx.send(AnswerEvent::Done);
        return;
    }

    let mut body = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!(url = %url, "generation stream cancelled by consumer");
                return;
            }
            chunk = body.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        if !drain_complete_lines(&mut buffer, &event_tx) {
                            return;
                        }
                    }
                    Some(Err(source)) => {
                        tracing::warn!(url = %url, error = %source, "generation stream failed mid-body");
                        let _ = event_tx.send(AnswerEvent::Failed {
                            reason: source.to_string(),
                        });
                        return;
                    }
                    None => {
                        // Flush a final unterminated line before closing.
                        if !buffer.is_empty() {
                            let _ = event_tx.send(AnswerEvent::Fragment(std::mem::take(&mut buffer)));
                        }
                        let _ = event_tx.send(AnswerEvent::Done);
                        return;
                    }
                }
            }
        }
    }
}

/// Emits every complete `\n`-terminated line in `buffer` as a fragment,
/// stripping a trailing `\r`. Returns false once the consumer is gone.
fn drain_complete_lines(
    buffer: &mut String,
    event_tx: &mpsc::UnboundedSender<AnswerEvent>,
) -> bool {
    while let Some(newline_index) = buffer.find('\n') {
        let mut line = buffer[..newline_index].to_string();
        buffer.replace_range(..=newline_index, "");
        if line.ends_with('\r') {
            line.pop();
        }

        if event_tx.send(AnswerEvent::Fragment(line)).is_err() {
            return false;
        }
    }

    true
}
