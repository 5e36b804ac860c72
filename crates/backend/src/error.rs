use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("speech synthesis request failed on `{stage}`: {source}"))]
    SpeechRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("speech synthesis endpoint returned status {status}: {body}"))]
    SpeechStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to read speech synthesis audio body: {source}"))]
    SpeechBody {
        stage: &'static str,
        source: reqwest::Error,
    },
}

pub type BackendResult<T> = Result<T, BackendError>;
