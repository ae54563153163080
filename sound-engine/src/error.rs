use audio_backend::BackendError;
use clip_cache::ClipError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no source or clip named `{0}`")]
    NotFound(String),
    #[error("no audio backend initialized")]
    BackendUnsupported,
    #[error("no free voice for source `{0}`")]
    VoiceExhausted(String),
    #[error("decode failed: {0}")]
    DecodeFailed(#[from] ClipError),
    #[error("format rejected by backend: {0}")]
    FormatUnsupported(String),
    #[error("audio driver failure: {0}")]
    Io(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Format(msg) => EngineError::FormatUnsupported(msg),
            BackendError::Io(msg) => EngineError::Io(msg),
            BackendError::Unsupported | BackendError::LineBusy => EngineError::BackendUnsupported,
            BackendError::UnknownVoice(v) => EngineError::Io(format!("unknown voice {v:?}")),
        }
    }
}
