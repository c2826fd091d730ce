use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TapeError {
    #[error("Malformed chunk &{id:04x}: {reason}")]
    MalformedChunk { id: u16, reason: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Not a UEF file")]
    NotUef,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TapeError {
    pub fn malformed(id: u16, reason: impl Into<String>) -> Self {
        TapeError::MalformedChunk {
            id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TapeError>;

/// A fatal error together with everything produced before it.
#[derive(Error, Debug)]
#[error("Stopped early: {error}")]
pub struct Truncated<T: Debug> {
    pub partial: T,
    #[source]
    pub error: TapeError,
}

impl<T: Debug> Truncated<T> {
    pub fn new(partial: T, error: TapeError) -> Self {
        Self { partial, error }
    }

    pub fn into_parts(self) -> (T, TapeError) {
        (self.partial, self.error)
    }
}
