use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transport error while sending command {index} ({command:?}): {source}")]
    Command {
        index: usize,
        command: String,
        #[source]
        source: Box<SyncError>,
    },
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("export failed: {0}")]
    Export(String),
}

impl SyncError {
    /// True for errors raised by the transport rather than the data path.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Io(_) | SyncError::Transport(_) | SyncError::Command { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
