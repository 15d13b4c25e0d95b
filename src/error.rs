//! Error types shared by the mailbox collaborators and the UI loop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("mailbox {0} not found")]
    MailboxNotFound(String),

    #[error("message {0} not found")]
    MessageNotFound(String),

    #[error("subscription closed")]
    StreamClosed,

    #[error("message parsing error: {0}")]
    Parse(String),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("failed to launch {command}: {reason}")]
    Launch { command: String, reason: String },

    #[error("background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
