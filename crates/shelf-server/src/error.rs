use shelf_queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    AuthFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
