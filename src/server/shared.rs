use std::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Shutdown,
}

pub type CallbackResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Work to run before the server is stopped.
pub type ShutdownCallback = Box<dyn FnOnce() -> CallbackResult + Send>;
