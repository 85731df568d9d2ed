/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can contain failures uniformly (user-facing apology vs expected outcome).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("user has not authorized the music provider")]
    Unauthorized,

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
