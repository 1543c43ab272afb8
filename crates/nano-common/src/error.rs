use thiserror::Error;

/// Host-side failures of the NANO runtime.
///
/// Script-visible stream failures never reach this type directly; they are
/// surfaced to JavaScript as thrown exceptions or rejected promises. Only
/// failures that end a request (or prevent an app from starting) are
/// represented here.
#[derive(Error, Debug)]
pub enum NanoError {
    #[error("Transport error: {0}")]
    Transport(String),

    /// The app module failed to parse, link or evaluate.
    #[error("Script error: {0}")]
    Script(String),

    #[error("JavaScript execution error: {0}")]
    JavaScriptExecution(String),

    /// The handler settled with something that is not Response-shaped.
    #[error("Handler result is not a Response: {0}")]
    Shape(String),

    /// The handler's asynchronous result did not settle within the drain budget.
    #[error("Handler did not settle after {cycles} drain cycles")]
    Timeout { cycles: u32 },

    /// A streamed response body grew past the app's buffer limit.
    #[error("Response body exceeds the {limit} byte limit")]
    ResponseTooLarge { limit: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NanoError {
    /// HTTP status code used when this error ends a request.
    pub fn status_code(&self) -> u16 {
        match self {
            NanoError::Timeout { .. } => 504,
            NanoError::WorkerUnavailable(_) => 503,
            NanoError::InvalidRequest(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, NanoError>;
