use crate::j2534::types::Status;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end an operation outright. Per-call driver outcomes are
/// reported as [`Status`] instead; only loading, opening and connecting
/// escalate to this type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to load J2534 DLL '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: libloading::Error,
    },
    #[error("{name} not found: {source}")]
    MissingSymbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("PassThruOpen failed: {status}: {message}")]
    Open { status: Status, message: String },
    #[error("Can't open channel: {message}")]
    Connect { status: Status, message: String },
    #[error("Payload of {len} bytes exceeds the {max} byte record capacity")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("J2534 call failed: {0}")]
    Driver(#[from] Status),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
