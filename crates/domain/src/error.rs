/// Shared error type used across all Gambit crates.
///
/// Variants group by the taxonomy the core distinguishes: load-time deck
/// errors, schema validation, guardrail trips, provider failures, and
/// artifact-store failures. `HandlerError` has no variant here — per the
/// run engine's contract (§4.6.3), a child error handled by `onError` is
/// swallowed into an envelope and never surfaces as a `Result::Err`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("load: {0}")]
    Load(String),

    #[error("schema: {0}")]
    Schema(SchemaError),

    #[error("guardrail: {0}")]
    Guardrail(String),

    #[error("provider: {0}")]
    Provider(String),

    #[error("artifact: {0}")]
    Artifact(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// A schema validation failure: the JSON-pointer-style path into the value
/// that failed, plus a short human message. Carried as a distinct type
/// (rather than a bare string) so callers that only care about the path
/// don't need to parse it back out of `Display`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{path}: {message}")]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Self {
        Error::Schema(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
