use crate::onboarding::SetupStep;

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can turn any failure into exactly one user-facing reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("invalid credential format: {0}")]
    InvalidCredentialFormat(String),

    #[error("invalid destination id (minimum length {min})")]
    InvalidDestinationId { min: usize },

    #[error("setup incomplete: {0}")]
    MissingSetup(SetupStep),

    #[error("download failed: {0}")]
    Download(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("upload failed: {0}")]
    Upload(String),
}

impl Error {
    /// Short machine-friendly label used in logs and the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::External(_) => "external",
            Error::InvalidCredentialFormat(_) => "invalid_credential_format",
            Error::InvalidDestinationId { .. } => "invalid_destination_id",
            Error::MissingSetup(_) => "missing_setup",
            Error::Download(_) => "download_failure",
            Error::Authentication(_) => "authentication_failure",
            Error::Upload(_) => "upload_failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
