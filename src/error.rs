use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("invalid batch size: {0} (must be greater than zero)")]
    #[diagnostic(help("pass a positive integer, e.g. 200"))]
    InvalidBatchSize(i64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("output file {0} already has content; choose fresh, resume or abort")]
    ExistingOutput(String),

    #[error("invalid sequence identifier: {0:?}")]
    InvalidSeqId(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("could not parse {endpoint} response: missing {missing}{}", fmt_detail(.detail))]
    ProtocolParse {
        endpoint: &'static str,
        missing: &'static str,
        detail: Option<String>,
    },

    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("NCBI rejected the request with status {status}: {message}")]
    BadRequest { status: u16, message: String },

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetryBudgetExhausted { attempts: u32, last: String },
}

fn fmt_detail(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|value| format!(" ({value})"))
        .unwrap_or_default()
}

/// Coarse classification used to decide how a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Io,
    ProtocolParse,
    TransientNetwork,
    BadRequest,
    RetryExhausted,
    Remote,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidBatchSize(_)
            | FetchError::InvalidConfig(_)
            | FetchError::ConfigRead(_)
            | FetchError::ConfigParse(_)
            | FetchError::ExistingOutput(_)
            | FetchError::InvalidSeqId(_) => ErrorKind::Configuration,
            FetchError::Filesystem(_) => ErrorKind::Io,
            FetchError::ProtocolParse { .. } => ErrorKind::ProtocolParse,
            FetchError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            FetchError::BadRequest { .. } => ErrorKind::BadRequest,
            FetchError::RetryBudgetExhausted { .. } => ErrorKind::RetryExhausted,
            FetchError::NcbiHttp(_) | FetchError::NcbiStatus { .. } => ErrorKind::Remote,
        }
    }
}
