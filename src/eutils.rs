use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::FetchError;

pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    EPost,
    EFetch,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::EPost => "epost.fcgi",
            Endpoint::EFetch => "efetch.fcgi",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::EPost => write!(f, "epost"),
            Endpoint::EFetch => write!(f, "efetch"),
        }
    }
}

/// Raw transport to the Entrez E-utilities: one form-encoded POST per call,
/// returning the response body untouched.
pub trait EutilsClient: Send + Sync {
    fn post(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<String, FetchError>;
}

#[derive(Clone)]
pub struct EutilsHttpClient {
    client: Client,
    base_url: String,
}

impl EutilsHttpClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-seqfetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::InvalidConfig(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| FetchError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }
}

impl EutilsClient for EutilsHttpClient {
    fn post(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<String, FetchError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .form(params)
            .send()
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| format!("{endpoint} request failed"));
            return Err(classify_status(status, message));
        }
        response.text().map_err(classify_transport_error)
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetchError {
    if is_retryable_error(&err) {
        FetchError::TransientNetwork(err.to_string())
    } else {
        FetchError::NcbiHttp(err.to_string())
    }
}

/// Maps a non-success HTTP status to the error the orchestrator acts on.
pub fn classify_status(status: u16, message: String) -> FetchError {
    let message = truncate_message(message);
    if is_retryable_status(status) {
        FetchError::TransientNetwork(format!("status {status}: {message}"))
    } else if (400..500).contains(&status) {
        FetchError::BadRequest { status, message }
    } else {
        FetchError::NcbiStatus { status, message }
    }
}

fn truncate_message(message: String) -> String {
    const MAX_CHARS: usize = 300;
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }
    let mut short: String = trimmed.chars().take(MAX_CHARS).collect();
    short.push_str("...");
    short
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

// Name resolution failures surface as connect errors.
fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}
