//! Two-step Entrez session: epost a batch of ids, then efetch the records
//! through the returned history reference.

use tracing::debug;

use crate::domain::{Database, SeqId, SessionRef};
use crate::error::FetchError;
use crate::eutils::{Endpoint, EutilsClient};

pub const TOOL_NAME: &str = "kira-seqfetch";

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub email: Option<String>,
}

pub struct SessionClient<'a, C: EutilsClient> {
    client: &'a C,
    database: Database,
    credentials: Credentials,
}

impl<'a, C: EutilsClient> SessionClient<'a, C> {
    pub fn new(client: &'a C, database: Database, credentials: Credentials) -> Self {
        Self {
            client,
            database,
            credentials,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Posts the batch to the history server and returns the session tokens.
    pub fn handshake(&self, batch: &[SeqId]) -> Result<SessionRef, FetchError> {
        let mut params = vec![
            ("db", self.database.to_string()),
            ("id", join_ids(batch)),
        ];
        self.push_credentials(&mut params);
        let body = self.client.post(Endpoint::EPost, &params)?;
        let session = parse_session(&body)?;
        debug!(
            query_key = %session.query_key,
            batch = batch.len(),
            "epost session established"
        );
        Ok(session)
    }

    /// Fetches the records behind a session reference.
    pub fn fetch_session(&self, session: &SessionRef, rettype: &str) -> Result<String, FetchError> {
        let mut params = vec![
            ("db", self.database.to_string()),
            ("query_key", session.query_key.clone()),
            ("WebEnv", session.web_env.clone()),
            ("rettype", rettype.to_string()),
            ("retmode", "text".to_string()),
        ];
        self.push_credentials(&mut params);
        self.client.post(Endpoint::EFetch, &params)
    }

    /// Fetches records by id directly, without a history session.
    pub fn fetch_direct(&self, batch: &[SeqId], rettype: &str) -> Result<String, FetchError> {
        let mut params = vec![
            ("db", self.database.to_string()),
            ("id", join_ids(batch)),
            ("rettype", rettype.to_string()),
            ("retmode", "text".to_string()),
            ("retmax", batch.len().to_string()),
        ];
        self.push_credentials(&mut params);
        self.client.post(Endpoint::EFetch, &params)
    }

    fn push_credentials(&self, params: &mut Vec<(&'static str, String)>) {
        if let Some(api_key) = &self.credentials.api_key {
            params.push(("api_key", api_key.clone()));
        }
        if let Some(email) = &self.credentials.email {
            params.push(("email", email.clone()));
        }
        params.push(("tool", TOOL_NAME.to_string()));
    }
}

fn join_ids(batch: &[SeqId]) -> String {
    batch
        .iter()
        .map(SeqId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Pulls `WebEnv` and `QueryKey` out of an epost response body.
pub fn parse_session(body: &str) -> Result<SessionRef, FetchError> {
    let web_env = extract_tag(body, "WebEnv").ok_or_else(|| missing_token(body, "WebEnv"))?;
    let query_key =
        extract_tag(body, "QueryKey").ok_or_else(|| missing_token(body, "QueryKey"))?;
    Ok(SessionRef {
        web_env: web_env.to_string(),
        query_key: query_key.to_string(),
    })
}

fn missing_token(body: &str, missing: &'static str) -> FetchError {
    FetchError::ProtocolParse {
        endpoint: "epost",
        missing,
        detail: extract_tag(body, "ERROR").map(str::to_string),
    }
}

fn extract_tag<'b>(body: &'b str, tag: &str) -> Option<&'b str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let len = body[start..].find(&close)?;
    let value = body[start..start + len].trim();
    (!value.is_empty()).then_some(value)
}
