#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use camino::Utf8PathBuf;

use kira_seqfetch::app::{ProgressEvent, ProgressSink};
use kira_seqfetch::config::{FetchConfig, Pacing, RetryPolicy};
use kira_seqfetch::error::FetchError;
use kira_seqfetch::eutils::{DEFAULT_BASE_URL, Endpoint, EutilsClient};
use kira_seqfetch::session::Credentials;

#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: Endpoint,
    pub params: Vec<(String, String)>,
}

impl Call {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// In-memory stand-in for the E-utilities endpoints.
#[derive(Default)]
pub struct MockEutils {
    records: HashMap<String, String>,
    tokenless_epost: HashSet<String>,
    transient_eposts: Mutex<u32>,
    bad_request_eposts: Mutex<u32>,
    failing_session_fetch: bool,
    sessions: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockEutils {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, ids: &[&str]) -> Self {
        for id in ids {
            self.records
                .insert(id.to_string(), format!(">{id} mock protein\nMKTAYIAKQR\n"));
        }
        self
    }

    pub fn with_record_body(mut self, id: &str, body: &str) -> Self {
        self.records.insert(id.to_string(), body.to_string());
        self
    }

    /// epost answers batches containing `id` without session tokens.
    pub fn with_tokenless_epost(mut self, id: &str) -> Self {
        self.tokenless_epost.insert(id.to_string());
        self
    }

    /// The next `count` epost calls fail as if the connection dropped.
    pub fn with_transient_eposts(self, count: u32) -> Self {
        *self.transient_eposts.lock().unwrap() = count;
        self
    }

    /// The next `count` epost calls are rejected with HTTP 400.
    pub fn with_bad_request_eposts(self, count: u32) -> Self {
        *self.bad_request_eposts.lock().unwrap() = count;
        self
    }

    /// Every efetch against a history-server session fails with HTTP 502.
    pub fn with_failing_session_fetch(mut self) -> Self {
        self.failing_session_fetch = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn epost_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.endpoint == Endpoint::EPost)
            .count()
    }

    /// Every id sent to epost, in call order.
    pub fn posted_ids(&self) -> Vec<String> {
        self.ids_sent(|call| call.endpoint == Endpoint::EPost)
    }

    /// Every id requested through the direct efetch path.
    pub fn direct_ids(&self) -> Vec<String> {
        self.ids_sent(|call| call.endpoint == Endpoint::EFetch)
    }

    fn ids_sent(&self, filter: impl Fn(&Call) -> bool) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|call| filter(call))
            .filter_map(|call| call.param("id").map(str::to_string))
            .flat_map(|ids| ids.split(',').map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    fn bodies(&self, ids: &[String]) -> String {
        ids.iter()
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect()
    }
}

impl EutilsClient for MockEutils {
    fn post(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<String, FetchError> {
        let call = Call {
            endpoint,
            params: params
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        };
        self.calls.lock().unwrap().push(call.clone());

        let ids: Vec<String> = call
            .param("id")
            .map(|ids| ids.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        match endpoint {
            Endpoint::EPost => {
                {
                    let mut transient = self.transient_eposts.lock().unwrap();
                    if *transient > 0 {
                        *transient -= 1;
                        return Err(FetchError::TransientNetwork(
                            "connection reset by peer".to_string(),
                        ));
                    }
                }
                {
                    let mut rejected = self.bad_request_eposts.lock().unwrap();
                    if *rejected > 0 {
                        *rejected -= 1;
                        return Err(FetchError::BadRequest {
                            status: 400,
                            message: "Invalid uid".to_string(),
                        });
                    }
                }
                if ids.iter().any(|id| self.tokenless_epost.contains(id)) {
                    return Ok(
                        "<ePostResult><ERROR>Empty result - nothing to do</ERROR></ePostResult>"
                            .to_string(),
                    );
                }
                let mut sessions = self.sessions.lock().unwrap();
                let web_env = format!("MCID_{}", sessions.len() + 1);
                sessions.insert(web_env.clone(), ids);
                Ok(format!(
                    "<ePostResult>\n\t<QueryKey>1</QueryKey>\n\t<WebEnv>{web_env}</WebEnv>\n</ePostResult>\n"
                ))
            }
            Endpoint::EFetch => {
                if let Some(web_env) = call.param("WebEnv") {
                    if self.failing_session_fetch {
                        return Err(FetchError::NcbiStatus {
                            status: 502,
                            message: "Bad Gateway".to_string(),
                        });
                    }
                    let sessions = self.sessions.lock().unwrap();
                    let ids = sessions.get(web_env).cloned().ok_or_else(|| {
                        FetchError::BadRequest {
                            status: 400,
                            message: "unknown WebEnv".to_string(),
                        }
                    })?;
                    return Ok(self.bodies(&ids));
                }
                Ok(self.bodies(&ids))
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

pub fn write_input(dir: &Path, lines: &[&str]) -> Utf8PathBuf {
    let path = dir.join("ids.txt");
    std::fs::write(&path, lines.join("\n")).unwrap();
    Utf8PathBuf::from_path_buf(path).unwrap()
}

pub fn test_config(dir: &Path, ids: &[&str], batch_size: usize, database: &str) -> FetchConfig {
    let input = write_input(dir, ids);
    let output = Utf8PathBuf::from_path_buf(dir.join("out.fasta")).unwrap();
    FetchConfig {
        input,
        output,
        batch_size,
        fallback_batch_size: 10,
        database: database.parse().unwrap(),
        rettype: "fasta".to_string(),
        credentials: Credentials {
            api_key: Some("test-key".to_string()),
            email: Some("lab@example.org".to_string()),
        },
        base_url: DEFAULT_BASE_URL.to_string(),
        retry: RetryPolicy::default(),
        pacing: Pacing::none(),
    }
}
