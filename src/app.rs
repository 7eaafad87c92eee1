use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::batch::{BatchRunner, PassReport};
use crate::config::FetchConfig;
use crate::domain::ResumeChoice;
use crate::error::FetchError;
use crate::eutils::EutilsClient;
use crate::idset;
use crate::outcome::RunOutcome;
use crate::reconcile::{Reconciler, RunContext};
use crate::session::SessionClient;
use crate::store::OutputStore;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input: String,
    pub output: String,
    pub database: String,
    pub requested: usize,
    pub invalid_input: Vec<String>,
    pub already_present: usize,
    pub resume: Option<ResumeChoice>,
    pub rounds: Vec<PassReport>,
    pub outcome: RunOutcome,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: EutilsClient> {
    client: C,
}

impl<C: EutilsClient> App<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Downloads every requested id that the output file does not hold yet.
    ///
    /// `resume` is only consulted when the output already has content; with
    /// content present and no choice the run is refused before any request.
    pub fn run(
        &self,
        config: &FetchConfig,
        resume: Option<ResumeChoice>,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, FetchError> {
        let started_at = iso_timestamp();
        let store = OutputStore::new(config.output.clone());

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading {}", config.input),
            elapsed: None,
        });
        let requested = idset::read_requested(config.input.as_std_path())?;

        let resume = if store.has_content()? {
            let choice = resume.ok_or_else(|| FetchError::ExistingOutput(config.output.to_string()))?;
            match choice {
                ResumeChoice::Fresh => {
                    info!(output = %config.output, "removing existing output");
                    store.reset()?;
                }
                ResumeChoice::Resume => {
                    info!(output = %config.output, "resuming from existing output");
                }
                ResumeChoice::Abort => {
                    info!("aborted before downloading");
                    return Ok(RunReport {
                        input: config.input.to_string(),
                        output: config.output.to_string(),
                        database: config.database.to_string(),
                        requested: requested.ids.len(),
                        invalid_input: requested.invalid,
                        already_present: 0,
                        resume: Some(choice),
                        rounds: Vec::new(),
                        outcome: RunOutcome::Aborted,
                        started_at,
                        finished_at: iso_timestamp(),
                    });
                }
            }
            Some(choice)
        } else {
            None
        };

        let mut ctx = RunContext::from_input(requested);
        ctx.refresh(&store, &config.database)?;
        let already_present = ctx.requested().len() - ctx.pending().len();
        info!(
            requested = ctx.requested().len(),
            invalid = ctx.invalid_input().len(),
            already_present,
            pending = ctx.pending().len(),
            "starting download"
        );

        let session = SessionClient::new(
            &self.client,
            config.database.clone(),
            config.credentials.clone(),
        );
        let runner = BatchRunner::new(&session, &store, config);
        let outcome = Reconciler::new(&runner, &store, &config.database).run(&mut ctx, sink)?;

        Ok(RunReport {
            input: config.input.to_string(),
            output: config.output.to_string(),
            database: config.database.to_string(),
            requested: ctx.requested().len(),
            invalid_input: ctx.invalid_input().to_vec(),
            already_present,
            resume,
            rounds: ctx.rounds().to_vec(),
            outcome,
            started_at,
            finished_at: iso_timestamp(),
        })
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
