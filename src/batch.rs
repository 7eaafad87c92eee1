use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::{FetchConfig, Pacing, RetryPolicy};
use crate::domain::SeqId;
use crate::error::{ErrorKind, FetchError};
use crate::eutils::EutilsClient;
use crate::session::SessionClient;
use crate::store::OutputStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// epost + efetch per batch.
    Primary,
    /// efetch by id list in small batches.
    Fallback,
}

/// What happened during one pass over the pending ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub strategy: Strategy,
    pub batches: usize,
    pub written_batches: usize,
    pub failed_batches: usize,
    pub bytes_appended: usize,
    pub had_failures: bool,
}

impl PassReport {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            batches: 0,
            written_batches: 0,
            failed_batches: 0,
            bytes_appended: 0,
            had_failures: false,
        }
    }
}

/// Drives batches through the remote service and appends the results.
pub struct BatchRunner<'a, C: EutilsClient> {
    session: &'a SessionClient<'a, C>,
    store: &'a OutputStore,
    rettype: &'a str,
    batch_size: usize,
    fallback_batch_size: usize,
    retry: RetryPolicy,
    pacing: Pacing,
}

impl<'a, C: EutilsClient> BatchRunner<'a, C> {
    pub fn new(
        session: &'a SessionClient<'a, C>,
        store: &'a OutputStore,
        config: &'a FetchConfig,
    ) -> Self {
        Self {
            session,
            store,
            rettype: &config.rettype,
            batch_size: config.batch_size,
            fallback_batch_size: config.fallback_batch_size,
            retry: config.retry,
            pacing: config.pacing,
        }
    }

    /// One epost/efetch pass. Per-batch failures are recorded in the report;
    /// only filesystem errors end the pass early.
    pub fn primary_pass(
        &self,
        pending: &[SeqId],
        sink: &dyn ProgressSink,
    ) -> Result<PassReport, FetchError> {
        let mut report = PassReport::new(Strategy::Primary);
        let total = pending.len().div_ceil(self.batch_size);
        info!(ids = pending.len(), batches = total, "starting epost/efetch pass");

        for (index, batch) in pending.chunks(self.batch_size).enumerate() {
            let started = Instant::now();
            report.batches += 1;
            if index > 0 {
                pause(self.pacing.batch_delay);
            }

            let mut flagged = false;
            let handshake = self.send_with_retries(|| self.session.handshake(batch), &mut flagged);
            report.had_failures |= flagged;
            let session = match handshake {
                Ok(session) => session,
                Err(err) => {
                    self.record_failure(&mut report, index + 1, "epost", err, sink)?;
                    continue;
                }
            };

            let body = match self.session.fetch_session(&session, self.rettype) {
                Ok(body) => body,
                Err(err) => {
                    self.record_failure(&mut report, index + 1, "efetch", err, sink)?;
                    continue;
                }
            };
            report.bytes_appended += self.store.append(&body)?;
            report.written_batches += 1;

            sink.event(ProgressEvent {
                message: format!(
                    "phase=Fetch; batch {}/{total}; {} ids",
                    index + 1,
                    batch.len()
                ),
                elapsed: Some(started.elapsed()),
            });
        }

        Ok(report)
    }

    /// Slower pass that skips the history server and asks for records by id.
    pub fn fallback_pass(
        &self,
        pending: &[SeqId],
        sink: &dyn ProgressSink,
    ) -> Result<PassReport, FetchError> {
        let mut report = PassReport::new(Strategy::Fallback);
        let total = pending.len().div_ceil(self.fallback_batch_size);
        info!(ids = pending.len(), batches = total, "starting direct efetch pass");

        for (index, batch) in pending.chunks(self.fallback_batch_size).enumerate() {
            let started = Instant::now();
            report.batches += 1;
            if index > 0 {
                pause(self.pacing.fallback_delay);
            }

            let mut flagged = false;
            let fetched = self.send_with_retries(
                || self.session.fetch_direct(batch, self.rettype),
                &mut flagged,
            );
            report.had_failures |= flagged;
            let body = match fetched {
                Ok(body) => body,
                Err(err) => {
                    self.record_failure(&mut report, index + 1, "efetch", err, sink)?;
                    continue;
                }
            };
            report.bytes_appended += self.store.append(&body)?;
            report.written_batches += 1;

            sink.event(ProgressEvent {
                message: format!(
                    "phase=Fallback; batch {}/{total}; {} ids",
                    index + 1,
                    batch.len()
                ),
                elapsed: Some(started.elapsed()),
            });
        }

        Ok(report)
    }

    /// Repeats `op` on transient and bad-request failures until it succeeds
    /// or the retry budget runs out. `flagged` is set when the service
    /// rejected a request, even if a later attempt went through.
    fn send_with_retries<T, F>(&self, mut op: F, flagged: &mut bool) -> Result<T, FetchError>
    where
        F: FnMut() -> Result<T, FetchError>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let delay = match err.kind() {
                ErrorKind::TransientNetwork => self.pacing.transient_delay,
                ErrorKind::BadRequest => {
                    *flagged = true;
                    self.pacing.bad_request_delay
                }
                ErrorKind::Configuration
                | ErrorKind::Io
                | ErrorKind::ProtocolParse
                | ErrorKind::RetryExhausted
                | ErrorKind::Remote => return Err(err),
            };
            if !self.retry.allows(attempts) {
                return Err(FetchError::RetryBudgetExhausted {
                    attempts,
                    last: err.to_string(),
                });
            }
            warn!(attempt = attempts, "{err}; retrying in {delay:?}");
            pause(delay);
        }
    }

    fn record_failure(
        &self,
        report: &mut PassReport,
        batch: usize,
        stage: &str,
        err: FetchError,
        sink: &dyn ProgressSink,
    ) -> Result<(), FetchError> {
        match err.kind() {
            ErrorKind::Io | ErrorKind::Configuration => Err(err),
            ErrorKind::ProtocolParse
            | ErrorKind::TransientNetwork
            | ErrorKind::BadRequest
            | ErrorKind::RetryExhausted
            | ErrorKind::Remote => {
                warn!(batch, stage, "batch abandoned: {err}");
                report.failed_batches += 1;
                report.had_failures = true;
                let phase = match report.strategy {
                    Strategy::Primary => "Fetch",
                    Strategy::Fallback => "Fallback",
                };
                sink.event(ProgressEvent {
                    message: format!("phase={phase}; batch {batch} failed at {stage}: {err}"),
                    elapsed: None,
                });
                Ok(())
            }
        }
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
