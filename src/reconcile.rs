//! Round-by-round reconciliation of requested ids against the output file.
//!
//! Each round recomputes the pending set from scratch by rescanning the
//! output, so correctness depends only on what was durably written and not
//! on which batches reported success.

use std::collections::{BTreeSet, HashSet};

use tracing::info;

use crate::app::{ProgressEvent, ProgressSink};
use crate::batch::{BatchRunner, PassReport};
use crate::domain::{Database, SeqId};
use crate::error::FetchError;
use crate::eutils::EutilsClient;
use crate::idset::{self, RequestedInput, RequestedSet};
use crate::outcome::RunOutcome;
use crate::store::OutputStore;

const PDB_TAG: &str = "pdb|";

/// Requested ids and what is still missing, carried through every round.
#[derive(Debug, Clone)]
pub struct RunContext {
    requested: RequestedSet,
    invalid_input: Vec<String>,
    pending: BTreeSet<SeqId>,
    rounds: Vec<PassReport>,
}

impl RunContext {
    pub fn new(requested: RequestedSet) -> Self {
        let pending = requested.clone();
        Self {
            requested,
            invalid_input: Vec::new(),
            pending,
            rounds: Vec::new(),
        }
    }

    /// Context for a parsed input file; unusable lines are carried to the
    /// final outcome.
    pub fn from_input(input: RequestedInput) -> Self {
        Self {
            invalid_input: input.invalid,
            ..Self::new(input.ids)
        }
    }

    pub fn requested(&self) -> &RequestedSet {
        &self.requested
    }

    pub fn invalid_input(&self) -> &[String] {
        &self.invalid_input
    }

    pub fn pending(&self) -> &BTreeSet<SeqId> {
        &self.pending
    }

    pub fn rounds(&self) -> &[PassReport] {
        &self.rounds
    }

    /// Replaces the pending set with a fresh computation and returns how
    /// many ids it shrank by.
    pub fn refresh(&mut self, store: &OutputStore, database: &Database) -> Result<usize, FetchError> {
        let fresh = compute_pending(&self.requested, store, database)?;
        let resolved = self.pending.len().saturating_sub(fresh.len());
        self.pending = fresh;
        Ok(resolved)
    }

    fn pending_list(&self) -> Vec<SeqId> {
        self.pending.iter().cloned().collect()
    }
}

/// `requested - obtained`, where obtained comes from the output headers.
///
/// For the protein database an id also counts as obtained when any header
/// contains `pdb|XXXX|` where `XXXX` is its first four characters. NCBI
/// reports structure chains under their own canonical id, so `1ABC_A` may
/// come back as a differently named record. Unrelated records sharing the
/// same four-character prefix also match.
pub fn compute_pending(
    requested: &RequestedSet,
    store: &OutputStore,
    database: &Database,
) -> Result<BTreeSet<SeqId>, FetchError> {
    let headers = store.header_lines()?;
    let obtained = idset::obtained_from_headers(&headers);
    let mut pending = idset::pending(requested, &obtained);

    if database.is_protein() && !pending.is_empty() {
        let fields = pdb_fields(&headers);
        pending.retain(|id| !has_pdb_entry(id.structural_prefix(), &fields, &headers));
    }
    Ok(pending)
}

/// Every field that follows a `pdb|` tag and is closed by `|`, wherever the
/// tag occurs in the line.
fn pdb_fields(headers: &[String]) -> HashSet<&str> {
    headers
        .iter()
        .flat_map(|line| {
            line.match_indices(PDB_TAG).filter_map(move |(idx, _)| {
                let rest = &line[idx + PDB_TAG.len()..];
                rest.find('|').map(|end| &rest[..end])
            })
        })
        .collect()
}

fn has_pdb_entry(prefix: &str, fields: &HashSet<&str>, headers: &[String]) -> bool {
    if !prefix.contains('|') {
        return fields.contains(prefix);
    }
    let needle = format!("{PDB_TAG}{prefix}|");
    headers.iter().any(|line| line.contains(&needle))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundState {
    PrimaryRound,
    PrimaryRetry { resolved: usize },
    FallbackRound,
    Complete,
    PartialFailure,
}

pub struct Reconciler<'a, C: EutilsClient> {
    runner: &'a BatchRunner<'a, C>,
    store: &'a OutputStore,
    database: &'a Database,
}

impl<'a, C: EutilsClient> Reconciler<'a, C> {
    pub fn new(runner: &'a BatchRunner<'a, C>, store: &'a OutputStore, database: &'a Database) -> Self {
        Self {
            runner,
            store,
            database,
        }
    }

    /// Runs primary rounds while they make progress, then one fallback round.
    pub fn run(&self, ctx: &mut RunContext, sink: &dyn ProgressSink) -> Result<RunOutcome, FetchError> {
        let mut state = if ctx.pending.is_empty() {
            RoundState::Complete
        } else {
            RoundState::PrimaryRound
        };

        loop {
            state = match state {
                RoundState::PrimaryRound => {
                    let report = self.runner.primary_pass(&ctx.pending_list(), sink)?;
                    let had_failures = report.had_failures;
                    ctx.rounds.push(report);
                    let resolved = ctx.refresh(self.store, self.database)?;
                    self.announce(ctx, sink);
                    if ctx.pending.is_empty() {
                        RoundState::Complete
                    } else if had_failures {
                        RoundState::FallbackRound
                    } else {
                        RoundState::PrimaryRetry { resolved }
                    }
                }
                // A clean pass that resolved nothing will not do better next time.
                RoundState::PrimaryRetry { resolved } if resolved == 0 => {
                    info!("epost/efetch pass made no progress");
                    RoundState::FallbackRound
                }
                RoundState::PrimaryRetry { .. } => RoundState::PrimaryRound,
                RoundState::FallbackRound => {
                    info!(
                        remaining = ctx.pending.len(),
                        "switching to direct efetch"
                    );
                    let report = self.runner.fallback_pass(&ctx.pending_list(), sink)?;
                    ctx.rounds.push(report);
                    ctx.refresh(self.store, self.database)?;
                    self.announce(ctx, sink);
                    if ctx.pending.is_empty() {
                        RoundState::Complete
                    } else {
                        RoundState::PartialFailure
                    }
                }
                RoundState::Complete | RoundState::PartialFailure => {
                    return Ok(RunOutcome::classify(&ctx.pending, &ctx.invalid_input));
                }
            };
        }
    }

    fn announce(&self, ctx: &RunContext, sink: &dyn ProgressSink) {
        info!(
            remaining = ctx.pending.len(),
            requested = ctx.requested.len(),
            "round finished"
        );
        sink.event(ProgressEvent {
            message: format!(
                "phase=Verify; {} of {} ids still missing",
                ctx.pending.len(),
                ctx.requested.len()
            ),
            elapsed: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn pdb_tag_found_at_any_position() {
        let headers = headers(&[">pdb|pdb|1ABC|A Chain A", ">gi|123|pdb|2XYZ|B"]);
        let fields = pdb_fields(&headers);
        assert!(has_pdb_entry("1ABC", &fields, &headers));
        assert!(has_pdb_entry("2XYZ", &fields, &headers));
        assert!(has_pdb_entry("pdb", &fields, &headers));
        assert!(!has_pdb_entry("3QRS", &fields, &headers));
    }

    #[test]
    fn prefix_with_pipe_uses_substring_match() {
        let headers = headers(&[">pdb|A|B_|x"]);
        let fields = pdb_fields(&headers);
        assert!(has_pdb_entry("A|B_", &fields, &headers));
        assert!(!has_pdb_entry("A|C_", &fields, &headers));
    }

    #[test]
    fn unterminated_field_does_not_match() {
        let headers = headers(&[">pdb|1ABC"]);
        let fields = pdb_fields(&headers);
        assert!(!has_pdb_entry("1ABC", &fields, &headers));
    }
}
