//! Identifier sets and the FASTA header scanner that recovers them.
//!
//! Obtained identifiers are never tracked in memory across rounds; they are
//! recovered by rescanning the output file, which keeps reconciliation
//! correct after crashes or partially written batches.
//!
//! Two header dialects are understood:
//! - pipe-delimited (`>sp|P69905|HBA_HUMAN ...`): the second field, or the
//!   third when the second is empty;
//! - plain (`>XP_012345.1 description`): the first token without `>`.
//!
//! Header lines in any other shape contribute nothing to the set. They are
//! skipped silently, so a record whose header cannot be read will be
//! requested again on the next round.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::SeqId;
use crate::error::FetchError;

pub type RequestedSet = BTreeSet<SeqId>;
pub type ObtainedSet = BTreeSet<SeqId>;

const RECORD_MARKER: char = '>';
const PIPE_WINDOW: usize = 15;

/// Extracts the identifier from a record header line.
pub fn parse_header_id(line: &str) -> Option<SeqId> {
    let line = line.trim_end_matches(['\r', '\n']);
    let body = line.strip_prefix(RECORD_MARKER)?;

    let candidate = if line.chars().take(PIPE_WINDOW).any(|ch| ch == '|') {
        let mut fields = body.split('|');
        fields.next();
        let second = fields.next().map(str::trim).unwrap_or_default();
        if second.is_empty() {
            fields.next().map(str::trim).unwrap_or_default()
        } else {
            second
        }
    } else {
        body.split_whitespace().next().unwrap_or_default()
    };

    let token = candidate.split_whitespace().next()?;
    token.parse().ok()
}

/// Reads every header line of a record file.
///
/// A missing file reads as empty. Bytes that are not valid UTF-8 are
/// replaced rather than aborting the scan.
pub fn read_header_lines(path: &Path) -> Result<Vec<String>, FetchError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(FetchError::Filesystem(format!(
                "open {}: {err}",
                path.display()
            )));
        }
    };

    let mut reader = BufReader::new(file);
    let mut headers = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|err| FetchError::Filesystem(format!("read {}: {err}", path.display())))?;
        if read == 0 {
            break;
        }
        if buf.first() == Some(&(RECORD_MARKER as u8)) {
            headers.push(String::from_utf8_lossy(&buf).trim_end().to_string());
        }
    }
    Ok(headers)
}

/// Recomputes the set of identifiers present in a record file.
pub fn scan_obtained(path: &Path) -> Result<ObtainedSet, FetchError> {
    let headers = read_header_lines(path)?;
    Ok(obtained_from_headers(&headers))
}

pub fn obtained_from_headers(headers: &[String]) -> ObtainedSet {
    let mut obtained = ObtainedSet::new();
    let mut unrecognized = 0usize;
    for header in headers {
        match parse_header_id(header) {
            Some(id) => {
                obtained.insert(id);
            }
            None => unrecognized += 1,
        }
    }
    if unrecognized > 0 {
        debug!(unrecognized, "skipped headers without a readable identifier");
    }
    obtained
}

/// Identifier list as read from the input file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedInput {
    pub ids: RequestedSet,
    /// Non-blank lines that are not usable identifiers, kept verbatim.
    pub invalid: Vec<String>,
}

/// Reads the identifier list, one per line.
pub fn read_requested(path: &Path) -> Result<RequestedInput, FetchError> {
    let file = File::open(path)
        .map_err(|err| FetchError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut input = RequestedInput::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .map_err(|err| FetchError::Filesystem(format!("read {}: {err}", path.display())))?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<SeqId>() {
            Ok(id) => {
                input.ids.insert(id);
            }
            Err(err) => {
                warn!(line = index + 1, "cannot request input line: {err}");
                let trimmed = line.trim().to_string();
                if !input.invalid.contains(&trimmed) {
                    input.invalid.push(trimmed);
                }
            }
        }
    }
    Ok(input)
}

pub fn pending(requested: &RequestedSet, obtained: &ObtainedSet) -> BTreeSet<SeqId> {
    requested.difference(obtained).cloned().collect()
}
