use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::SeqId;

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Complete,
    PartialFailure {
        unresolved: Vec<SeqId>,
        /// Input lines that could not be requested at all.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        invalid_input: Vec<String>,
    },
    Aborted,
}

impl RunOutcome {
    pub fn classify(pending: &BTreeSet<SeqId>, invalid_input: &[String]) -> Self {
        if pending.is_empty() && invalid_input.is_empty() {
            RunOutcome::Complete
        } else {
            RunOutcome::PartialFailure {
                unresolved: pending.iter().cloned().collect(),
                invalid_input: invalid_input.to_vec(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Complete)
    }

    pub fn unresolved(&self) -> &[SeqId] {
        match self {
            RunOutcome::PartialFailure { unresolved, .. } => unresolved,
            RunOutcome::Complete | RunOutcome::Aborted => &[],
        }
    }

    pub fn invalid_input(&self) -> &[String] {
        match self {
            RunOutcome::PartialFailure { invalid_input, .. } => invalid_input,
            RunOutcome::Complete | RunOutcome::Aborted => &[],
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Complete => 0,
            RunOutcome::PartialFailure { .. } => 4,
            RunOutcome::Aborted => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_pending() {
        assert_eq!(
            RunOutcome::classify(&BTreeSet::new(), &[]),
            RunOutcome::Complete
        );

        let pending: BTreeSet<SeqId> = ["C".parse().unwrap()].into_iter().collect();
        let outcome = RunOutcome::classify(&pending, &[]);
        assert!(!outcome.is_success());
        assert_eq!(outcome.unresolved().len(), 1);
        assert_eq!(outcome.exit_code(), 4);
    }

    #[test]
    fn invalid_input_alone_is_a_failure() {
        let outcome = RunOutcome::classify(&BTreeSet::new(), &["B comment".to_string()]);
        assert!(!outcome.is_success());
        assert!(outcome.unresolved().is_empty());
        assert_eq!(outcome.invalid_input(), ["B comment".to_string()]);
        assert_eq!(outcome.exit_code(), 4);
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(RunOutcome::PartialFailure {
            unresolved: vec!["C".parse().unwrap()],
            invalid_input: Vec::new(),
        })
        .unwrap();
        assert_eq!(json["status"], "partial_failure");
        assert_eq!(json["unresolved"][0], "C");
        assert!(json.get("invalid_input").is_none());
    }
}
