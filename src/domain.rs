use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Accession or identifier of one record in the remote archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqId(String);

impl SeqId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First four characters, the PDB entry part of ids such as `1ABC_A`.
    pub fn structural_prefix(&self) -> &str {
        match self.0.char_indices().nth(4) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SeqId {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && !trimmed
                .chars()
                .any(|ch| ch.is_whitespace() || ch == ',' || ch.is_control());
        if !is_valid {
            return Err(FetchError::InvalidSeqId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Entrez database name (`protein`, `nuccore`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Database(String);

impl Database {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_protein(&self) -> bool {
        self.0.eq_ignore_ascii_case("protein")
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Database {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !is_valid {
            return Err(FetchError::InvalidConfig(format!(
                "invalid database name: {value:?}"
            )));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// History server reference returned by epost, valid for one efetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    pub web_env: String,
    pub query_key: String,
}

/// What to do when the output file already holds records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResumeChoice {
    /// Delete the existing output and start over.
    Fresh,
    /// Keep the existing output and only fetch what is missing.
    Resume,
    /// Stop without downloading anything.
    Abort,
}

impl fmt::Display for ResumeChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeChoice::Fresh => write!(f, "fresh"),
            ResumeChoice::Resume => write!(f, "resume"),
            ResumeChoice::Abort => write!(f, "abort"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_seq_id_trims() {
        let id: SeqId = "  WP_000001.1 \r".parse().unwrap();
        assert_eq!(id.as_str(), "WP_000001.1");
    }

    #[test]
    fn parse_seq_id_rejects_separators() {
        assert_matches!("A,B".parse::<SeqId>(), Err(FetchError::InvalidSeqId(_)));
        assert_matches!("A B".parse::<SeqId>(), Err(FetchError::InvalidSeqId(_)));
        assert_matches!("   ".parse::<SeqId>(), Err(FetchError::InvalidSeqId(_)));
    }

    #[test]
    fn structural_prefix_of_short_id() {
        let id: SeqId = "1AB".parse().unwrap();
        assert_eq!(id.structural_prefix(), "1AB");
        let id: SeqId = "1LYZ_A".parse().unwrap();
        assert_eq!(id.structural_prefix(), "1LYZ");
    }

    #[test]
    fn protein_database() {
        let db: Database = "protein".parse().unwrap();
        assert!(db.is_protein());
        let db: Database = "nuccore".parse().unwrap();
        assert!(!db.is_protein());
        assert_matches!("".parse::<Database>(), Err(FetchError::InvalidConfig(_)));
    }
}
