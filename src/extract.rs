//! Candidate Extractor
//!
//! Pulls the delimited query out of free-text generator output. Parsing only;
//! what a malformed response costs is decided by the caller.

use crate::error::{NlqError, Result};
use std::fmt;

pub const OPEN_TAG: &str = "<SQL>";
pub const CLOSE_TAG: &str = "</SQL>";

/// Extracted, not-yet-validated query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate(String);

impl Candidate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Take the text between the first `<SQL>` and the next `</SQL>`, collapsing
/// whitespace runs to single spaces.
pub fn extract(response: &str) -> Result<Candidate> {
    let start = response
        .find(OPEN_TAG)
        .ok_or_else(|| NlqError::MalformedResponse(format!("missing {} tag", OPEN_TAG)))?
        + OPEN_TAG.len();
    let len = response[start..]
        .find(CLOSE_TAG)
        .ok_or_else(|| NlqError::MalformedResponse(format!("missing {} tag", CLOSE_TAG)))?;

    let collapsed = response[start..start + len]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    Ok(Candidate(collapsed))
}
