//! CxQL override-chain merger
//!
//! A team-level query in the source product is really a chain: the sub-team
//! override calls `base.<Name>()` to get its parent team's result, which in
//! turn may call its own base, and so on. The destination has no team
//! levels, so the chain is flattened into one body here:
//!
//! - every link is emitted in order, outermost ancestor first, each wrapped in
//!   its own block and tagged with a descriptive comment header
//! - `base.<Name>()` calls are rewired onto the running `result`
//! - links that drop the inherited result, or use it in a way that cannot be
//!   rewired textually, get a small auto-inserted fix-up
//!
//! Already-merged bodies carry the headers this crate emits; merging one of
//! those again is reported instead of silently nesting merges.

pub mod basecall;
pub mod cxquery;
pub mod merger;

pub use basecall::{strip_comments, BaseCall};
pub use cxquery::{severity_label, CxQuery};
pub use merger::{MergeOutcome, QueryMerger};

use cxql_catalog::QueryId;

/// Outcome class of a chain that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    Ok,
    /// A link already contains merge headers.
    Remerge,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Cannot process an empty set of queries")]
    Empty,
    #[error("Query name must be the same: expected {expected}, found {found}")]
    NameMismatch { expected: String, found: String },
    #[error("Query language must be the same: expected {expected}, found {found}")]
    LanguageMismatch { expected: String, found: String },
    #[error("Query {query_id} severity {severity} out of range")]
    SeverityOutOfRange { query_id: QueryId, severity: i32 },
    #[error("Corp level query {0} cannot be merged")]
    CorpLevel(QueryId),
    #[error("Project level query {0} must be the last on the list")]
    ProjectNotLast(QueryId),
    #[error("Query {0} contains previously merged code")]
    Remerge(QueryId),
    #[error("Invalid base-call pattern: {0}")]
    Pattern(#[from] regex::Error),
}
