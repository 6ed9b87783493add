//! Source query catalog
//!
//! The read-only view of the legacy SAST product that every other crate
//! works from:
//!
//! - queries organized language → group, each with its override pointer
//!   (`base_query_id`), ownership and dependency ids
//! - the team tree and the projects hanging off it
//! - a JSON snapshot format so a catalog export can be replayed offline

pub mod catalog;
pub mod query;
pub mod snapshot;
pub mod teams;

pub use catalog::QueryCatalog;
pub use query::{OwnerScope, OwningGroup, PackageType, Query, QueryGroup, QueryId, QueryLanguage};
pub use snapshot::CatalogSnapshot;
pub use teams::{Project, Team, TeamDirectory};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid catalog snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Query id {0} appears more than once in the catalog")]
    DuplicateQuery(QueryId),
    #[error("Team {team} references unknown parent team {parent}")]
    UnknownParent { team: u64, parent: u64 },
}
