//! Migration orchestrator
//!
//! Replays a [`cxql_plan::QueriesList`] against a destination tenant in a
//! fixed order: corp placeholders, corp queries, team buckets (merged over
//! their override chains), project buckets. The destination is reached only
//! through the [`DestinationClient`] and [`AuditSessionClient`] traits;
//! [`OfflineDestination`] is a file-backed implementation of both.

pub mod chain;
pub mod destination;
pub mod offline;
pub mod run;
pub mod session;
pub mod status;

pub use chain::{build_merge_chain, merged_query};
pub use destination::{
    AuditSession, AuditSessionClient, DestQuery, DestinationClient, NewQuery, QueryLevel,
};
pub use offline::{
    DestinationSnapshot, OfflineDestination, DEFAULT_TARGET_APPLICATION, DEFAULT_TARGET_PROJECT,
};
pub use run::{MigrationRun, RunOptions};
pub use session::SessionManager;
pub use status::{MigratedQuery, MigrationStatus, Phase};

use std::path::PathBuf;

use cxql_catalog::QueryId;
use cxql_merge::MergeError;

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("unable to find SAST root query for {0}")]
    RootNotFound(String),
    #[error("unable to find Cx1 query for {0}")]
    DestinationNotFound(String),
    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),
    #[error("Audit session error: {0:#}")]
    Session(anyhow::Error),
    #[error("Destination error: {0:#}")]
    Destination(anyhow::Error),
    #[error("Query {0} is not part of the migration plan")]
    NotInPlan(QueryId),
    #[error("Nothing queued for {0}")]
    NothingQueued(String),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid destination snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
