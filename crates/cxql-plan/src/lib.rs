//! Migration plan generation
//!
//! Turns a [`cxql_catalog::QueryCatalog`] into a [`QueriesList`]: four
//! buckets of queries, each ordered so that dependencies are migrated before
//! the queries that call them.
//!
//! - [`classify`]: one pass over the catalog, sorting queries by owner
//! - [`backfill`]: sub-teams pick up the chains they inherit from ancestors
//! - [`settle_order`]: final stable topological pass over each bucket
//!
//! The plan is written to disk between the generate and apply phases.

pub mod backfill;
pub mod classify;
pub mod deplist;
pub mod plan;
pub mod report;

pub use backfill::backfill;
pub use classify::classify;
pub use deplist::settle_order;
pub use plan::{Bucket, QueriesList};
pub use report::{
    catalog_report, project_report, DependencyKind, DependencyLine, DependencyReport,
    ReportEntry, ReportOptions, ReportSection,
};

use std::path::PathBuf;

use cxql_catalog::{QueryCatalog, QueryId, TeamDirectory};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid plan file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Query {query} (id {id}) from the plan no longer exists; regenerate the plan")]
    StaleQuery { id: QueryId, query: String },
    #[error("Unable to find project with ID {0}")]
    UnknownProject(u64),
}

/// Classify, backfill, then settle every bucket.
pub fn generate_migration_plan(catalog: &QueryCatalog, teams: &TeamDirectory) -> QueriesList {
    let mut plan = classify(catalog);
    backfill(&mut plan, catalog, teams);
    plan.settle();
    tracing::info!(
        "Migration plan holds {} queries in {} buckets",
        plan.total_queries(),
        plan.buckets().iter().filter(|(_, list)| !list.is_empty()).count()
    );
    plan
}
