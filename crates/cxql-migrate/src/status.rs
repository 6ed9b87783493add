//! Per-query outcome bookkeeping.

use std::collections::BTreeMap;
use std::fmt;

use cxql_catalog::{Query, QueryId};

use crate::destination::DestQuery;
use crate::MigrateError;

/// The step of a run that handled a query. One query can be handled more
/// than once: as a corp placeholder and again in every team bucket that
/// inherited it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    CorpCreate,
    CorpMigrate,
    Team(u64),
    Project(u64),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::CorpCreate => f.write_str("corp-create"),
            Phase::CorpMigrate => f.write_str("corp-migrate"),
            Phase::Team(id) => write!(f, "team {id}"),
            Phase::Project(id) => write!(f, "project {id}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigratedQuery {
    pub source: Query,
    pub phase: Phase,
    pub destination: Option<DestQuery>,
    pub error: Option<String>,
}

impl MigratedQuery {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for MigratedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.destination) {
            (Some(err), _) => write!(f, "ERR: {} -> {}", self.source.detailed(), err),
            (None, Some(dest)) => write!(f, "OK: {} -> {}", self.source.detailed(), dest.detailed()),
            (None, None) => write!(f, "OK: {}", self.source.detailed()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    entries: BTreeMap<(QueryId, Phase), MigratedQuery>,
}

impl MigrationStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one query; a later outcome for the same query
    /// and phase replaces the earlier one.
    pub fn record(&mut self, phase: Phase, source: &Query, outcome: &Result<DestQuery, MigrateError>) {
        let entry = match outcome {
            Ok(dest) => MigratedQuery {
                source: source.clone(),
                phase,
                destination: Some(dest.clone()),
                error: None,
            },
            Err(err) => MigratedQuery {
                source: source.clone(),
                phase,
                destination: None,
                error: Some(err.to_string()),
            },
        };
        self.entries.insert((source.query_id, phase), entry);
    }

    pub fn get(&self, id: QueryId, phase: Phase) -> Option<&MigratedQuery> {
        self.entries.get(&(id, phase))
    }

    pub fn entries(&self) -> impl Iterator<Item = &MigratedQuery> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ok_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_ok()).count()
    }

    pub fn error_count(&self) -> usize {
        self.len() - self.ok_count()
    }

    /// Outcomes ordered by `language.group.name #id`, then phase.
    pub fn summary(&self) -> Vec<&MigratedQuery> {
        let mut lines: Vec<&MigratedQuery> = self.entries.values().collect();
        lines.sort_by_cached_key(|e| (e.source.sort_key(), e.phase));
        lines
    }
}
