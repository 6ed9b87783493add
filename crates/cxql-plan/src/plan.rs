//! The migration plan: four ordered buckets of queries.
//!
//! A plan is a pure function of the source catalog. It is written to disk
//! between the generate and apply phases, so on reload every entry is
//! re-resolved against the live catalog (see [`QueriesList::fix_groups`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use cxql_catalog::{Query, QueryCatalog, QueryId};

use crate::PlanError;

/// Addresses one bucket of a [`QueriesList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Placeholder corp (tenant) queries that must exist before overrides.
    CorpCreate,
    CorpMigrate,
    Team(u64),
    Project(u64),
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::CorpCreate => f.write_str("corp-create"),
            Bucket::CorpMigrate => f.write_str("corp-migrate"),
            Bucket::Team(id) => write!(f, "team {id}"),
            Bucket::Project(id) => write!(f, "project {id}"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueriesList {
    #[serde(default)]
    pub corp_queries_to_create: Vec<Query>,
    #[serde(default)]
    pub corp_queries_to_migrate: Vec<Query>,
    #[serde(default)]
    pub team_queries_to_migrate: BTreeMap<u64, Vec<Query>>,
    #[serde(default)]
    pub project_queries_to_migrate: BTreeMap<u64, Vec<Query>>,
}

impl QueriesList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, bucket: Bucket) -> &[Query] {
        match bucket {
            Bucket::CorpCreate => &self.corp_queries_to_create,
            Bucket::CorpMigrate => &self.corp_queries_to_migrate,
            Bucket::Team(id) => self
                .team_queries_to_migrate
                .get(&id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            Bucket::Project(id) => self
                .project_queries_to_migrate
                .get(&id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    pub(crate) fn list_mut(&mut self, bucket: Bucket) -> &mut Vec<Query> {
        match bucket {
            Bucket::CorpCreate => &mut self.corp_queries_to_create,
            Bucket::CorpMigrate => &mut self.corp_queries_to_migrate,
            Bucket::Team(id) => self.team_queries_to_migrate.entry(id).or_default(),
            Bucket::Project(id) => self.project_queries_to_migrate.entry(id).or_default(),
        }
    }

    /// Every bucket in processing order: corp-create, corp-migrate, teams, projects.
    pub fn buckets(&self) -> Vec<(Bucket, &[Query])> {
        let mut all: Vec<(Bucket, &[Query])> = vec![
            (Bucket::CorpCreate, self.corp_queries_to_create.as_slice()),
            (Bucket::CorpMigrate, self.corp_queries_to_migrate.as_slice()),
        ];
        all.extend(
            self.team_queries_to_migrate
                .iter()
                .map(|(id, list)| (Bucket::Team(*id), list.as_slice())),
        );
        all.extend(
            self.project_queries_to_migrate
                .iter()
                .map(|(id, list)| (Bucket::Project(*id), list.as_slice())),
        );
        all
    }

    pub fn position(&self, bucket: Bucket, id: QueryId) -> Option<usize> {
        self.bucket(bucket).iter().position(|q| q.query_id == id)
    }

    pub fn contains(&self, bucket: Bucket, id: QueryId) -> bool {
        self.position(bucket, id).is_some()
    }

    pub fn total_queries(&self) -> usize {
        self.buckets().iter().map(|(_, list)| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_queries() == 0
    }

    /// Records a chain root that needs an empty corp-level placeholder.
    ///
    /// Placeholders carry no logic, so dependencies are not expanded here.
    pub fn append_new_corp(&mut self, query: &Query) {
        if !query.is_migratable() {
            return;
        }
        if self.contains(Bucket::CorpCreate, query.query_id) {
            tracing::trace!(
                "Skip appending corp-base query to create: {}",
                query.detailed()
            );
            return;
        }
        tracing::info!("Appending corp-base query to create: {}", query.detailed());
        self.corp_queries_to_create.push(query.clone());
    }

    pub fn append_corp(&mut self, query: &Query, catalog: &QueryCatalog) {
        if self.contains(Bucket::CorpMigrate, query.query_id) {
            tracing::trace!("Skip appending corp query to migrate: {}", query.detailed());
            return;
        }
        tracing::info!("Appending corp query to migrate: {}", query.detailed());
        self.append(Bucket::CorpMigrate, query, catalog);
    }

    pub fn append_team(&mut self, query: &Query, team_id: u64, catalog: &QueryCatalog) {
        tracing::info!(
            "Appending team {} override query to migrate: {}",
            team_id,
            query.detailed()
        );
        self.append(Bucket::Team(team_id), query, catalog);
        if query.is_root() {
            self.append_new_corp(query);
        }
    }

    pub fn insert_team(&mut self, query: &Query, team_id: u64, catalog: &QueryCatalog) {
        tracing::info!(
            "Inserting team {} override query to migrate: {}",
            team_id,
            query.detailed()
        );
        self.insert(Bucket::Team(team_id), query, catalog);
        if query.is_root() {
            self.append_new_corp(query);
        }
    }

    pub fn append_project(&mut self, query: &Query, project_id: u64, catalog: &QueryCatalog) {
        tracing::info!(
            "Appending project {} override query to migrate: {}",
            project_id,
            query.detailed()
        );
        self.append(Bucket::Project(project_id), query, catalog);
        if query.is_root() {
            self.append_new_corp(query);
        }
    }

    /// Re-populates ownership of every entry from the live catalog.
    ///
    /// Fails on the first entry whose id no longer resolves: the plan must
    /// then be regenerated.
    pub fn fix_groups(&mut self, catalog: &QueryCatalog) -> Result<(), PlanError> {
        let lists = std::iter::once(&mut self.corp_queries_to_create)
            .chain(std::iter::once(&mut self.corp_queries_to_migrate))
            .chain(self.team_queries_to_migrate.values_mut())
            .chain(self.project_queries_to_migrate.values_mut());

        for list in lists {
            for query in list.iter_mut() {
                let Some(live) = catalog.get(query.query_id) else {
                    return Err(PlanError::StaleQuery {
                        id: query.query_id,
                        query: query.to_string(),
                    });
                };
                query.owning_group = live.owning_group.clone();
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PlanError> {
        fs::write(path, self.to_json()?).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Created output file {}", path.display());
        Ok(())
    }

    /// Loads a plan file. Ownership is left empty until [`Self::fix_groups`].
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let text = fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}
