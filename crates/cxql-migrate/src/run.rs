//! One migration run against a destination.

use cxql_catalog::{Query, QueryCatalog, QueryId, TeamDirectory};
use cxql_plan::{Bucket, QueriesList};

use crate::chain::merged_query;
use crate::destination::{
    AuditSession, AuditSessionClient, DestQuery, DestinationClient, NewQuery, QueryLevel,
};
use crate::session::SessionManager;
use crate::status::{MigrationStatus, Phase};
use crate::MigrateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Merge chains that already contain merged code.
    pub allow_remerge: bool,
    /// Body of the tenant-level placeholders created for team chain roots.
    pub placeholder_source: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            allow_remerge: false,
            placeholder_source: "//empty".to_string(),
        }
    }
}

/// Per-run context: everything a run touches lives here, nothing is global.
pub struct MigrationRun<'a, D> {
    catalog: &'a QueryCatalog,
    teams: &'a TeamDirectory,
    destination: &'a mut D,
    sessions: SessionManager,
    options: RunOptions,
    status: MigrationStatus,
}

impl<'a, D> MigrationRun<'a, D>
where
    D: DestinationClient + AuditSessionClient,
{
    pub fn new(
        catalog: &'a QueryCatalog,
        teams: &'a TeamDirectory,
        destination: &'a mut D,
        options: RunOptions,
    ) -> Self {
        Self {
            catalog,
            teams,
            destination,
            sessions: SessionManager::new(),
            options,
            status: MigrationStatus::new(),
        }
    }

    pub fn status(&self) -> &MigrationStatus {
        &self.status
    }

    /// Closes the audit session and hands back the outcomes.
    pub fn finish(mut self) -> MigrationStatus {
        self.sessions.close(&mut *self.destination);
        self.status
    }

    /// Corp placeholders, corp queries, team buckets, then project buckets.
    ///
    /// Team buckets are skipped for teams without projects: an
    /// application-level override is only reachable through a project.
    pub fn migrate_all(&mut self, plan: &QueriesList) {
        tracing::info!("Migrating {} queued queries", plan.total_queries());
        let projects_per_team = self.teams.projects_per_team();
        for (bucket, queries) in plan.buckets() {
            if let Bucket::Team(team_id) = bucket {
                if !projects_per_team.contains_key(&team_id) {
                    tracing::info!(
                        "Skipping {} queries of team {}: it owns no projects",
                        queries.len(),
                        team_id
                    );
                    continue;
                }
            }
            self.migrate_bucket(bucket, queries);
        }
        tracing::info!(
            "Migration finished: {} OK, {} failed",
            self.status.ok_count(),
            self.status.error_count()
        );
    }

    pub fn migrate_team(&mut self, plan: &QueriesList, team_id: u64) -> Result<(), MigrateError> {
        let bucket = Bucket::Team(team_id);
        let queries = plan.bucket(bucket);
        if queries.is_empty() {
            return Err(MigrateError::NothingQueued(bucket.to_string()));
        }
        if !self.teams.team_has_projects(team_id) {
            tracing::warn!("Team {} owns no projects, migrating its queries anyway", team_id);
        }
        self.migrate_bucket(bucket, queries);
        Ok(())
    }

    pub fn migrate_project(&mut self, plan: &QueriesList, project_id: u64) -> Result<(), MigrateError> {
        let bucket = Bucket::Project(project_id);
        let queries = plan.bucket(bucket);
        if queries.is_empty() {
            return Err(MigrateError::NothingQueued(bucket.to_string()));
        }
        self.migrate_bucket(bucket, queries);
        Ok(())
    }

    /// Migrates `id` in every bucket that holds it.
    pub fn migrate_query(&mut self, plan: &QueriesList, id: QueryId) -> Result<(), MigrateError> {
        let mut found = false;
        for (bucket, queries) in plan.buckets() {
            if let Some(query) = queries.iter().find(|q| q.query_id == id) {
                found = true;
                self.migrate_one(bucket, query);
            }
        }
        if found {
            Ok(())
        } else {
            Err(MigrateError::NotInPlan(id))
        }
    }

    fn migrate_bucket(&mut self, bucket: Bucket, queries: &[Query]) {
        if queries.is_empty() {
            return;
        }
        tracing::info!("Migrating {} queries of {}", queries.len(), bucket);
        for query in queries {
            self.migrate_one(bucket, query);
        }
    }

    fn migrate_one(&mut self, bucket: Bucket, query: &Query) {
        let (phase, outcome) = match bucket {
            Bucket::CorpCreate => (Phase::CorpCreate, self.create_placeholder(query)),
            Bucket::CorpMigrate => (Phase::CorpMigrate, self.migrate_corp_query(query)),
            Bucket::Team(id) => (Phase::Team(id), self.migrate_team_query(query)),
            Bucket::Project(id) => (Phase::Project(id), self.migrate_project_query(query)),
        };
        match &outcome {
            Ok(dest) => tracing::info!("Migrated {} -> {}", query.detailed(), dest.detailed()),
            Err(err) => tracing::error!("Failed to migrate {}: {}", query.detailed(), err),
        }
        self.status.record(phase, query, &outcome);
    }

    fn session(&mut self, language: &str) -> Result<AuditSession, MigrateError> {
        self.sessions.refresh(&mut *self.destination, language)
    }

    fn create_placeholder(&mut self, query: &Query) -> Result<DestQuery, MigrateError> {
        let session = self.session(&query.language)?;
        let placeholder = self.options.placeholder_source.clone();
        self.create_tenant_query(&session, query, &placeholder)
    }

    fn migrate_corp_query(&mut self, query: &Query) -> Result<DestQuery, MigrateError> {
        if query.is_root() {
            let session = self.session(&query.language)?;
            return self.create_tenant_query(&session, query, &query.source);
        }
        let base = self.root_destination(query)?;
        let session = self.session(&query.language)?;
        self.create_override(&session, QueryLevel::Tenant, query, &base)
    }

    fn migrate_team_query(&mut self, query: &Query) -> Result<DestQuery, MigrateError> {
        let base = self.root_destination(query)?;
        let merged = merged_query(
            self.catalog,
            self.teams,
            query,
            &base.name,
            self.options.allow_remerge,
        )?;
        let session = self.session(&query.language)?;
        self.create_override(&session, QueryLevel::Application, &merged, &base)
    }

    fn migrate_project_query(&mut self, query: &Query) -> Result<DestQuery, MigrateError> {
        let base = self.root_destination(query)?;
        let session = self.session(&query.language)?;
        self.create_override(&session, QueryLevel::Project, query, &base)
    }

    /// The destination query standing in for the root of `query`'s chain.
    fn root_destination(&self, query: &Query) -> Result<DestQuery, MigrateError> {
        let root = self
            .catalog
            .root_query_id(query.query_id)
            .and_then(|id| self.catalog.get(id))
            .ok_or_else(|| MigrateError::RootNotFound(query.to_string()))?;
        self.destination
            .resolve_base(root.query_id, &root.language, &root.group, &root.name)
            .ok_or_else(|| MigrateError::DestinationNotFound(root.to_string()))
    }

    fn create_tenant_query(
        &mut self,
        session: &AuditSession,
        query: &Query,
        source: &str,
    ) -> Result<DestQuery, MigrateError> {
        let level = QueryLevel::Tenant;
        if let Some(existing) =
            self.equivalent(session, level, &query.language, &query.group, &query.name, source)
        {
            return Ok(existing);
        }
        self.destination
            .create_new_query(session, NewQuery::tenant(query, source))
            .map_err(MigrateError::Destination)
    }

    fn create_override(
        &mut self,
        session: &AuditSession,
        level: QueryLevel,
        query: &Query,
        base: &DestQuery,
    ) -> Result<DestQuery, MigrateError> {
        if let Some(existing) =
            self.equivalent(session, level, &base.language, &base.group, &base.name, &query.source)
        {
            return Ok(existing);
        }
        let created = self
            .destination
            .create_override(session, level, base)
            .map_err(MigrateError::Destination)?;
        let updated = self
            .destination
            .update_source(session, &created, &query.source)
            .map_err(MigrateError::Destination)?;
        self.destination
            .update_severity(session, &updated, query.severity)
            .map_err(MigrateError::Destination)
    }

    /// An existing query at `level` whose source already equals `source`.
    fn equivalent(
        &mut self,
        session: &AuditSession,
        level: QueryLevel,
        language: &str,
        group: &str,
        name: &str,
        source: &str,
    ) -> Option<DestQuery> {
        let existing = self.destination.find_query(level, language, group, name)?;
        match self.destination.query_source(session, &existing) {
            Ok(current) if current == source => {
                tracing::info!(
                    "{} already exists with identical source, reusing it",
                    existing.detailed()
                );
                Some(existing)
            }
            Ok(_) => None,
            Err(err) => {
                tracing::warn!("Unable to read source of {}: {:#}", existing.detailed(), err);
                None
            }
        }
    }
}
