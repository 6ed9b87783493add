//! File-backed destination.
//!
//! Stands in for a remote tenant: queries live in a JSON snapshot, ids are
//! handed out sequentially and every mutation is appended to a log that is
//! saved with the snapshot.

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use cxql_catalog::QueryId;

use crate::destination::{
    AuditSession, AuditSessionClient, DestQuery, DestinationClient, NewQuery, QueryLevel,
};
use crate::MigrateError;

pub const DEFAULT_TARGET_PROJECT: &str = "CxPSEMEA-Query Migration Project";
pub const DEFAULT_TARGET_APPLICATION: &str = "CxPSEMEA-Query Migration Application";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DestinationSnapshot {
    #[serde(default)]
    pub queries: Vec<DestQuery>,
    /// Source chain-root id to destination query id.
    #[serde(default)]
    pub query_mapping: BTreeMap<QueryId, u64>,
    /// Languages an audit session can be opened for; empty allows any.
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub mutations: Vec<String>,
}

#[derive(Debug)]
pub struct OfflineDestination {
    snapshot: DestinationSnapshot,
    target_project: String,
    target_application: String,
    next_id: u64,
    sessions_opened: u64,
    live_sessions: HashSet<String>,
}

impl OfflineDestination {
    pub fn new(snapshot: DestinationSnapshot) -> Self {
        let next_id = snapshot
            .queries
            .iter()
            .map(|q| q.query_id)
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            snapshot,
            target_project: DEFAULT_TARGET_PROJECT.to_string(),
            target_application: DEFAULT_TARGET_APPLICATION.to_string(),
            next_id,
            sessions_opened: 0,
            live_sessions: HashSet::new(),
        }
    }

    /// Application and project that receive team and project overrides.
    pub fn with_targets(mut self, project: &str, application: &str) -> Self {
        self.target_project = project.to_string();
        self.target_application = application.to_string();
        self
    }

    pub fn open(path: &Path) -> Result<Self, MigrateError> {
        let text = fs::read_to_string(path).map_err(|source| MigrateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: DestinationSnapshot = serde_json::from_str(&text)?;
        tracing::info!(
            "Loaded destination with {} queries from {}",
            snapshot.queries.len(),
            path.display()
        );
        Ok(Self::new(snapshot))
    }

    pub fn save(&self, path: &Path) -> Result<(), MigrateError> {
        let text = serde_json::to_string_pretty(&self.snapshot)?;
        fs::write(path, text).map_err(|source| MigrateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Saved destination to {}", path.display());
        Ok(())
    }

    pub fn snapshot(&self) -> &DestinationSnapshot {
        &self.snapshot
    }

    pub fn queries(&self) -> &[DestQuery] {
        &self.snapshot.queries
    }

    pub fn mutations(&self) -> &[String] {
        &self.snapshot.mutations
    }

    fn level_id(&self, level: QueryLevel) -> &str {
        match level {
            QueryLevel::Product | QueryLevel::Tenant => "",
            QueryLevel::Application => self.target_application.as_str(),
            QueryLevel::Project => self.target_project.as_str(),
        }
    }

    fn position(&self, level: QueryLevel, language: &str, group: &str, name: &str) -> Option<usize> {
        let level_id = self.level_id(level);
        self.snapshot.queries.iter().position(|q| {
            q.level == level
                && q.level_id == level_id
                && q.language.eq_ignore_ascii_case(language)
                && q.group == group
                && q.name == name
        })
    }

    fn index_of(&self, id: u64) -> anyhow::Result<usize> {
        self.snapshot
            .queries
            .iter()
            .position(|q| q.query_id == id)
            .ok_or_else(|| anyhow!("query {id} does not exist"))
    }

    fn check_session(&self, session: &AuditSession, language: &str) -> anyhow::Result<()> {
        if !self.live_sessions.contains(&session.id) {
            bail!("audit session {} is not open", session.id);
        }
        if !session.has_language(language) {
            bail!("audit session {} does not cover {}", session.id, language);
        }
        Ok(())
    }

    fn push(&mut self, mut query: DestQuery) -> DestQuery {
        query.query_id = self.next_id;
        self.next_id += 1;
        self.snapshot.queries.push(query.clone());
        query
    }

    fn log(&mut self, entry: String) {
        tracing::debug!("Destination: {}", entry);
        self.snapshot.mutations.push(entry);
    }
}

impl DestinationClient for OfflineDestination {
    fn find_query(
        &self,
        level: QueryLevel,
        language: &str,
        group: &str,
        name: &str,
    ) -> Option<DestQuery> {
        self.position(level, language, group, name)
            .map(|i| self.snapshot.queries[i].clone())
    }

    fn resolve_base(
        &self,
        sast_root_id: QueryId,
        language: &str,
        group: &str,
        name: &str,
    ) -> Option<DestQuery> {
        if let Some(id) = self.snapshot.query_mapping.get(&sast_root_id) {
            if let Some(query) = self.snapshot.queries.iter().find(|q| q.query_id == *id) {
                return Some(query.clone());
            }
            tracing::warn!("Query mapping for {} points at missing query {}", sast_root_id, id);
        }
        self.find_query(QueryLevel::Tenant, language, group, name)
            .or_else(|| self.find_query(QueryLevel::Product, language, group, name))
    }

    fn query_source(&mut self, session: &AuditSession, query: &DestQuery) -> anyhow::Result<String> {
        self.check_session(session, &query.language)?;
        let index = self.index_of(query.query_id)?;
        Ok(self.snapshot.queries[index].source.clone())
    }

    fn create_new_query(&mut self, session: &AuditSession, query: NewQuery) -> anyhow::Result<DestQuery> {
        self.check_session(session, &query.language)?;
        if self
            .position(query.level, &query.language, &query.group, &query.name)
            .is_some()
        {
            bail!(
                "{} -> {} -> {} already exists at {} level",
                query.language,
                query.group,
                query.name,
                query.level
            );
        }
        let level_id = self.level_id(query.level).to_string();
        let created = self.push(DestQuery {
            query_id: 0,
            level: query.level,
            level_id,
            language: query.language,
            group: query.group,
            name: query.name,
            source: query.source,
            severity: query.severity,
            is_executable: query.is_executable,
            cwe: query.cwe,
            description_id: query.description_id,
        });
        self.log(format!("create {}", created.detailed()));
        Ok(created)
    }

    fn create_override(
        &mut self,
        session: &AuditSession,
        level: QueryLevel,
        base: &DestQuery,
    ) -> anyhow::Result<DestQuery> {
        self.check_session(session, &base.language)?;
        if level == QueryLevel::Product {
            bail!("cannot override {} at product level", base);
        }
        if let Some(index) = self.position(level, &base.language, &base.group, &base.name) {
            return Ok(self.snapshot.queries[index].clone());
        }
        let level_id = self.level_id(level).to_string();
        let created = self.push(DestQuery {
            level,
            level_id,
            ..base.clone()
        });
        self.log(format!("override {} from {}", created.detailed(), base.query_id));
        Ok(created)
    }

    fn update_source(
        &mut self,
        session: &AuditSession,
        query: &DestQuery,
        source: &str,
    ) -> anyhow::Result<DestQuery> {
        self.check_session(session, &query.language)?;
        let index = self.index_of(query.query_id)?;
        self.snapshot.queries[index].source = source.to_string();
        let updated = self.snapshot.queries[index].clone();
        self.log(format!("source {}", updated.detailed()));
        Ok(updated)
    }

    fn update_severity(
        &mut self,
        session: &AuditSession,
        query: &DestQuery,
        severity: i32,
    ) -> anyhow::Result<DestQuery> {
        self.check_session(session, &query.language)?;
        let index = self.index_of(query.query_id)?;
        self.snapshot.queries[index].severity = severity;
        let updated = self.snapshot.queries[index].clone();
        self.log(format!("severity {} {}", severity, updated.detailed()));
        Ok(updated)
    }
}

impl AuditSessionClient for OfflineDestination {
    fn create_session(&mut self, language: &str) -> anyhow::Result<AuditSession> {
        let languages = &self.snapshot.languages;
        if !languages.is_empty() && !languages.iter().any(|l| l.eq_ignore_ascii_case(language)) {
            bail!("no scan available for language {language}");
        }
        self.sessions_opened += 1;
        let session = AuditSession {
            id: format!("offline-{}", self.sessions_opened),
            languages: vec![language.to_string()],
        };
        self.live_sessions.insert(session.id.clone());
        Ok(session)
    }

    fn keep_alive(&mut self, session: &AuditSession) -> anyhow::Result<()> {
        if self.live_sessions.contains(&session.id) {
            Ok(())
        } else {
            bail!("audit session {} expired", session.id)
        }
    }

    fn delete_session(&mut self, session: &AuditSession) -> anyhow::Result<()> {
        if self.live_sessions.remove(&session.id) {
            Ok(())
        } else {
            bail!("audit session {} does not exist", session.id)
        }
    }
}
