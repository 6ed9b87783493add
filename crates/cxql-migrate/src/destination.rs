//! Boundary to the destination (level-based) product.
//!
//! The core never talks HTTP: a remote client, or [`crate::OfflineDestination`],
//! implements these traits. Every call is blocking and may fail on its own.

use serde::{Deserialize, Serialize};
use std::fmt;

use cxql_catalog::{Query, QueryId};

/// Override levels of the destination, widest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum QueryLevel {
    #[default]
    Product,
    Tenant,
    Application,
    Project,
}

impl fmt::Display for QueryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryLevel::Product => "Product",
            QueryLevel::Tenant => "Tenant",
            QueryLevel::Application => "Application",
            QueryLevel::Project => "Project",
        };
        f.write_str(name)
    }
}

/// A query as the destination knows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DestQuery {
    #[serde(rename = "QueryID")]
    pub query_id: u64,
    pub level: QueryLevel,
    /// Tenant name, application or project the query is attached to.
    #[serde(default, rename = "LevelID")]
    pub level_id: String,
    pub language: String,
    pub group: String,
    pub name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub severity: i32,
    #[serde(default)]
    pub is_executable: bool,
    #[serde(default, rename = "CWE")]
    pub cwe: i64,
    #[serde(default, rename = "DescriptionID")]
    pub description_id: i64,
}

impl DestQuery {
    pub fn detailed(&self) -> String {
        format!(
            "[{}] {} -> {} -> {} ({} level)",
            self.query_id, self.language, self.group, self.name, self.level
        )
    }
}

impl fmt::Display for DestQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} -> {}", self.language, self.group, self.name)
    }
}

/// Request for a brand-new (non-override) query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuery {
    pub level: QueryLevel,
    pub language: String,
    pub group: String,
    pub name: String,
    pub source: String,
    pub severity: i32,
    pub is_executable: bool,
    pub cwe: i64,
    pub description_id: i64,
}

impl NewQuery {
    /// Tenant-level copy of `query` carrying `source` as its body.
    pub fn tenant(query: &Query, source: &str) -> Self {
        Self {
            level: QueryLevel::Tenant,
            language: query.language.clone(),
            group: query.group.clone(),
            name: query.name.clone(),
            source: source.to_string(),
            severity: query.severity,
            is_executable: query.is_executable,
            cwe: query.cwe,
            description_id: query.description_id,
        }
    }
}

/// A destination audit session, scoped to the languages its scan covered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSession {
    pub id: String,
    pub languages: Vec<String>,
}

impl AuditSession {
    pub fn has_language(&self, language: &str) -> bool {
        self.languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}

pub trait AuditSessionClient {
    fn create_session(&mut self, language: &str) -> anyhow::Result<AuditSession>;
    fn keep_alive(&mut self, session: &AuditSession) -> anyhow::Result<()>;
    fn delete_session(&mut self, session: &AuditSession) -> anyhow::Result<()>;
}

pub trait DestinationClient {
    /// Existing query at `level` (for the current migration target).
    fn find_query(&self, level: QueryLevel, language: &str, group: &str, name: &str)
        -> Option<DestQuery>;

    /// Destination query corresponding to the source chain root `sast_root_id`.
    fn resolve_base(
        &self,
        sast_root_id: QueryId,
        language: &str,
        group: &str,
        name: &str,
    ) -> Option<DestQuery>;

    fn query_source(&mut self, session: &AuditSession, query: &DestQuery) -> anyhow::Result<String>;

    fn create_new_query(&mut self, session: &AuditSession, query: NewQuery) -> anyhow::Result<DestQuery>;

    fn create_override(
        &mut self,
        session: &AuditSession,
        level: QueryLevel,
        base: &DestQuery,
    ) -> anyhow::Result<DestQuery>;

    fn update_source(
        &mut self,
        session: &AuditSession,
        query: &DestQuery,
        source: &str,
    ) -> anyhow::Result<DestQuery>;

    fn update_severity(
        &mut self,
        session: &AuditSession,
        query: &DestQuery,
        severity: i32,
    ) -> anyhow::Result<DestQuery>;
}
