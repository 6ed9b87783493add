//! JSON snapshot of the source product: queries, teams and projects.
//!
//! The snapshot is what a catalog client exports; ownership metadata lives on
//! the groups and is copied onto each query when the catalog is built.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::catalog::QueryCatalog;
use crate::query::QueryLanguage;
use crate::teams::{Project, Team, TeamDirectory};
use crate::CatalogError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub languages: Vec<QueryLanguage>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl CatalogSnapshot {
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn write(&self, path: &Path) -> Result<(), CatalogError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the indexed catalog and team directory.
    pub fn into_parts(self) -> Result<(QueryCatalog, TeamDirectory), CatalogError> {
        let teams = TeamDirectory::new(self.teams, self.projects);
        for team in teams.teams() {
            if team.parent_id != 0 && teams.team(team.parent_id).is_none() {
                return Err(CatalogError::UnknownParent {
                    team: team.team_id,
                    parent: team.parent_id,
                });
            }
        }
        let catalog = QueryCatalog::new(self.languages)?;
        tracing::info!(
            "Loaded catalog with {} queries, {} teams, {} projects",
            catalog.len(),
            teams.teams().count(),
            teams.projects().count()
        );
        Ok((catalog, teams))
    }

    pub fn load(path: &Path) -> Result<(QueryCatalog, TeamDirectory), CatalogError> {
        Self::read(path)?.into_parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PackageType;

    const SNAPSHOT: &str = r#"{
        "Languages": [{
            "Name": "Java",
            "Groups": [{
                "Name": "Java_High_Risk",
                "PackageID": 12,
                "PackageType": "Team",
                "OwningTeamID": 2,
                "Queries": [{
                    "QueryID": 100,
                    "BaseQueryID": 100,
                    "Name": "XSS",
                    "Group": "Java_High_Risk",
                    "Language": "Java",
                    "Severity": 3,
                    "IsValid": true,
                    "Source": "result = Find_XSS();"
                }]
            }]
        }],
        "Teams": [
            {"TeamID": 1, "Name": "CxServer"},
            {"TeamID": 2, "Name": "AppSec", "ParentID": 1}
        ],
        "Projects": [{"ProjectID": 9, "Name": "WebGoat", "TeamID": 2}]
    }"#;

    #[test]
    fn parses_and_links_snapshot() {
        let (catalog, teams) = CatalogSnapshot::from_json(SNAPSHOT)
            .unwrap()
            .into_parts()
            .unwrap();
        let query = catalog.get(100).unwrap();
        assert_eq!(query.package_type(), PackageType::Team);
        assert_eq!(query.owning_group.owning_team_id, 2);
        assert_eq!(teams.ancestors(2), vec![1]);
        assert_eq!(teams.owner_label(query).as_deref(), Some("AppSec"));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let snapshot = CatalogSnapshot {
            teams: vec![Team {
                team_id: 2,
                name: "Orphan".to_string(),
                parent_id: 77,
            }],
            ..Default::default()
        };
        assert!(matches!(
            snapshot.into_parts(),
            Err(CatalogError::UnknownParent { team: 2, parent: 77 })
        ));
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        CatalogSnapshot::from_json(SNAPSHOT).unwrap().write(&path).unwrap();
        let (catalog, _) = CatalogSnapshot::load(&path).unwrap();
        assert_eq!(catalog.len(), 1);
    }
}
