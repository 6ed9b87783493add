//! Team hierarchy and project ownership of the source product.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::query::{PackageType, Query};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Team {
    #[serde(rename = "TeamID")]
    pub team_id: u64,
    pub name: String,
    /// 0 at the root of the hierarchy.
    #[serde(default, rename = "ParentID")]
    pub parent_id: u64,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.team_id, self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    #[serde(rename = "ProjectID")]
    pub project_id: u64,
    pub name: String,
    #[serde(rename = "TeamID")]
    pub team_id: u64,
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.project_id, self.name)
    }
}

/// Teams and projects keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    teams: BTreeMap<u64, Team>,
    projects: BTreeMap<u64, Project>,
}

impl TeamDirectory {
    pub fn new(teams: Vec<Team>, projects: Vec<Project>) -> Self {
        Self {
            teams: teams.into_iter().map(|t| (t.team_id, t)).collect(),
            projects: projects.into_iter().map(|p| (p.project_id, p)).collect(),
        }
    }

    pub fn team(&self, id: u64) -> Option<&Team> {
        self.teams.get(&id)
    }

    pub fn project(&self, id: u64) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn project_by_name(&self, name: &str) -> Option<&Project> {
        self.projects
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Parent, grandparent, ... up to the root. Excludes `team_id` itself.
    pub fn ancestors(&self, team_id: u64) -> Vec<u64> {
        let mut path = Vec::new();
        let mut seen = HashSet::from([team_id]);
        let mut current = self.teams.get(&team_id);
        while let Some(team) = current {
            if team.parent_id == 0 {
                break;
            }
            if !seen.insert(team.parent_id) {
                tracing::warn!("team {} has a cyclic parent chain", team_id);
                break;
            }
            path.push(team.parent_id);
            current = self.teams.get(&team.parent_id);
        }
        path
    }

    /// `team_id` followed by its ancestors.
    pub fn hierarchy(&self, team_id: u64) -> Vec<u64> {
        let mut path = vec![team_id];
        path.extend(self.ancestors(team_id));
        path
    }

    pub fn projects_per_team(&self) -> BTreeMap<u64, Vec<u64>> {
        let mut per_team: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for project in self.projects.values() {
            per_team
                .entry(project.team_id)
                .or_default()
                .push(project.project_id);
        }
        per_team
    }

    pub fn team_has_projects(&self, team_id: u64) -> bool {
        self.projects.values().any(|p| p.team_id == team_id)
    }

    /// Label of the team or project owning a query, for merge headers.
    /// `None` when the owner is unknown or the query is product content.
    pub fn owner_label(&self, query: &Query) -> Option<String> {
        let group = &query.owning_group;
        match group.package_type {
            PackageType::Team => self.team(group.owning_team_id).map(|t| t.name.clone()),
            PackageType::Project => self
                .project(group.owning_project_id)
                .map(|p| p.name.clone()),
            PackageType::Corp => Some("Corp".to_string()),
            PackageType::Product => None,
        }
    }
}
