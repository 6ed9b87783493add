//! Dependency listing for custom queries, whole-catalog or per project.
//!
//! Used ahead of a migration to see which custom (and product) queries a
//! given query relies on, and whether each of those is a new root ("NEW") or
//! an override of something else ("Override").

use std::collections::HashSet;
use std::fmt;

use cxql_catalog::{PackageType, Query, QueryCatalog, QueryId, TeamDirectory};

use crate::PlanError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Hide corp queries and corp dependencies (already migrated).
    pub no_corp: bool,
    /// Hide the full dependency list that includes product defaults.
    pub no_prod: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    New,
    Override,
}

impl DependencyKind {
    pub fn of(query: &Query) -> Self {
        if query.is_root() {
            DependencyKind::New
        } else {
            DependencyKind::Override
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DependencyKind::New => "NEW",
            DependencyKind::Override => "Override",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyLine {
    pub query_id: QueryId,
    pub kind: DependencyKind,
    pub description: String,
}

impl fmt::Display for DependencyLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.description)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportEntry {
    pub query_id: QueryId,
    pub description: String,
    /// Empty in whole-catalog mode.
    pub override_list: Vec<String>,
    pub custom_dependencies: Vec<DependencyLine>,
    pub all_dependencies: Vec<DependencyLine>,
}

impl ReportEntry {
    pub fn has_dependencies(&self) -> bool {
        !self.custom_dependencies.is_empty() || !self.all_dependencies.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportSection {
    pub title: String,
    pub entries: Vec<ReportEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyReport {
    pub sections: Vec<ReportSection>,
}

impl DependencyReport {
    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    pub fn find(&self, id: QueryId) -> Option<&ReportEntry> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .find(|e| e.query_id == id)
    }
}

impl fmt::Display for DependencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            writeln!(f, "{} ({}):", section.title, section.entries.len())?;
            for entry in &section.entries {
                if entry.override_list.is_empty() {
                    writeln!(f, "\t{}", entry.description)?;
                } else {
                    writeln!(f, "\t{}", entry.override_list.join("\n\t  <- "))?;
                }
                for (heading, lines) in [
                    ("custom dependencies", &entry.custom_dependencies),
                    ("all dependencies", &entry.all_dependencies),
                ] {
                    if lines.is_empty() {
                        continue;
                    }
                    writeln!(f, "\t  {heading}:")?;
                    for line in lines {
                        writeln!(f, "\t\t- {line}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn dependency_lines<'a>(
    catalog: &QueryCatalog,
    ids: impl IntoIterator<Item = &'a QueryId>,
    no_corp: bool,
) -> Vec<DependencyLine> {
    ids.into_iter()
        .filter_map(|&id| {
            let Some(dependency) = catalog.get(id) else {
                tracing::warn!("dependency {} is not in the catalog", id);
                return None;
            };
            if no_corp && dependency.package_type() == PackageType::Corp {
                return None;
            }
            Some(DependencyLine {
                query_id: id,
                kind: DependencyKind::of(dependency),
                description: dependency.detailed(),
            })
        })
        .collect()
}

fn build_entry(catalog: &QueryCatalog, query: &Query, options: ReportOptions, with_chain: bool) -> ReportEntry {
    ReportEntry {
        query_id: query.query_id,
        description: query.detailed(),
        override_list: if with_chain {
            catalog.override_list(query.query_id)
        } else {
            Vec::new()
        },
        custom_dependencies: dependency_lines(catalog, &query.custom_dependencies, options.no_corp),
        all_dependencies: if options.no_prod {
            Vec::new()
        } else {
            dependency_lines(catalog, &query.dependencies, false)
        },
    }
}

/// Every valid custom query that has something to report.
pub fn catalog_report(catalog: &QueryCatalog, options: ReportOptions) -> DependencyReport {
    let mut section = ReportSection {
        title: "Custom queries".to_string(),
        entries: Vec::new(),
    };

    for (_, group) in catalog.groups() {
        let included = match group.package_type {
            PackageType::Product => false,
            PackageType::Corp => !options.no_corp,
            PackageType::Team | PackageType::Project => true,
        };
        if !included {
            continue;
        }
        for query in group.queries.iter().filter(|q| q.is_migratable()) {
            let entry = build_entry(catalog, query, options, false);
            if entry.has_dependencies() {
                tracing::debug!("{} has dependencies", query.detailed());
                section.entries.push(entry);
            }
        }
    }

    DependencyReport {
        sections: vec![section],
    }
}

/// Queries that apply to one project: its own, those of its team hierarchy
/// and, unless `no_corp`, corp queries.
pub fn project_report(
    catalog: &QueryCatalog,
    teams: &TeamDirectory,
    project_id: u64,
    options: ReportOptions,
) -> Result<DependencyReport, PlanError> {
    let project = teams
        .project(project_id)
        .ok_or(PlanError::UnknownProject(project_id))?;
    let hierarchy: HashSet<u64> = teams.hierarchy(project.team_id).into_iter().collect();

    let mut project_queries = Vec::new();
    let mut team_queries = Vec::new();
    let mut corp_queries = Vec::new();
    for (_, group) in catalog.groups() {
        for query in &group.queries {
            match group.package_type {
                PackageType::Project if group.owning_project_id == project_id => {
                    tracing::info!("Adding project {} query {} to list", project, query.detailed());
                    project_queries.push(query);
                }
                PackageType::Team if hierarchy.contains(&group.owning_team_id) => {
                    tracing::info!(
                        "Adding team {} query {} to list",
                        group.owning_team_id,
                        query.detailed()
                    );
                    team_queries.push(query);
                }
                PackageType::Corp if !options.no_corp => {
                    tracing::info!("Adding corp query {} to list", query.detailed());
                    corp_queries.push(query);
                }
                _ => {}
            }
        }
    }

    let mut sections = vec![
        ReportSection {
            title: "Project queries".to_string(),
            entries: project_queries
                .into_iter()
                .map(|q| build_entry(catalog, q, options, true))
                .collect(),
        },
        ReportSection {
            title: "Team queries".to_string(),
            entries: team_queries
                .into_iter()
                .map(|q| build_entry(catalog, q, options, true))
                .collect(),
        },
    ];
    if !options.no_corp {
        sections.push(ReportSection {
            title: "Corp queries".to_string(),
            entries: corp_queries
                .into_iter()
                .map(|q| build_entry(catalog, q, options, true))
                .collect(),
        });
    }

    Ok(DependencyReport { sections })
}
