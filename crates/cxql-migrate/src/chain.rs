//! Team override chains, flattened for the destination.

use std::collections::HashSet;

use cxql_catalog::{PackageType, Query, QueryCatalog, TeamDirectory};
use cxql_merge::{MergeStatus, QueryMerger};

use crate::MigrateError;

/// Walks `base_query_id` from `query` through team-owned queries, prepending
/// each link with its owning team's name.
pub fn build_merge_chain(
    catalog: &QueryCatalog,
    teams: &TeamDirectory,
    query: &Query,
    allow_remerge: bool,
) -> QueryMerger {
    let mut merger = QueryMerger::new().allow_remerge(allow_remerge);
    let mut seen = HashSet::new();
    let mut current = query;

    while current.package_type() == PackageType::Team && seen.insert(current.query_id) {
        let Some(label) = teams.owner_label(current) else {
            tracing::warn!(
                "Team {} owning {} is unknown, chain stops here",
                current.owning_group.owning_team_id,
                current.detailed()
            );
            break;
        };
        merger.insert(current, &label);
        if current.is_root() {
            break;
        }
        match catalog.get(current.base_query_id) {
            Some(base) => current = base,
            None => break,
        }
    }

    tracing::debug!("Merge chain for {} has {} links", query.detailed(), merger.len());
    merger
}

/// `query` ready for submission under `dest_name`.
///
/// A one-link chain that keeps its name is returned unchanged; anything else
/// becomes a clone carrying the merged source.
pub fn merged_query(
    catalog: &QueryCatalog,
    teams: &TeamDirectory,
    query: &Query,
    dest_name: &str,
    allow_remerge: bool,
) -> Result<Query, MigrateError> {
    let merger = build_merge_chain(catalog, teams, query, allow_remerge);
    if merger.len() <= 1 && dest_name == query.name {
        return Ok(query.clone());
    }

    let outcome = merger.merge(dest_name)?;
    if outcome.status == MergeStatus::Remerge {
        tracing::warn!("{} was merged over previously merged code", query.detailed());
    }
    tracing::info!("Merged {} links into {}", merger.len(), query.detailed());

    let mut merged = query.clone();
    merged.source = outcome.source;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxql_catalog::{QueryGroup, QueryLanguage, Team};

    fn group(name: &str, package_type: PackageType, team: u64, queries: Vec<Query>) -> QueryGroup {
        QueryGroup {
            name: name.to_string(),
            package_id: team + 100,
            package_type,
            owning_team_id: team,
            owning_project_id: 0,
            queries,
        }
    }

    fn query(id: u64, base: u64, source: &str) -> Query {
        Query {
            query_id: id,
            base_query_id: base,
            name: "XSS".to_string(),
            group: "Java_High_Risk".to_string(),
            language: "Java".to_string(),
            severity: 3,
            is_valid: true,
            source: source.to_string(),
            ..Default::default()
        }
    }

    fn fixture() -> (QueryCatalog, TeamDirectory) {
        let catalog = QueryCatalog::new(vec![QueryLanguage {
            name: "Java".to_string(),
            groups: vec![
                group("Java_High_Risk", PackageType::Product, 0, vec![query(1, 1, "result = All;")]),
                group(
                    "Java_High_Risk",
                    PackageType::Team,
                    1,
                    vec![query(10, 1, "result = base.XSS();")],
                ),
                group(
                    "Java_High_Risk",
                    PackageType::Team,
                    2,
                    vec![query(20, 10, "result = base.XSS();\nresult.Add(All);")],
                ),
            ],
        }])
        .unwrap();
        let teams = TeamDirectory::new(
            vec![
                Team {
                    team_id: 1,
                    name: "Root".to_string(),
                    parent_id: 0,
                },
                Team {
                    team_id: 2,
                    name: "Child".to_string(),
                    parent_id: 1,
                },
            ],
            vec![],
        );
        (catalog, teams)
    }

    #[test]
    fn chain_stops_at_product_level() {
        let (catalog, teams) = fixture();
        let query = catalog.get(20).unwrap();
        let merger = build_merge_chain(&catalog, &teams, query, false);
        let ids: Vec<u64> = merger.queries().iter().map(|q| q.query_id).collect();
        assert_eq!(ids, vec![10, 20]);
        assert!(merger.get(0).unwrap().tag.contains("// TEAM: 1 - Root"));
    }

    #[test]
    fn unknown_owning_team_ends_the_chain() {
        let (catalog, _) = fixture();
        let teams = TeamDirectory::new(
            vec![Team {
                team_id: 2,
                name: "Child".to_string(),
                parent_id: 0,
            }],
            vec![],
        );
        let merger = build_merge_chain(&catalog, &teams, catalog.get(20).unwrap(), false);
        let ids: Vec<u64> = merger.queries().iter().map(|q| q.query_id).collect();
        assert_eq!(ids, vec![20]);
        assert!(merger.get(0).unwrap().tag.contains("// TEAM: 2 - Child"));
    }

    #[test]
    fn single_link_with_same_name_is_unchanged() {
        let (catalog, teams) = fixture();
        let query = catalog.get(10).unwrap();
        let merged = merged_query(&catalog, &teams, query, "XSS", false).unwrap();
        assert_eq!(merged.source, query.source);
    }

    #[test]
    fn renamed_or_longer_chains_are_merged() {
        let (catalog, teams) = fixture();
        let merged = merged_query(&catalog, &teams, catalog.get(20).unwrap(), "XSS", false).unwrap();
        assert!(merged.source.contains("// MERGED - TEAM LEVEL"));
        assert_eq!(merged.query_id, 20);

        let renamed = merged_query(&catalog, &teams, catalog.get(10).unwrap(), "XSS_New", false).unwrap();
        assert!(renamed.source.contains("base.XSS_New()"));
    }

    #[test]
    fn remerge_fails_unless_allowed() {
        let (catalog, teams) = fixture();
        let mut previous = catalog.get(20).unwrap().clone();
        previous.source = format!("// MERGED - TEAM LEVEL\n{}", previous.source);
        let err = merged_query(&catalog, &teams, &previous, "XSS", false).unwrap_err();
        assert!(matches!(err, MigrateError::Merge(_)));
        assert!(merged_query(&catalog, &teams, &previous, "XSS", true).is_ok());
    }
}
