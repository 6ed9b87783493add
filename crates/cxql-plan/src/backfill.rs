//! Pulls inherited ancestor-team queries into descendant team buckets.
//!
//! A sub-team inherits every team-level override above it. When the sub-team
//! is migrated on its own, any part of an ancestor's chain it does not already
//! carry has to travel with it.

use std::collections::{BTreeMap, HashSet};

use cxql_catalog::{PackageType, Query, QueryCatalog, QueryId, TeamDirectory};

use crate::plan::QueriesList;

/// `id` followed by its bases while the chain stays team-owned.
pub(crate) fn team_chain(catalog: &QueryCatalog, id: QueryId) -> Vec<&Query> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = catalog.get(id);
    while let Some(query) = current {
        if query.package_type() != PackageType::Team || !seen.insert(query.query_id) {
            break;
        }
        chain.push(query);
        if query.is_root() {
            break;
        }
        current = catalog.get(query.base_query_id);
    }
    chain
}

fn cover(covered: &mut HashSet<QueryId>, query: &Query) {
    covered.insert(query.query_id);
    covered.extend(query.custom_dependencies.iter().copied());
}

/// Extends each non-empty team bucket with uncovered queries from the chains
/// queued by its ancestors. Coverage is decided nearest ancestor first.
///
/// Each ancestor contributes one block, chain bases first and in the
/// ancestor's queue order, placed ahead of the team's own queries. Farther
/// ancestors end up in front of nearer ones.
///
/// Ancestor buckets are read as they stood before the pass, so a query
/// backfilled into a mid-level team is not forwarded a second time.
pub fn backfill(plan: &mut QueriesList, catalog: &QueryCatalog, teams: &TeamDirectory) {
    let queued: BTreeMap<u64, Vec<QueryId>> = plan
        .team_queries_to_migrate
        .iter()
        .filter(|(_, list)| !list.is_empty())
        .map(|(&team, list)| (team, list.iter().map(|q| q.query_id).collect()))
        .collect();

    for (&team_id, own) in &queued {
        let mut covered = HashSet::new();
        for &id in own {
            for query in team_chain(catalog, id) {
                cover(&mut covered, query);
            }
        }

        for ancestor in teams.ancestors(team_id) {
            let Some(inherited) = queued.get(&ancestor) else {
                continue;
            };
            let mut block: Vec<&Query> = Vec::new();
            for &id in inherited {
                for query in team_chain(catalog, id).into_iter().rev() {
                    if covered.contains(&query.query_id) {
                        continue;
                    }
                    tracing::info!(
                        "Team {} inherits {} from team {}",
                        team_id,
                        query.detailed(),
                        ancestor
                    );
                    block.push(query);
                    cover(&mut covered, query);
                }
            }
            // Prepending back to front leaves the block in order.
            for query in block.into_iter().rev() {
                plan.insert_team(query, team_id, catalog);
            }
        }
    }
}
