//! Single catalog pass that sorts every custom query into its bucket.

use cxql_catalog::{PackageType, QueryCatalog};

use crate::plan::QueriesList;

/// Partitions every valid custom query of `catalog` into the four buckets.
///
/// Corp groups feed the corp-migrate bucket; team and project groups feed
/// their owner's bucket, with chain roots also recorded as corp placeholders.
/// Product groups are skipped.
pub fn classify(catalog: &QueryCatalog) -> QueriesList {
    let mut plan = QueriesList::new();

    for (language, group) in catalog.groups() {
        match group.package_type {
            PackageType::Product => continue,
            PackageType::Corp => {
                tracing::debug!("Classifying corp group {} -> {}", language, group.name);
                for query in &group.queries {
                    plan.append_corp(query, catalog);
                }
            }
            PackageType::Team => {
                tracing::debug!(
                    "Classifying team {} group {} -> {}",
                    group.owning_team_id,
                    language,
                    group.name
                );
                for query in group.queries.iter().filter(|q| q.is_valid) {
                    plan.append_team(query, group.owning_team_id, catalog);
                }
            }
            PackageType::Project => {
                tracing::debug!(
                    "Classifying project {} group {} -> {}",
                    group.owning_project_id,
                    language,
                    group.name
                );
                for query in group.queries.iter().filter(|q| q.is_valid) {
                    plan.append_project(query, group.owning_project_id, catalog);
                }
            }
        }
    }

    tracing::info!(
        "Classified {} queries: {} corp to create, {} corp to migrate, {} team buckets, {} project buckets",
        plan.total_queries(),
        plan.corp_queries_to_create.len(),
        plan.corp_queries_to_migrate.len(),
        plan.team_queries_to_migrate.len(),
        plan.project_queries_to_migrate.len()
    );
    plan
}
