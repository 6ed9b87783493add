//! Dependency-ordered bucket construction.
//!
//! `append` places a query at the end of a bucket and pulls its same-scope
//! dependencies in ahead of the whole list; `insert` prepends a query and,
//! transitively, the dependencies it needs. Corp dependencies of team or
//! project queries never enter those buckets: they are redirected to the
//! corp bucket instead.
//!
//! Identity is the query id. The traversal is an explicit stack guarded by
//! an id set, so deep or cyclic dependency data terminates.

use std::collections::{BTreeSet, HashMap, HashSet};

use cxql_catalog::{PackageType, Query, QueryCatalog, QueryId};

use crate::plan::{Bucket, QueriesList};

impl QueriesList {
    /// Appends `query` to `bucket` with its dependencies ordered before it.
    pub fn append(&mut self, bucket: Bucket, query: &Query, catalog: &QueryCatalog) {
        let mut redirected = Vec::new();
        append_with_dependencies(self.list_mut(bucket), bucket, query, catalog, &mut redirected);
        self.append_redirected(redirected, catalog);
    }

    /// Prepends `query` to `bucket`, with its same-scope dependencies ahead of it.
    pub fn insert(&mut self, bucket: Bucket, query: &Query, catalog: &QueryCatalog) {
        let mut redirected = Vec::new();
        insert_with_dependencies(self.list_mut(bucket), bucket, query, catalog, &mut redirected);
        self.append_redirected(redirected, catalog);
    }

    fn append_redirected(&mut self, mut redirected: Vec<QueryId>, catalog: &QueryCatalog) {
        let mut next = 0;
        while next < redirected.len() {
            let id = redirected[next];
            next += 1;
            let Some(dependency) = catalog.get(id) else {
                continue;
            };
            if self.contains(Bucket::CorpMigrate, id) {
                tracing::trace!(
                    "Skip appending corp query to migrate: {}",
                    dependency.detailed()
                );
                continue;
            }
            tracing::info!(
                "Appending corp query to migrate: {}",
                dependency.detailed()
            );
            append_with_dependencies(
                &mut self.corp_queries_to_migrate,
                Bucket::CorpMigrate,
                dependency,
                catalog,
                &mut redirected,
            );
        }
    }

    /// Runs [`settle_order`] over every bucket.
    pub fn settle(&mut self) {
        settle_order(&mut self.corp_queries_to_create);
        settle_order(&mut self.corp_queries_to_migrate);
        for list in self.team_queries_to_migrate.values_mut() {
            settle_order(list);
        }
        for list in self.project_queries_to_migrate.values_mut() {
            settle_order(list);
        }
    }
}

fn contains(list: &[Query], id: QueryId) -> bool {
    list.iter().any(|q| q.query_id == id)
}

pub(crate) fn append_with_dependencies(
    list: &mut Vec<Query>,
    bucket: Bucket,
    query: &Query,
    catalog: &QueryCatalog,
    redirected: &mut Vec<QueryId>,
) {
    if !query.is_migratable() {
        tracing::trace!(" - not a valid custom query: {}", query.detailed());
        return;
    }
    if contains(list, query.query_id) {
        tracing::debug!(" - already in list");
        return;
    }

    tracing::debug!(" - appended query to {}", bucket);
    list.push(query.clone());

    for &dependency_id in &query.dependencies {
        if contains(list, dependency_id) {
            continue;
        }
        let Some(dependency) = catalog.get(dependency_id) else {
            tracing::warn!(
                "{} depends on unknown query {}",
                query.detailed(),
                dependency_id
            );
            continue;
        };
        if dependency.scope() == query.scope() {
            insert_with_dependencies(list, bucket, dependency, catalog, redirected);
        } else if dependency.package_type() == PackageType::Corp {
            redirected.push(dependency_id);
        }
    }
}

pub(crate) fn insert_with_dependencies(
    list: &mut Vec<Query>,
    bucket: Bucket,
    query: &Query,
    catalog: &QueryCatalog,
    redirected: &mut Vec<QueryId>,
) {
    let mut present: HashSet<QueryId> = list.iter().map(|q| q.query_id).collect();
    let mut visited: Vec<Query> = Vec::new();
    let mut stack: Vec<Query> = vec![query.clone()];

    while let Some(current) = stack.pop() {
        if !current.is_migratable() {
            continue;
        }
        if !present.insert(current.query_id) {
            tracing::debug!(" - already in list");
            continue;
        }
        tracing::debug!(
            " - inserted query into {}: {}",
            bucket,
            current.detailed()
        );

        // Reverse push so the first dependency is visited first.
        for &dependency_id in current.dependencies.iter().rev() {
            if present.contains(&dependency_id) {
                continue;
            }
            let Some(dependency) = catalog.get(dependency_id) else {
                tracing::warn!(
                    "{} depends on unknown query {}",
                    current.detailed(),
                    dependency_id
                );
                continue;
            };
            if dependency.scope() == current.scope() {
                stack.push(dependency.clone());
            } else if dependency.package_type() == PackageType::Corp {
                redirected.push(dependency_id);
            }
        }
        visited.push(current);
    }

    // Each visit was a prepend: the last one visited ends up first.
    visited.reverse();
    list.splice(0..0, visited);
}

/// Stable topological reorder: no entry precedes a dependency that is in the
/// same list. A list that is already ordered is left untouched.
pub fn settle_order(list: &mut Vec<Query>) {
    let position: HashMap<QueryId, usize> = list
        .iter()
        .enumerate()
        .map(|(i, q)| (q.query_id, i))
        .collect();

    let n = list.len();
    let mut pending = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, query) in list.iter().enumerate() {
        let mut seen = HashSet::new();
        for dependency in &query.dependencies {
            if let Some(&j) = position.get(dependency) {
                if j != i && seen.insert(j) {
                    pending[i] += 1;
                    dependents[j].push(i);
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &k in &dependents[i] {
            pending[k] -= 1;
            if pending[k] == 0 {
                ready.insert(k);
            }
        }
    }

    if order.len() < n {
        let placed: HashSet<usize> = order.iter().copied().collect();
        let cyclic: Vec<usize> = (0..n).filter(|i| !placed.contains(i)).collect();
        tracing::warn!(
            "dependency cycle among {} queries: {}",
            cyclic.len(),
            cyclic
                .iter()
                .map(|&i| list[i].detailed())
                .collect::<Vec<_>>()
                .join(", ")
        );
        order.extend(cyclic);
    }

    if order.iter().enumerate().all(|(at, &i)| at == i) {
        return;
    }

    let mut slots: Vec<Option<Query>> = list.drain(..).map(Some).collect();
    list.extend(order.into_iter().filter_map(|i| slots[i].take()));
}
