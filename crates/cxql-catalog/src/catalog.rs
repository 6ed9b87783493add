//! In-memory index over every query of the source product.

use std::collections::{HashMap, HashSet};

use crate::query::{Query, QueryGroup, QueryId, QueryLanguage};
use crate::CatalogError;

#[derive(Debug, Clone, Copy)]
struct Slot {
    language: usize,
    group: usize,
    query: usize,
}

/// Language → group → query tree plus an id index.
///
/// Read-only once built: callers clone queries when they need a variant.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    languages: Vec<QueryLanguage>,
    index: HashMap<QueryId, Slot>,
}

impl QueryCatalog {
    /// Builds the index, links every query to its owning group and derives
    /// `custom_dependencies` from `dependencies`.
    pub fn new(mut languages: Vec<QueryLanguage>) -> Result<Self, CatalogError> {
        let mut index = HashMap::new();
        for (li, language) in languages.iter_mut().enumerate() {
            for (gi, group) in language.groups.iter_mut().enumerate() {
                let owning = group.owning_group();
                for (qi, query) in group.queries.iter_mut().enumerate() {
                    query.owning_group = owning.clone();
                    let slot = Slot {
                        language: li,
                        group: gi,
                        query: qi,
                    };
                    if index.insert(query.query_id, slot).is_some() {
                        return Err(CatalogError::DuplicateQuery(query.query_id));
                    }
                }
            }
        }

        let mut catalog = Self { languages, index };
        catalog.link_custom_dependencies();
        Ok(catalog)
    }

    fn link_custom_dependencies(&mut self) {
        let custom: HashSet<QueryId> = self
            .queries()
            .filter(|q| q.is_custom())
            .map(|q| q.query_id)
            .collect();

        for language in &mut self.languages {
            for group in &mut language.groups {
                for query in &mut group.queries {
                    query.custom_dependencies = query
                        .dependencies
                        .iter()
                        .copied()
                        .filter(|id| custom.contains(id))
                        .collect();
                }
            }
        }
    }

    pub fn languages(&self) -> &[QueryLanguage] {
        &self.languages
    }

    /// Groups in catalog order, paired with their language name.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &QueryGroup)> {
        self.languages
            .iter()
            .flat_map(|l| l.groups.iter().map(move |g| (l.name.as_str(), g)))
    }

    pub fn queries(&self) -> impl Iterator<Item = &Query> {
        self.languages
            .iter()
            .flat_map(|l| l.groups.iter())
            .flat_map(|g| g.queries.iter())
    }

    pub fn get(&self, id: QueryId) -> Option<&Query> {
        let slot = self.index.get(&id)?;
        Some(&self.languages[slot.language].groups[slot.group].queries[slot.query])
    }

    pub fn contains(&self, id: QueryId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The override chain starting at `id`, ending at its root.
    ///
    /// Stops early (without the root) when a base id is missing or the chain
    /// loops back on itself.
    pub fn override_chain(&self, id: QueryId) -> Vec<&Query> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(id);
        while let Some(query) = current {
            if !seen.insert(query.query_id) {
                tracing::warn!("override chain of query {} loops at {}", id, query.query_id);
                break;
            }
            chain.push(query);
            if query.is_root() {
                break;
            }
            current = self.get(query.base_query_id);
        }
        chain
    }

    /// Id of the chain root `id` ultimately overrides.
    pub fn root_query_id(&self, id: QueryId) -> Option<QueryId> {
        self.override_chain(id)
            .last()
            .filter(|q| q.is_root())
            .map(|q| q.query_id)
    }

    /// Printable description of each link of the override chain.
    pub fn override_list(&self, id: QueryId) -> Vec<String> {
        self.override_chain(id)
            .into_iter()
            .map(|q| q.detailed())
            .collect()
    }
}
