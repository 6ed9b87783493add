//! Query records as they exist in the source (team-hierarchical) product.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable numeric query identity.
pub type QueryId = u64;

/// Which level of the source product owns a query package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PackageType {
    /// Unmodified product-default rules.
    #[default]
    Product,
    Corp,
    Team,
    Project,
}

impl PackageType {
    /// Everything except product defaults has been authored by the customer.
    pub fn is_custom(self) -> bool {
        !matches!(self, PackageType::Product)
    }

    pub fn label(self) -> &'static str {
        match self {
            PackageType::Product => "product",
            PackageType::Corp => "corp",
            PackageType::Team => "team",
            PackageType::Project => "project",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ownership of the package (query group) a query lives in.
///
/// This is derived from the catalog, never from a serialized plan: a plan file
/// may be older than the catalog it is applied against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwningGroup {
    pub package_id: u64,
    pub package_name: String,
    pub package_type: PackageType,
    pub owning_team_id: u64,
    pub owning_project_id: u64,
}

/// The scope a query belongs to, used for "same bucket" decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OwnerScope {
    Product,
    Corp,
    Team(u64),
    Project(u64),
}

impl OwningGroup {
    pub fn scope(&self) -> OwnerScope {
        match self.package_type {
            PackageType::Product => OwnerScope::Product,
            PackageType::Corp => OwnerScope::Corp,
            PackageType::Team => OwnerScope::Team(self.owning_team_id),
            PackageType::Project => OwnerScope::Project(self.owning_project_id),
        }
    }

    /// Team or project id owning the package (0 for corp/product).
    pub fn owner_id(&self) -> u64 {
        if self.owning_project_id > 0 {
            self.owning_project_id
        } else {
            self.owning_team_id
        }
    }
}

/// A single CxQL rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Query {
    #[serde(rename = "QueryID")]
    pub query_id: QueryId,
    /// The query this one overrides; equal to `query_id` for a chain root.
    #[serde(rename = "BaseQueryID")]
    pub base_query_id: QueryId,
    pub name: String,
    pub group: String,
    pub language: String,
    #[serde(default)]
    pub severity: i32,
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub is_executable: bool,
    #[serde(default, rename = "CWE")]
    pub cwe: i64,
    #[serde(default, rename = "DescriptionID")]
    pub description_id: i64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub dependencies: Vec<QueryId>,
    #[serde(default)]
    pub custom_dependencies: Vec<QueryId>,
    #[serde(skip)]
    pub owning_group: OwningGroup,
}

impl Query {
    pub fn is_root(&self) -> bool {
        self.base_query_id == self.query_id
    }

    pub fn is_custom(&self) -> bool {
        self.owning_group.package_type.is_custom()
    }

    /// Valid and customer-authored: the only queries that ever get migrated.
    pub fn is_migratable(&self) -> bool {
        self.is_valid && self.is_custom()
    }

    pub fn package_type(&self) -> PackageType {
        self.owning_group.package_type
    }

    pub fn scope(&self) -> OwnerScope {
        self.owning_group.scope()
    }

    /// Stable, human-readable sort key: `language.group.name #id`.
    pub fn sort_key(&self) -> String {
        format!(
            "{}.{}.{} #{}",
            self.language, self.group, self.name, self.query_id
        )
    }

    pub fn detailed(&self) -> String {
        let owner = match self.owning_group.package_type {
            PackageType::Product => "product".to_string(),
            PackageType::Corp => "corp".to_string(),
            PackageType::Team => format!("team {}", self.owning_group.owning_team_id),
            PackageType::Project => format!("project {}", self.owning_group.owning_project_id),
        };
        if self.is_root() {
            format!("[{}] {} ({} level)", self.query_id, self, owner)
        } else {
            format!(
                "[{}] {} ({} level, overrides {})",
                self.query_id, self, owner, self.base_query_id
            )
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} -> {}", self.language, self.group, self.name)
    }
}

/// A package of queries for one language, owned at a single level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryGroup {
    pub name: String,
    #[serde(default, rename = "PackageID")]
    pub package_id: u64,
    #[serde(default)]
    pub package_type: PackageType,
    #[serde(default, rename = "OwningTeamID")]
    pub owning_team_id: u64,
    #[serde(default, rename = "OwningProjectID")]
    pub owning_project_id: u64,
    #[serde(default)]
    pub queries: Vec<Query>,
}

impl QueryGroup {
    pub fn owning_group(&self) -> OwningGroup {
        OwningGroup {
            package_id: self.package_id,
            package_name: self.name.clone(),
            package_type: self.package_type,
            owning_team_id: self.owning_team_id,
            owning_project_id: self.owning_project_id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryLanguage {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<QueryGroup>,
}
