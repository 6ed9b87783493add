//! One link of a merge chain, with its descriptive header.

use chrono::NaiveDateTime;

use cxql_catalog::{PackageType, Query, QueryId};

pub(crate) const SEPARATOR: &str = "// ======================================================";

/// Markers emitted in every merged header; finding one means the source was
/// produced by an earlier merge.
pub(crate) const REMERGE_MARKERS: [&str; 3] = [
    "// MERGED - PROJECT LEVEL",
    "// MERGED - TEAM LEVEL",
    "// MERGED - CORPORATE LEVEL",
];

const TIMESTAMP_FORMAT: &str = "%m-%d-%Y %H:%M:%S%.6f";

pub fn severity_label(severity: i32) -> String {
    match severity {
        0 => "0 - Info".to_string(),
        1 => "1 - Low".to_string(),
        2 => "2 - Medium".to_string(),
        3 => "3 - High".to_string(),
        other => format!("Invalid ({other})"),
    }
}

#[derive(Debug, Clone)]
pub struct CxQuery {
    pub source: String,
    pub query_id: QueryId,
    pub name: String,
    pub language: String,
    pub package_id: u64,
    pub package_name: String,
    pub severity: i32,
    pub level: PackageType,
    pub owner_id: u64,
    pub owner_name: String,
    pub tag: String,
}

impl CxQuery {
    pub fn new(query: &Query, owner: &str, timestamp: NaiveDateTime) -> Self {
        let mut record = Self {
            source: query.source.clone(),
            query_id: query.query_id,
            name: query.name.trim().to_string(),
            language: query.language.trim().to_string(),
            package_id: query.owning_group.package_id,
            package_name: query.group.trim().to_string(),
            severity: query.severity,
            level: query.package_type(),
            owner_id: query.owning_group.owner_id(),
            owner_name: owner.trim().to_string(),
            tag: String::new(),
        };
        record.tag = record.header(timestamp);
        record
    }

    fn header(&self, timestamp: NaiveDateTime) -> String {
        let mut tag = format!("{SEPARATOR}\n");
        match self.level {
            PackageType::Corp => tag.push_str("// MERGED - CORPORATE LEVEL\n"),
            PackageType::Team => {
                tag.push_str("// MERGED - TEAM LEVEL\n");
                tag.push_str(&format!("// TEAM: {} - {}\n", self.owner_id, self.owner_name));
            }
            PackageType::Project => {
                tag.push_str("// MERGED - PROJECT LEVEL\n");
                tag.push_str(&format!(
                    "// PROJECT: {} - {}\n",
                    self.owner_id, self.owner_name
                ));
            }
            PackageType::Product => {}
        }
        tag.push_str(&format!("// QUERY: {} - {}\n", self.query_id, self.name));
        tag.push_str(&format!("// LANGUAGE: {}\n", self.language));
        tag.push_str(&format!(
            "// PACKAGE: {} - {}\n",
            self.package_id, self.package_name
        ));
        tag.push_str(&format!("// SEVERITY: {}\n", severity_label(self.severity)));
        tag.push_str(&format!(
            "// TIMESTAMP: {}\n",
            timestamp.format(TIMESTAMP_FORMAT)
        ));
        tag.push_str(SEPARATOR);
        tag.push('\n');
        tag
    }

    pub fn is_remerge(&self) -> bool {
        REMERGE_MARKERS.iter().any(|m| self.source.contains(m))
    }
}
