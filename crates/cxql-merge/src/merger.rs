//! The merge chain and the flattening algorithm.

use chrono::{Local, NaiveDateTime};

use cxql_catalog::{PackageType, Query};

use crate::basecall::{strip_comments, BaseCall};
use crate::cxquery::{CxQuery, SEPARATOR};
use crate::{MergeError, MergeStatus};

const AUTO_BEGIN: &str = "// ---------- >> AUTO ADDED BY MERGE";
const AUTO_END: &str = "// << ---------- AUTO ADDED BY MERGE";
const BROKEN_CHAIN: &str = "// BASE CALL CHAIN BROKEN - QUERY DOES NOT CALL BASE";
const UNSAFE_ASSIGNMENT: &str = "// DIRECT RESULT ASSIGNMENT UNDETECTED - result = base.<x>";
const INACTIVE_PREFIX: &str = "//NO-BASE//\t ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub source: String,
    pub status: MergeStatus,
}

/// An ordered override chain: index 0 is the outermost ancestor, the last
/// entry is the most specific override.
#[derive(Debug, Clone, Default)]
pub struct QueryMerger {
    queries: Vec<CxQuery>,
    allow_remerge: bool,
    timestamp: Option<NaiveDateTime>,
}

impl QueryMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept chains that contain previously merged code.
    pub fn allow_remerge(mut self, allow: bool) -> Self {
        self.allow_remerge = allow;
        self
    }

    /// Fixed header timestamp instead of the current local time.
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn stamp(&self) -> NaiveDateTime {
        self.timestamp
            .unwrap_or_else(|| Local::now().naive_local())
    }

    /// Appends the innermost link.
    pub fn add(&mut self, query: &Query, owner: &str) {
        let record = CxQuery::new(query, owner, self.stamp());
        self.queries.push(record);
    }

    /// Prepends an outer (ancestor) link.
    pub fn insert(&mut self, query: &Query, owner: &str) {
        let record = CxQuery::new(query, owner, self.stamp());
        self.queries.insert(0, record);
    }

    pub fn clear(&mut self) {
        self.queries.clear();
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Drops the last link.
    pub fn pop(&mut self) -> Option<CxQuery> {
        self.queries.pop()
    }

    pub fn get(&self, index: usize) -> Option<&CxQuery> {
        self.queries.get(index)
    }

    pub fn queries(&self) -> &[CxQuery] {
        &self.queries
    }

    /// Highest severity of the chain, or the severity of its last link.
    pub fn severity(&self, highest: bool) -> i32 {
        let mut severity = 0;
        for query in &self.queries {
            if !highest || query.severity > severity {
                severity = query.severity;
            }
        }
        severity
    }

    /// Validates the chain without merging it.
    pub fn check_status(&self) -> Result<MergeStatus, MergeError> {
        let first = self.queries.first().ok_or(MergeError::Empty)?;
        let last = self.queries.len() - 1;

        for (index, query) in self.queries.iter().enumerate() {
            if query.name != first.name {
                return Err(MergeError::NameMismatch {
                    expected: first.name.clone(),
                    found: query.name.clone(),
                });
            }
            if query.language != first.language {
                return Err(MergeError::LanguageMismatch {
                    expected: first.language.clone(),
                    found: query.language.clone(),
                });
            }
            if !(0..=3).contains(&query.severity) {
                return Err(MergeError::SeverityOutOfRange {
                    query_id: query.query_id,
                    severity: query.severity,
                });
            }
            if query.level == PackageType::Corp {
                return Err(MergeError::CorpLevel(query.query_id));
            }
            if query.level == PackageType::Project && index < last {
                return Err(MergeError::ProjectNotLast(query.query_id));
            }
        }

        if self.queries.iter().any(CxQuery::is_remerge) {
            Ok(MergeStatus::Remerge)
        } else {
            Ok(MergeStatus::Ok)
        }
    }

    /// Validates and flattens the chain into one body named `dest_name`
    /// (empty keeps the chain's own name).
    pub fn merge(&self, dest_name: &str) -> Result<MergeOutcome, MergeError> {
        let status = self.check_status()?;
        if status == MergeStatus::Remerge {
            let merged = self
                .queries
                .iter()
                .find(|q| q.is_remerge())
                .map(|q| q.query_id)
                .unwrap_or_default();
            if !self.allow_remerge {
                tracing::warn!("Query {} contains previously merged code", merged);
                return Err(MergeError::Remerge(merged));
            }
            tracing::warn!("Re-merging previously merged code of query {}", merged);
        }

        let source = self.render(dest_name)?;
        tracing::trace!("Merged query source:\n{}", source);
        Ok(MergeOutcome { source, status })
    }

    /// The merged body with all comments removed, unvalidated.
    pub fn uncommented_code(&self) -> Result<String, MergeError> {
        let merged = self.render("")?;
        if merged.is_empty() {
            return Ok(merged);
        }
        Ok(strip_comments(&merged)?)
    }

    fn render(&self, dest_name: &str) -> Result<String, MergeError> {
        let Some(first) = self.queries.first() else {
            return Ok(String::new());
        };
        let name = first.name.as_str();
        let dest = if dest_name.is_empty() { name } else { dest_name };
        let rename = (name != dest).then(|| {
            (
                format!("// QUERY RENAMED FROM {name} TO {dest}\n"),
                format!("base.{name}()"),
                format!("base.{dest}()"),
            )
        });

        if let [only] = self.queries.as_slice() {
            let mut code = only.source.clone();
            let mut notes = String::new();
            if let Some((notice, from, to)) = &rename {
                notes = format!("{notice}{SEPARATOR}\n");
                code = code.replace(from, to);
            }
            return Ok(format!("{}{}\n{}\n", only.tag, notes, code));
        }

        let calls = self
            .queries
            .iter()
            .map(|q| BaseCall::detect(&q.source, &q.name))
            .collect::<Result<Vec<_>, _>>()?;
        // The chain is anchored at the last link that ignores its base.
        let anchor = calls.iter().rposition(|c| !c.calls_base).unwrap_or(0);
        let base_call = format!("base.{dest}()");

        let mut blocks = Vec::with_capacity(self.queries.len());
        for (index, (query, call)) in self.queries.iter().zip(&calls).enumerate() {
            let mut code = query.source.clone();
            let mut notes = String::new();
            if let Some((notice, from, to)) = &rename {
                notes.push_str(notice);
                code = code.replace(from, to);
            }

            if index >= anchor {
                if !call.calls_base {
                    notes.push_str(BROKEN_CHAIN);
                    notes.push('\n');
                    code = format!("\n{AUTO_BEGIN}\nresult.Clear();\n{AUTO_END}\n\n{code}");
                } else if !call.is_safe {
                    notes.push_str(UNSAFE_ASSIGNMENT);
                    notes.push('\n');
                }
            }
            if index > anchor && call.calls_base {
                if call.is_safe {
                    code = code.replace(&base_call, "result");
                } else {
                    let temp = unique_temp(&code, dest);
                    code = code.replace(&base_call, &temp);
                    code = format!(
                        "\n{AUTO_BEGIN}\nCxList {temp} = result.Clone();\nresult.Clear();\n{AUTO_END}\n\n{code}"
                    );
                }
            }
            if !notes.is_empty() {
                notes.push_str(SEPARATOR);
                notes.push('\n');
            }

            tracing::debug!(
                "Merging link {} of {}: query {} (calls base: {}, safe: {})",
                index + 1,
                self.queries.len(),
                query.query_id,
                call.calls_base,
                call.is_safe
            );
            blocks.push(format!(
                "{}{}{{\n{}\n}}",
                query.tag,
                notes,
                arrange(&code, index < anchor)
            ));
        }

        Ok(blocks.join("\n\n\n"))
    }
}

/// `_merged_base_<dest>`, suffixed with a counter until it is unused in `code`.
fn unique_temp(code: &str, dest: &str) -> String {
    let base = format!("_merged_base_{dest}");
    let mut candidate = base.clone();
    let mut counter = 0;
    while code.contains(&candidate) {
        counter += 1;
        candidate = format!("{base}{counter}");
    }
    candidate
}

/// Indents every line, commenting it out for links above the anchor.
fn arrange(code: &str, inactive: bool) -> String {
    let mut arranged = String::new();
    for line in code.trim().lines() {
        arranged.push('\t');
        if inactive {
            arranged.push_str(INACTIVE_PREFIX);
        }
        arranged.push_str(line);
        arranged.push('\n');
    }
    arranged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_name_avoids_collisions() {
        assert_eq!(unique_temp("result = base.Q();", "Q"), "_merged_base_Q");
        assert_eq!(
            unique_temp("CxList _merged_base_Q = All; _merged_base_Q1 = All;", "Q"),
            "_merged_base_Q2"
        );
    }

    #[test]
    fn arrange_indents_and_comments() {
        assert_eq!(arrange("\na();\nb();\n", false), "\ta();\n\tb();\n");
        assert_eq!(arrange("a();", true), "\t//NO-BASE//\t a();\n");
    }

    #[test]
    fn severity_is_last_or_highest() {
        let mut merger = QueryMerger::new();
        for severity in [2, 3, 1] {
            merger.add(
                &Query {
                    severity,
                    ..Default::default()
                },
                "",
            );
        }
        assert_eq!(merger.severity(false), 1);
        assert_eq!(merger.severity(true), 3);
        assert_eq!(QueryMerger::new().severity(true), 0);
    }
}
