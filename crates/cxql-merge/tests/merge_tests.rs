use chrono::NaiveDate;
use cxql_catalog::{OwningGroup, PackageType, Query, QueryId};
use cxql_merge::{MergeError, MergeStatus, QueryMerger};
use proptest::prelude::*;

fn query(id: QueryId, level: PackageType, owner: u64, source: &str) -> Query {
    Query {
        query_id: id,
        base_query_id: id,
        name: "Q".to_string(),
        group: "Java_High_Risk".to_string(),
        language: "Java".to_string(),
        severity: 2,
        is_valid: true,
        source: source.to_string(),
        owning_group: OwningGroup {
            package_id: 900 + owner,
            package_name: "Java_High_Risk".to_string(),
            package_type: level,
            owning_team_id: if level == PackageType::Team { owner } else { 0 },
            owning_project_id: if level == PackageType::Project { owner } else { 0 },
        },
        ..Default::default()
    }
}

fn team(id: QueryId, owner: u64, source: &str) -> Query {
    query(id, PackageType::Team, owner, source)
}

fn merger() -> QueryMerger {
    let timestamp = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_micro_opt(3, 4, 5, 6)
        .unwrap();
    QueryMerger::new().with_timestamp(timestamp)
}

fn chain(links: &[Query]) -> QueryMerger {
    let mut merger = merger();
    for link in links {
        merger.add(link, &format!("Team{}", link.owning_group.owning_team_id));
    }
    merger
}

/// Source text of the `n`-th brace-wrapped block of a merged body.
fn block(merged: &str, n: usize) -> &str {
    merged.split("\n\n\n").nth(n).unwrap()
}

#[test]
fn safe_call_chains_into_result_and_unsafe_call_gets_clone_and_clear() {
    let merged = chain(&[
        team(1, 1, "result = base.Q();"),
        team(2, 2, "result = base.Q(); foo();"),
    ])
    .merge("Q")
    .unwrap();
    assert_eq!(merged.status, MergeStatus::Ok);

    // Every link calls base, so the first one anchors the chain and keeps its call.
    let outer = block(&merged.source, 0);
    assert!(outer.contains("\tresult = base.Q();"));
    assert!(!outer.contains("//NO-BASE//"));

    let inner = block(&merged.source, 1);
    assert!(inner.contains("CxList _merged_base_Q = result.Clone();"));
    assert!(inner.contains("result.Clear();"));
    assert!(inner.contains("result = _merged_base_Q; foo();"));
    assert!(inner.contains("// DIRECT RESULT ASSIGNMENT UNDETECTED"));
    assert!(!inner.contains("base.Q()"));
}

#[test]
fn safe_inner_call_is_replaced_by_result() {
    let merged = chain(&[
        team(1, 1, "result = All.FindByName(\"a\");"),
        team(2, 2, "result = base.Q();\nresult -= All.FindByName(\"b\");"),
    ])
    .merge("")
    .unwrap();
    let inner = block(&merged.source, 1);
    assert!(inner.contains("\tresult = result;"));
    assert!(!inner.contains("AUTO ADDED BY MERGE"));
}

#[test]
fn broken_chain_is_cleared_and_noted_ahead_of_the_override() {
    let merged = chain(&[
        team(1, 1, "result = something();"),
        team(2, 2, "result = base.Q();"),
    ])
    .merge("Q")
    .unwrap();

    let source = &merged.source;
    let clear = source.find("result.Clear();").unwrap();
    let note = source
        .find("// BASE CALL CHAIN BROKEN - QUERY DOES NOT CALL BASE")
        .unwrap();
    let override_block = source.find("// QUERY: 2 - Q").unwrap();
    assert!(clear < override_block);
    assert!(note < override_block);
}

#[test]
fn links_above_the_anchor_are_commented_out() {
    let merged = chain(&[
        team(1, 1, "result = first();"),
        team(2, 2, "result = second();\nresult.Add(x);"),
        team(3, 3, "result = base.Q();"),
    ])
    .merge("Q")
    .unwrap();

    let first = block(&merged.source, 0);
    assert!(first.contains("\t//NO-BASE//\t result = first();"));
    let anchor = block(&merged.source, 1);
    assert!(anchor.contains("\tresult = second();\n\tresult.Add(x);"));
    assert!(anchor.contains("{\n"));
    assert!(!anchor.contains("//NO-BASE//"));
    assert!(merged.source.ends_with('}'));
    assert_eq!(merged.source.matches("\n\n\n//").count(), 2);
}

#[test]
fn remerge_is_reported_not_repeated() {
    let previous = chain(&[
        team(1, 1, "result = All;"),
        team(2, 2, "result = base.Q();"),
    ])
    .merge("Q")
    .unwrap()
    .source;

    let links = [team(1, 1, "result = All;"), team(3, 2, &previous)];
    let err = chain(&links).merge("Q").unwrap_err();
    assert!(matches!(err, MergeError::Remerge(3)));
    assert_eq!(chain(&links).check_status().unwrap(), MergeStatus::Remerge);

    let forced = chain(&links).allow_remerge(true).merge("Q").unwrap();
    assert_eq!(forced.status, MergeStatus::Remerge);
}

#[test]
fn single_entry_keeps_source_and_header() {
    let source = "CxList a = All.FindByName(\"x\");\nresult = base.Q() - a;";
    let merger = chain(&[team(5, 1, source)]);
    let merged = merger.merge("").unwrap();
    let expected = format!("{}\n{}\n", merger.get(0).unwrap().tag, source);
    assert_eq!(merged.source, expected);
}

#[test]
fn rename_rewrites_base_calls_and_says_so() {
    let merger = chain(&[team(5, 1, "result = base.Q() * All;")]);
    let merged = merger.merge("Q_New").unwrap();
    assert!(merged.source.contains("// QUERY RENAMED FROM Q TO Q_New\n"));
    assert!(merged.source.contains("result = base.Q_New() * All;"));
    assert!(!merged.source.contains("base.Q()"));

    let merged = chain(&[team(1, 1, "result = All;"), team(2, 2, "result = base.Q();")])
        .merge("Q_New")
        .unwrap();
    let inner = block(&merged.source, 1);
    assert!(inner.contains("// QUERY RENAMED FROM Q TO Q_New"));
    assert!(inner.contains("\tresult = result;"));
}

#[test]
fn corp_links_and_mismatched_names_are_rejected() {
    let corp = query(1, PackageType::Corp, 0, "result = All;");
    let err = chain(&[corp, team(2, 2, "result = base.Q();")])
        .merge("Q")
        .unwrap_err();
    assert!(matches!(err, MergeError::CorpLevel(1)));

    let mut other = team(3, 2, "result = base.Q();");
    other.name = "Other".to_string();
    let err = chain(&[team(1, 1, "result = All;"), other]).merge("Q").unwrap_err();
    assert!(matches!(err, MergeError::NameMismatch { .. }));
}

#[test]
fn structural_violations_are_rejected() {
    let mut java = team(2, 2, "result = base.Q();");
    java.language = "CSharp".to_string();
    assert!(matches!(
        chain(&[team(1, 1, "result = All;"), java]).check_status(),
        Err(MergeError::LanguageMismatch { .. })
    ));

    let mut severe = team(2, 2, "result = base.Q();");
    severe.severity = 4;
    assert!(matches!(
        chain(&[severe]).check_status(),
        Err(MergeError::SeverityOutOfRange { query_id: 2, severity: 4 })
    ));

    let project = query(7, PackageType::Project, 40, "result = base.Q();");
    assert!(matches!(
        chain(&[project.clone(), team(2, 2, "result = base.Q();")]).check_status(),
        Err(MergeError::ProjectNotLast(7))
    ));
    assert_eq!(
        chain(&[team(2, 2, "result = All;"), project]).check_status().unwrap(),
        MergeStatus::Ok
    );

    assert!(matches!(merger().merge("Q"), Err(MergeError::Empty)));
}

#[test]
fn insert_prepends_and_pop_drops_the_innermost() {
    let mut merger = merger();
    merger.add(&team(2, 2, "result = base.Q();"), "Child");
    merger.insert(&team(1, 1, "result = All;"), "Parent");
    assert_eq!(merger.len(), 2);
    assert_eq!(merger.get(0).unwrap().query_id, 1);
    assert!(merger.get(0).unwrap().tag.contains("// TEAM: 1 - Parent"));
    assert_eq!(merger.pop().unwrap().query_id, 2);
    merger.clear();
    assert!(merger.is_empty());
}

#[test]
fn uncommented_code_has_no_comments() {
    let code = chain(&[
        team(1, 1, "result = All; // all"),
        team(2, 2, "/* narrow */ result = base.Q();"),
    ])
    .uncommented_code()
    .unwrap();
    assert!(!code.contains("//"));
    assert!(!code.contains("/*"));
    assert!(code.contains("result = All;"));
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn single_entry_is_tag_plus_verbatim_source(source in "[a-zA-Z0-9_ ();=.\n]{0,120}") {
        let merger = chain(&[team(9, 1, &source)]);
        let merged = merger.merge("").unwrap();
        prop_assert_eq!(merged.source, format!("{}\n{}\n", merger.get(0).unwrap().tag, source));
    }

    #[test]
    fn safe_chains_never_leave_inner_base_calls(depth in 2usize..6) {
        let links: Vec<Query> = (0..depth)
            .map(|i| {
                let source = if i == 0 { "result = All;" } else { "result = base.Q();\nresult.Add(x);" };
                team(i as QueryId + 1, i as u64 + 1, source)
            })
            .collect();
        let merged = chain(&links).merge("Q").unwrap();
        prop_assert!(!merged.source.contains("base.Q()"));
        prop_assert_eq!(merged.source.matches("{\n").count(), depth);
    }
}
