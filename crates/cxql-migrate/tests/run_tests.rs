use std::collections::BTreeMap;

use cxql_catalog::{
    PackageType, Project, Query, QueryCatalog, QueryGroup, QueryId, QueryLanguage, Team,
    TeamDirectory,
};
use cxql_migrate::{
    DestQuery, DestinationSnapshot, MigrateError, MigrationRun, OfflineDestination, Phase,
    QueryLevel, RunOptions,
};
use cxql_plan::{generate_migration_plan, QueriesList};

fn query(id: QueryId, base: QueryId, name: &str, source: &str) -> Query {
    Query {
        query_id: id,
        base_query_id: base,
        name: name.to_string(),
        group: "Java_High_Risk".to_string(),
        language: "Java".to_string(),
        severity: 2,
        is_valid: true,
        is_executable: true,
        source: source.to_string(),
        ..Default::default()
    }
}

fn group(package_type: PackageType, team: u64, project: u64, queries: Vec<Query>) -> QueryGroup {
    QueryGroup {
        name: "Java_High_Risk".to_string(),
        package_id: 1000 + team * 10 + project,
        package_type,
        owning_team_id: team,
        owning_project_id: project,
        queries,
    }
}

/// Product XSS/SQLi, two corp queries, a two-level team tree with a custom
/// root, a team without projects and one project override.
fn fixture() -> (QueryCatalog, TeamDirectory) {
    let catalog = QueryCatalog::new(vec![QueryLanguage {
        name: "Java".to_string(),
        groups: vec![
            group(
                PackageType::Product,
                0,
                0,
                vec![
                    query(1, 1, "XSS", "result = All.FindByName(\"xss\");"),
                    query(2, 2, "SQLi", "result = All.FindByName(\"sql\");"),
                ],
            ),
            group(
                PackageType::Corp,
                0,
                0,
                vec![
                    query(60, 60, "Corp_Helper", "result = All.FindByType(typeof(X));"),
                    query(61, 2, "SQLi", "result = base.SQLi();"),
                ],
            ),
            group(
                PackageType::Team,
                1,
                0,
                vec![
                    query(10, 1, "XSS", "result = base.XSS();"),
                    query(11, 11, "Team_Custom", "result = All.FindByName(\"t\");"),
                ],
            ),
            group(
                PackageType::Team,
                2,
                0,
                vec![
                    query(20, 10, "XSS", "result = base.XSS();\nresult -= All.FindByName(\"ok\");"),
                    query(21, 11, "Team_Custom", "result = base.Team_Custom() * All;"),
                ],
            ),
            group(
                PackageType::Team,
                3,
                0,
                vec![query(30, 10, "XSS", "result = All;")],
            ),
            group(
                PackageType::Project,
                0,
                100,
                vec![query(40, 20, "XSS", "result = base.XSS();")],
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
            Team {
                team_id: 3,
                name: "Idle".to_string(),
                parent_id: 1,
            },
        ],
        vec![
            Project {
                project_id: 100,
                name: "web".to_string(),
                team_id: 2,
            },
            Project {
                project_id: 101,
                name: "api".to_string(),
                team_id: 1,
            },
        ],
    );
    (catalog, teams)
}

fn product(id: u64, name: &str) -> DestQuery {
    DestQuery {
        query_id: id,
        level: QueryLevel::Product,
        language: "Java".to_string(),
        group: "Java_High_Risk".to_string(),
        name: name.to_string(),
        source: "result = All;".to_string(),
        severity: 3,
        ..Default::default()
    }
}

fn destination() -> OfflineDestination {
    OfflineDestination::new(DestinationSnapshot {
        queries: vec![product(500, "XSS"), product(501, "SQLi")],
        query_mapping: BTreeMap::from([(1, 500), (2, 501)]),
        ..Default::default()
    })
    .with_targets("Project", "Application")
}

fn dest_query<'a>(dest: &'a OfflineDestination, level: QueryLevel, name: &str) -> &'a DestQuery {
    dest.queries()
        .iter()
        .find(|q| q.level == level && q.name == name)
        .unwrap()
}

fn plan(catalog: &QueryCatalog, teams: &TeamDirectory) -> QueriesList {
    generate_migration_plan(catalog, teams)
}

#[test]
fn full_run_migrates_every_bucket_in_order() {
    let (catalog, teams) = fixture();
    let plan = plan(&catalog, &teams);
    let mut dest = destination();

    let mut run = MigrationRun::new(&catalog, &teams, &mut dest, RunOptions::default());
    run.migrate_all(&plan);
    let status = run.finish();

    assert_eq!(status.error_count(), 0, "{:#?}", status.summary());
    assert_eq!(status.len(), 8);
    assert!(status.get(11, Phase::CorpCreate).is_some());
    assert!(status.get(11, Phase::Team(1)).is_some());
    // Team 3 owns no projects.
    assert!(status.get(30, Phase::Team(3)).is_none());

    let placeholder = dest_query(&dest, QueryLevel::Tenant, "Team_Custom");
    assert_eq!(placeholder.source, "//empty");

    let helper = dest_query(&dest, QueryLevel::Tenant, "Corp_Helper");
    assert_eq!(helper.source, "result = All.FindByType(typeof(X));");
    let corp_sqli = dest_query(&dest, QueryLevel::Tenant, "SQLi");
    assert_eq!(corp_sqli.source, "result = base.SQLi();");
    assert_eq!(corp_sqli.severity, 2);

    // Team 2 ran after team 1 and replaced the application override with
    // the merged chain.
    let xss = dest_query(&dest, QueryLevel::Application, "XSS");
    assert_eq!(xss.level_id, "Application");
    assert!(xss.source.contains("// TEAM: 1 - Root"));
    assert!(xss.source.contains("// TEAM: 2 - Child"));
    assert_eq!(
        status.get(10, Phase::Team(1)).unwrap().destination.as_ref().unwrap().query_id,
        xss.query_id
    );

    let custom = dest_query(&dest, QueryLevel::Application, "Team_Custom");
    assert_eq!(
        status.get(11, Phase::Team(1)).unwrap().destination.as_ref().unwrap().query_id,
        custom.query_id
    );

    let project = dest_query(&dest, QueryLevel::Project, "XSS");
    assert_eq!(project.source, "result = base.XSS();");
    assert_eq!(project.level_id, "Project");
}

#[test]
fn identical_queries_are_reused_not_resubmitted() {
    let (catalog, teams) = fixture();
    let plan = plan(&catalog, &teams);
    let mut dest = destination();

    let mut run = MigrationRun::new(&catalog, &teams, &mut dest, RunOptions::default());
    run.migrate_all(&plan);
    run.finish();
    let before = dest.mutations().len();

    let mut run = MigrationRun::new(&catalog, &teams, &mut dest, RunOptions::default());
    run.migrate_query(&plan, 60).unwrap();
    run.migrate_query(&plan, 61).unwrap();
    run.migrate_query(&plan, 40).unwrap();
    let status = run.finish();
    assert_eq!(status.error_count(), 0);
    assert_eq!(dest.mutations().len(), before);
}

#[test]
fn failures_are_recorded_and_the_run_continues() {
    let (catalog, teams) = fixture();
    let plan = plan(&catalog, &teams);
    let mut dest = OfflineDestination::new(DestinationSnapshot {
        queries: vec![product(500, "XSS")],
        query_mapping: BTreeMap::from([(1, 500)]),
        ..Default::default()
    });

    let mut run = MigrationRun::new(&catalog, &teams, &mut dest, RunOptions::default());
    run.migrate_all(&plan);
    let status = run.finish();

    let sqli = status.get(61, Phase::CorpMigrate).unwrap();
    assert!(!sqli.is_ok());
    assert_eq!(
        sqli.error.as_deref(),
        Some("unable to find Cx1 query for Java -> Java_High_Risk -> SQLi")
    );
    assert!(sqli.to_string().starts_with("ERR: [61]"));
    assert!(status.get(40, Phase::Project(100)).unwrap().is_ok());
    assert_eq!(status.error_count(), 1);
}

#[test]
fn uncovered_language_fails_every_query() {
    let (catalog, teams) = fixture();
    let plan = plan(&catalog, &teams);
    let mut dest = OfflineDestination::new(DestinationSnapshot {
        queries: vec![product(500, "XSS"), product(501, "SQLi")],
        query_mapping: BTreeMap::from([(1, 500), (2, 501)]),
        languages: vec!["CSharp".to_string()],
        ..Default::default()
    });

    let mut run = MigrationRun::new(&catalog, &teams, &mut dest, RunOptions::default());
    run.migrate_all(&plan);
    let status = run.finish();
    assert_eq!(status.ok_count(), 0);
    for (id, phase) in [(11, Phase::CorpCreate), (61, Phase::CorpMigrate), (40, Phase::Project(100))] {
        let error = status.get(id, phase).unwrap().error.clone().unwrap_or_default();
        assert!(error.starts_with("Audit session error"), "{error}");
    }
    assert!(dest.mutations().is_empty());
}

#[test]
fn single_targets_are_restricted() {
    let (catalog, teams) = fixture();
    let plan = plan(&catalog, &teams);
    let mut dest = destination();

    let mut run = MigrationRun::new(&catalog, &teams, &mut dest, RunOptions::default());
    run.migrate_query(&plan, 11).unwrap();
    run.migrate_team(&plan, 3).unwrap();
    assert!(matches!(
        run.migrate_team(&plan, 99),
        Err(MigrateError::NothingQueued(_))
    ));
    assert!(matches!(
        run.migrate_project(&plan, 101),
        Err(MigrateError::NothingQueued(_))
    ));
    assert!(matches!(
        run.migrate_query(&plan, 999),
        Err(MigrateError::NotInPlan(999))
    ));
    let status = run.finish();

    // Query 11 sits in corp-create and in the buckets of teams 1 and 3.
    assert!(status.get(11, Phase::CorpCreate).unwrap().is_ok());
    assert!(status.get(11, Phase::Team(1)).unwrap().is_ok());
    assert!(status.get(11, Phase::Team(3)).unwrap().is_ok());
    assert!(status.get(30, Phase::Team(3)).unwrap().is_ok());
    assert!(status.get(11, Phase::Team(2)).is_none());
    assert!(status.get(60, Phase::CorpMigrate).is_none());
}

#[test]
fn previously_merged_code_needs_remerge_permission() {
    let (catalog, teams) = fixture();
    let mut plan = plan(&catalog, &teams);
    let merged = "// MERGED - TEAM LEVEL\nresult = base.XSS();";
    if let Some(list) = plan.team_queries_to_migrate.get_mut(&2) {
        for query in list.iter_mut().filter(|q| q.query_id == 20) {
            query.source = merged.to_string();
        }
    }

    let mut dest = destination();
    let mut run = MigrationRun::new(&catalog, &teams, &mut dest, RunOptions::default());
    run.migrate_team(&plan, 2).unwrap();
    let status = run.finish();
    assert!(status
        .get(20, Phase::Team(2))
        .unwrap()
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("previously merged"));

    let options = RunOptions {
        allow_remerge: true,
        ..RunOptions::default()
    };
    let mut run = MigrationRun::new(&catalog, &teams, &mut dest, options);
    run.migrate_team(&plan, 2).unwrap();
    assert!(run.finish().get(20, Phase::Team(2)).unwrap().is_ok());
}
