//! cxql-migrate CLI
//!
//! Two-phase migration of custom CxQL queries:
//! - `generate`: catalog snapshot → `queries.json` migration plan
//! - `apply`: replay a plan against a destination snapshot
//!
//! plus `merge` (preview one flattened team chain) and `deps` (dependency
//! report).

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use cxql_catalog::{CatalogSnapshot, PackageType};
use cxql_migrate::{merged_query, MigrationRun, MigrationStatus, OfflineDestination};
use cxql_plan::{
    catalog_report, generate_migration_plan, project_report, QueriesList, ReportOptions,
};

mod config;
mod logging;

use config::MigrationConfig;

#[derive(Parser)]
#[command(name = "cxql-migrate")]
#[command(author, version, about = "Migrate custom CxQL queries between products")]
struct Cli {
    /// Log level: TRACE, DEBUG, INFO, WARNING or ERROR.
    #[arg(long, global = true)]
    log: Option<String>,
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the migration plan from a catalog snapshot.
    Generate {
        /// Catalog snapshot (languages, teams, projects)
        #[arg(long)]
        catalog: PathBuf,
        /// Plan file to write (default from config, `queries.json`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay a plan against a destination snapshot.
    Apply {
        #[arg(long)]
        catalog: PathBuf,
        /// Plan file to read (default from config, `queries.json`)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Destination snapshot; updated in place
        #[arg(long)]
        destination: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        /// Merge chains that already contain merged code
        #[arg(long)]
        allow_remerge: bool,
        #[arg(long)]
        target_project: Option<String>,
        #[arg(long)]
        target_application: Option<String>,
    },

    /// Print the merged body of one team-level query.
    Merge {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        query_id: u64,
        /// Destination query name (default: the query's own name)
        #[arg(long)]
        dest_name: Option<String>,
        #[arg(long)]
        allow_remerge: bool,
    },

    /// Print custom-query dependencies, for the catalog or one project.
    Deps {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long, conflicts_with = "project_name")]
        project_id: Option<u64>,
        #[arg(long)]
        project_name: Option<String>,
        /// Leave corp queries out
        #[arg(long)]
        no_corp: bool,
        /// Leave product dependencies out
        #[arg(long)]
        no_prod: bool,
    },
}

/// Restricts `apply` to one team, project or query.
#[derive(Args, Debug, Default)]
#[group(multiple = false)]
struct TargetArgs {
    #[arg(long)]
    team_id: Option<u64>,
    #[arg(long)]
    project_id: Option<u64>,
    #[arg(long)]
    query_id: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MigrationConfig::resolve(cli.config.as_deref())?;
    logging::init(cli.log.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Commands::Generate { catalog, output } => {
            let output = output.unwrap_or_else(|| config.plan_path.clone());
            cmd_generate(&catalog, &output)
        }
        Commands::Apply {
            catalog,
            input,
            destination,
            target,
            allow_remerge,
            target_project,
            target_application,
        } => {
            let mut config = config;
            if let Some(input) = input {
                config.plan_path = input;
            }
            config.allow_remerge |= allow_remerge;
            if let Some(project) = target_project {
                config.target_project = project;
            }
            if let Some(application) = target_application {
                config.target_application = application;
            }
            cmd_apply(&catalog, &destination, &target, &config)
        }
        Commands::Merge {
            catalog,
            query_id,
            dest_name,
            allow_remerge,
        } => cmd_merge(
            &catalog,
            query_id,
            dest_name.as_deref(),
            allow_remerge || config.allow_remerge,
        ),
        Commands::Deps {
            catalog,
            project_id,
            project_name,
            no_corp,
            no_prod,
        } => cmd_deps(
            &catalog,
            project_id,
            project_name.as_deref(),
            ReportOptions { no_corp, no_prod },
        ),
    }
}

fn cmd_generate(catalog_path: &Path, output: &Path) -> Result<()> {
    let (catalog, teams) = CatalogSnapshot::load(catalog_path)
        .with_context(|| format!("loading catalog {}", catalog_path.display()))?;
    let plan = generate_migration_plan(&catalog, &teams);
    plan.save(output)
        .with_context(|| format!("writing plan {}", output.display()))?;

    for (bucket, queries) in plan.buckets() {
        if !queries.is_empty() {
            println!("  {} {}: {} queries", "→".yellow(), bucket, queries.len());
        }
    }
    eprintln!(
        "{} {} ({} queries)",
        "wrote".green().bold(),
        output.display().to_string().bold(),
        plan.total_queries()
    );
    Ok(())
}

fn cmd_apply(
    catalog_path: &Path,
    destination_path: &Path,
    target: &TargetArgs,
    config: &MigrationConfig,
) -> Result<()> {
    let (catalog, teams) = CatalogSnapshot::load(catalog_path)
        .with_context(|| format!("loading catalog {}", catalog_path.display()))?;
    let mut plan = QueriesList::load(&config.plan_path)
        .with_context(|| format!("loading plan {}", config.plan_path.display()))?;
    plan.fix_groups(&catalog)
        .with_context(|| format!("plan {} does not match the catalog", config.plan_path.display()))?;
    let mut destination = OfflineDestination::open(destination_path)
        .with_context(|| format!("loading destination {}", destination_path.display()))?
        .with_targets(&config.target_project, &config.target_application);

    let mut run = MigrationRun::new(&catalog, &teams, &mut destination, config.run_options());
    let targeted = match (target.team_id, target.project_id, target.query_id) {
        (Some(team), _, _) => run.migrate_team(&plan, team),
        (_, Some(project), _) => run.migrate_project(&plan, project),
        (_, _, Some(query)) => run.migrate_query(&plan, query),
        _ => {
            run.migrate_all(&plan);
            Ok(())
        }
    };
    let status = run.finish();
    targeted?;

    destination
        .save(destination_path)
        .with_context(|| format!("writing destination {}", destination_path.display()))?;
    print_summary(&status);
    Ok(())
}

fn print_summary(status: &MigrationStatus) {
    for entry in status.summary() {
        let line = entry.to_string();
        if entry.is_ok() {
            println!("{}", line.green());
        } else {
            println!("{}", line.red());
        }
    }
    println!(
        "{} {} OK, {} failed",
        "summary:".bold(),
        status.ok_count(),
        status.error_count()
    );
}

fn cmd_merge(
    catalog_path: &Path,
    query_id: u64,
    dest_name: Option<&str>,
    allow_remerge: bool,
) -> Result<()> {
    let (catalog, teams) = CatalogSnapshot::load(catalog_path)
        .with_context(|| format!("loading catalog {}", catalog_path.display()))?;
    let Some(query) = catalog.get(query_id) else {
        bail!("query {query_id} is not in the catalog");
    };
    if query.package_type() != PackageType::Team {
        bail!("{} is not a team-level query", query.detailed());
    }
    let dest_name = dest_name.unwrap_or(&query.name);
    let merged = merged_query(&catalog, &teams, query, dest_name, allow_remerge)?;
    println!("{}", merged.source);
    Ok(())
}

fn cmd_deps(
    catalog_path: &Path,
    project_id: Option<u64>,
    project_name: Option<&str>,
    options: ReportOptions,
) -> Result<()> {
    let (catalog, teams) = CatalogSnapshot::load(catalog_path)
        .with_context(|| format!("loading catalog {}", catalog_path.display()))?;

    let project_id = match (project_id, project_name) {
        (Some(id), _) => Some(id),
        (None, Some(name)) => match teams.project_by_name(name) {
            Some(project) => Some(project.project_id),
            None => bail!("unable to find project named {name}"),
        },
        (None, None) => None,
    };

    let report = match project_id {
        Some(id) => project_report(&catalog, &teams, id, options)?,
        None => catalog_report(&catalog, options),
    };
    print!("{report}");
    eprintln!("{} {} entries", "info:".yellow().bold(), report.entry_count());
    Ok(())
}
