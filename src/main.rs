use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use arachne::kg::WikidataSource;
use arachne::logging::configure_logging;
use arachne::output;
use arachne::pipeline::{annotate_table, finalize, Evidence, StageConfig};
use arachne::table::Table;
use arachne::targets::{self, TargetStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate tables against Wikidata and write submission files
    Annotate(AnnotateArgs),

    /// Print a GNU parallel invocation splitting a run into even shards
    Plan(PlanArgs),
}

#[derive(Args)]
struct AnnotateArgs {
    /// Directory holding the tables as CSV files
    #[arg(short, long)]
    tables: PathBuf,

    /// Column-pair property target file
    #[arg(long)]
    cpa_targets: Option<PathBuf>,

    /// Cell entity target file
    #[arg(long)]
    cea_targets: Option<PathBuf>,

    /// Column type target file
    #[arg(long)]
    cta_targets: Option<PathBuf>,

    /// Directory submission directories are created under
    #[arg(short, long, default_value = "submissions")]
    out: PathBuf,

    /// Number of tables to skip from the front of the sorted list
    #[arg(long, default_value = "0")]
    offset: usize,

    /// Number of tables to annotate, all remaining when omitted
    #[arg(long)]
    amount: Option<usize>,

    /// Challenge round recorded in the output file names
    #[arg(long, default_value = "2")]
    round: u32,

    /// Submission number recorded in the output file names
    #[arg(long, default_value = "1")]
    submission: u32,

    /// Enable the joint property fallback stage
    #[arg(long)]
    joint_property: bool,

    /// Enable the reverse tail fallback stage
    #[arg(long)]
    reverse_tail: bool,

    /// Disable the type-constrained fallback stage
    #[arg(long)]
    no_type_constrained: bool,

    /// Disable the broad datatype fallback stage
    #[arg(long)]
    no_datatype: bool,
}

#[derive(Args)]
struct PlanArgs {
    /// Directory holding the tables as CSV files
    #[arg(short, long)]
    tables: PathBuf,

    /// Column-pair property target file
    #[arg(long)]
    cpa_targets: Option<PathBuf>,

    /// Cell entity target file
    #[arg(long)]
    cea_targets: Option<PathBuf>,

    /// Column type target file
    #[arg(long)]
    cta_targets: Option<PathBuf>,

    /// Number of parallel annotate processes
    #[arg(short, long, default_value = "4")]
    jobs: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Annotate(args) => run_annotate(args).await,
        Commands::Plan(args) => run_plan(&args),
    }
}

async fn run_annotate(args: AnnotateArgs) -> Result<()> {
    let store = TargetStore::load(
        args.cpa_targets.as_deref(),
        args.cea_targets.as_deref(),
        args.cta_targets.as_deref(),
    )?;
    let names = table_list(&args.tables, &store)?;
    let shard = targets::shard(&names, args.offset, args.amount);
    if shard.is_empty() {
        warn!("no tables selected, nothing to do");
        return Ok(());
    }
    info!(
        "annotating {} of {} tables from {}",
        shard.len(),
        names.len(),
        args.tables.display()
    );

    let source = WikidataSource::new()?;
    let stages = StageConfig {
        joint_property: args.joint_property,
        reverse_tail: args.reverse_tail,
        type_constrained: !args.no_type_constrained,
        datatype_broad: !args.no_datatype,
    };

    let mut evidence = Evidence::default();
    for name in shard {
        let path = args.tables.join(format!("{name}.csv"));
        let table = match Table::from_csv(&path) {
            Ok(table) => table,
            Err(error) => {
                warn!("skipping {name}: {error:#}");
                continue;
            }
        };
        annotate_table(&source, &table, &stages, &mut evidence).await;
    }
    if !evidence.unresolved_subjects.is_empty() {
        info!(
            "{} subject cells never resolved",
            evidence.unresolved_subjects.len()
        );
    }

    let annotations = finalize(
        &source,
        &evidence,
        store.properties.as_ref(),
        store.entities.as_ref(),
        store.types.as_ref(),
    )
    .await;
    targets::report_coverage(&store, &annotations);

    let dir = output::submission_dir(&args.out, args.round, args.submission)?;
    output::write_submissions(&dir, args.round, args.submission, &annotations)?;
    info!("submissions written to {}", dir.display());
    Ok(())
}

fn run_plan(args: &PlanArgs) -> Result<()> {
    ensure!(args.jobs > 0, "at least one job is required");
    let store = TargetStore::load(
        args.cpa_targets.as_deref(),
        args.cea_targets.as_deref(),
        args.cta_targets.as_deref(),
    )?;
    let names = table_list(&args.tables, &store)?;
    ensure!(!names.is_empty(), "no tables found to split");

    let (amounts, offsets) = split_evenly(names.len(), args.jobs);
    let mut command = format!(
        "parallel --delay 1 --linebuffer --link arachne annotate --tables {}",
        args.tables.display()
    );
    if let Some(path) = &args.cpa_targets {
        command.push_str(&format!(" --cpa-targets {}", path.display()));
    }
    if let Some(path) = &args.cea_targets {
        command.push_str(&format!(" --cea-targets {}", path.display()));
    }
    if let Some(path) = &args.cta_targets {
        command.push_str(&format!(" --cta-targets {}", path.display()));
    }
    command.push_str(&format!(
        " --amount {{1}} --offset {{2}} ::: {} ::: {}",
        amounts.join(" "),
        offsets.join(" ")
    ));
    println!("{command}");
    Ok(())
}

/// The tables a run covers: whatever the targets name, or every CSV in the
/// directory when no target file was given.
fn table_list(tables_dir: &Path, store: &TargetStore) -> Result<Vec<String>> {
    if !store.is_empty() {
        let names = store.table_names();
        if !names.is_empty() {
            return Ok(names);
        }
    }
    let entries = fs::read_dir(tables_dir)
        .with_context(|| format!("failed to read {}", tables_dir.display()))?;
    let mut names = BTreeSet::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read {}", tables_dir.display()))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.insert(stem.to_string());
        }
    }
    Ok(names.into_iter().collect())
}

/// Splits `total` tables into `jobs` contiguous shards differing in size by
/// at most one, returned as printable (amounts, offsets).
fn split_evenly(total: usize, jobs: usize) -> (Vec<String>, Vec<String>) {
    let per = total / jobs;
    let extra = total % jobs;
    let mut amounts = Vec::with_capacity(jobs);
    let mut offsets = Vec::with_capacity(jobs);
    let mut offset = 0;
    for job in 0..jobs {
        let amount = per + usize::from(job < extra);
        amounts.push(amount.to_string());
        offsets.push(offset.to_string());
        offset += amount;
    }
    (amounts, offsets)
}
