use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::{NaiveDate, SubsecRound, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod assignments;
mod counter;
mod error;
mod grid;
mod location_counts;
mod locations;
mod models;
mod round;
mod selector;
mod target;

use assignments::SequenceFilter;
use round::{ModeledClades, RoundConfig, RoundOptions};
use selector::SelectionParams;

#[derive(Parser)]
#[command(name = "clade-nowcast")]
#[command(about = "Clade lists and target data for a variant nowcast hub", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the clades to model for a round and save the clade list
    SelectClades {
        /// Clade assignment table (CSV, or TSV with a .tsv extension)
        #[arg(long)]
        assignments: PathBuf,
        /// Round id; defaults to the next Wednesday
        #[arg(long)]
        round_id: Option<NaiveDate>,
        /// Date of the sequence snapshot behind the assignments
        #[arg(long)]
        sequence_as_of: Option<NaiveDate>,
        #[arg(long, default_value_t = 0.01)]
        threshold: f64,
        #[arg(long, default_value_t = 3)]
        threshold_weeks: u32,
        #[arg(long, default_value_t = 9)]
        max_clades: usize,
        #[arg(long, env = "MODELED_CLADES_DIR", default_value = "auxiliary-data/modeled-clades")]
        modeled_clades_dir: PathBuf,
    },
    /// Build time-series and oracle target data for a round
    TargetData {
        /// Round nowcast date (YYYY-MM-DD)
        #[arg(long)]
        nowcast_date: NaiveDate,
        /// Clade assignment table (CSV, or TSV with a .tsv extension)
        #[arg(long)]
        assignments: PathBuf,
        /// Defaults to the nowcast date + 90 days
        #[arg(long)]
        sequence_as_of: Option<NaiveDate>,
        /// Defaults to created_at of the round's clade list
        #[arg(long)]
        tree_as_of: Option<NaiveDate>,
        /// Defaults to the nowcast date - 31 days
        #[arg(long)]
        collection_min_date: Option<NaiveDate>,
        /// Defaults to the nowcast date + 10 days
        #[arg(long)]
        collection_max_date: Option<NaiveDate>,
        #[arg(long, env = "TARGET_DATA_DIR", default_value = "target-data")]
        target_data_dir: PathBuf,
        #[arg(long, env = "MODELED_CLADES_DIR", default_value = "auxiliary-data/modeled-clades")]
        modeled_clades_dir: PathBuf,
    },
    /// Count sequences per location and collection date before a round closes
    LocationCounts {
        /// Round nowcast date (YYYY-MM-DD)
        #[arg(long)]
        nowcast_date: NaiveDate,
        #[arg(long)]
        assignments: PathBuf,
        #[arg(long, default_value = "auxiliary-data/unscored-location-dates")]
        output_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("clade_nowcast=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::SelectClades {
            assignments,
            round_id,
            sequence_as_of,
            threshold,
            threshold_weeks,
            max_clades,
            modeled_clades_dir,
        } => {
            let round_id = round_id.unwrap_or_else(|| round::next_wednesday(today));
            let params = SelectionParams {
                threshold,
                threshold_weeks,
                max_clades,
            };
            let path = select_clades(
                &assignments,
                round_id,
                sequence_as_of,
                params,
                &modeled_clades_dir,
            )?;
            println!("Clade list written to {}.", path.display());
        }
        Commands::TargetData {
            nowcast_date,
            assignments,
            sequence_as_of,
            tree_as_of,
            collection_min_date,
            collection_max_date,
            target_data_dir,
            modeled_clades_dir,
        } => {
            let options = RoundOptions {
                sequence_as_of,
                tree_as_of,
                collection_min_date,
                collection_max_date,
            };
            let outcome = target_data(
                &assignments,
                nowcast_date,
                &options,
                &modeled_clades_dir,
                &target_data_dir,
                today,
            )?;
            match outcome {
                TargetDataOutcome::Written(paths) => println!(
                    "Target data written to {} and {}.",
                    paths.time_series.display(),
                    paths.oracle.display()
                ),
                TargetDataOutcome::RoundNotConfigured => {
                    println!("No round found for nowcast date {nowcast_date}.")
                }
                TargetDataOutcome::SequenceAsOfInFuture => return Ok(ExitCode::FAILURE),
            }
        }
        Commands::LocationCounts {
            nowcast_date,
            assignments,
            output_dir,
        } => {
            let path = location_counts(&assignments, nowcast_date, &output_dir)?;
            println!("Location/date counts written to {}.", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn select_clades(
    assignments_path: &Path,
    round_id: NaiveDate,
    sequence_as_of: Option<NaiveDate>,
    params: SelectionParams,
    modeled_clades_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let round_id = round::round_id(round_id);
    info!(round = %round_id, "getting clade list");

    let rows = assignments::read_assignments(assignments_path)
        .with_context(|| format!("failed to read {}", assignments_path.display()))?;
    let rows = assignments::filter_assignments(rows, &SequenceFilter::default())?;
    let counts = assignments::summarize(&rows);

    let counter = counter::WindowedCounter::from_counts(&counts)?;
    let selection = selector::select_clades(&counter, params)?;

    let created_at = match sequence_as_of {
        Some(date) => date
            .and_hms_opt(23, 59, 59)
            .context("invalid sequence_as_of")?
            .and_utc(),
        None => Utc::now().trunc_subsecs(0),
    };
    let modeled = ModeledClades::from_selection(&selection, params, created_at);
    info!(clades = ?modeled.clades, "clade list");

    let path = round::save_modeled_clades(modeled_clades_dir, &round_id, &modeled)?;
    Ok(path)
}

#[derive(Debug)]
enum TargetDataOutcome {
    Written(target::TargetDataPaths),
    RoundNotConfigured,
    SequenceAsOfInFuture,
}

fn target_data(
    assignments_path: &Path,
    nowcast_date: NaiveDate,
    options: &RoundOptions,
    modeled_clades_dir: &Path,
    target_data_dir: &Path,
    today: NaiveDate,
) -> anyhow::Result<TargetDataOutcome> {
    let sequence_as_of = options.sequence_as_of(nowcast_date)?;
    if let Err(err) = round::ensure_snapshot_complete(sequence_as_of, today) {
        error!("stopping: {err}");
        return Ok(TargetDataOutcome::SequenceAsOfInFuture);
    }

    let round_id = round::round_id(nowcast_date);
    let Some(modeled) = round::load_modeled_clades(modeled_clades_dir, &round_id)
        .with_context(|| format!("failed to load clade list for round {round_id}"))?
    else {
        info!(round = %round_id, "stopping: no round found for nowcast date");
        return Ok(TargetDataOutcome::RoundNotConfigured);
    };

    let config = RoundConfig::resolve(nowcast_date, options, &modeled, today)?;
    info!(
        round = %round_id,
        sequence_as_of = %config.sequence_as_of,
        tree_as_of = %config.tree_as_of.to_rfc3339(),
        collection_min_date = %config.collection_min_date,
        collection_max_date = %config.collection_max_date,
        "building target data"
    );

    let rows = assignments::read_assignments(assignments_path)
        .with_context(|| format!("failed to read {}", assignments_path.display()))?;
    let filter = SequenceFilter {
        collection_min_date: Some(config.collection_min_date),
        collection_max_date: Some(config.collection_max_date),
    };
    let rows = assignments::filter_assignments(rows, &filter)?;
    let counts = assignments::summarize(&rows);

    let grid = grid::build_grid(
        &counts,
        &modeled.clade_list(),
        &locations::abbreviations(),
        config.collection_min_date,
        config.collection_max_date,
    )?;
    let paths = target::write_target_data(
        &grid,
        config.nowcast_date,
        config.sequence_as_of,
        target_data_dir,
    )?;
    Ok(TargetDataOutcome::Written(paths))
}

fn location_counts(
    assignments_path: &Path,
    nowcast_date: NaiveDate,
    output_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let round_id = round::round_id(nowcast_date);
    info!(round = %round_id, "getting location/date counts");

    let rows = assignments::read_assignments(assignments_path)
        .with_context(|| format!("failed to read {}", assignments_path.display()))?;
    let rows = assignments::filter_assignments(rows, &SequenceFilter::default())?;
    let counts = assignments::summarize(&rows);

    let totals = location_counts::location_date_totals(
        &counts,
        &locations::abbreviations(),
        nowcast_date,
    )?;
    let path = location_counts::write_location_date_totals(output_dir, &round_id, &totals)?;
    Ok(path)
}
