use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Local, Months, NaiveDate};
use clap::Parser;
use compact_str::CompactString;
use geowiki::aggregate::RankingMode;
use geowiki::pipeline::{run_parallel, PipelineConfig, ProjectSource};
use tracing_subscriber::EnvFilter;

/// Geo coding editor activity on Wikipedia.
///
/// Each project `<pr>` is read from `<data_dir>/<pr>_geo.tsv` and produces
/// `<basename>_<pr>_{countries,cities}_<start>_<end>.{tsv,json}` in the
/// output directory.
#[derive(Debug, clap::Parser)]
#[command(version)]
struct CommandLine {
    /// Wiki projects to analyze (e.g. `en`)
    #[arg(short = 'p', long = "wp", num_args = 1.., required = true)]
    wp_projects: Vec<String>,

    /// Directory containing the per-project row dumps
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Directory for report output
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Base output file name
    #[arg(short, long, default_value = "geo_editors")]
    basename: String,

    /// Path to the geo IP lookup table
    #[arg(short, long)]
    geo_db: PathBuf,

    /// Newline-delimited list of bot identifiers to exclude
    #[arg(long)]
    bots: Option<PathBuf>,

    /// Inclusive start of the reported period (defaults to one month before end)
    #[arg(short, long)]
    start: Option<NaiveDate>,

    /// Inclusive end of the reported period (defaults to yesterday)
    #[arg(short, long)]
    end: Option<NaiveDate>,

    /// Number of worker threads
    #[arg(short = 'n', long, default_value_t = 2)]
    threads: usize,

    /// Rank cities by fraction of country edits instead of the 0-10 scale
    #[arg(long)]
    fractional: bool,

    /// Minimum fraction of country edits a city must have (fractional mode)
    #[arg(long, default_value_t = 0.1)]
    min_fraction: f64,

    /// Number of ranked cities per country (weighted mode)
    #[arg(long, default_value_t = 10)]
    top_cities: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = CommandLine::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let end = args
        .end
        .unwrap_or_else(|| Local::now().date_naive().pred_opt().unwrap());
    let start = args
        .start
        .unwrap_or_else(|| end.checked_sub_months(Months::new(1)).unwrap());

    let mode = if args.fractional {
        RankingMode::Fractional {
            min_fraction: args.min_fraction,
        }
    } else {
        RankingMode::Weighted {
            top_n: args.top_cities,
        }
    };

    if let Err(e) = std::fs::create_dir_all(&args.output) {
        tracing::error!(message = "could not create output directory", path = %args.output.display(), error = %e);
        return ExitCode::FAILURE;
    }

    let config = PipelineConfig {
        basename: args.basename,
        output_dir: args.output,
        geo_db: args.geo_db,
        bot_list: args.bots,
        separator: '\t',
        has_header: true,
        start,
        end,
        mode,
    };

    let sources: Vec<ProjectSource> = args
        .wp_projects
        .iter()
        .map(|pr| ProjectSource {
            project: CompactString::from(pr.as_str()),
            path: args.data_dir.join(format!("{pr}_geo.tsv")),
        })
        .collect();

    let results = run_parallel(&config, sources, args.threads);
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    tracing::info!(
        message = "all projects done",
        output_dir = %config.output_dir.display(),
        projects = results.len(),
        failed
    );

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
