use std::{
    collections::VecDeque,
    fs::File,
    io::BufReader,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::NaiveDate;
use compact_str::CompactString;
use rustc_hash::FxHashSet;

use crate::{
    aggregate::{aggregate_cohorts, rank_cities, RankingMode},
    extract::extract,
    geo::{ResolverError, TableResolver},
    report::{write_cohort_reports, write_city_reports, ReportError, ReportMeta},
    source::{DelimitedRows, SourceError},
};

/// Run-wide settings shared by all project pipelines.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base output file name, e.g. `geo_editors`.
    pub basename: String,
    pub output_dir: PathBuf,
    /// Path to the geo lookup table.
    pub geo_db: PathBuf,
    /// Optional newline-delimited list of user identifiers to exclude.
    pub bot_list: Option<PathBuf>,
    pub separator: char,
    /// Whether row sources carry a header line to discard.
    pub has_header: bool,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub mode: RankingMode,
}

/// One project's row source.
#[derive(Debug, Clone)]
pub struct ProjectSource {
    /// Wiki project code, e.g. `en`.
    pub project: CompactString,
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("row source `{path}` could not be opened")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("row source failed")]
    Source(#[from] SourceError),
    #[error("geo resolver unavailable")]
    Resolver(#[from] ResolverError),
    #[error("bot list `{path}` could not be read")]
    BotList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report output failed")]
    Report(#[from] ReportError),
    #[error("project pipeline panicked")]
    Panicked,
}

/// Reads a newline-delimited identifier file into an exclusion set.
///
/// Same role as the stats bot lists used for Wikipedia reporting: one
/// identifier per line, blank lines ignored.
pub fn load_bot_list(path: &Path) -> Result<FxHashSet<CompactString>, PipelineError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PipelineError::BotList {
        path: path.to_path_buf(),
        source,
    })?;

    let bots: FxHashSet<CompactString> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(CompactString::from)
        .collect();

    tracing::debug!(message = "loaded bot list", path = %path.display(), bots = bots.len());
    Ok(bots)
}

/// Runs the full pipeline for one project: extract, aggregate, write reports.
///
/// Configuration-level failures (missing geo database, unreadable source or
/// bot list) surface before extraction touches any record. Extraction itself
/// completes fully before either aggregation starts; both reducers need the
/// complete tally maps.
pub fn run_project(config: &PipelineConfig, source: &ProjectSource) -> Result<(), PipelineError> {
    tracing::info!(
        message = "creating dataset",
        project = source.project.as_str(),
        source = %source.path.display()
    );

    let bots = match &config.bot_list {
        Some(path) => load_bot_list(path)?,
        None => FxHashSet::default(),
    };
    let resolver = TableResolver::open(&config.geo_db)?;

    let file = File::open(&source.path).map_err(|e| PipelineError::SourceUnavailable {
        path: source.path.clone(),
        source: e,
    })?;
    let rows = DelimitedRows::new(BufReader::new(file), config.separator)
        .skip_header(config.has_header);

    // a row error aborts this project's run, but only after the extractor
    // has drained everything before it
    let mut row_error = None;
    let records = rows.map_while(|row| match row {
        Ok(record) => Some(record),
        Err(e) => {
            row_error = Some(e);
            None
        }
    });
    let (editor_tallies, city_tallies) = extract(records, &bots, &resolver);
    if let Some(e) = row_error {
        return Err(e.into());
    }

    let cohorts = aggregate_cohorts(&editor_tallies);
    let rankings = rank_cities(&city_tallies, config.mode);

    let meta = ReportMeta {
        project: source.project.clone(),
        basename: config.basename.clone(),
        start: config.start,
        end: config.end,
    };
    write_cohort_reports(&config.output_dir, &meta, &cohorts)?;
    write_city_reports(&config.output_dir, &meta, &rankings, config.mode)?;

    tracing::info!(
        message = "done",
        project = source.project.as_str(),
        countries = cohorts.countries.len(),
        editors_world = cohorts.world.all
    );
    Ok(())
}

/// Runs independent project pipelines on a bounded worker pool.
///
/// Projects share no mutable state, so the only coordination is the job
/// queue. A failing (or panicking) project is logged with its identifier and
/// reported in its own result slot; sibling projects keep running.
pub fn run_parallel(
    config: &PipelineConfig,
    sources: Vec<ProjectSource>,
    workers: usize,
) -> Vec<(CompactString, Result<(), PipelineError>)> {
    let workers = workers.max(1).min(sources.len().max(1));
    let queue: Mutex<VecDeque<ProjectSource>> = Mutex::new(sources.into());
    let results: Mutex<Vec<(CompactString, Result<(), PipelineError>)>> = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let Some(source) = queue.lock().unwrap().pop_front() else {
                    break;
                };

                let outcome =
                    catch_unwind(AssertUnwindSafe(|| run_project(config, &source)))
                        .unwrap_or_else(|_| {
                            tracing::error!(
                                message = "project pipeline panicked",
                                project = source.project.as_str()
                            );
                            Err(PipelineError::Panicked)
                        });

                if let Err(error) = &outcome {
                    tracing::error!(
                        message = "project pipeline failed",
                        project = source.project.as_str(),
                        error = %error
                    );
                }

                results.lock().unwrap().push((source.project, outcome));
            });
        }
    });

    let mut results = results.into_inner().unwrap();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}
