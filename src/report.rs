use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use compact_str::CompactString;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::aggregate::{CityRanking, CohortCounts, CohortReport, RankingMode};

const DATE_FORMAT: &str = "%Y%m%d";

/// Naming and metadata shared by all artifacts of one project run.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    /// Wiki project code, e.g. `en`.
    pub project: CompactString,
    /// Base output file name, e.g. `geo_editors`.
    pub basename: String,
    /// Inclusive start of the reported period.
    pub start: NaiveDate,
    /// Inclusive end of the reported period.
    pub end: NaiveDate,
}

impl ReportMeta {
    /// `<basename>_<project>_<kind>_<start>_<end>.<ext>`
    fn file_name(&self, kind: &str, ext: &str) -> String {
        format!(
            "{}_{}_{}_{}_{}.{}",
            self.basename,
            self.project,
            kind,
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT),
            ext
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("could not write report file `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not serialize report `{path}`")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize)]
struct CohortDocument<'a> {
    project: &'a str,
    start: String,
    end: String,
    world: &'a CohortCounts,
    countries: BTreeMap<&'a str, &'a CohortCounts>,
}

#[derive(Serialize)]
struct CityDocument<'a> {
    project: &'a str,
    start: String,
    end: String,
    countries: BTreeMap<&'a str, &'a CityRanking>,
}

/// Writes the editor-cohort table for one project as TSV and JSON.
///
/// The TSV has one `country \t all \t 5+ \t 100+` row per country plus a
/// World row, in ordinal country-name order. The JSON document keeps World
/// out of the country map, as a top-level field next to the period metadata.
pub fn write_cohort_reports(
    dir: &Path,
    meta: &ReportMeta,
    report: &CohortReport,
) -> Result<(), ReportError> {
    let countries: BTreeMap<&str, &CohortCounts> = report
        .countries
        .iter()
        .map(|(country, counts)| (country.as_str(), counts))
        .collect();

    let tsv_path = dir.join(meta.file_name("countries", "tsv"));
    let mut tsv = buffered(&tsv_path)?;
    let mut rows: Vec<(&str, &CohortCounts)> = countries.iter().map(|(&c, &n)| (c, n)).collect();
    rows.push(("World", &report.world));
    rows.sort_by(|a, b| a.0.cmp(b.0));
    for (country, counts) in rows {
        writeln!(
            tsv,
            "{country}\t{}\t{}\t{}",
            counts.all, counts.active, counts.very_active
        )
        .map_err(|source| ReportError::Io {
            path: tsv_path.clone(),
            source,
        })?;
    }
    flush(tsv, &tsv_path)?;

    let json_path = dir.join(meta.file_name("countries", "json"));
    let document = CohortDocument {
        project: &meta.project,
        start: meta.start.format(DATE_FORMAT).to_string(),
        end: meta.end.format(DATE_FORMAT).to_string(),
        world: &report.world,
        countries,
    };
    write_json(&json_path, &document)?;

    tracing::debug!(
        message = "wrote cohort reports",
        project = meta.project.as_str(),
        tsv = %tsv_path.display(),
        json = %json_path.display()
    );
    Ok(())
}

/// Writes the city-ranking table for one project as TSV and JSON.
///
/// TSV rows are `country \t total_edits \t city \t weight ...` with a
/// variable trailing-column count, in ordinal country-name order; the inner
/// city list keeps its descending-count order. Weights print as `%.1f` in
/// weighted mode and `%.4f` in fractional mode.
pub fn write_city_reports(
    dir: &Path,
    meta: &ReportMeta,
    rankings: &FxHashMap<CompactString, CityRanking>,
    mode: RankingMode,
) -> Result<(), ReportError> {
    let countries: BTreeMap<&str, &CityRanking> = rankings
        .iter()
        .map(|(country, ranking)| (country.as_str(), ranking))
        .collect();

    let tsv_path = dir.join(meta.file_name("cities", "tsv"));
    let mut tsv = buffered(&tsv_path)?;
    for (country, ranking) in &countries {
        let mut row = format!("{country}\t{}", ranking.total_edits);
        for (city, weight) in &ranking.top_cities {
            match mode {
                RankingMode::Weighted { .. } => {
                    row.push_str(&format!("\t{city}\t{weight:.1}"));
                }
                RankingMode::Fractional { .. } => {
                    row.push_str(&format!("\t{city}\t{weight:.4}"));
                }
            }
        }
        writeln!(tsv, "{row}").map_err(|source| ReportError::Io {
            path: tsv_path.clone(),
            source,
        })?;
    }
    flush(tsv, &tsv_path)?;

    let json_path = dir.join(meta.file_name("cities", "json"));
    let document = CityDocument {
        project: &meta.project,
        start: meta.start.format(DATE_FORMAT).to_string(),
        end: meta.end.format(DATE_FORMAT).to_string(),
        countries,
    };
    write_json(&json_path, &document)?;

    tracing::debug!(
        message = "wrote city reports",
        project = meta.project.as_str(),
        tsv = %tsv_path.display(),
        json = %json_path.display()
    );
    Ok(())
}

fn buffered(path: &Path) -> Result<BufWriter<File>, ReportError> {
    let file = File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::new(file))
}

fn flush(mut writer: BufWriter<File>, path: &Path) -> Result<(), ReportError> {
    writer.flush().map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, document: &T) -> Result<(), ReportError> {
    let file = File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document).map_err(|source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    flush(writer, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ReportMeta {
        ReportMeta {
            project: "en".into(),
            basename: "geo_editors".into(),
            start: NaiveDate::from_ymd_opt(2012, 5, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2012, 5, 31).unwrap(),
        }
    }

    fn sample_cohorts() -> CohortReport {
        CohortReport {
            world: CohortCounts {
                all: 3,
                active: 1,
                very_active: 0,
            },
            countries: [
                (
                    CompactString::const_new("France"),
                    CohortCounts {
                        all: 2,
                        active: 1,
                        very_active: 0,
                    },
                ),
                (
                    CompactString::const_new("Germany"),
                    CohortCounts {
                        all: 1,
                        active: 0,
                        very_active: 0,
                    },
                ),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn cohort_tsv_is_sorted_and_includes_world() {
        let dir = tempfile::tempdir().unwrap();
        write_cohort_reports(dir.path(), &meta(), &sample_cohorts()).unwrap();

        let tsv = std::fs::read_to_string(
            dir.path().join("geo_editors_en_countries_20120501_20120531.tsv"),
        )
        .unwrap();
        assert_eq!(tsv, "France\t2\t1\t0\nGermany\t1\t0\t0\nWorld\t3\t1\t0\n");
    }

    #[test]
    fn cohort_json_separates_world_from_countries() {
        let dir = tempfile::tempdir().unwrap();
        write_cohort_reports(dir.path(), &meta(), &sample_cohorts()).unwrap();

        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(
                dir.path().join("geo_editors_en_countries_20120501_20120531.json"),
            )
            .unwrap(),
        )
        .unwrap();

        assert_eq!(json["project"], "en");
        assert_eq!(json["start"], "20120501");
        assert_eq!(json["end"], "20120531");
        assert_eq!(json["world"]["all"], 3);
        assert_eq!(json["world"]["5+"], 1);
        assert_eq!(json["countries"]["France"]["all"], 2);
        assert!(json["countries"].get("World").is_none());
    }

    #[test]
    fn city_tsv_keeps_rank_order_within_rows() {
        let rankings: FxHashMap<CompactString, CityRanking> = [
            (
                CompactString::const_new("France"),
                CityRanking {
                    total_edits: 150,
                    top_cities: vec![("Paris".into(), 10.0), ("Lyon".into(), 5.0)],
                },
            ),
            (
                CompactString::const_new("Germany"),
                CityRanking {
                    total_edits: 10,
                    top_cities: vec![("Berlin".into(), 10.0)],
                },
            ),
        ]
        .into_iter()
        .collect();

        let dir = tempfile::tempdir().unwrap();
        write_city_reports(
            dir.path(),
            &meta(),
            &rankings,
            RankingMode::Weighted { top_n: 10 },
        )
        .unwrap();

        let tsv = std::fs::read_to_string(
            dir.path().join("geo_editors_en_cities_20120501_20120531.tsv"),
        )
        .unwrap();
        assert_eq!(
            tsv,
            "France\t150\tParis\t10.0\tLyon\t5.0\nGermany\t10\tBerlin\t10.0\n"
        );
    }

    #[test]
    fn city_json_shape_matches_consumers() {
        let rankings: FxHashMap<CompactString, CityRanking> = [(
            CompactString::const_new("France"),
            CityRanking {
                total_edits: 160,
                top_cities: vec![("Paris".into(), 0.625)],
            },
        )]
        .into_iter()
        .collect();

        let dir = tempfile::tempdir().unwrap();
        write_city_reports(
            dir.path(),
            &meta(),
            &rankings,
            RankingMode::Fractional { min_fraction: 0.1 },
        )
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(
                dir.path().join("geo_editors_en_cities_20120501_20120531.json"),
            )
            .unwrap(),
        )
        .unwrap();

        assert_eq!(json["countries"]["France"]["edits"], 160);
        assert_eq!(json["countries"]["France"]["top_cities"][0][0], "Paris");
        assert_eq!(json["countries"]["France"]["top_cities"][0][1], 0.625);
    }
}
