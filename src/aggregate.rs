use compact_str::CompactString;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::extract::{CountryCityTally, EditorCountryTally};

/// Minimum occurrence count for the "active" editor cohort.
pub const ACTIVE_EDITS: u64 = 5;
/// Minimum occurrence count for the "very active" editor cohort.
pub const VERY_ACTIVE_EDITS: u64 = 100;

/// Editor counts per activity cohort. Cohorts are nested: an editor counted
/// under `very_active` is also counted under `active` and `all`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CohortCounts {
    pub all: u64,
    #[serde(rename = "5+")]
    pub active: u64,
    #[serde(rename = "100+")]
    pub very_active: u64,
}

/// Cohort counts per country plus the synthetic World aggregate, which
/// equals the sum over all per-country entries, field by field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CohortReport {
    pub world: CohortCounts,
    pub countries: FxHashMap<CompactString, CohortCounts>,
}

/// Reduces the `(user, country)` tallies into per-country cohort counts.
///
/// Single pass; an editor contributes one count to every country they edited
/// from, in each cohort whose threshold their edit count for that country
/// clears.
pub fn aggregate_cohorts(tallies: &EditorCountryTally) -> CohortReport {
    let mut report = CohortReport::default();

    for ((_, country), &edits) in tallies {
        if edits == 0 {
            continue;
        }

        let counts = report.countries.entry(country.clone()).or_default();
        counts.all += 1;
        report.world.all += 1;
        if edits >= ACTIVE_EDITS {
            counts.active += 1;
            report.world.active += 1;
            if edits >= VERY_ACTIVE_EDITS {
                counts.very_active += 1;
                report.world.very_active += 1;
            }
        }
    }

    report
}

/// Which of the two historical ranking conventions to emit.
///
/// The two are mutually exclusive; a pipeline run uses exactly one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RankingMode {
    /// Keep the `top_n` cities per country, each weighted relative to that
    /// country's top city on a 0–10 scale (top city = 10.0 exactly).
    Weighted { top_n: usize },
    /// Keep every city whose share of the country's edits is at least
    /// `min_fraction`; weights are plain fractions in [0, 1].
    Fractional { min_fraction: f64 },
}

/// Per-country ranking of contributing cities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityRanking {
    /// Total edits for the country, over all cities (not just retained ones).
    #[serde(rename = "edits")]
    pub total_edits: u64,
    /// Sorted by descending raw edit count, ties in first-seen order.
    pub top_cities: Vec<(CompactString, f64)>,
}

/// Reduces the `(country, city)` tallies into per-country city rankings.
///
/// A country whose total edit count is zero is excluded from the output
/// rather than dividing by zero.
pub fn rank_cities(
    tallies: &CountryCityTally,
    mode: RankingMode,
) -> FxHashMap<CompactString, CityRanking> {
    let mut per_country: FxHashMap<&CompactString, Vec<(&CompactString, u64, u64)>> =
        FxHashMap::default();
    for ((country, city), tally) in tallies {
        per_country
            .entry(country)
            .or_default()
            .push((city, tally.edits, tally.first_seen));
    }

    let mut rankings = FxHashMap::default();

    for (country, mut cities) in per_country {
        cities.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let total_edits: u64 = cities.iter().map(|c| c.1).sum();
        if total_edits == 0 {
            continue;
        }

        let top_cities = match mode {
            RankingMode::Weighted { top_n } => {
                let top_count = cities[0].1;
                cities
                    .iter()
                    .take(top_n)
                    .map(|(city, edits, _)| {
                        ((*city).clone(), 10.0 * *edits as f64 / top_count as f64)
                    })
                    .collect()
            }
            RankingMode::Fractional { min_fraction } => cities
                .iter()
                .map(|(city, edits, _)| ((*city).clone(), *edits as f64 / total_edits as f64))
                .filter(|(_, fraction)| *fraction >= min_fraction)
                .collect(),
        };

        rankings.insert(
            country.clone(),
            CityRanking {
                total_edits,
                top_cities,
            },
        );
    }

    rankings
}
