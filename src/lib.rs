//! # geowiki
//!
//! Geo-coding pipeline for Wikipedia editor activity. It consumes a stream
//! of edit-log records (user identifier, originating IP address, optional
//! edit-size delta), resolves each IP to a geographic location and
//! aggregates the results into two per-project reports:
//!
//! 1. **Editor cohorts** — per country (plus a synthetic World row): total
//!    editors, active editors (5+ edits) and very active editors (100+
//!    edits).
//! 2. **City rankings** — per country: total edits and the top contributing
//!    cities, weighted either on a 0–10 scale relative to the top city or as
//!    fractions of the country total.
//!
//! Reports are written as tab-separated tables and JSON documents for
//! downstream dashboarding.
//!
//! ## Basic usage
//!
//! ```rust,no_run
//! use geowiki::aggregate::{aggregate_cohorts, rank_cities, RankingMode};
//! use geowiki::extract::extract;
//! use geowiki::geo::TableResolver;
//! use geowiki::source::DelimitedRows;
//! use rustc_hash::FxHashSet;
//! use std::{fs::File, io::BufReader, path::Path};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = TableResolver::open(Path::new("geo.tsv"))?;
//!     let rows = DelimitedRows::new(BufReader::new(File::open("en_geo.tsv")?), '\t')
//!         .skip_header(true)
//!         .filter_map(Result::ok);
//!
//!     let (editors, cities) = extract(rows, &FxHashSet::default(), &resolver);
//!
//!     let cohorts = aggregate_cohorts(&editors);
//!     let rankings = rank_cities(&cities, RankingMode::Weighted { top_n: 10 });
//!
//!     println!("world editors: {}", cohorts.world.all);
//!     println!("countries ranked: {}", rankings.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline model
//!
//! Within one project, processing is strictly sequential: extraction drains
//! the whole record stream into the two tally maps before either reducer
//! runs, because both the World sums and the per-country edit totals need
//! the complete maps. Memory is bounded by the number of distinct
//! `(user, country)` and `(country, city)` keys, never by input size.
//!
//! Across projects there is no shared mutable state, so
//! [`pipeline::run_parallel`] fans independent projects out over a bounded
//! worker pool; one project failing (or panicking) is logged and isolated to
//! its own result.
//!
//! ## Geo resolution
//!
//! The resolver is an explicit capability ([`geo::GeoResolver`]) passed into
//! extraction, never a global handle, so tests can substitute closures. The
//! sentinel policy is deliberate and matched to the historical reports:
//! syntactically invalid IPs tally under the pseudo-country `"Invalid IP"`,
//! unresolved-but-valid IPs under `"Unknown"`, and a resolver *failure*
//! skips only the affected record.
//!
//! ## Logging and error handling
//!
//! Uses the `tracing` crate for warnings and per-project progress. All
//! fallible paths return module-level `thiserror` enums; only configuration
//! problems (missing geo database, unreadable source or bot list) abort a
//! project's run.

pub mod aggregate;
pub mod extract;
pub mod geo;
pub mod pipeline;
pub mod report;
pub mod source;
