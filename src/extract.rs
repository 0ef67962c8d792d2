use compact_str::CompactString;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    geo::{valid_ip, GeoResolver, INVALID_IP, UNKNOWN},
    source::RawRecord,
};

/// Edit counts keyed by `(user, country)`. One entry is created lazily on
/// first occurrence of the pair; each further record increments it.
pub type EditorCountryTally = FxHashMap<(CompactString, CompactString), u64>;

/// Edit counts keyed by `(country, city)`.
pub type CountryCityTally = FxHashMap<(CompactString, CompactString), CityTally>;

/// Count plus the insertion rank of the `(country, city)` key, which the
/// ranker uses to break count ties by first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CityTally {
    pub edits: u64,
    pub(crate) first_seen: u64,
}

/// Single pass over the record stream: filters excluded users, resolves each
/// remaining IP to a location and builds the two tally maps.
///
/// Memory is bounded by the number of distinct `(user, country)` and
/// `(country, city)` keys, not by input size. Per successfully processed
/// record exactly one entry in each map is incremented.
///
/// Location policy, in order:
/// - excluded user: the record is skipped outright and appears in neither map
/// - syntactically invalid IP: tallied under city = country = `"Invalid IP"`
/// - resolver error: logged and skipped (not tallied anywhere), unlike the
///   invalid-IP path
/// - no resolver result, or an empty city/country field: the missing field
///   becomes `"Unknown"`, each independently
pub fn extract<I, R>(
    records: I,
    excluded_users: &FxHashSet<CompactString>,
    resolver: &R,
) -> (EditorCountryTally, CountryCityTally)
where
    I: IntoIterator<Item = RawRecord>,
    R: GeoResolver + ?Sized,
{
    let mut editors = EditorCountryTally::default();
    let mut cities = CountryCityTally::default();

    for record in records {
        if excluded_users.contains(&record.user) {
            continue;
        }

        let (country, city) = if !valid_ip(&record.ip) {
            (
                CompactString::const_new(INVALID_IP),
                CompactString::const_new(INVALID_IP),
            )
        } else {
            match resolver.resolve(&record.ip) {
                Ok(Some(geo)) => (or_unknown(geo.country), or_unknown(geo.city)),
                Ok(None) => (
                    CompactString::const_new(UNKNOWN),
                    CompactString::const_new(UNKNOWN),
                ),
                Err(error) => {
                    tracing::warn!(
                        message = "geo lookup failed, skipping record",
                        ip = record.ip.as_str(),
                        error = %error
                    );
                    continue;
                }
            }
        };

        let rank = cities.len() as u64;
        cities
            .entry((country.clone(), city))
            .or_insert(CityTally {
                edits: 0,
                first_seen: rank,
            })
            .edits += 1;

        *editors.entry((record.user, country)).or_insert(0) += 1;
    }

    (editors, cities)
}

fn or_unknown(field: CompactString) -> CompactString {
    if field.trim().is_empty() {
        CompactString::const_new(UNKNOWN)
    } else {
        field
    }
}

#[cfg(test)]
pub(crate) fn key(a: &str, b: &str) -> (CompactString, CompactString) {
    (CompactString::from(a), CompactString::from(b))
}
