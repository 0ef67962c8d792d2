use std::{io::BufRead, path::Path, sync::LazyLock};

use compact_str::CompactString;
use regex::Regex;
use rustc_hash::FxHashMap;

/// Sentinel location name for a valid IP whose lookup returned an empty
/// city or country field.
pub const UNKNOWN: &str = "Unknown";
/// Sentinel location name for an IP that failed syntactic validation.
pub const INVALID_IP: &str = "Invalid IP";

/// Location guess for a single IP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeoResult {
    pub city: CompactString,
    pub country: CompactString,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("geo database `{path}` could not be opened")]
    DatabaseUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("geo database `{path}` is malformed at line {line}")]
    MalformedDatabase { path: String, line: u64 },
    #[error("lookup failed for `{ip}`: {message}")]
    Lookup { ip: CompactString, message: String },
}

/// Capability object mapping an IP address to an optional location.
///
/// Constructed once by the orchestration layer and passed by reference into
/// the extractor; there is no global resolver handle. A `resolve` call is an
/// opaque, potentially slow, potentially failing unit of work: `Ok(None)`
/// means the address is not covered by the resolver's data, `Err` means the
/// lookup itself failed (the extractor skips such records).
pub trait GeoResolver {
    fn resolve(&self, ip: &str) -> Result<Option<GeoResult>, ResolverError>;
}

// closures double as resolvers, mainly for tests
impl<F> GeoResolver for F
where
    F: Fn(&str) -> Result<Option<GeoResult>, ResolverError>,
{
    fn resolve(&self, ip: &str) -> Result<Option<GeoResult>, ResolverError> {
        self(ip)
    }
}

/// Checks the accepted IP pattern: four dot-separated numeric octets, each
/// in range. Returns `false` for anything else; no error path.
pub fn valid_ip(ip: &str) -> bool {
    static IP_PATTERN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}$").unwrap());

    if !IP_PATTERN.is_match(ip) {
        return false;
    }

    ip.split('.').all(|octet| matches!(octet.parse::<u16>(), Ok(n) if n <= 255))
}

/// In-memory resolver backed by a tab-separated lookup table
/// (`ip<TAB>country<TAB>city`, one entry per line).
///
/// Fields are stored verbatim; normalizing empty fields to [`UNKNOWN`] is the
/// extractor's job, not the resolver's.
#[derive(Debug)]
pub struct TableResolver {
    entries: FxHashMap<CompactString, GeoResult>,
}

impl TableResolver {
    pub fn open(path: &Path) -> Result<Self, ResolverError> {
        let file = std::fs::File::open(path).map_err(|source| {
            ResolverError::DatabaseUnavailable {
                path: path.display().to_string(),
                source,
            }
        })?;

        Self::read(std::io::BufReader::new(file), &path.display().to_string())
    }

    pub fn read<R: BufRead>(reader: R, path: &str) -> Result<Self, ResolverError> {
        let mut entries = FxHashMap::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| ResolverError::DatabaseUnavailable {
                path: path.to_string(),
                source,
            })?;
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split('\t');
            let (Some(ip), Some(country), Some(city)) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(ResolverError::MalformedDatabase {
                    path: path.to_string(),
                    line: index as u64 + 1,
                });
            };

            entries.insert(
                CompactString::from(ip),
                GeoResult {
                    city: CompactString::from(city),
                    country: CompactString::from(country),
                },
            );
        }

        tracing::debug!(
            message = "loaded geo lookup table",
            path,
            entries = entries.len()
        );

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeoResolver for TableResolver {
    fn resolve(&self, ip: &str) -> Result<Option<GeoResult>, ResolverError> {
        Ok(self.entries.get(ip).cloned())
    }
}
