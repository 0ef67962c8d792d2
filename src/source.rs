use std::io::BufRead;

use compact_str::CompactString;

/// One editor-activity log row, already split into fields.
///
/// Rows are ephemeral: the extractor consumes each record exactly once and
/// never buffers the input. The third field (edit size delta) is carried
/// through but not used by any aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub user: CompactString,
    pub ip: CompactString,
    pub edit_delta: Option<i64>,
}

impl RawRecord {
    pub fn new(user: impl Into<CompactString>, ip: impl Into<CompactString>) -> Self {
        Self {
            user: user.into(),
            ip: ip.into(),
            edit_delta: None,
        }
    }

    pub fn with_delta(mut self, edit_delta: i64) -> Self {
        self.edit_delta = Some(edit_delta);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error reading row source")]
    Io(#[from] std::io::Error),
    #[error("row {line} has {fields} fields, expected at least 2")]
    ShortRow { line: u64, fields: usize },
}

/// Streaming reader for delimited-text row sources (tab-separated dumps of
/// the edit log, typically).
///
/// Pre-parsed sources don't need this type at all; the extractor accepts any
/// iterator of [`RawRecord`]. This adapter exists so the split-vs-no-split
/// branching happens once at the boundary, not inside the extraction loop.
pub struct DelimitedRows<R> {
    reader: R,
    separator: char,
    skip_header: bool,
    line: u64,
    buf: String,
}

impl<R: BufRead> DelimitedRows<R> {
    pub fn new(reader: R, separator: char) -> Self {
        Self {
            reader,
            separator,
            skip_header: false,
            line: 0,
            buf: String::new(),
        }
    }

    /// Discard the first line of the source (dumped result sets carry a
    /// header row).
    pub fn skip_header(mut self, skip: bool) -> Self {
        self.skip_header = skip;
        self
    }

    fn parse_line(&self) -> Result<RawRecord, SourceError> {
        let row = self.buf.trim_end_matches(['\n', '\r']);
        let mut fields = row.split(self.separator);

        let (Some(user), Some(ip)) = (fields.next(), fields.next()) else {
            return Err(SourceError::ShortRow {
                line: self.line,
                fields: if row.is_empty() { 0 } else { 1 },
            });
        };

        // a malformed third field is treated as absent, never an error
        let edit_delta = fields.next().and_then(|s| s.trim().parse().ok());

        Ok(RawRecord {
            user: CompactString::from(user),
            ip: CompactString::from(ip),
            edit_delta,
        })
    }
}

impl<R: BufRead> Iterator for DelimitedRows<R> {
    type Item = Result<RawRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line += 1;

            if self.skip_header && self.line == 1 {
                continue;
            }

            return Some(self.parse_line());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(input: &str, skip_header: bool) -> Vec<Result<RawRecord, SourceError>> {
        DelimitedRows::new(input.as_bytes(), '\t')
            .skip_header(skip_header)
            .collect()
    }

    #[test]
    fn parses_three_field_rows() {
        let rows = collect("alice\t1.2.3.4\t50\nbob\t5.6.7.8\t-3\n", false);
        let rows: Vec<_> = rows.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            rows,
            vec![
                RawRecord::new("alice", "1.2.3.4").with_delta(50),
                RawRecord::new("bob", "5.6.7.8").with_delta(-3),
            ]
        );
    }

    #[test]
    fn header_row_is_discarded() {
        let rows = collect("user\tip\tlen_change\nalice\t1.2.3.4\t50\n", true);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().user, "alice");
    }

    #[test]
    fn missing_or_malformed_delta_becomes_none() {
        let rows = collect("alice\t1.2.3.4\nbob\t5.6.7.8\tNULL\n", false);
        assert_eq!(rows[0].as_ref().unwrap().edit_delta, None);
        assert_eq!(rows[1].as_ref().unwrap().edit_delta, None);
    }

    #[test]
    fn short_row_is_an_error() {
        let rows = collect("alice\t1.2.3.4\njustonefield\n", false);
        assert!(rows[0].is_ok());
        assert!(matches!(
            rows[1],
            Err(SourceError::ShortRow { line: 2, fields: 1 })
        ));
    }
}
