//! The `.datim` wire format: a bit-exact, tab-delimited serialization of
//! [`Imprint`] values, plus the base-path bookkeeping used to re-anchor a
//! recorded tree onto a different root during check.
//!
//! A line-oriented, field-prefixed text format parsed one line at a time and
//! reconstructed field-by-field on write, tab-delimited and name-mapped
//! (rather than whitespace and positional) since the header must tolerate
//! field reordering.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use jiff::Timestamp;

use crate::error::Error;
use crate::hash::Hash;
use crate::imprint::Imprint;
use crate::path::{AbsAnyPath, AbsDirPath};

/// Canonical header field names, in the order this codec writes them.
///
/// The parser does not assume this order: it reads whatever order the
/// header on disk declares and maps every subsequent row by name.
pub const FIELD_NAMES: [&str; 6] = [
    "#",
    "miniprint",
    "path",
    "content-modifiedAt",
    "content-fingerprint",
    "fingerprint",
];

const BASE_PATH_MARKER: &str = "/";

/// Line terminator a [`DatimWriter`] inserts after each record.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub enum LineTerminator {
    /// `\n`, used when writing to a `.datim` file.
    #[default]
    Lf,
    /// The host platform's native separator, used for interactive streams.
    Platform,
}

impl LineTerminator {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Platform => {
                if cfg!(windows) {
                    "\r\n"
                } else {
                    "\n"
                }
            }
        }
    }
}

/// Serializes imprints to the `.datim` format.
///
/// Call [`DatimWriter::write_header`] exactly once before any other write,
/// and [`DatimWriter::write_base_path`] before the imprints it anchors.
pub struct DatimWriter<W> {
    writer: W,
    terminator: LineTerminator,
    next_line: u64,
}

impl<W: Write> DatimWriter<W> {
    /// Wrap `writer`, starting imprint line numbering at 1.
    pub fn new(writer: W, terminator: LineTerminator) -> Self {
        Self {
            writer,
            terminator,
            next_line: 1,
        }
    }

    /// Write the header row.
    pub fn write_header(&mut self) -> Result<(), Error> {
        self.write_row(&FIELD_NAMES)
    }

    /// Write a base-path row, switching the current base path for every
    /// imprint row written after it.
    pub fn write_base_path(&mut self, base: &AbsDirPath) -> Result<(), Error> {
        let path = display_path(base)?;
        self.write_row(&[BASE_PATH_MARKER, "", path.as_str(), "", "", ""])
    }

    /// Write one imprint row, assigning it the next sequential line number.
    pub fn write_imprint(&mut self, imprint: &Imprint) -> Result<(), Error> {
        let path = display_path(imprint.path())?;
        let line = self.next_line.to_string();
        let miniprint = imprint.miniprint();
        let content_modified_at = imprint.content_modified_at().to_string();
        let content_fingerprint = imprint.content_fingerprint().to_string();
        let fingerprint = imprint.fingerprint().to_string();
        self.write_row(&[
            line.as_str(),
            miniprint.as_str(),
            path.as_str(),
            content_modified_at.as_str(),
            content_fingerprint.as_str(),
            fingerprint.as_str(),
        ])?;
        self.next_line += 1;
        Ok(())
    }

    fn write_row(&mut self, fields: &[&str]) -> Result<(), Error> {
        let row = fields.join("\t");
        write!(self.writer, "{row}{}", self.terminator.as_str())
            .map_err(|source| Error::io(PathBuf::new(), source))
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn display_path<Kind>(path: &crate::path::AbsPath<Kind>) -> Result<String, Error> {
    let rendered = path.as_std_path().display().to_string();
    if rendered.contains('\t') {
        return Err(Error::InvalidPath(format!(
            "path {rendered:?} contains a tab, which the datim format uses as a field delimiter"
        )));
    }
    Ok(rendered)
}

/// Parses a `.datim` byte stream into a lazy sequence of [`Imprint`] values.
///
/// Base-path rows are consumed internally and never yielded; they only
/// update [`DatimReader::current_base_path`]. Constructed with `rebase:
/// true`, every imprint row is re-anchored onto the base path active at the
/// time it appears, failing with [`Error::MissingBasePath`] if none has been
/// seen yet.
pub struct DatimReader<R> {
    lines: std::io::Lines<R>,
    field_index: Vec<usize>,
    current_base_path: Option<AbsDirPath>,
    rebase_onto: Option<AbsDirPath>,
    source_line: u64,
}

impl<R: BufRead> DatimReader<R> {
    /// Read and validate the header, readying the reader to stream imprints.
    ///
    /// When `rebase_onto` is `Some`, every yielded imprint's path is
    /// re-anchored onto it using the base path recorded in the file;
    /// otherwise paths are yielded exactly as recorded.
    pub fn new(mut reader: R, rebase_onto: Option<AbsDirPath>) -> Result<Self, Error> {
        let mut header_line = String::new();
        let read = reader
            .read_line(&mut header_line)
            .map_err(|source| Error::io(PathBuf::new(), source))?;
        if read == 0 {
            return Err(Error::BadHeader("file is empty".to_string()));
        }
        let header_line = header_line
            .strip_prefix('\u{feff}')
            .unwrap_or(&header_line)
            .trim_end_matches('\n')
            .trim_end_matches('\r');

        let header_fields: Vec<&str> = header_line.split('\t').collect();
        let field_index = FIELD_NAMES
            .iter()
            .map(|name| {
                header_fields
                    .iter()
                    .position(|field| field == name)
                    .ok_or_else(|| Error::BadHeader(format!("missing field {name:?}")))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        if header_fields.len() != FIELD_NAMES.len() {
            return Err(Error::BadHeader(format!(
                "expected {} fields, header declares {}",
                FIELD_NAMES.len(),
                header_fields.len()
            )));
        }

        Ok(Self {
            lines: reader.lines(),
            field_index,
            current_base_path: None,
            rebase_onto,
            source_line: 1,
        })
    }

    /// The base path most recently switched to by a base-path row, if any.
    pub fn current_base_path(&self) -> Option<&AbsDirPath> {
        self.current_base_path.as_ref()
    }

    fn field<'a>(&self, row: &'a [&'a str], name_index: usize) -> &'a str {
        row[self.field_index[name_index]]
    }

    fn parse_row(&mut self, row_text: &str) -> Result<Option<Imprint>, Error> {
        let row: Vec<&str> = row_text.split('\t').collect();
        if row.len() != FIELD_NAMES.len() {
            return Err(Error::BadRecord {
                line: self.source_line,
                reason: format!("expected {} fields, got {}", FIELD_NAMES.len(), row.len()),
            });
        }

        let number_field = self.field(&row, 0);
        if number_field == BASE_PATH_MARKER {
            let path_field = self.field(&row, 2);
            let base = AbsAnyPath::canonicalize(path_field)
                .map(AbsAnyPath::into_dir)
                .unwrap_or_else(|_| AbsAnyPath::from(PathBuf::from(path_field)).into_dir());
            self.current_base_path = Some(base);
            return Ok(None);
        }

        // Validate the field is the decimal line number the format requires;
        // the value itself isn't otherwise needed; `source_line` (the
        // physical line within the stream) is what error contexts report.
        let _: u64 = number_field.parse().map_err(|_| Error::BadRecord {
            line: self.source_line,
            reason: format!("{number_field:?} is neither a line number nor the base-path marker"),
        })?;

        let path_field = self.field(&row, 2);
        let recorded_path = AbsAnyPath::from(PathBuf::from(path_field));

        let path = match &self.rebase_onto {
            Some(new_root) => self.rebase(&recorded_path, new_root, self.source_line)?,
            None => recorded_path,
        };

        let content_modified_at: Timestamp =
            self.field(&row, 3).parse().map_err(|err| Error::BadRecord {
                line: self.source_line,
                reason: format!("malformed timestamp: {err}"),
            })?;
        let content_fingerprint: Hash =
            self.field(&row, 4).parse().map_err(|_| Error::BadRecord {
                line: self.source_line,
                reason: "malformed content-fingerprint checksum".to_string(),
            })?;
        let fingerprint: Hash = self.field(&row, 5).parse().map_err(|_| Error::BadRecord {
            line: self.source_line,
            reason: "malformed fingerprint checksum".to_string(),
        })?;

        if path.as_std_path().as_os_str().is_empty() {
            return Err(Error::BadRecord {
                line: self.source_line,
                reason: "path field is empty".to_string(),
            });
        }

        let imprint =
            Imprint::from_recorded(path, content_modified_at, content_fingerprint, fingerprint);
        Ok(Some(imprint))
    }

    fn rebase(
        &self,
        recorded: &AbsAnyPath,
        new_root: &AbsDirPath,
        line: u64,
    ) -> Result<AbsAnyPath, Error> {
        let base = self
            .current_base_path
            .as_ref()
            .ok_or(Error::MissingBasePath { line })?;
        let suffix = recorded.strip_prefix(base).unwrap_or_else(|| {
            recorded
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_default()
        });
        Ok(new_root.join_relative(suffix))
    }
}

impl<R: BufRead> Iterator for DatimReader<R> {
    type Item = Result<Imprint, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.source_line += 1;
            let line = match line {
                Ok(line) => line,
                Err(source) => return Some(Err(Error::io(PathBuf::new(), source))),
            };
            if line.is_empty() {
                continue;
            }
            match self.parse_row(&line) {
                Ok(Some(imprint)) => return Some(Ok(imprint)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
