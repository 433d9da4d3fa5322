//! The imprint record: the unit of data this whole crate exists to produce,
//! serialize, and check.

use derive_getters::Getters;
use jiff::Timestamp;

use crate::error::Error;
use crate::hash::Hash;
use crate::path::AbsAnyPath;

/// An immutable fingerprint of a single filesystem path.
///
/// Constructed exactly once by the generator (via [`Imprint::for_file`] or
/// [`Imprint::for_directory`]) or reconstructed verbatim by the codec parser;
/// never mutated afterwards.
#[derive(Clone, Debug, Getters)]
pub struct Imprint {
    /// Absolute, case-preserved path as reported by the filesystem.
    path: AbsAnyPath,

    /// Modification timestamp at the platform's native precision.
    ///
    /// Displayed/serialized at full precision; truncated to milliseconds
    /// when folded into [`Imprint::fingerprint`].
    content_modified_at: Timestamp,

    /// For files, the SHA-256 of the file's bytes.
    /// For directories, the SHA-256 over the ordered sequence of children's
    /// `content_fingerprint` values.
    content_fingerprint: Hash,

    /// The composite fingerprint: SHA-256 over filename-hash, mtime-millis,
    /// content fingerprint, and (for directories) the children fingerprint.
    fingerprint: Hash,

    /// For directories only: SHA-256 over the ordered sequence of children's
    /// composite `fingerprint` values. Present in the composite hash but not
    /// persisted as its own `.datim` column.
    children_fingerprint: Option<Hash>,
}

impl Imprint {
    /// Construct the imprint for a regular file.
    ///
    /// `path` must be absolute. Fails with [`Error::InvalidPath`] if it is
    /// empty or, when `require_filename` is set, if it has no final
    /// component to hash (e.g. it names a filesystem root).
    pub fn for_file(
        path: AbsAnyPath,
        content_modified_at: Timestamp,
        content_fingerprint: Hash,
        require_filename: bool,
    ) -> Result<Self, Error> {
        Self::new(
            path,
            content_modified_at,
            content_fingerprint,
            None,
            require_filename,
        )
    }

    /// Construct the imprint for a directory.
    ///
    /// `children_fingerprint` should be [`Hash::empty`] for a directory with
    /// no surviving children (after exclusion filtering).
    pub fn for_directory(
        path: AbsAnyPath,
        content_modified_at: Timestamp,
        content_fingerprint: Hash,
        children_fingerprint: Hash,
        require_filename: bool,
    ) -> Result<Self, Error> {
        Self::new(
            path,
            content_modified_at,
            content_fingerprint,
            Some(children_fingerprint),
            require_filename,
        )
    }

    fn new(
        path: AbsAnyPath,
        content_modified_at: Timestamp,
        content_fingerprint: Hash,
        children_fingerprint: Option<Hash>,
        require_filename: bool,
    ) -> Result<Self, Error> {
        let path_display = path.as_std_path().display().to_string();
        if path_display.is_empty() {
            return Err(Error::InvalidPath("path is empty".to_string()));
        }

        let filename = path.file_name_str();
        if require_filename && filename.is_none() {
            return Err(Error::InvalidPath(format!(
                "path {path:?} has no filename component but one is required"
            )));
        }

        let fingerprint =
            compose_fingerprint(filename.as_deref(), content_modified_at, &content_fingerprint, children_fingerprint.as_ref());

        Ok(Self {
            path,
            content_modified_at,
            content_fingerprint,
            fingerprint,
            children_fingerprint,
        })
    }

    /// Reconstruct an imprint exactly as recorded in a `.datim` row, trusting
    /// the stored composite fingerprint rather than recomputing it.
    ///
    /// The row format doesn't distinguish a file row from a directory row,
    /// nor does it persist `children_fingerprint`, so a fingerprint recomputed
    /// from just `content_fingerprint` would only ever match what a *file*
    /// row's writer produced; recomputing it here would reject every
    /// directory row. Trusting the recorded value is also what lets a
    /// directory row round-trip byte-for-byte through the codec.
    pub(crate) fn from_recorded(
        path: AbsAnyPath,
        content_modified_at: Timestamp,
        content_fingerprint: Hash,
        fingerprint: Hash,
    ) -> Self {
        Self {
            path,
            content_modified_at,
            content_fingerprint,
            fingerprint,
            children_fingerprint: None,
        }
    }

    /// Whether this imprint describes a directory.
    ///
    /// Always `false` for an imprint reconstructed from a `.datim` row, since
    /// the row format doesn't persist this bit; only imprints freshly built
    /// by the generator carry it.
    pub fn is_directory(&self) -> bool {
        self.children_fingerprint.is_some()
    }

    /// The first 8 hex characters of the composite [`Imprint::fingerprint`].
    pub fn miniprint(&self) -> String {
        let full = self.fingerprint.to_string();
        full.chars().take(8).collect()
    }
}

/// Truncate a timestamp to millisecond precision and encode it as a
/// big-endian 8-byte integer, as required by the composite fingerprint.
pub(crate) fn mtime_millis_be(timestamp: Timestamp) -> [u8; 8] {
    timestamp.as_millisecond().to_be_bytes()
}

fn compose_fingerprint(
    filename: Option<&str>,
    content_modified_at: Timestamp,
    content_fingerprint: &Hash,
    children_fingerprint: Option<&Hash>,
) -> Hash {
    let mut digest = crate::hash::Digest::new();
    if let Some(name) = filename {
        digest.update_hash(&Hash::hash_string(name));
    }
    digest.update(mtime_millis_be(content_modified_at));
    digest.update_hash(content_fingerprint);
    if let Some(children) = children_fingerprint {
        digest.update_hash(children);
    }
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::path::AbsAnyPath;

    fn path(p: &str) -> AbsAnyPath {
        // `AbsAnyPath` normally comes from canonicalizing a real filesystem
        // path; tests that only care about fingerprint arithmetic build one
        // directly from a string to avoid touching the filesystem.
        AbsAnyPath::from_literal_for_test(p)
    }

    #[test]
    fn single_file_matches_spec_example() {
        // Known SHA-256("foobar") composed with a fixed mtime.
        let mtime: Timestamp = "2022-05-22T20:48:16.7512146Z".parse().expect("parse timestamp");
        let content_fp = Hash::hash_string("foobar");
        assert_eq!(
            content_fp.to_string(),
            "c3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2"
        );

        let imprint = Imprint::for_file(path("/foo.bar"), mtime, content_fp, true)
            .expect("construct imprint");

        assert_eq!(
            imprint.fingerprint().to_string(),
            "c56f2ad0a6e082790805ffabf1f68f13f77954ae6936ab1793edde7e101864c9"
        );
        assert_eq!(imprint.miniprint(), "c56f2ad0");
    }

    #[test]
    fn empty_directory_has_empty_content_and_children_fingerprint() {
        let mtime: Timestamp = "2024-01-01T00:00:00Z".parse().expect("parse timestamp");
        let imprint = Imprint::for_directory(
            path("/empty"),
            mtime,
            Hash::empty(),
            Hash::empty(),
            true,
        )
        .expect("construct imprint");
        assert_eq!(*imprint.content_fingerprint(), Hash::empty());
        assert_eq!(imprint.children_fingerprint(), &Some(Hash::empty()));
    }

    #[test]
    fn root_without_filename_is_allowed_when_not_required() {
        let mtime: Timestamp = "2024-01-01T00:00:00Z".parse().expect("parse timestamp");
        let imprint = Imprint::for_directory(path("/"), mtime, Hash::empty(), Hash::empty(), false);
        assert!(imprint.is_ok());
    }

    #[test]
    fn root_without_filename_errors_when_required() {
        let mtime: Timestamp = "2024-01-01T00:00:00Z".parse().expect("parse timestamp");
        let imprint = Imprint::for_directory(path("/"), mtime, Hash::empty(), Hash::empty(), true);
        assert!(matches!(imprint, Err(Error::InvalidPath(_))));
    }
}
