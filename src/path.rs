//! A small typed-path layer over [`std::path`].
//!
//! A typestate path (`AbsPath<Kind>`) stops absolute/relative and file/dir
//! paths from being mixed up at call sites. Only the slice of that idea this
//! crate actually needs: every path the imprint engine touches is absolute,
//! and we only ever need to know whether we're holding one that names a file
//! or one that names a directory.

use std::ffi::OsStr;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use derive_more::Display;

use crate::error::Error;

/// Marker for a path known to identify a regular file.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FileKind;

/// Marker for a path known to identify a directory.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct DirKind;

/// Marker for a path whose kind (file or directory) is not yet known.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct AnyKind;

/// An absolute path, tagged at compile time with what it's known to name.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
#[display("{}", self.inner.display())]
pub struct AbsPath<Kind> {
    kind: PhantomData<Kind>,
    inner: PathBuf,
}

/// An absolute path known to name a regular file.
pub type AbsFilePath = AbsPath<FileKind>;
/// An absolute path known to name a directory.
pub type AbsDirPath = AbsPath<DirKind>;
/// An absolute path of unspecified kind (e.g. the root of a walk, before stat'ing it).
pub type AbsAnyPath = AbsPath<AnyKind>;

impl<Kind> std::fmt::Debug for AbsPath<Kind> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.inner)
    }
}

impl<Kind> AbsPath<Kind> {
    fn new_unchecked(inner: PathBuf) -> Self {
        Self {
            kind: PhantomData,
            inner,
        }
    }

    /// View this path as a standard library path.
    pub fn as_std_path(&self) -> &Path {
        &self.inner
    }

    /// The final path component, as reported by the filesystem, if any.
    ///
    /// A filesystem root (e.g. `/` or `C:\`) has no final component.
    pub fn file_name(&self) -> Option<&OsStr> {
        self.inner.file_name()
    }

    /// The final path component as a UTF-8 string, lossily converted.
    ///
    /// Used for filename hashing and filename comparison, both of which
    /// compare the *string form* of the name rather than the raw OS string.
    pub fn file_name_str(&self) -> Option<std::borrow::Cow<'_, str>> {
        self.inner.file_name().map(|n| n.to_string_lossy())
    }

    /// Reinterpret this path as one of unspecified kind.
    pub fn erase_kind(&self) -> AbsAnyPath {
        AbsPath::new_unchecked(self.inner.clone())
    }

    /// Compute the path relative to `base`, if `self` is inside `base`.
    pub fn strip_prefix<OtherKind>(&self, base: &AbsPath<OtherKind>) -> Option<PathBuf> {
        self.inner
            .strip_prefix(&base.inner)
            .ok()
            .map(Path::to_path_buf)
    }
}

impl AbsPath<AnyKind> {
    /// Canonicalize `path` (resolving symlinks along the way to an absolute,
    /// real path) without asserting anything about what kind of entry it names.
    pub fn canonicalize(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .map_err(|source| Error::io(path, source))?;
        Ok(Self::new_unchecked(canonical))
    }

    /// Build a path directly from a string without touching the filesystem.
    ///
    /// Only meant for unit tests that exercise fingerprint arithmetic against
    /// paths that don't need to (and sometimes can't, e.g. `/foo.bar`) exist
    /// on the machine running the test.
    #[cfg(test)]
    pub(crate) fn from_literal_for_test(path: &str) -> Self {
        Self::new_unchecked(PathBuf::from(path))
    }

    /// Assert that this path names a file, yielding a typed [`AbsFilePath`].
    pub fn into_file(self) -> AbsFilePath {
        AbsPath::new_unchecked(self.inner)
    }

    /// Assert that this path names a directory, yielding a typed [`AbsDirPath`].
    pub fn into_dir(self) -> AbsDirPath {
        AbsPath::new_unchecked(self.inner)
    }
}

impl AbsDirPath {
    /// Join a child component onto this directory, asserting the result
    /// names a file.
    pub fn join_file(&self, name: impl AsRef<Path>) -> AbsFilePath {
        AbsPath::new_unchecked(self.inner.join(name))
    }

    /// Join a child component onto this directory, asserting the result
    /// names a directory.
    pub fn join_dir(&self, name: impl AsRef<Path>) -> AbsDirPath {
        AbsPath::new_unchecked(self.inner.join(name))
    }

    /// Join an arbitrary relative path onto this directory, of unspecified kind.
    ///
    /// Used to re-anchor a path recorded under one base directory onto a
    /// different one during check rebasing.
    pub fn join_relative(&self, relative: impl AsRef<Path>) -> AbsAnyPath {
        AbsPath::new_unchecked(self.inner.join(relative))
    }
}

impl From<PathBuf> for AbsPath<AnyKind> {
    /// Wrap a path recorded elsewhere (e.g. read back from a `.datim` file)
    /// without touching the filesystem or asserting it is absolute.
    ///
    /// Callers that need a filesystem-verified path should prefer
    /// [`AbsPath::canonicalize`].
    fn from(inner: PathBuf) -> Self {
        Self::new_unchecked(inner)
    }
}

impl<Kind> AsRef<Path> for AbsPath<Kind> {
    fn as_ref(&self) -> &Path {
        &self.inner
    }
}

impl<Kind> From<AbsPath<Kind>> for PathBuf {
    fn from(value: AbsPath<Kind>) -> Self {
        value.inner
    }
}
