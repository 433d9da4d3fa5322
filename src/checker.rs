//! Replaying a recorded [`Imprint`] against a live filesystem path and
//! classifying how (if at all) it has drifted.
//!
//! A small async function per path: stat first, then stream-hash content
//! only when the path turns out to be a file.

use std::cmp::Ordering;
use std::sync::Arc;

use jiff::Timestamp;
use tap::Pipe as _;
use tokio::sync::{Mutex, Semaphore};
use tracing::{instrument, trace};

use crate::config::CheckerConfig;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::imprint::Imprint;
use crate::path::AbsAnyPath;

/// A single way a live path was found to differ from its recorded imprint.
///
/// Ordered most-severe first; [`CheckResult::mismatches`] is always sorted
/// in this order.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Mismatch {
    /// The live content's SHA-256 differs from the recorded one.
    ContentFingerprint,
    /// The live last-modified time differs from the recorded one, compared
    /// at the platform's native precision.
    ContentModifiedAt,
    /// The live final path component differs, compared as a string (so a
    /// case-only rename is caught even on case-insensitive filesystems).
    Filename,
}

impl Mismatch {
    fn ordinal(self) -> u8 {
        match self {
            Self::ContentFingerprint => 0,
            Self::ContentModifiedAt => 1,
            Self::Filename => 2,
        }
    }
}

impl PartialOrd for Mismatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Mismatch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

/// The outcome of comparing one live path against its recorded imprint.
#[derive(Clone, Debug)]
pub enum CheckResult {
    /// The path does not exist on the live filesystem.
    Missing {
        /// The path that was checked.
        path: AbsAnyPath,
    },
    /// The path exists and is a regular file.
    ExistingFile {
        /// The path that was checked.
        path: AbsAnyPath,
        /// Mismatches found, sorted most-severe first. Empty means a match.
        mismatches: Vec<Mismatch>,
    },
    /// The path exists and is a directory.
    ExistingDirectory {
        /// The path that was checked.
        path: AbsAnyPath,
        /// Mismatches found, sorted most-severe first. Empty means a match.
        mismatches: Vec<Mismatch>,
    },
}

impl CheckResult {
    /// The path this result describes.
    pub fn path(&self) -> &AbsAnyPath {
        match self {
            Self::Missing { path } => path,
            Self::ExistingFile { path, .. } => path,
            Self::ExistingDirectory { path, .. } => path,
        }
    }

    /// Mismatches found, sorted most-severe first. Always empty for
    /// [`CheckResult::Missing`], since there's nothing to compare field by
    /// field.
    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            Self::Missing { .. } => &[],
            Self::ExistingFile { mismatches, .. } => mismatches,
            Self::ExistingDirectory { mismatches, .. } => mismatches,
        }
    }

    /// Whether the live path matches its recorded imprint exactly.
    ///
    /// A missing path is never considered a match.
    pub fn is_match(&self) -> bool {
        !matches!(self, Self::Missing { .. }) && self.mismatches().is_empty()
    }
}

fn compare_filenames(live: &AbsAnyPath, recorded: &Imprint) -> Option<Mismatch> {
    let live_name = live.file_name_str();
    let recorded_name = recorded.path().file_name_str();
    match (live_name, recorded_name) {
        (Some(live), Some(recorded)) if live != recorded => Some(Mismatch::Filename),
        _ => None,
    }
}

fn compare_mtime(live: Timestamp, recorded: &Imprint) -> Option<Mismatch> {
    (live != *recorded.content_modified_at()).then_some(Mismatch::ContentModifiedAt)
}

/// Compare a live filesystem path against its recorded imprint.
///
/// Per-path failures (e.g. permission denied while stream-hashing) are
/// returned as an `Err`; they don't abort a broader check run, which is the
/// caller's responsibility to continue past.
#[instrument(skip(imprint, config), fields(path = %path))]
pub async fn check_path(
    path: AbsAnyPath,
    imprint: &Imprint,
    config: &CheckerConfig,
) -> Result<CheckResult> {
    config.listener.before_check_path(path.as_std_path());
    config.listener.on_check_path(path.as_std_path());

    let result = check_path_inner(path.clone(), imprint).await?;

    if !result.mismatches().is_empty() {
        config.listener.on_result_mismatch(&result);
    }
    config.listener.after_check_path(path.as_std_path());
    Ok(result)
}

async fn check_path_inner(path: AbsAnyPath, imprint: &Imprint) -> Result<CheckResult> {
    // Read through symlinks for type/content, same as the generator: a live
    // symlink is compared as whatever it resolves to, not flagged unsupported.
    let metadata = match tokio::fs::metadata(path.as_std_path()).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            trace!(%path, "path missing during check");
            return Ok(CheckResult::Missing { path });
        }
        Err(err) => return Err(Error::io(path.as_std_path(), err)),
    };

    if metadata.is_file() {
        let mtime: Timestamp = metadata
            .modified()
            .map_err(|err| Error::io(path.as_std_path(), err))?
            .try_into()
            .map_err(|_| {
                Error::io(
                    path.as_std_path(),
                    std::io::Error::other("mtime is outside the representable timestamp range"),
                )
            })?;

        let content_fingerprint = hash_file(&path).await?;

        let mut mismatches = Vec::new();
        if content_fingerprint != *imprint.content_fingerprint() {
            mismatches.push(Mismatch::ContentFingerprint);
        }
        if let Some(mismatch) = compare_mtime(mtime, imprint) {
            mismatches.push(mismatch);
        }
        if let Some(mismatch) = compare_filenames(&path, imprint) {
            mismatches.push(mismatch);
        }
        mismatches.sort();

        Ok(CheckResult::ExistingFile { path, mismatches })
    } else if metadata.is_dir() {
        let mut mismatches = Vec::new();
        if let Some(mismatch) = compare_filenames(&path, imprint) {
            mismatches.push(mismatch);
        }
        mismatches.sort();

        Ok(CheckResult::ExistingDirectory { path, mismatches })
    } else {
        Err(Error::UnsupportedPath(path.as_std_path().to_path_buf()))
    }
}

async fn hash_file(path: &AbsAnyPath) -> Result<Hash> {
    let path = path.as_std_path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|err| Error::io(path.clone(), err))?;
        file.pipe(std::io::BufReader::new)
            .pipe(Hash::hash_stream)
            .map_err(|err| Error::io(path.clone(), err))
    })
    .await
    .map_err(|err| Error::ConsumerError(format!("hashing task panicked: {err}")))?
}

/// Drive [`check_path`] concurrently over every imprint in `imprints`,
/// handing each outcome to `result_consumer` as it completes.
///
/// Concurrency is bounded two ways, mirroring the executor described for the
/// checker: `config.compute_executor`'s thread count caps how many paths are
/// actively being stat'd/hashed at once, and `config.queue_depth` caps how
/// far producers may race ahead of a slow consumer — once that many results
/// are buffered awaiting consumption, the task that would submit the next
/// one blocks instead of piling up further in-flight work, the async
/// equivalent of a bounded executor's caller-runs policy.
///
/// A malformed row from the imprint source (`Err` in `imprints`) is handed
/// to `result_consumer` as-is; it does not abort the run. If the consumer
/// itself errors, the first such error is latched and returned once every
/// path has been checked, matching the generator's "first consumer error"
/// semantics.
pub async fn check_all(
    imprints: impl IntoIterator<Item = Result<Imprint>>,
    config: &CheckerConfig,
    mut result_consumer: impl FnMut(Result<CheckResult>) -> Result<()> + Send + 'static,
) -> Result<()> {
    let compute_permits = Arc::new(Semaphore::new(config.compute_executor.thread_count().max(1)));
    let (tx, rx) = flume::bounded::<Result<CheckResult>>(config.queue_depth.max(1));

    let first_error = Arc::new(Mutex::new(None));
    let first_error_for_emit = first_error.clone();
    let emit_task = tokio::spawn(async move {
        while let Ok(result) = rx.recv_async().await {
            if let Err(err) = result_consumer(result) {
                let mut slot = first_error_for_emit.lock().await;
                if slot.is_none() {
                    *slot = Some(err);
                }
            }
        }
    });

    let mut handles = Vec::new();
    for row in imprints {
        let tx = tx.clone();
        match row {
            Ok(imprint) => {
                let permits = compute_permits.clone();
                let config = config.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.expect("compute semaphore is never closed");
                    let path = imprint.path().clone();
                    let result = check_path(path, &imprint, &config).await;
                    let _ = tx.send_async(result).await;
                }));
            }
            Err(err) => {
                handles.push(tokio::spawn(async move {
                    let _ = tx.send_async(Err(err)).await;
                }));
            }
        }
    }
    drop(tx);

    for handle in handles {
        handle
            .await
            .map_err(|err| Error::ConsumerError(format!("check task panicked: {err}")))?;
    }
    emit_task
        .await
        .map_err(|err| Error::ConsumerError(format!("emit task panicked: {err}")))?;

    if let Some(err) = first_error.lock().await.take() {
        return Err(err);
    }
    Ok(())
}
