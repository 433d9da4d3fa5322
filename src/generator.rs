//! The parallel imprint generator: walks a tree, hashes as it goes, and
//! emits one record per visited path to a caller-supplied consumer.
//!
//! The two logical executors from the concurrency model are realized here as
//! plain `tokio` primitives rather than a bespoke thread pool: a [`Semaphore`]
//! throttles the *compute pool* (stat/read/hash work), and a single spawned
//! task reading off a `flume` channel is the *emit pool*, so the consumer
//! closure never needs to be `Sync` or hold its own lock.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use jiff::Timestamp;
use tap::Pipe as _;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, instrument, trace, warn};

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::hash::{fold_hashes, Hash};
use crate::imprint::Imprint;
use crate::path::AbsAnyPath;

/// Generates imprints for one or more trees under a shared configuration.
///
/// Cheap to clone: internals are reference-counted. The "first consumer
/// error" slot is shared across every [`Generator::produce_imprint`] call
/// made through the same instance.
#[derive(Clone)]
pub struct Generator {
    config: Arc<GeneratorConfig>,
    compute_permits: Arc<Semaphore>,
    first_consumer_error: Arc<Mutex<Option<Error>>>,
}

impl Generator {
    /// Build a generator from an immutable configuration.
    pub fn new(config: GeneratorConfig) -> Self {
        let threads = config.compute_executor.thread_count().max(1);
        Self {
            config: Arc::new(config),
            compute_permits: Arc::new(Semaphore::new(threads)),
            first_consumer_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Recursively walk `root`, emitting one imprint per visited path to
    /// `consumer`, and return the composite imprint for `root` itself.
    ///
    /// May be called multiple times on the same generator; calls are
    /// independent of each other except for sharing the first-consumer-error
    /// slot described on [`Generator`].
    #[instrument(skip(self, consumer), fields(root = %root))]
    pub async fn produce_imprint(
        &self,
        root: AbsAnyPath,
        mut consumer: impl FnMut(Imprint) -> Result<()> + Send + 'static,
    ) -> Result<Imprint> {
        let canonical_root = AbsAnyPath::canonicalize(root.as_std_path())?;

        let (tx, rx) = flume::unbounded::<Imprint>();
        let first_error_for_emit = self.first_consumer_error.clone();
        let emit_task = tokio::spawn(async move {
            while let Ok(imprint) = rx.recv_async().await {
                if let Err(err) = consumer(imprint) {
                    let mut slot = first_error_for_emit.lock().await;
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                }
            }
        });

        let result = walk(
            self.config.clone(),
            self.compute_permits.clone(),
            canonical_root,
            tx.clone(),
        )
        .await;
        drop(tx);
        emit_task
            .await
            .map_err(|err| Error::ConsumerError(format!("emit task panicked: {err}")))?;

        let imprint = result?;
        if let Some(err) = self.first_consumer_error.lock().await.take() {
            return Err(err);
        }
        Ok(imprint)
    }
}

fn is_permission_denied(err: &Error) -> bool {
    matches!(err, Error::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied)
}

#[cfg(windows)]
async fn is_dos_hidden_or_system(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => {
            let attrs = metadata.file_attributes();
            attrs & FILE_ATTRIBUTE_HIDDEN != 0 || attrs & FILE_ATTRIBUTE_SYSTEM != 0
        }
        Err(_) => false,
    }
}

#[cfg(not(windows))]
async fn is_dos_hidden_or_system(_path: &Path) -> bool {
    false
}

async fn hash_file(path: &Path) -> Result<Hash> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|err| Error::io(path.clone(), err))?;
        file.pipe(std::io::BufReader::new)
            .pipe(Hash::hash_stream)
            .map_err(|err| Error::io(path.clone(), err))
    })
    .await
    .map_err(|err| Error::ConsumerError(format!("hashing task panicked: {err}")))?
}

fn mtime_of(metadata: &std::fs::Metadata, path: &Path) -> Result<Timestamp> {
    metadata
        .modified()
        .map_err(|err| Error::io(path, err))?
        .try_into()
        .map_err(|_| {
            Error::io(
                path,
                std::io::Error::other("mtime is outside the representable timestamp range"),
            )
        })
}

/// Walk one path (file or directory), recursing into directories with one
/// spawned task per surviving child.
///
/// Boxed because async fns can't recurse directly; `'static` because each
/// recursive step is `tokio::spawn`ed, which requires owned futures.
fn walk(
    config: Arc<GeneratorConfig>,
    compute_permits: Arc<Semaphore>,
    path: AbsAnyPath,
    tx: flume::Sender<Imprint>,
) -> BoxFuture<'static, Result<Imprint>> {
    Box::pin(async move {
        let permit = compute_permits
            .clone()
            .acquire_owned()
            .await
            .expect("compute semaphore is never closed");

        // Identity (`path`) stays the non-canonicalized entry as listed by the
        // parent; type and mtime are read through the symlink, so a
        // symlink-to-file is hashed as a file and a symlink-to-directory is
        // walked as a directory, rather than rejected as unsupported.
        let metadata = tokio::fs::metadata(path.as_std_path())
            .await
            .map_err(|err| Error::io(path.as_std_path(), err))?;
        let mtime = mtime_of(&metadata, path.as_std_path())?;

        config.listener.on_generate_imprint(path.as_std_path());

        if metadata.is_file() {
            config.listener.before_hash_file(path.as_std_path());
            let content_fingerprint = hash_file(path.as_std_path()).await?;
            config.listener.after_hash_file(path.as_std_path());
            drop(permit);

            let imprint = Imprint::for_file(path.clone(), mtime, content_fingerprint, true)?;
            trace!(path = %path, fingerprint = %imprint.fingerprint(), "hashed file");
            tx.send_async(imprint.clone())
                .await
                .map_err(|_| Error::ConsumerError("emit channel closed early".to_string()))?;
            Ok(imprint)
        } else if metadata.is_dir() {
            config.listener.on_enter_directory(path.as_std_path());
            let dir = path.clone().into_dir();

            let mut read_dir = tokio::fs::read_dir(dir.as_std_path())
                .await
                .map_err(|err| Error::io(path.as_std_path(), err))?;

            let mut children = Vec::new();
            loop {
                let entry = read_dir
                    .next_entry()
                    .await
                    .map_err(|err| Error::io(path.as_std_path(), err))?;
                let Some(entry) = entry else { break };

                let file_name = entry.file_name();
                let file_name_str = file_name.to_string_lossy().into_owned();
                let child_path = dir.join_dir(file_name).erase_kind();

                if config.exclusions.excludes_file_name(&file_name_str)
                    || config.exclusions.excludes_path(&child_path)
                {
                    config.listener.on_skip_excluded_path(child_path.as_std_path());
                    continue;
                }
                if is_dos_hidden_or_system(child_path.as_std_path()).await {
                    continue;
                }
                children.push(child_path);
            }
            drop(permit);
            drop(read_dir);

            let mut handles = Vec::with_capacity(children.len());
            for child in children {
                let config = config.clone();
                let compute_permits = compute_permits.clone();
                let tx = tx.clone();
                let child_for_error = child.clone();
                handles.push((
                    child_for_error,
                    tokio::spawn(walk(config, compute_permits, child, tx)),
                ));
            }

            let mut child_imprints = Vec::with_capacity(handles.len());
            for (child_path, handle) in handles {
                let outcome = handle
                    .await
                    .map_err(|err| Error::ConsumerError(format!("compute task panicked: {err}")))?;
                match outcome {
                    Ok(imprint) => child_imprints.push(imprint),
                    Err(err) if is_permission_denied(&err) => {
                        warn!(path = %child_path, "skipping unreadable path");
                        config
                            .listener
                            .on_skip_unreadable_path(child_path.as_std_path());
                    }
                    Err(err) => return Err(err),
                }
            }

            child_imprints.sort_by(|a, b| a.path().file_name_str().cmp(&b.path().file_name_str()));

            let content_fingerprint =
                fold_hashes(child_imprints.iter().map(Imprint::content_fingerprint));
            let children_fingerprint =
                fold_hashes(child_imprints.iter().map(Imprint::fingerprint));

            let imprint = Imprint::for_directory(
                path.clone(),
                mtime,
                content_fingerprint,
                children_fingerprint,
                true,
            )?;
            debug!(path = %path, children = child_imprints.len(), "composed directory imprint");
            tx.send_async(imprint.clone())
                .await
                .map_err(|_| Error::ConsumerError("emit channel closed early".to_string()))?;
            Ok(imprint)
        } else {
            drop(permit);
            Err(Error::UnsupportedPath(path.as_std_path().to_path_buf()))
        }
    })
}
