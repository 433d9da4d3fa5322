use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Args, ValueEnum};
use color_eyre::eyre::{Context as _, Result};
use datim::{
    AbsAnyPath, DatimWriter, Error, Exclusions, ExecutorStrategy, Generator, GeneratorConfig,
    LineTerminator,
};
use tracing::instrument;

use crate::cmd::require_utf8;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExecutorKind {
    FixedThread,
    CachedThread,
    ForkJoinFifo,
    ForkJoinLifo,
}

impl ExecutorKind {
    fn into_strategy(self, threads: usize) -> ExecutorStrategy {
        match self {
            Self::FixedThread => ExecutorStrategy::FixedThread { threads },
            Self::CachedThread => ExecutorStrategy::CachedThread { threads },
            Self::ForkJoinFifo => ExecutorStrategy::ForkJoinFifo { threads },
            Self::ForkJoinLifo => ExecutorStrategy::ForkJoinLifo { threads },
        }
    }
}

/// Options for `datim generate`.
#[derive(Clone, Args, Debug)]
pub struct Options {
    /// Roots to fingerprint.
    #[arg(required = true)]
    data: Vec<PathBuf>,

    /// Where to write the `.datim` output. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Text encoding of the output file.
    #[arg(long, default_value = "utf-8")]
    output_charset: String,

    /// Compute pool scheduling strategy.
    #[arg(long, value_enum, default_value_t = ExecutorKind::FixedThread)]
    executor: ExecutorKind,

    /// Exact path to skip, may be repeated.
    #[arg(long = "exclude-path")]
    exclude_path: Vec<PathBuf>,

    /// Glob matched against a descendant's full canonical path, may be repeated.
    #[arg(long = "exclude-path-glob")]
    exclude_path_glob: Vec<String>,

    /// Glob matched against a descendant's final path component only, may be repeated.
    #[arg(long = "exclude-filename-glob")]
    exclude_filename_glob: Vec<String>,
}

fn build_exclusions(options: &Options) -> Result<Exclusions> {
    let literal_paths = options
        .exclude_path
        .iter()
        .map(AbsAnyPath::canonicalize)
        .collect::<Result<Vec<_>, _>>()
        .context("canonicalize --exclude-path")?;

    let path_globs = options
        .exclude_path_glob
        .iter()
        .map(|pattern| glob::Pattern::new(pattern))
        .collect::<Result<Vec<_>, _>>()
        .context("parse --exclude-path-glob")?;

    let filename_globs = options
        .exclude_filename_glob
        .iter()
        .map(|pattern| glob::Pattern::new(pattern))
        .collect::<Result<Vec<_>, _>>()
        .context("parse --exclude-filename-glob")?;

    Ok(Exclusions::builder()
        .literal_paths(literal_paths)
        .path_globs(path_globs)
        .filename_globs(filename_globs)
        .build())
}

#[instrument(skip(options))]
pub async fn exec(options: Options) -> Result<()> {
    require_utf8(&options.output_charset)?;

    let exclusions = build_exclusions(&options)?;
    let threads = num_cpus::get();
    let config = GeneratorConfig::builder()
        .compute_executor(options.executor.into_strategy(threads))
        .exclusions(exclusions)
        .build();
    let generator = Generator::new(config);

    let output: Box<dyn Write + Send> = match &options.output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("create output file {path:?}"))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let writer = Arc::new(Mutex::new(DatimWriter::new(output, LineTerminator::default())));
    writer
        .lock()
        .expect("writer mutex poisoned")
        .write_header()
        .map_err(datim_error)?;

    for root in &options.data {
        let base = AbsAnyPath::canonicalize(root)
            .with_context(|| format!("canonicalize {root:?}"))?
            .into_dir();
        writer
            .lock()
            .expect("writer mutex poisoned")
            .write_base_path(&base)
            .map_err(datim_error)?;

        let sink = writer.clone();
        generator
            .produce_imprint(base.erase_kind(), move |imprint| {
                sink.lock()
                    .expect("writer mutex poisoned")
                    .write_imprint(&imprint)
                    .map_err(|err| Error::ConsumerError(err.to_string()))
            })
            .await
            .map_err(datim_error)
            .with_context(|| format!("generate imprint for {root:?}"))?;
    }

    Ok(())
}

fn datim_error(err: Error) -> color_eyre::eyre::Error {
    color_eyre::eyre::eyre!(err)
}
