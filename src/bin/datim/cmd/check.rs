use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Args;
use color_eyre::eyre::{eyre, Context as _, Result};
use datim::{check_all, AbsAnyPath, CheckResult, CheckerConfig, DatimReader, Error};
use tracing::instrument;

use crate::cmd::require_utf8;

/// Options for `datim check`.
#[derive(Clone, Args, Debug)]
pub struct Options {
    /// Root to compare against the recorded imprint.
    data: PathBuf,

    /// The `.datim` file to check against.
    #[arg(long)]
    imprint: PathBuf,

    /// Text encoding of the imprint file.
    #[arg(long, default_value = "utf-8")]
    imprint_charset: String,

    /// Where to write the check report. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Text encoding of the output report.
    #[arg(long, default_value = "utf-8")]
    output_charset: String,
}

#[instrument(skip(options))]
pub async fn exec(options: Options) -> Result<()> {
    require_utf8(&options.imprint_charset)?;
    require_utf8(&options.output_charset)?;

    let new_root = AbsAnyPath::canonicalize(&options.data)
        .with_context(|| format!("canonicalize {:?}", options.data))?
        .into_dir();

    let imprint_file = std::fs::File::open(&options.imprint)
        .with_context(|| format!("open imprint file {:?}", options.imprint))?;
    let reader = DatimReader::new(BufReader::new(imprint_file), Some(new_root))
        .with_context(|| format!("read header of {:?}", options.imprint))?;
    let imprints: Vec<Result<datim::Imprint, Error>> = reader.collect();

    let output: Box<dyn Write + Send> = match &options.output {
        Some(path) => Box::new(
            std::fs::File::create(path).with_context(|| format!("create output file {path:?}"))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let output = Arc::new(Mutex::new(output));

    let mismatched = Arc::new(Mutex::new(0u64));
    let missing = Arc::new(Mutex::new(0u64));
    let matched = Arc::new(Mutex::new(0u64));

    let report_sink = output.clone();
    let mismatched_count = mismatched.clone();
    let missing_count = missing.clone();
    let matched_count = matched.clone();

    let config = CheckerConfig::builder().build();
    check_all(imprints, &config, move |result| {
        let line = match result {
            Ok(CheckResult::Missing { path }) => {
                *missing_count.lock().expect("missing counter poisoned") += 1;
                format!("MISSING\t{}\n", path.as_std_path().display())
            }
            Ok(result) if result.is_match() => {
                *matched_count.lock().expect("matched counter poisoned") += 1;
                format!("MATCH\t{}\n", result.path().as_std_path().display())
            }
            Ok(result) => {
                *mismatched_count.lock().expect("mismatched counter poisoned") += 1;
                let mismatches: Vec<&str> = result
                    .mismatches()
                    .iter()
                    .map(|mismatch| match mismatch {
                        datim::Mismatch::ContentFingerprint => "content-fingerprint",
                        datim::Mismatch::ContentModifiedAt => "content-modifiedAt",
                        datim::Mismatch::Filename => "filename",
                    })
                    .collect();
                format!(
                    "MISMATCH\t{}\t{}\n",
                    result.path().as_std_path().display(),
                    mismatches.join(",")
                )
            }
            Err(err) => {
                *mismatched_count.lock().expect("mismatched counter poisoned") += 1;
                format!("ERROR\t{err}\n")
            }
        };
        report_sink
            .lock()
            .expect("output mutex poisoned")
            .write_all(line.as_bytes())
            .map_err(|err| Error::ConsumerError(err.to_string()))
    })
    .await
    .map_err(|err| eyre!(err))
    .context("check tree against imprint")?;

    let matched = *matched.lock().expect("matched counter poisoned");
    let mismatched = *mismatched.lock().expect("mismatched counter poisoned");
    let missing = *missing.lock().expect("missing counter poisoned");
    tracing::info!(matched, mismatched, missing, "check complete");

    if mismatched > 0 || missing > 0 {
        return Err(eyre!(
            "check failed: {mismatched} mismatched, {missing} missing, {matched} matched"
        ));
    }

    Ok(())
}
