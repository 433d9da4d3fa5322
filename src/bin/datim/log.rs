use clap::ValueEnum;
use color_eyre::Result;
use tracing_error::ErrorLayer;
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _};
use tracing_tree::HierarchicalLayer;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum WhenColor {
    Always,
    Never,
    Auto,
}

/// Build the process-wide tracing subscriber.
///
/// Mirrors the layering the library's `#[instrument]` spans expect:
/// `ErrorLayer` so `color_eyre` reports can capture the active span trace,
/// then a human-readable tree of spans filtered by `DATIM_LOG`.
pub fn make_logger(color: WhenColor) -> Result<impl tracing::Subscriber> {
    let tree = HierarchicalLayer::new(2)
        .with_indent_lines(true)
        .with_targets(true)
        .with_ansi(match color {
            WhenColor::Always => true,
            WhenColor::Never => false,
            WhenColor::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        })
        .with_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_env_var("DATIM_LOG")
                .from_env_lossy(),
        );

    Ok(tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(tree))
}
