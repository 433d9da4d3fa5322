//! Immutable configuration for the generator and checker.
//!
//! Built with `bon`'s derive macro: plain data, no environment or file reads
//! baked in. Translating CLI flags or env vars into one of these structs is
//! the binary's job, not this module's.

use std::sync::Arc;

use bon::Builder;
use glob::Pattern;

use crate::listener::{Listener, NullListener};
use crate::path::AbsAnyPath;

/// How the compute pool (traversal + hashing) schedules its workers.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ExecutorStrategy {
    /// A fixed-size pool of `threads` workers.
    FixedThread { threads: usize },
    /// A pool that grows up to `threads` workers and lets idle ones exit.
    CachedThread { threads: usize },
    /// A work-stealing pool of `threads` workers, FIFO local queues.
    ForkJoinFifo { threads: usize },
    /// A work-stealing pool of `threads` workers, LIFO local queues.
    ForkJoinLifo { threads: usize },
}

impl ExecutorStrategy {
    /// The number of worker threads this strategy was configured with.
    pub fn thread_count(&self) -> usize {
        match *self {
            Self::FixedThread { threads }
            | Self::CachedThread { threads }
            | Self::ForkJoinFifo { threads }
            | Self::ForkJoinLifo { threads } => threads,
        }
    }

    /// A fixed-size pool with one worker per available CPU.
    pub fn fixed_thread_per_cpu() -> Self {
        Self::FixedThread {
            threads: num_cpus::get(),
        }
    }
}

impl Default for ExecutorStrategy {
    fn default() -> Self {
        Self::fixed_thread_per_cpu()
    }
}

/// A set of exclusion rules applied to descendants during a walk.
///
/// Never applied to the root of a walk, only to children discovered while
/// recursing into it.
#[derive(Clone, Debug, Default, Builder)]
pub struct Exclusions {
    /// Exact canonical path matches.
    #[builder(default, into)]
    pub literal_paths: Vec<AbsAnyPath>,

    /// Glob patterns matched against a child's full canonical path.
    #[builder(default)]
    pub path_globs: Vec<Pattern>,

    /// Glob patterns matched against a child's final path component only.
    #[builder(default)]
    pub filename_globs: Vec<Pattern>,
}

impl Exclusions {
    /// Whether `candidate` (a canonical path) matches a literal exclusion or
    /// a path glob.
    pub fn excludes_path(&self, candidate: &AbsAnyPath) -> bool {
        if self.literal_paths.iter().any(|p| p == candidate) {
            return true;
        }
        let display = candidate.as_std_path().display().to_string();
        self.path_globs.iter().any(|glob| glob.matches(&display))
    }

    /// Whether `file_name` (a child's final path component) matches a
    /// filename glob.
    pub fn excludes_file_name(&self, file_name: &str) -> bool {
        self.filename_globs.iter().any(|glob| glob.matches(file_name))
    }
}

/// Configuration for [`crate::generator`].
#[derive(Clone, Builder)]
pub struct GeneratorConfig {
    /// Scheduling strategy for the compute pool.
    #[builder(default)]
    pub compute_executor: ExecutorStrategy,

    /// Exclusion rules applied to descendants.
    #[builder(default)]
    pub exclusions: Exclusions,

    /// Optional progress/diagnostic listener.
    #[builder(default = Arc::new(NullListener))]
    pub listener: Arc<dyn Listener>,
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("compute_executor", &self.compute_executor)
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}

/// Default depth of the checker's bounded task queue.
pub const DEFAULT_CHECK_QUEUE_DEPTH: usize = 1_000_000;

/// Configuration for [`crate::checker`].
#[derive(Clone, Builder)]
pub struct CheckerConfig {
    /// Scheduling strategy for the compute pool.
    #[builder(default)]
    pub compute_executor: ExecutorStrategy,

    /// Maximum number of in-flight check tasks before producers block.
    #[builder(default = DEFAULT_CHECK_QUEUE_DEPTH)]
    pub queue_depth: usize,

    /// Optional progress/diagnostic listener.
    #[builder(default = Arc::new(NullListener))]
    pub listener: Arc<dyn Listener>,
}

impl std::fmt::Debug for CheckerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckerConfig")
            .field("compute_executor", &self.compute_executor)
            .field("queue_depth", &self.queue_depth)
            .finish_non_exhaustive()
    }
}
