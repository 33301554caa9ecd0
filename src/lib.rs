//! Statistics about git repositories: per-author and per-file insertions,
//! deletions and commits, blame-based line ownership, code age and
//! stability, across one or many repositories.

pub mod analyze;
pub mod blame;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod model;
pub mod output;
pub mod persons;
pub mod runner;
pub mod stats;
pub mod util;

pub use analyze::{analyze_repository, analyze_repository_with, blame_at, AnalysisPhase, RepoAnalyzer};
pub use cancel::CancelToken;
pub use config::{BlameExclusions, CopyMoveLevel, IdentityPolicy, Settings};
pub use error::{InspectError, Result};
pub use model::{AnalysisReport, RepositoryOutcome, RepositoryResult};
pub use runner::{run, run_with_cancel};
