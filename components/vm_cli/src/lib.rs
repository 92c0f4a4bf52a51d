//! Tiered VM command-line host
//!
//! Provides the Runtime struct and supporting modules for the `tiervm`
//! binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod programs;
pub mod runtime;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use programs::WorkloadKind;
pub use runtime::{FunctionReport, RunReport, Runtime};
