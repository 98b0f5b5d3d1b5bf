//! Command line configuration and process bootstrap for the `roster` binary.

pub mod bootstrap_helpers;
pub mod cli_args;

pub use bootstrap_helpers::init_tracing;
pub use cli_args::Cli;
