pub mod commands;
pub mod error;

pub use commands::{run, Args, Output, USAGE};
pub use error::CliError;
