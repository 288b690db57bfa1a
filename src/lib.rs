pub mod cli;
pub use cli::Cli;
pub mod config;
pub mod error;
pub use error::{Error, Result};
pub mod logging;
pub mod server;
pub mod service;
