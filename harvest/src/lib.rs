pub mod cli;
pub mod credentials;
pub mod load_config;
pub mod source;

pub use cli::{run, Cli, Commands};
