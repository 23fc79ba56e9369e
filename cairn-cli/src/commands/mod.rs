//! Command handlers -- one module per subcommand

pub mod config;
pub mod policy;
pub mod simulate;
pub mod tree;
