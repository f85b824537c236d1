pub mod logging;
pub mod offline;

// Re-export CLI types and functions for testing
pub mod cli;
pub use cli::{Cli, Commands, run_with_cli};
pub use offline::{DryRunCreator, OfflineIdProvider};
