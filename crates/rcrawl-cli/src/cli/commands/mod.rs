//! CLI command handlers. Each command is in its own file for clarity.

mod reset;
mod run;
mod status;

pub use reset::run_reset;
pub use run::run_crawl;
pub use status::run_status;
