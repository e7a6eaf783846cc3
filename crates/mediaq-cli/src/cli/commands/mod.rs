//! CLI command handlers. Each command is in its own file.

mod cancel;
mod fetch;
mod serve;
mod stats;
mod status;
mod submit;

pub use cancel::run_cancel;
pub use fetch::run_fetch;
pub use serve::run_serve;
pub use stats::run_stats;
pub use status::run_status;
pub use submit::run_submit;
