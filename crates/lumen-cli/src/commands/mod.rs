//! CLI subcommand implementations.

pub mod award;
pub mod evaluate;
pub mod freeze;
pub mod log_time;
pub mod progress;
pub mod record;
pub mod status;
pub mod sweep;
pub mod util;
