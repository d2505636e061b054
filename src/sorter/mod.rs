pub mod archive;
pub mod categorize;
pub mod config;
pub mod error_log;
pub mod handoff;
pub mod intake;
pub mod locks;
pub mod normalize;
pub mod paths;
pub mod pipeline;
pub mod quarantine;
pub mod resolve;
pub mod util;
pub mod watcher;
