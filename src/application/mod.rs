pub mod config;
pub mod coordinator;

pub use config::Config;
pub use coordinator::{ProgressChannel, ProgressSink, SearchCoordinator, SearchReport};
