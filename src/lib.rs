pub mod app;
pub mod archive;
pub mod backup;
pub mod card;
pub mod clock;
pub mod config;
pub mod opt;
pub mod prompt;
pub mod scheduler;
pub mod srs;
pub mod stats;
