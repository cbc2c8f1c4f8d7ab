pub mod apis;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod history;
pub mod leaderboard;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod types;

// Application use cases and the ports they depend on
pub mod app;
pub mod infra;
