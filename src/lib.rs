pub mod analyzers;
pub mod checkpoint;
pub mod config;
pub mod fetch;
pub mod infra;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod services;
pub mod stats;
