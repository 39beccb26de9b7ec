pub mod budget;
pub mod client;
pub mod config;
pub mod connection_pool;
pub mod corpus;
pub mod errors;
pub mod executor;
pub mod metrics;
pub mod percentiles;
pub mod report;
pub mod runner;
pub mod stats;
pub mod trend;
pub mod utils;
pub mod worker;
