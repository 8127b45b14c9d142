pub mod config;
pub mod engine;
pub mod exchange;
pub mod orders;
pub mod resilience;
pub mod types;
