pub mod config;
pub mod lease;
pub mod orchestrator;
pub mod service;
pub mod telemetry;
