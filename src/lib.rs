pub mod apis;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod storage;
pub mod types;

// Ports the sources fetch through, and their network-backed implementations
pub mod app;
pub mod infra;

// Stored entities and the record-to-event mapping
pub mod domain;
