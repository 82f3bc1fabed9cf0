pub mod cli;
pub mod config;
pub mod mcp;
pub mod service;
pub mod supervisor;
pub mod telemetry;
