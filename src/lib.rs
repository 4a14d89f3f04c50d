pub mod api;
pub mod collector;
pub mod config;
pub mod domain;
pub mod ml;
pub mod telemetry;
