pub mod config;
pub mod controller;
pub mod messages;
pub mod runtime;
pub mod telemetry;
