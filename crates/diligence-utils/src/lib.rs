//! Shared utilities for diligence-rs
//!
//! This crate provides common functionality used across the diligence-rs workspace,
//! including logging setup and the base application configuration.

pub mod config;
pub mod logging;

pub use config::{AppConfig, env_override};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
