//! Shared configuration and logging used across the platform.

/// Server and launch configuration types.
pub mod config;
/// Structured logging setup.
pub mod logging;
