//! Polyglot Kernel Library
//!
//! Translation orchestration and backfill for forum content. The `polyglot`
//! binary wraps this library with an HTTP server and a CLI.

pub mod config;
pub mod content;
pub mod cron;
pub mod db;
pub mod error;
pub mod locale;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod routes;
pub mod services;
pub mod state;
