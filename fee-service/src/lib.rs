//! Fee Service - Per-session school fee management with balance carry-forward.

pub mod config;
pub mod models;
pub mod services;
pub mod startup;
